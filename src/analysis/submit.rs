use tracing::{debug, error, info, warn};

use crate::analysis::api_client::ApiClient;
use crate::analysis::envelope::{classify_submission, SubmissionShape};
use crate::analysis::error::{AnalysisError, FlowPhase};
use crate::analysis::events::{EventOutcome, Observers};
use crate::analysis::models::{AnalysisPreferences, AnalysisResult, JobHandle};
use crate::analysis::transport::reason_phrase;
use crate::analysis::utils::excerpt;

/// 提交结果：后端可能同步返回最终结果，也可能只返回 jobId
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Completed(AnalysisResult),
    Pending(JobHandle),
}

#[derive(Clone)]
pub struct JobSubmitter {
    api_client: ApiClient,
    observers: Observers,
}

impl JobSubmitter {
    pub fn new(api_client: ApiClient, observers: Observers) -> Self {
        Self {
            api_client,
            observers,
        }
    }

    pub async fn submit(
        &self,
        file_key: &str,
        file_name: &str,
        preferences: &AnalysisPreferences,
    ) -> Result<Submission, AnalysisError> {
        self.observers.emit(FlowPhase::Submit, None, EventOutcome::Started);
        let outcome = self.submit_inner(file_key, file_name, preferences).await;
        match &outcome {
            Ok(Submission::Completed(_)) => {
                self.observers.emit(FlowPhase::Submit, None, EventOutcome::Succeeded)
            }
            Ok(Submission::Pending(_)) => {
                self.observers.emit(FlowPhase::Submit, None, EventOutcome::Pending)
            }
            Err(e) => self.observers.emit(
                FlowPhase::Submit,
                None,
                EventOutcome::Failed {
                    reason: e.to_string(),
                },
            ),
        }
        outcome
    }

    async fn submit_inner(
        &self,
        file_key: &str,
        file_name: &str,
        preferences: &AnalysisPreferences,
    ) -> Result<Submission, AnalysisError> {
        let response = self
            .api_client
            .trigger_analysis(file_key, file_name, preferences)
            .await?;
        debug!("提交响应状态: {}", response.status);

        if !response.is_success() {
            error!("❌ API 返回错误: {} {}", response.status, response.body);
            return Err(AnalysisError::SubmissionFailed {
                status: response.status,
                status_text: response.status_text,
                body: response.body,
            });
        }

        let max_chars = self.api_client.config().details_excerpt_chars;
        let malformed = |reason: String| AnalysisError::ResponseMalformed {
            reason,
            excerpt: excerpt(&response.body, max_chars),
        };

        // 先按文本读取，再尝试解析
        let parsed: serde_json::Value = serde_json::from_str(&response.body).map_err(|e| {
            error!("❌ 响应不是合法 JSON: {}", excerpt(&response.body, max_chars));
            malformed(e.to_string())
        })?;

        match classify_submission(parsed).map_err(|e| malformed(e.to_string()))? {
            SubmissionShape::AsyncJob(job) => {
                info!("📨 任务已受理，jobId: {}", job.job_id);
                Ok(Submission::Pending(job))
            }
            SubmissionShape::SyncResult(value) => {
                info!("后端同步返回了分析结果");
                let result =
                    AnalysisResult::from_sync_payload(value).map_err(|e| malformed(e.to_string()))?;
                Ok(Submission::Completed(result))
            }
            SubmissionShape::Rejected { status_code, body } => {
                error!("❌ 包装内返回错误: {} {}", status_code, body);
                let body = match body {
                    serde_json::Value::String(text) => text,
                    other => other.to_string(),
                };
                Err(AnalysisError::SubmissionFailed {
                    status: status_code,
                    status_text: reason_phrase(status_code),
                    body,
                })
            }
            SubmissionShape::Invalid { reason } => {
                warn!("⚠️ 提交响应无效: {}", reason);
                Err(malformed(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::{json, network_error, test_config, text, ScriptedTransport};
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Arc;

    fn submitter(transport: Arc<ScriptedTransport>) -> JobSubmitter {
        JobSubmitter::new(ApiClient::new(transport, test_config()), Observers::new())
    }

    async fn submit_with(
        reply: crate::analysis::test_support::Reply,
    ) -> Result<Submission, AnalysisError> {
        let transport = ScriptedTransport::new()
            .on(Method::POST, "/analyze", vec![reply])
            .shared();
        submitter(transport)
            .submit("editais/abc-edital.pdf", "edital.pdf", &AnalysisPreferences::default())
            .await
    }

    #[tokio::test]
    async fn test_direct_job_ack_is_pending() {
        let outcome = submit_with(json(200, json!({"success": true, "jobId": "J1"})))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Submission::Pending(JobHandle {
                job_id: "J1".to_string(),
                polling_hint: None
            })
        );
    }

    #[tokio::test]
    async fn test_sync_result_is_completed() {
        let outcome = submit_with(json(
            200,
            json!({
                "success": true,
                "subjects": [{
                    "name": "Direito Constitucional",
                    "estimatedHours": 30,
                    "topics": ["Art. 5º"]
                }]
            }),
        ))
        .await
        .unwrap();
        match outcome {
            Submission::Completed(result) => {
                assert!(result.success);
                assert_eq!(result.subjects[0].topics[0].name, "Art. 5º");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_enveloped_job_ack() {
        let outcome = submit_with(json(
            200,
            json!({"statusCode": 200, "body": "{\"success\":true,\"jobId\":\"job-42\"}"}),
        ))
        .await
        .unwrap();
        assert!(matches!(outcome, Submission::Pending(ref job) if job.job_id == "job-42"));
    }

    #[tokio::test]
    async fn test_http_error_carries_status_and_body() {
        let err = submit_with(text(504, "Endpoint request timed out")).await.unwrap_err();
        let result = err.into_result();
        assert_eq!(result.error.as_deref(), Some("Erro HTTP 504: Gateway Timeout"));
        assert_eq!(result.details.as_deref(), Some("Endpoint request timed out"));
    }

    #[tokio::test]
    async fn test_invalid_json_details_are_bounded() {
        let raw = format!("<!DOCTYPE html>{}", "a".repeat(5000));
        let err = submit_with(text(200, &raw)).await.unwrap_err();
        match err {
            AnalysisError::ResponseMalformed { excerpt, .. } => {
                assert_eq!(excerpt.chars().count(), 503);
                assert!(excerpt.starts_with("<!DOCTYPE html>"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_enveloped_without_job_id_is_malformed() {
        let err = submit_with(json(200, json!({"statusCode": 200, "body": "{\"success\":true}"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "response_malformed");
    }

    #[tokio::test]
    async fn test_enveloped_lambda_error_is_submission_failure() {
        let reply = json(200, json!({"statusCode": 500, "body": {"error": "Lambda crashed"}}));
        let err = submit_with(reply).await.unwrap_err();
        assert_eq!(
            err,
            AnalysisError::SubmissionFailed {
                status: 500,
                status_text: "Internal Server Error".to_string(),
                body: "{\"error\":\"Lambda crashed\"}".to_string(),
            }
        );
        let result = err.into_result();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Erro HTTP 500: Internal Server Error"));
    }

    #[tokio::test]
    async fn test_error_shaped_body_is_not_a_success() {
        let err = submit_with(json(200, json!({"message": "Internal server error"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "response_malformed");
        assert!(!err.into_result().success);
    }

    #[tokio::test]
    async fn test_declared_failure_is_returned_as_failure() {
        let outcome = submit_with(json(200, json!({"success": false, "error": "PDF ilegível"})))
            .await
            .unwrap();
        match outcome {
            Submission::Completed(result) => {
                assert!(!result.success);
                assert_eq!(result.error.as_deref(), Some("PDF ilegível"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_network_error() {
        let err = submit_with(network_error("Failed to fetch")).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Network { phase: FlowPhase::Submit, .. }));
    }
}
