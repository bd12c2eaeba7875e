use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analysis::api_client::ApiClient;
use crate::analysis::envelope::{classify_response, unwrap_envelope, ResponseShape};
use crate::analysis::error::{AnalysisError, FlowPhase};
use crate::analysis::events::{EventOutcome, Observers};
use crate::analysis::models::{AnalysisResult, DEFAULT_JOB_ERROR, JobHandle, JobStatus};
use crate::analysis::transport::HttpResponse;
use crate::analysis::utils::excerpt;

/// 单个来源的一次查询结果
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    Completed(AnalysisResult),
    Failed(String),
    /// 仍在处理，或结果尚不可用（404）
    Pending,
}

/// 结果来源。返回 `Err` 表示传输层失败，轮询器会继续尝试下一个来源
#[async_trait]
pub trait ResultSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, job: &JobHandle) -> Result<PollStatus, String>;
}

/// 主来源：`GET <status_path>/<jobId>`
pub struct StatusEndpointSource {
    api_client: ApiClient,
}

impl StatusEndpointSource {
    pub fn new(api_client: ApiClient) -> Self {
        Self { api_client }
    }
}

#[async_trait]
impl ResultSource for StatusEndpointSource {
    fn name(&self) -> &'static str {
        "status_endpoint"
    }

    async fn fetch(&self, job: &JobHandle) -> Result<PollStatus, String> {
        let url = self.api_client.status_url(&job.job_id).map_err(|e| e.to_string())?;
        let response = self.api_client.fetch(&url).await.map_err(|e| e.to_string())?;
        interpret_response(response, self.api_client.config().details_excerpt_chars)
    }
}

/// 备用来源：直接读取结果文件（pollingHint 或约定地址）
pub struct ResultLocationSource {
    api_client: ApiClient,
}

impl ResultLocationSource {
    pub fn new(api_client: ApiClient) -> Self {
        Self { api_client }
    }
}

#[async_trait]
impl ResultSource for ResultLocationSource {
    fn name(&self) -> &'static str {
        "result_location"
    }

    async fn fetch(&self, job: &JobHandle) -> Result<PollStatus, String> {
        let url = self
            .api_client
            .result_location(job)
            .ok_or_else(|| "未配置结果文件地址".to_string())?;
        let response = self.api_client.fetch(&url).await.map_err(|e| e.to_string())?;
        interpret_response(response, self.api_client.config().details_excerpt_chars)
    }
}

pub(crate) fn interpret_response(
    response: HttpResponse,
    max_chars: usize,
) -> Result<PollStatus, String> {
    if response.status == 404 {
        return Ok(PollStatus::Pending);
    }
    if !response.is_success() {
        return Err(format!(
            "HTTP {}: {}",
            response.status,
            excerpt(&response.body, max_chars)
        ));
    }
    let value: Value = serde_json::from_str(&response.body)
        .map_err(|e| format!("JSON 解析失败: {} ({})", e, excerpt(&response.body, max_chars)))?;
    interpret_payload(value)
}

/// 解析状态响应：`status` 字段优先，没有时看 `success`
///
/// 包装里的 `statusCode` 与 HTTP 状态码同等对待：404 表示结果未就绪，其他非 2xx 视为该来源失败。
pub fn interpret_payload(value: Value) -> Result<PollStatus, String> {
    let payload = match classify_response(value).map_err(|e| e.to_string())? {
        ResponseShape::Enveloped {
            status_code: Some(404),
            ..
        } => return Ok(PollStatus::Pending),
        ResponseShape::Enveloped {
            status_code: Some(code),
            body,
        } if !(200..300).contains(&code) => {
            debug!("包装内的错误响应: {}", body);
            return Err(format!("HTTP {} (envelope)", code));
        }
        shape => shape.into_inner(),
    };
    if !payload.is_object() {
        return Err("状态响应不是 JSON 对象".to_string());
    }

    let status = payload.get("status").and_then(Value::as_str).map(JobStatus::parse);
    match status {
        Some(JobStatus::Success) => completed(extract_result(&payload)?),
        Some(JobStatus::Failed) => Ok(PollStatus::Failed(error_message(&payload))),
        Some(JobStatus::Running) => Ok(PollStatus::Pending),
        None if payload.get("success").and_then(Value::as_bool) == Some(true) => completed(payload),
        None => {
            debug!("状态响应中没有可识别的状态，继续等待");
            Ok(PollStatus::Pending)
        }
    }
}

/// 结果可能直接平铺在响应里，也可能放在 `result` / `output`（状态机输出）中
fn extract_result(payload: &Value) -> Result<Value, String> {
    for key in ["result", "output"] {
        match payload.get(key) {
            Some(Value::Object(_)) => {
                return unwrap_envelope(payload[key].clone()).map_err(|e| e.to_string());
            }
            Some(Value::String(text)) => {
                let inner: Value = serde_json::from_str(text)
                    .map_err(|e| format!("{} 字段解析失败: {}", key, e))?;
                return unwrap_envelope(inner).map_err(|e| e.to_string());
            }
            _ => {}
        }
    }
    Ok(payload.clone())
}

fn completed(result_value: Value) -> Result<PollStatus, String> {
    let result = AnalysisResult::from_backend_payload(result_value)
        .map_err(|e| format!("结果格式错误: {}", e))?;
    if result.success {
        Ok(PollStatus::Completed(result))
    } else {
        Ok(PollStatus::Failed(
            result.error.unwrap_or_else(|| DEFAULT_JOB_ERROR.to_string()),
        ))
    }
}

fn error_message(payload: &Value) -> String {
    let from_key = |key: &str| match payload.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Object(obj)) => obj.get("message").and_then(Value::as_str).map(str::to_string),
        _ => None,
    };
    from_key("error")
        .or_else(|| from_key("cause"))
        .unwrap_or_else(|| DEFAULT_JOB_ERROR.to_string())
}

/// 结果轮询器
///
/// 每一轮按顺序尝试各个来源，直到某个来源给出可识别的状态；所有来源都失败时
/// 本轮按“尚未就绪”处理。两轮之间用非阻塞的定时器等待。
/// 取消只会停止本地轮询，后端任务仍会继续执行。
#[derive(Clone)]
pub struct ResultPoller {
    sources: Vec<Arc<dyn ResultSource>>,
    interval: Duration,
    max_attempts: u32,
    observers: Observers,
}

impl ResultPoller {
    pub fn new(
        sources: Vec<Arc<dyn ResultSource>>,
        interval: Duration,
        max_attempts: u32,
        observers: Observers,
    ) -> Self {
        Self {
            sources,
            interval,
            max_attempts: max_attempts.max(1),
            observers,
        }
    }

    /// 默认来源顺序：状态接口，然后是结果文件
    pub fn from_api_client(api_client: &ApiClient, observers: Observers) -> Self {
        let config = api_client.config();
        let sources: Vec<Arc<dyn ResultSource>> = vec![
            Arc::new(StatusEndpointSource::new(api_client.clone())),
            Arc::new(ResultLocationSource::new(api_client.clone())),
        ];
        Self::new(sources, config.poll_interval(), config.max_poll_attempts, observers)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn poll(
        &self,
        job: &JobHandle,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        info!(
            "🔄 开始轮询任务 {} (每 {:?} 一次，最多 {} 次)",
            job.job_id, self.interval, self.max_attempts
        );

        for attempt in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                return Err(self.cancelled(attempt));
            }
            self.observers.emit(FlowPhase::Poll, Some(attempt), EventOutcome::Started);

            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled(attempt)),
                status = self.poll_once(job, attempt) => status,
            };

            match status {
                Some(PollStatus::Completed(result)) => {
                    info!("✅ 任务 {} 在第 {} 次查询时完成", job.job_id, attempt);
                    self.observers.emit(FlowPhase::Poll, Some(attempt), EventOutcome::Succeeded);
                    return Ok(result);
                }
                Some(PollStatus::Failed(message)) => {
                    warn!("❌ 任务 {} 失败: {}", job.job_id, message);
                    self.observers.emit(
                        FlowPhase::Poll,
                        Some(attempt),
                        EventOutcome::Failed {
                            reason: message.clone(),
                        },
                    );
                    return Err(AnalysisError::JobFailed { message });
                }
                Some(PollStatus::Pending) => {
                    debug!("任务 {} 第 {}/{} 次查询: 处理中", job.job_id, attempt, self.max_attempts);
                    self.observers.emit(FlowPhase::Poll, Some(attempt), EventOutcome::Pending);
                }
                None => {
                    warn!(
                        "⚠️ 第 {}/{} 次查询所有来源均失败，按未就绪处理",
                        attempt, self.max_attempts
                    );
                    self.observers.emit(FlowPhase::Poll, Some(attempt), EventOutcome::Pending);
                }
            }

            if attempt < self.max_attempts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(self.cancelled(attempt)),
                    _ = sleep(self.interval) => {}
                }
            }
        }

        warn!("⏰ 任务 {} 轮询超时，已查询 {} 次", job.job_id, self.max_attempts);
        self.observers.emit(
            FlowPhase::Poll,
            Some(self.max_attempts),
            EventOutcome::Failed {
                reason: "timeout".to_string(),
            },
        );
        Err(AnalysisError::Timeout {
            attempts: self.max_attempts,
        })
    }

    async fn poll_once(&self, job: &JobHandle, attempt: u32) -> Option<PollStatus> {
        for source in &self.sources {
            match source.fetch(job).await {
                Ok(status) => return Some(status),
                Err(reason) => {
                    warn!("⚠️ 来源 {} 查询失败: {}", source.name(), reason);
                    self.observers.emit(
                        FlowPhase::Poll,
                        Some(attempt),
                        EventOutcome::SourceFailed {
                            source: source.name(),
                            reason,
                        },
                    );
                }
            }
        }
        None
    }

    fn cancelled(&self, attempt: u32) -> AnalysisError {
        info!("轮询已取消 (第 {} 次查询)，后端任务不会因此停止", attempt);
        AnalysisError::Cancelled
    }
}
