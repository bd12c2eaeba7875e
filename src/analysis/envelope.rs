//! 后端响应形状识别
//!
//! 经由 API Gateway 的 Lambda 代理集成时，响应可能被包装成
//! `{"statusCode": 200, "body": "<JSON 字符串>"}`，也可能直接返回对象。
//! 提交接口还存在同步（直接返回分析结果）和异步（返回 jobId）两种模式，
//! 每次都要按响应内容判断。

use serde_json::Value;
use thiserror::Error;

use crate::analysis::models::JobHandle;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("body 不是合法的 JSON: {0}")]
    InvalidBody(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape {
    Direct(Value),
    Enveloped { status_code: Option<u16>, body: Value },
}

impl ResponseShape {
    pub fn into_inner(self) -> Value {
        match self {
            ResponseShape::Direct(value) => value,
            ResponseShape::Enveloped { body, .. } => body,
        }
    }
}

/// 同时存在 `statusCode` 和 `body` 时视为代理包装，字符串 body 会被解析为 JSON
pub fn classify_response(raw: Value) -> Result<ResponseShape, EnvelopeError> {
    let is_envelope = raw
        .as_object()
        .is_some_and(|obj| obj.contains_key("statusCode") && obj.contains_key("body"));
    if !is_envelope {
        return Ok(ResponseShape::Direct(raw));
    }

    let status_code = raw
        .get("statusCode")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok());
    let body = match raw.get("body") {
        Some(Value::String(text)) => parse_body_string(text)?,
        Some(other) => other.clone(),
        None => Value::Null,
    };
    Ok(ResponseShape::Enveloped { status_code, body })
}

/// 去掉代理包装；非包装响应原样返回
pub fn unwrap_envelope(raw: Value) -> Result<Value, EnvelopeError> {
    classify_response(raw).map(ResponseShape::into_inner)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionShape {
    /// 后端同步完成分析，响应本身就是最终结果
    SyncResult(Value),
    /// 后端已受理，需要轮询
    AsyncJob(JobHandle),
    /// 包装里的 `statusCode` 不是 2xx
    Rejected { status_code: u16, body: Value },
    Invalid { reason: String },
}

/// 包装（字符串或对象 body）里只接受受理回执；没有包装的对象可能是同步结果
pub fn classify_submission(parsed: Value) -> Result<SubmissionShape, EnvelopeError> {
    match classify_response(parsed)? {
        ResponseShape::Enveloped {
            status_code: Some(code),
            body,
        } if !(200..300).contains(&code) => Ok(SubmissionShape::Rejected {
            status_code: code,
            body,
        }),
        ResponseShape::Enveloped { body, .. } => Ok(classify_wrapped(&body)),
        ResponseShape::Direct(value) => {
            if let Some(Value::String(body)) = value.get("body") {
                let inner = parse_body_string(body)?;
                return Ok(classify_wrapped(&inner));
            }
            Ok(match job_acknowledgement(&value) {
                Some(job) => SubmissionShape::AsyncJob(job),
                None => SubmissionShape::SyncResult(value),
            })
        }
    }
}

fn classify_wrapped(inner: &Value) -> SubmissionShape {
    match job_acknowledgement(inner) {
        Some(job) => SubmissionShape::AsyncJob(job),
        None => SubmissionShape::Invalid {
            reason: inner
                .get("error")
                .and_then(Value::as_str)
                .map(|e| format!("后端未返回 jobId: {}", e))
                .unwrap_or_else(|| "响应中缺少 jobId".to_string()),
        },
    }
}

/// `{success: true, jobId}` 形式的受理回执
fn job_acknowledgement(value: &Value) -> Option<JobHandle> {
    if value.get("success").and_then(Value::as_bool) != Some(true) {
        return None;
    }
    let job_id = non_empty_str(value, "jobId")?;
    let polling_hint =
        non_empty_str(value, "pollingHint").or_else(|| non_empty_str(value, "resultUrl"));
    Some(JobHandle {
        job_id,
        polling_hint,
    })
}

fn non_empty_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_body_string(text: &str) -> Result<Value, EnvelopeError> {
    serde_json::from_str(text).map_err(|e| EnvelopeError::InvalidBody(e.to_string()))
}
