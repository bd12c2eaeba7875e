use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// 请求本身没有得到响应（连接失败、超时、跨域拦截等），区别于非 2xx 响应
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: vec![("Accept".to_string(), "application/json".to_string())],
            body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: &serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Accept".to_string(), "application/json".to_string()),
            ],
            body: Some(Bytes::from(body.to_string())),
        }
    }

    /// `Bytes` 的 clone 只增加引用计数，重试或记录请求时不会复制文件内容
    pub fn put_bytes(url: impl Into<String>, content_type: &str, bytes: Bytes) -> Self {
        Self {
            method: Method::PUT,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            body: Some(bytes),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// 响应体总是先按文本读取，是否为 JSON 由调用方判断
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            status_text: reason_phrase(status),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 状态码对应的标准描述，未知状态码返回空串
pub fn reason_phrase(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
        .to_string()
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// 基于 reqwest 的默认实现
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError(format!("创建 HTTP 客户端失败: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        debug!("{} {}", request.method, request.url);
        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| TransportError(e.to_string()))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| TransportError(e.to_string()))?;
        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            body,
        })
    }
}
