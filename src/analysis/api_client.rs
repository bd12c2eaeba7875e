use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::analysis::config::AnalysisClientConfig;
use crate::analysis::error::{AnalysisError, FlowPhase};
use crate::analysis::models::{AnalysisPreferences, AnalyzeRequest, JobHandle, TicketRequest};
use crate::analysis::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use crate::analysis::utils::join_url;

/// API 客户端，负责拼接后端地址并发出请求
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    config: AnalysisClientConfig,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn HttpTransport>, config: AnalysisClientConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &AnalysisClientConfig {
        &self.config
    }

    /// 未配置 base URL 时在任何网络请求之前失败
    pub fn ensure_configured(&self) -> Result<(), AnalysisError> {
        if self.config.api_base_url.trim().is_empty() {
            error!("❌ API base URL 未配置");
            return Err(AnalysisError::Configuration("api_base_url".to_string()));
        }
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<String, AnalysisError> {
        self.ensure_configured()?;
        Ok(join_url(&self.config.api_base_url, path))
    }

    async fn send(
        &self,
        phase: FlowPhase,
        request: HttpRequest,
    ) -> Result<HttpResponse, AnalysisError> {
        self.transport.send(request).await.map_err(|e| {
            error!("请求失败 ({}): {}", phase, e);
            AnalysisError::Network {
                phase,
                message: e.0,
            }
        })
    }

    /// 请求上传凭证
    pub async fn request_upload_ticket(
        &self,
        file_name: &str,
        file_type: &str,
        file_key: &str,
    ) -> Result<HttpResponse, AnalysisError> {
        let url = self.endpoint(&self.config.upload_url_path)?;
        info!("--- 阶段1: 正在请求上传凭证... ---");
        let payload = serde_json::to_value(TicketRequest {
            file_name,
            file_type,
            file_key,
        })
        .map_err(|e| AnalysisError::Configuration(format!("序列化凭证请求失败: {}", e)))?;
        debug!("凭证请求: {}", payload);
        self.send(FlowPhase::Stage, HttpRequest::post_json(url, &payload)).await
    }

    /// 把文件原始字节 PUT 到预签名地址
    pub async fn put_file(
        &self,
        upload_url: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<HttpResponse, AnalysisError> {
        info!("--- 阶段2: 正在上传文件 ({} 字节)... ---", bytes.len());
        self.send(
            FlowPhase::Transfer,
            HttpRequest::put_bytes(upload_url, content_type, bytes),
        )
        .await
    }

    /// 触发分析任务
    pub async fn trigger_analysis(
        &self,
        file_key: &str,
        file_name: &str,
        preferences: &AnalysisPreferences,
    ) -> Result<HttpResponse, AnalysisError> {
        let url = self.endpoint(&self.config.analyze_path)?;
        info!("--- 阶段3: 正在提交分析任务... ---");
        let payload = serde_json::to_value(AnalyzeRequest {
            file_key,
            file_name,
            preferences,
        })
        .map_err(|e| AnalysisError::Configuration(format!("序列化分析请求失败: {}", e)))?;
        debug!("分析请求: {}", payload);
        self.send(FlowPhase::Submit, HttpRequest::post_json(url, &payload)).await
    }

    pub fn status_url(&self, job_id: &str) -> Result<String, AnalysisError> {
        let base = self.endpoint(&self.config.status_path)?;
        Ok(format!("{}/{}", base.trim_end_matches('/'), urlencoding::encode(job_id)))
    }

    /// 结果文件地址：优先使用提交时返回的 pollingHint，其次是配置的约定地址
    pub fn result_location(&self, job: &JobHandle) -> Option<String> {
        if let Some(hint) = job.polling_hint.as_deref().filter(|h| !h.trim().is_empty()) {
            return Some(hint.to_string());
        }
        self.config
            .result_location_template
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(|t| t.replace("{jobId}", &urlencoding::encode(&job.job_id)))
    }

    /// 轮询时直接返回传输层错误，由调用方决定是否换下一个来源
    pub async fn fetch(&self, url: &str) -> Result<HttpResponse, TransportError> {
        self.transport.send(HttpRequest::get(url)).await
    }

    /// 连通性检查：health 接口返回 2xx 即视为可用
    pub async fn check_connectivity(&self) -> Result<bool, AnalysisError> {
        let url = self.endpoint(&self.config.health_path)?;
        let response = self.send(FlowPhase::Health, HttpRequest::get(url)).await?;
        debug!("health 响应: HTTP {} {}", response.status, response.body);
        if !response.is_success() {
            error!("❌ API 返回错误: {} {}", response.status, response.status_text);
        }
        Ok(response.is_success())
    }
}
