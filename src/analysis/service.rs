use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::analysis::api_client::ApiClient;
use crate::analysis::config::AnalysisClientConfig;
use crate::analysis::error::AnalysisError;
use crate::analysis::events::{Observers, SharedObserver, TracingObserver};
use crate::analysis::models::{
    AnalysisPreferences, AnalysisResult, FileUpload, JobHandle, UploadTicket,
};
use crate::analysis::poller::ResultPoller;
use crate::analysis::submit::{JobSubmitter, Submission};
use crate::analysis::transport::{HttpTransport, ReqwestTransport};
use crate::analysis::upload::UploadStager;

/// 分析服务主结构体：上传 → 提交 → 轮询
///
/// 每次调用的状态（凭证、jobId、轮询计数）都是局部的，同一个实例可以被多个任务并发使用。
#[derive(Clone)]
pub struct AnalysisService {
    api_client: ApiClient,
    observers: Observers,
}

impl AnalysisService {
    /// 使用 reqwest 传输层创建服务，并挂上默认的 tracing 观察者
    pub fn new(config: AnalysisClientConfig) -> Result<Self, AnalysisError> {
        let transport = ReqwestTransport::new(config.request_timeout()).map_err(|e| {
            AnalysisError::Configuration(e.to_string())
        })?;
        let mut service = Self::with_transport(Arc::new(transport), config);
        service.add_observer(Arc::new(TracingObserver));
        Ok(service)
    }

    pub fn with_transport(transport: Arc<dyn HttpTransport>, config: AnalysisClientConfig) -> Self {
        Self {
            api_client: ApiClient::new(transport, config),
            observers: Observers::new(),
        }
    }

    pub fn add_observer(&mut self, observer: SharedObserver) {
        self.observers.push(observer);
    }

    pub fn api_client(&self) -> &ApiClient {
        &self.api_client
    }

    pub async fn check_connectivity(&self) -> Result<bool, AnalysisError> {
        self.api_client.check_connectivity().await
    }

    pub async fn stage(&self, file: &FileUpload) -> Result<UploadTicket, AnalysisError> {
        UploadStager::new(self.api_client.clone(), self.observers.clone())
            .stage(file)
            .await
    }

    pub async fn submit(
        &self,
        file_key: &str,
        file_name: &str,
        preferences: &AnalysisPreferences,
    ) -> Result<Submission, AnalysisError> {
        JobSubmitter::new(self.api_client.clone(), self.observers.clone())
            .submit(file_key, file_name, preferences)
            .await
    }

    /// 轮询任务结果；取消只停止本地轮询，不会终止后端任务
    pub async fn poll(
        &self,
        job: &JobHandle,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        ResultPoller::from_api_client(&self.api_client, self.observers.clone())
            .poll(job, cancel)
            .await
    }

    /// 完整流程，所有错误都转换成 `success = false` 的结果
    pub async fn analyze(
        &self,
        file: &FileUpload,
        preferences: &AnalysisPreferences,
        cancel: &CancellationToken,
    ) -> AnalysisResult {
        match self.run(file, preferences, cancel).await {
            Ok(result) => {
                info!("🎉 分析完成，识别到 {} 门科目", result.subjects.len());
                result
            }
            Err(e) => {
                match &e {
                    AnalysisError::Cancelled => warn!("分析已取消: {}", file.file_name),
                    _ => error!("❌ 分析 '{}' 失败: {}", file.file_name, e),
                }
                e.into_result()
            }
        }
    }

    async fn run(
        &self,
        file: &FileUpload,
        preferences: &AnalysisPreferences,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        info!("🚀 开始分析: {} ({} 字节)", file.file_name, file.size());
        let ticket = self.stage(file).await?;
        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        match self.submit(&ticket.file_key, &file.file_name, preferences).await? {
            Submission::Completed(result) => Ok(result),
            Submission::Pending(job) => self.poll(&job, cancel).await,
        }
    }
}
