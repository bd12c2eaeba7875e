//! 招考公告（edital）分析任务客户端
//!
//! 流程分三步：上传文件到预签名地址、提交异步分析任务、轮询任务结果。
//! 所有错误在 [`AnalysisService::analyze`] 边界统一转换为 `success = false` 的
//! [`AnalysisResult`]。

pub mod api_client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod events;
pub mod models;
pub mod poller;
pub mod service;
pub mod submit;
pub mod transport;
pub mod upload;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::AnalysisClientConfig;
pub use error::{AnalysisError, FlowPhase};
pub use events::{EventOutcome, FlowEvent, FlowObserver, TracingObserver};
pub use models::{AnalysisPreferences, AnalysisResult, FileUpload, JobHandle, UploadTicket};
pub use poller::{ResultPoller, ResultSource};
pub use service::AnalysisService;
pub use submit::Submission;
