use serde::Deserialize;
use std::time::Duration;

/// 分析客户端配置
///
/// 默认值对应线上部署：预签名 URL 上传（10 MiB 上限），10 秒轮询一次，最多 30 次。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisClientConfig {
    pub api_base_url: String,
    pub upload_url_path: String,
    pub analyze_path: String,
    pub status_path: String,
    pub health_path: String,
    /// 结果文件的约定地址，`{jobId}` 会被替换；提交响应里带 pollingHint 时优先使用 hint
    pub result_location_template: Option<String>,
    /// 上传对象 key 的前缀
    pub key_prefix: String,
    pub max_file_size_bytes: u64,
    pub poll_interval_secs: u64,
    pub max_poll_attempts: u32,
    pub request_timeout_secs: u64,
    /// 错误详情里保留的原始响应字符数
    pub details_excerpt_chars: usize,
}

impl Default for AnalysisClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            upload_url_path: "/upload-url".to_string(),
            analyze_path: "/analyze".to_string(),
            status_path: "/status".to_string(),
            health_path: "/health".to_string(),
            result_location_template: None,
            key_prefix: "editais".to_string(),
            max_file_size_bytes: 10 * 1024 * 1024,
            poll_interval_secs: 10,
            max_poll_attempts: 30,
            request_timeout_secs: 30,
            details_excerpt_chars: 500,
        }
    }
}

impl AnalysisClientConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// 轮询最长等待时间（不含单次请求耗时）
    pub fn max_poll_wait(&self) -> Duration {
        self.poll_interval() * self.max_poll_attempts.saturating_sub(1)
    }
}
