use tracing::{debug, error, info};

use crate::analysis::api_client::ApiClient;
use crate::analysis::envelope::unwrap_envelope;
use crate::analysis::error::{AnalysisError, FlowPhase};
use crate::analysis::events::{EventOutcome, Observers};
use crate::analysis::models::{FileUpload, TicketFields, UploadTicket};
use crate::analysis::utils::{excerpt, proposed_file_key, sanitize_file_name};

/// 文件上传：先取预签名地址，再 PUT 原始字节
#[derive(Clone)]
pub struct UploadStager {
    api_client: ApiClient,
    observers: Observers,
}

impl UploadStager {
    pub fn new(api_client: ApiClient, observers: Observers) -> Self {
        Self {
            api_client,
            observers,
        }
    }

    /// 上传文件并返回后端确认的对象 key
    ///
    /// 成功路径上恰好发出一次凭证请求和一次 PUT，任何失败都不重试。
    pub async fn stage(&self, file: &FileUpload) -> Result<UploadTicket, AnalysisError> {
        self.api_client.ensure_configured()?;
        let limit = self.api_client.config().max_file_size_bytes;
        if file.size() > limit {
            error!("❌ 文件过大: {} 字节 (上限 {} 字节)", file.size(), limit);
            return Err(AnalysisError::FileTooLarge {
                size: file.size(),
                limit,
            });
        }

        self.observers.emit(FlowPhase::Stage, None, EventOutcome::Started);
        let ticket = match self.request_ticket(file).await {
            Ok(ticket) => ticket,
            Err(e) => {
                self.observers.emit(FlowPhase::Stage, None, failed(&e));
                return Err(e);
            }
        };
        self.observers.emit(FlowPhase::Stage, None, EventOutcome::Succeeded);

        self.observers.emit(FlowPhase::Transfer, None, EventOutcome::Started);
        if let Err(e) = self.transfer(file, &ticket).await {
            self.observers.emit(FlowPhase::Transfer, None, failed(&e));
            return Err(e);
        }
        self.observers.emit(FlowPhase::Transfer, None, EventOutcome::Succeeded);

        info!("✅ 文件上传成功，key: {}", ticket.file_key);
        Ok(ticket)
    }

    async fn request_ticket(&self, file: &FileUpload) -> Result<UploadTicket, AnalysisError> {
        let sanitized = sanitize_file_name(&file.file_name);
        let proposed_key = proposed_file_key(&self.api_client.config().key_prefix, &sanitized);
        debug!("建议的对象 key: {}", proposed_key);

        let response = self
            .api_client
            .request_upload_ticket(&sanitized, &file.content_type, &proposed_key)
            .await?;
        if !response.is_success() {
            error!("❌ 获取上传凭证失败: HTTP {} {}", response.status, response.body);
            return Err(AnalysisError::TicketRequestFailed {
                status: response.status,
                body: response.body,
            });
        }

        let max_chars = self.api_client.config().details_excerpt_chars;
        parse_ticket(&response.body, max_chars)
    }

    async fn transfer(
        &self,
        file: &FileUpload,
        ticket: &UploadTicket,
    ) -> Result<(), AnalysisError> {
        let response = self
            .api_client
            .put_file(&ticket.upload_url, &file.content_type, file.bytes.clone())
            .await?;
        if response.is_success() {
            Ok(())
        } else {
            error!("❌ 文件上传失败: HTTP {} {}", response.status, response.body);
            Err(AnalysisError::TransferFailed {
                status: response.status,
                body: response.body,
            })
        }
    }
}

/// 解析凭证响应，上传地址和 key 缺一不可
pub(crate) fn parse_ticket(raw: &str, max_chars: usize) -> Result<UploadTicket, AnalysisError> {
    let malformed = |reason: String| AnalysisError::TicketMalformed {
        reason,
        excerpt: excerpt(raw, max_chars),
    };
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| malformed(e.to_string()))?;
    let inner = unwrap_envelope(value).map_err(|e| malformed(e.to_string()))?;
    let fields: TicketFields =
        serde_json::from_value(inner).map_err(|e| malformed(e.to_string()))?;

    let upload_url = fields
        .upload_url()
        .ok_or(AnalysisError::MissingTicketField { field: "uploadUrl" })?;
    let file_key = fields
        .file_key()
        .ok_or(AnalysisError::MissingTicketField { field: "fileKey" })?;
    Ok(UploadTicket {
        file_key: file_key.to_string(),
        upload_url: upload_url.to_string(),
    })
}

fn failed(err: &AnalysisError) -> EventOutcome {
    EventOutcome::Failed {
        reason: err.to_string(),
    }
}
