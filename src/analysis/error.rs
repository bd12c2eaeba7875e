use thiserror::Error;

use crate::analysis::models::AnalysisResult;

/// 分析流程所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowPhase {
    Stage,
    Transfer,
    Submit,
    Poll,
    Health,
}

impl std::fmt::Display for FlowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowPhase::Stage => write!(f, "stage"),
            FlowPhase::Transfer => write!(f, "transfer"),
            FlowPhase::Submit => write!(f, "submit"),
            FlowPhase::Poll => write!(f, "poll"),
            FlowPhase::Health => write!(f, "health"),
        }
    }
}

/// 分析流程的错误分类，在服务边界统一转换为 `AnalysisResult`
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalysisError {
    #[error("配置缺失: {0}")]
    Configuration(String),

    #[error("文件过大: {size} 字节，上限 {limit} 字节")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("获取上传凭证失败: HTTP {status}")]
    TicketRequestFailed { status: u16, body: String },

    #[error("上传凭证格式错误: {reason}")]
    TicketMalformed { reason: String, excerpt: String },

    #[error("上传凭证缺少字段: {field}")]
    MissingTicketField { field: &'static str },

    #[error("文件上传失败: HTTP {status}")]
    TransferFailed { status: u16, body: String },

    #[error("提交分析任务失败: HTTP {status} {status_text}")]
    SubmissionFailed {
        status: u16,
        status_text: String,
        body: String,
    },

    #[error("响应格式错误: {reason}")]
    ResponseMalformed { reason: String, excerpt: String },

    #[error("分析任务失败: {message}")]
    JobFailed { message: String },

    #[error("轮询超时: 已尝试 {attempts} 次")]
    Timeout { attempts: u32 },

    #[error("网络错误 ({phase}): {message}")]
    Network { phase: FlowPhase, message: String },

    #[error("已取消")]
    Cancelled,
}

impl AnalysisError {
    /// 稳定的错误类型标签，写入结果的 `source` 字段
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Configuration(_) => "configuration_error",
            AnalysisError::FileTooLarge { .. } => "file_too_large",
            AnalysisError::TicketRequestFailed { .. } => "ticket_request_failed",
            AnalysisError::TicketMalformed { .. } | AnalysisError::MissingTicketField { .. } => {
                "ticket_malformed"
            }
            AnalysisError::TransferFailed { .. } => "transfer_failed",
            AnalysisError::SubmissionFailed { .. } => "submission_failed",
            AnalysisError::ResponseMalformed { .. } => "response_malformed",
            AnalysisError::JobFailed { .. } => "job_failed",
            AnalysisError::Timeout { .. } => "timeout",
            AnalysisError::Network { .. } => "network_error",
            AnalysisError::Cancelled => "cancelled",
        }
    }

    /// 转换为调用方可直接展示的失败结果
    pub fn into_result(self) -> AnalysisResult {
        let kind = self.kind();
        let result = match self {
            AnalysisError::Configuration(what) => AnalysisResult::failure(
                "Configuração da API ausente",
                "Verifique a variável de ambiente com o endereço da API",
            )
            .with_details(what),
            AnalysisError::FileTooLarge { size, limit } => AnalysisResult::failure(
                format!("Arquivo muito grande. Limite: {} MB", limit / (1024 * 1024)),
                "Tente um PDF menor",
            )
            .with_details(format!("{} bytes", size)),
            AnalysisError::TicketRequestFailed { status, body } => AnalysisResult::failure(
                format!("Erro ao preparar upload (HTTP {})", status),
                "Verifique sua conexão e tente novamente",
            )
            .with_details(body),
            AnalysisError::TicketMalformed { reason, excerpt } => AnalysisResult::failure(
                "Resposta inválida ao preparar upload",
                "Verifique a configuração da API",
            )
            .with_details(format!("{}: {}", reason, excerpt)),
            AnalysisError::MissingTicketField { field } => AnalysisResult::failure(
                "Resposta inválida ao preparar upload",
                "Verifique a configuração da API",
            )
            .with_details(format!("campo ausente: {}", field)),
            AnalysisError::TransferFailed { status, body } => AnalysisResult::failure(
                format!("Erro ao fazer upload do arquivo (HTTP {})", status),
                "Tente novamente em alguns instantes",
            )
            .with_details(body),
            AnalysisError::SubmissionFailed {
                status,
                status_text,
                body,
            } => AnalysisResult::failure(
                format!("Erro HTTP {}: {}", status, status_text),
                "Verifique sua conexão e a configuração da API",
            )
            .with_details(body),
            AnalysisError::ResponseMalformed { reason, excerpt } => AnalysisResult::failure(
                "Resposta inválida do servidor",
                "Tente novamente; se o erro persistir, verifique a configuração da API",
            )
            .with_details(format!("{}: {}", reason, excerpt)),
            AnalysisError::JobFailed { message } => AnalysisResult::failure(
                message,
                "Tente novamente com um arquivo diferente",
            ),
            AnalysisError::Timeout { attempts } => AnalysisResult::failure(
                "Tempo limite excedido na análise",
                concat!(
                    "O edital pode ser muito complexo. ",
                    "Tente um arquivo menor ou mais simples, ou tente novamente"
                ),
            )
            .with_details(format!("{} tentativas sem resultado", attempts)),
            AnalysisError::Network { phase, message } => AnalysisResult::failure(
                "Erro ao conectar com o servidor",
                "Verifique sua conexão e a configuração da API",
            )
            .with_details(format!("{}: {}", phase, message)),
            AnalysisError::Cancelled => AnalysisResult::failure(
                "Análise cancelada",
                "O processamento pode continuar no servidor; tente novamente se necessário",
            ),
        };
        result.with_source(kind)
    }
}

impl From<AnalysisError> for AnalysisResult {
    fn from(err: AnalysisError) -> Self {
        err.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_failed_result() {
        let result = AnalysisError::SubmissionFailed {
            status: 502,
            status_text: "Bad Gateway".to_string(),
            body: "upstream".to_string(),
        }
        .into_result();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Erro HTTP 502: Bad Gateway"));
        assert_eq!(result.details.as_deref(), Some("upstream"));
        assert_eq!(result.source.as_deref(), Some("submission_failed"));
    }

    #[test]
    fn test_job_failed_keeps_backend_message() {
        let result = AnalysisError::JobFailed {
            message: "bad pdf".to_string(),
        }
        .into_result();
        assert_eq!(result.error.as_deref(), Some("bad pdf"));
        assert!(result.suggestion.unwrap().contains("arquivo diferente"));
    }

    #[test]
    fn test_missing_field_is_ticket_malformed_kind() {
        let err = AnalysisError::MissingTicketField { field: "fileKey" };
        assert_eq!(err.kind(), "ticket_malformed");
        assert!(err.to_string().contains("fileKey"));
    }
}
