use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;
use uuid::Uuid;

static UNSAFE_CHARS: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

const FALLBACK_FILE_NAME: &str = "edital";

/// 清理文件名用于对象存储 key：只保留字母、数字、点和短横线
pub fn sanitize_file_name(file_name: &str) -> String {
    let re = match UNSAFE_CHARS.get_or_init(|| Regex::new(r"[^a-zA-Z0-9.\-]")) {
        Ok(re) => re,
        Err(e) => {
            warn!("文件名清理规则无效: {}", e);
            return FALLBACK_FILE_NAME.to_string();
        }
    };
    let sanitized = re.replace_all(file_name.trim(), "_");
    if sanitized.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        sanitized.into_owned()
    }
}

/// 生成建议的对象 key，形如 `editais/<uuid>-<文件名>`
pub fn proposed_file_key(prefix: &str, sanitized_name: &str) -> String {
    let prefix = prefix.trim().trim_start_matches('/').trim_end_matches('/');
    if prefix.is_empty() {
        format!("{}-{}", Uuid::new_v4(), sanitized_name)
    } else {
        format!("{}/{}-{}", prefix, Uuid::new_v4(), sanitized_name)
    }
}

/// 截取原始响应的前 `max_chars` 个字符，用于错误详情和日志
pub fn excerpt(raw: &str, max_chars: usize) -> String {
    match raw.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &raw[..idx]),
        None => raw.to_string(),
    }
}

/// 拼接 base URL 和路径，避免重复或缺失的斜杠
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    let path = path.trim();
    if path.is_empty() {
        base.to_string()
    } else if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}
