use bytes::Bytes;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::io;
use std::path::Path;

use crate::analysis::error::AnalysisError;

/// 后端没有给出具体原因时使用的错误信息
pub(crate) const DEFAULT_JOB_ERROR: &str = "Falha no processamento do edital";

/// 待上传的文件
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl FileUpload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// 从本地路径读取文件，按扩展名推断 MIME 类型
    ///
    /// 先看文件元数据，超过 `max_bytes` 的文件不会被读入内存。
    pub async fn from_path(path: &Path, max_bytes: u64) -> io::Result<Self> {
        let size = tokio::fs::metadata(path).await?.len();
        if size > max_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                AnalysisError::FileTooLarge {
                    size,
                    limit: max_bytes,
                },
            ));
        }
        let bytes = Bytes::from(tokio::fs::read(path).await?);
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("edital.pdf")
            .to_string();
        let content_type = content_type_for(&file_name).to_string();
        Ok(Self {
            file_name,
            content_type,
            bytes,
        })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// 上传凭证：一次性的预签名地址和对象 key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTicket {
    pub file_key: String,
    pub upload_url: String,
}

/// 凭证接口的原始字段，校验前允许缺失
///
/// 地址可能叫 `uploadUrl` 也可能叫 `uploadHandle`，两个同时出现时取 `uploadUrl`。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TicketFields {
    #[serde(default, deserialize_with = "lenient_string")]
    upload_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    upload_handle: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    file_key: Option<String>,
}

impl TicketFields {
    pub fn upload_url(&self) -> Option<&str> {
        non_blank(self.upload_url.as_deref()).or_else(|| non_blank(self.upload_handle.as_deref()))
    }

    pub fn file_key(&self) -> Option<&str> {
        non_blank(self.file_key.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TicketRequest<'a> {
    pub file_name: &'a str,
    pub file_type: &'a str,
    pub file_key: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AnalyzeRequest<'a> {
    pub file_key: &'a str,
    pub file_name: &'a str,
    pub preferences: &'a AnalysisPreferences,
}

/// 用户偏好，原样透传给后端
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, alias = "focus_areas", skip_serializing_if = "Vec::is_empty")]
    pub focus_areas: Vec<String>,
}

/// 已提交的异步任务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: String,
    pub polling_hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Success,
    Failed,
}

impl JobStatus {
    /// 兼容状态机的执行状态（SUCCEEDED / TIMED_OUT / ABORTED 等），未知状态视为仍在运行
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" | "SUCCEEDED" | "COMPLETED" => JobStatus::Success,
            "FAILED" | "TIMED_OUT" | "ABORTED" => JobStatus::Failed,
            _ => JobStatus::Running,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Difficulty {
    #[serde(rename = "Baixo")]
    Baixo,
    #[serde(rename = "Médio")]
    Medio,
    #[serde(rename = "Alto")]
    Alto,
}

impl Difficulty {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "baixo" | "baixa" | "low" => Some(Difficulty::Baixo),
            "médio" | "medio" | "média" | "media" | "medium" => Some(Difficulty::Medio),
            "alto" | "alta" | "high" => Some(Difficulty::Alto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Confidence {
    #[serde(rename = "Alta")]
    Alta,
    #[serde(rename = "Média")]
    Media,
    #[serde(rename = "Baixa")]
    Baixa,
}

impl Confidence {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "alta" | "high" => Some(Confidence::Alta),
            "média" | "media" | "medium" => Some(Confidence::Media),
            "baixa" | "low" => Some(Confidence::Baixa),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(
        default,
        deserialize_with = "lenient_difficulty",
        skip_serializing_if = "Option::is_none"
    )]
    pub difficulty: Option<Difficulty>,
    #[serde(default, deserialize_with = "number_or_zero")]
    pub estimated_hours: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub study_methods: BTreeSet<String>,
    #[serde(default, deserialize_with = "bool_or_false")]
    pub is_optional: bool,
}

impl Topic {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub weight: Option<f64>,
    #[serde(default, deserialize_with = "lenient_difficulty")]
    pub difficulty: Option<Difficulty>,
    #[serde(default, deserialize_with = "number_or_zero")]
    pub estimated_hours: f64,
    #[serde(default, deserialize_with = "topics_from_names_or_objects")]
    pub topics: Vec<Topic>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_optional: Option<bool>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub questions_count: Option<u32>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub points: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamInfo {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub institution: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub total_questions: Option<u32>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub exam_date: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub phases: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub salary: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub vacancies: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirements {
    #[serde(default, deserialize_with = "lenient_string")]
    pub education: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub experience: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub age: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub other: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyRecommendations {
    #[serde(default, deserialize_with = "lenient_confidence")]
    pub analysis_confidence: Option<Confidence>,
    #[serde(default, deserialize_with = "number_or_zero")]
    pub total_estimated_hours: f64,
    #[serde(default, deserialize_with = "number_or_zero")]
    pub recommended_months: f64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub subjects_found: Option<u32>,
}

/// 返回给调用方的最终结果，`success` 区分成功分支与错误分支
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub success: bool,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<Subject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_info: Option<ExamInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Requirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_recommendations: Option<StudyRecommendations>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl AnalysisResult {
    pub fn failure(error: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            suggestion: Some(suggestion.into()),
            ..Self::default()
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// 解析后端返回的结果对象；缺少 `success` 字段时按成功处理
    pub(crate) fn from_backend_payload(mut payload: Value) -> Result<Self, serde_json::Error> {
        if let Some(obj) = payload.as_object_mut() {
            if !obj.get("success").is_some_and(Value::is_boolean) {
                obj.insert("success".to_string(), Value::Bool(true));
            }
        } else {
            return Err(serde_json::Error::custom("结果不是 JSON 对象"));
        }
        let mut result: AnalysisResult = serde_json::from_value(payload)?;
        if result.success {
            result.error = None;
            result.suggestion = None;
            result.details = None;
        }
        Ok(result)
    }

    /// 同步提交返回的结果必须能看出成败：带布尔 `success`，或者至少有科目
    pub(crate) fn from_sync_payload(payload: Value) -> Result<Self, serde_json::Error> {
        let declared = payload.get("success").is_some_and(Value::is_boolean);
        let has_subjects = payload
            .get("subjects")
            .and_then(Value::as_array)
            .is_some_and(|subjects| !subjects.is_empty());
        if !declared && !has_subjects {
            return Err(serde_json::Error::custom("响应既没有 success 字段也没有科目"));
        }
        let result = Self::from_backend_payload(payload)?;
        if !result.success && result.error.is_none() {
            return Ok(Self {
                error: Some(DEFAULT_JOB_ERROR.to_string()),
                ..result
            });
        }
        Ok(result)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(value_as_f64))
}

fn number_or_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(lenient_number(deserializer)?.unwrap_or(0.0))
}

fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    Ok(lenient_number(deserializer)?
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n.round() as u32))
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "sim" | "yes" | "1" => Some(true),
            "false" | "não" | "nao" | "no" | "0" => Some(false),
            _ => None,
        },
        Some(Value::Number(n)) => n.as_f64().map(|n| n != 0.0),
        _ => None,
    })
}

fn bool_or_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(lenient_bool(deserializer)?.unwrap_or(false))
}

fn lenient_difficulty<'de, D>(deserializer: D) -> Result<Option<Difficulty>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(Value::as_str).and_then(Difficulty::parse))
}

fn lenient_confidence<'de, D>(deserializer: D) -> Result<Option<Confidence>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(Value::as_str).and_then(Confidence::parse))
}

/// 后端早期版本把 topics 返回为字符串数组
fn topics_from_names_or_objects<'de, D>(deserializer: D) -> Result<Vec<Topic>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    raw.into_iter()
        .map(|item| match item {
            Value::String(name) => Ok(Topic::named(name)),
            other => serde_json::from_value(other).map_err(D::Error::custom),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backend_payload_without_success_is_success() {
        let result = AnalysisResult::from_backend_payload(json!({
            "status": "SUCCESS",
            "subjects": [{"name": "Direito", "estimatedHours": 40, "topics": []}]
        }))
        .unwrap();
        assert!(result.success);
        assert_eq!(result.subjects.len(), 1);
        assert_eq!(result.subjects[0].estimated_hours, 40.0);
    }

    #[test]
    fn test_topics_accept_plain_names() {
        let subject: Subject = serde_json::from_value(json!({
            "name": "Português",
            "difficulty": "Medio",
            "estimatedHours": "12,5",
            "topics": [
                "Crase",
                {
                    "name": "Regência",
                    "studyMethods": ["resumo", "questões", "resumo"],
                    "isOptional": true
                }
            ],
            "questionsCount": 20.0
        }))
        .unwrap();
        assert_eq!(subject.difficulty, Some(Difficulty::Medio));
        assert_eq!(subject.estimated_hours, 12.5);
        assert_eq!(subject.topics[0], Topic::named("Crase"));
        assert_eq!(subject.topics[1].study_methods.len(), 2);
        assert!(subject.topics[1].is_optional);
        assert_eq!(subject.questions_count, Some(20));
    }

    #[test]
    fn test_unknown_difficulty_is_absent_not_error() {
        let topic: Topic =
            serde_json::from_value(json!({"name": "x", "difficulty": "Extremo"})).unwrap();
        assert_eq!(topic.difficulty, None);
    }

    #[test]
    fn test_nullable_exam_info() {
        let result = AnalysisResult::from_backend_payload(json!({
            "success": true,
            "examInfo": {"name": null, "phases": null, "salary": 5200.5, "vacancies": 12},
            "studyRecommendations": {
                "analysisConfidence": "Média",
                "totalEstimatedHours": 300,
                "recommendedMonths": 6,
                "subjectsFound": 8
            }
        }))
        .unwrap();
        let info = result.exam_info.unwrap();
        assert_eq!(info.name, None);
        assert!(info.phases.is_empty());
        assert_eq!(info.salary.as_deref(), Some("5200.5"));
        let rec = result.study_recommendations.unwrap();
        assert_eq!(rec.analysis_confidence, Some(Confidence::Media));
        assert_eq!(rec.subjects_found, Some(8));
    }

    #[test]
    fn test_difficulty_serializes_with_accent() {
        let value = serde_json::to_value(Difficulty::Medio).unwrap();
        assert_eq!(value, json!("Médio"));
    }

    #[test]
    fn test_failure_has_no_success_branch() {
        let result = AnalysisResult::failure("erro", "tente novamente").with_details("raw");
        assert!(!result.success);
        assert!(result.subjects.is_empty());
        assert!(result.exam_info.is_none());
        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("subjects").is_none());
        assert_eq!(value["details"], json!("raw"));
    }

    #[test]
    fn test_job_status_vocabulary() {
        assert_eq!(JobStatus::parse("SUCCEEDED"), JobStatus::Success);
        assert_eq!(JobStatus::parse("success"), JobStatus::Success);
        assert_eq!(JobStatus::parse("TIMED_OUT"), JobStatus::Failed);
        assert_eq!(JobStatus::parse("RUNNING"), JobStatus::Running);
        assert_eq!(JobStatus::parse("QUEUED"), JobStatus::Running);
    }

    #[test]
    fn test_string_flags_and_numeric_dates_decode() {
        let result = AnalysisResult::from_backend_payload(json!({
            "success": true,
            "subjects": [{
                "name": "Inglês",
                "isOptional": "false",
                "topics": [{"name": "Reading", "isOptional": "sim"}]
            }],
            "examInfo": {"name": 2024, "institution": "CEBRASPE", "examDate": 20240915},
            "requirements": {"education": "Superior", "experience": 3}
        }))
        .unwrap();
        assert_eq!(result.subjects[0].is_optional, Some(false));
        assert!(result.subjects[0].topics[0].is_optional);
        let info = result.exam_info.unwrap();
        assert_eq!(info.name.as_deref(), Some("2024"));
        assert_eq!(info.exam_date.as_deref(), Some("20240915"));
        assert_eq!(result.requirements.unwrap().experience.as_deref(), Some("3"));
    }

    #[test]
    fn test_ticket_fields_accept_both_url_names() {
        let both: TicketFields = serde_json::from_value(json!({
            "uploadUrl": "https://a.test/put",
            "uploadHandle": "https://b.test/put",
            "fileKey": "k"
        }))
        .unwrap();
        assert_eq!(both.upload_url(), Some("https://a.test/put"));

        let handle_only: TicketFields = serde_json::from_value(json!({
            "uploadUrl": "",
            "uploadHandle": "https://b.test/put"
        }))
        .unwrap();
        assert_eq!(handle_only.upload_url(), Some("https://b.test/put"));
        assert_eq!(handle_only.file_key(), None);
    }

    #[test]
    fn test_sync_payload_must_declare_outcome() {
        let error_shaped = json!({"message": "Internal server error"});
        assert!(AnalysisResult::from_sync_payload(error_shaped).is_err());
        assert!(AnalysisResult::from_sync_payload(json!({"error": "Lambda crashed"})).is_err());

        let implicit =
            AnalysisResult::from_sync_payload(json!({"subjects": [{"name": "Direito"}]})).unwrap();
        assert!(implicit.success);

        let failed = AnalysisResult::from_sync_payload(json!({"success": false})).unwrap();
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some(DEFAULT_JOB_ERROR));
    }

    #[tokio::test]
    async fn test_from_path_checks_size_before_reading() {
        let path = std::env::temp_dir().join(format!("edital-{}.pdf", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, vec![b'%'; 2048]).await.unwrap();

        let err = FileUpload::from_path(&path, 1024).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        let inner = err.get_ref().and_then(|e| e.downcast_ref::<AnalysisError>());
        assert_eq!(inner, Some(&AnalysisError::FileTooLarge { size: 2048, limit: 1024 }));

        let file = FileUpload::from_path(&path, 4096).await.unwrap();
        assert_eq!(file.size(), 2048);
        assert_eq!(file.content_type, "application/pdf");
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("edital.PDF"), "application/pdf");
        assert_eq!(content_type_for("notas.txt"), "text/plain");
        assert_eq!(content_type_for("sem_extensao"), "application/octet-stream");
    }
}
