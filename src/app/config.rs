use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::analysis::{AnalysisClientConfig, AnalysisPreferences};

/// 覆盖 `analysis.api_base_url` 的环境变量
pub const API_BASE_URL_ENV: &str = "STUDYPLAN_API_BASE_URL";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_check_connectivity")]
    pub check_connectivity: bool,
    #[serde(default)]
    pub preferences: AnalysisPreferences,
    #[serde(default)]
    pub analysis: AnalysisClientConfig,
}

impl AppConfig {
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let env_base_url = std::env::var(API_BASE_URL_ENV).ok();
        Self::load_with_override(config_path, env_base_url)
    }

    fn load_with_override(config_path: Option<&Path>, base_url: Option<String>) -> Result<Self> {
        let path = config_path.unwrap_or_else(|| Path::new("config.toml"));
        let mut cfg = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
            Self::from_toml(&raw).with_context(|| format!("解析配置文件失败: {}", path.display()))?
        } else {
            AppConfig::default()
        };
        if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
            cfg.analysis.api_base_url = url;
        }
        Ok(cfg)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            check_connectivity: default_check_connectivity(),
            preferences: AnalysisPreferences::default(),
            analysis: AnalysisClientConfig::default(),
        }
    }
}

fn default_output_dir() -> String {
    "output_json".to_string()
}

fn default_check_connectivity() -> bool {
    true
}
