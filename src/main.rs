use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use edital_job_client::CancellationToken;
use edital_job_client::analysis::{AnalysisService, FileUpload};
use edital_job_client::app::AppConfig;
use edital_job_client::logger;

#[tokio::main]
async fn main() -> Result<()> {
    logger::init();

    let mut args = std::env::args().skip(1);
    let file_path = args
        .next()
        .ok_or_else(|| anyhow!("用法: edital_job_client <edital.pdf> [config.toml]"))?;
    let config_path = args.next();

    let app_config = AppConfig::load(config_path.as_deref().map(Path::new))?;
    fs::create_dir_all(&app_config.output_dir)
        .with_context(|| format!("创建输出目录失败: {}", app_config.output_dir))?;

    let service = AnalysisService::new(app_config.analysis.clone())?;

    if app_config.check_connectivity {
        match service.check_connectivity().await {
            Ok(true) => info!("✅ API 连通正常"),
            Ok(false) => warn!("⚠️ health 接口返回错误，继续尝试分析"),
            Err(e) => warn!("⚠️ 连通性检查失败: {}", e),
        }
    }

    let path = Path::new(&file_path);
    let file = FileUpload::from_path(path, app_config.analysis.max_file_size_bytes)
        .await
        .with_context(|| format!("读取文件失败: {}", path.display()))?;

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到中断信号，停止轮询（后端任务仍会继续执行）");
            ctrl_c_token.cancel();
        }
    });

    let result = service.analyze(&file, &app_config.preferences, &cancel).await;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("edital");
    let output_path = Path::new(&app_config.output_dir).join(format!("{}.json", stem));
    fs::write(&output_path, serde_json::to_string_pretty(&result)?)
        .with_context(|| format!("写入结果失败: {}", output_path.display()))?;
    info!("结果已保存: {}", output_path.display());

    if result.success {
        Ok(())
    } else {
        Err(anyhow!(
            "分析失败: {}",
            result.error.as_deref().unwrap_or("未知错误")
        ))
    }
}
