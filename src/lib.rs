pub mod analysis;
pub mod app;
pub mod logger;

pub use analysis::{AnalysisClientConfig, AnalysisError, AnalysisResult, AnalysisService};
pub use tokio_util::sync::CancellationToken;
