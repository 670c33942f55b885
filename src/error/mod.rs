use hspi_orchestrator::OrchestratorError;
use hspi_runtime::engine::RuntimeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("usage: {0}")]
    Usage(String),
    #[error("{0}")]
    Orchestrator(#[from] OrchestratorError),
    #[error("simulation failed: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}
