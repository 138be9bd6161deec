use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No tickers available: {0}")]
    NoTickersAvailable(String),

    #[error("Report generation failed: {0}")]
    GenerationFailed(String),

    #[error("Model output invalid: {0}")]
    ParseInvalid(String),

    #[error("A run is already in progress")]
    RunAlreadyInProgress,

    #[error("Credential invalid: {0}")]
    CredentialInvalid(String),

    #[error("Unknown run: {0}")]
    UnknownRun(Uuid),

    #[error("Store error: {0}")]
    Store(#[from] pulse_store::StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
