use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Backend init failed for model '{model}': {reason}")]
    BackendInit { model: String, reason: String },

    #[error("Backend call failed: {0}")]
    BackendInvoke(String),

    #[error("Query execution failed: {0}")]
    QueryExecution(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Stream closed by consumer")]
    StreamClosed,

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
