use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinesDbError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Record not found: {model}/{id}")]
    NotFound { model: String, id: u64 },

    #[error("Operator error: {0}")]
    Operator(String),

    #[error("Load error at record {index}: {reason}")]
    Load { index: usize, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, LinesDbError>;
