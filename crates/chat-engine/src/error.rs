use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("message not found")]
    NotFound,

    #[error("forbidden")]
    Forbidden,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("persistence error: {0}")]
    Store(#[from] chat_store::error::StoreError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
