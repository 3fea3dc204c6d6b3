use thiserror::Error;

/// Every variant here is, from the Circuit Breaker's point of view, a
/// failure (§4.2 step 3) — the caller records a breaker failure on any of
/// them regardless of which one fired.
#[derive(Debug, Error)]
pub enum AsClientError {
    #[error("request to Authorization Service failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Authorization Service returned unexpected status {status}")]
    UnexpectedStatus { status: u16 },

    #[error("failed to parse Authorization Service response: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, AsClientError>;
