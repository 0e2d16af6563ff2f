use thiserror::Error;

/// Request-level failures surfaced by the serving core.
///
/// Duplicate-key races inside the cache are deliberately not represented
/// here: first write wins and losers are absorbed at the insert site.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("pipe provisioning failed: {0}")]
    PoolProvisioningFailed(String),

    #[error("cache error: {0}")]
    Cache(#[from] rusqlite::Error),
}

impl ServeError {
    /// HTTP status the error maps to at the surface.
    pub fn status_code(&self) -> u16 {
        match self {
            ServeError::InvalidRequest(_) => 400,
            _ => 500,
        }
    }
}
