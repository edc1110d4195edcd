use thiserror::Error;

/// Request-level failure taxonomy. Validation problems are client errors and
/// never reach the sampler; sampler faults surface unchanged as server
/// errors.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("{0}")]
    InvalidParameter(String),

    #[error("generation failed: {0}")]
    Sampler(#[source] anyhow::Error),
}

impl GenerateError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}
