use thiserror::Error;

/// Errors raised while building data model values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Duplicate key in desired state: {key}")]
    DuplicateKey { key: String },

    #[error("Invalid wait spec: {0}")]
    InvalidWaitSpec(String),
}

impl CoreError {
    /// Create a new DuplicateKey error
    pub fn duplicate_key(key: impl Into<String>) -> Self {
        Self::DuplicateKey { key: key.into() }
    }

    /// Create a new InvalidWaitSpec error
    pub fn invalid_wait_spec(message: impl Into<String>) -> Self {
        Self::InvalidWaitSpec(message.into())
    }
}
