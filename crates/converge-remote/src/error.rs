//! Remote API error types.
//!
//! Every error a [`crate::RemoteApi`] backend can return is expressed here so
//! that the not-found guard, the transient classifier and the mutator can
//! react to a stable taxonomy instead of backend-specific codes.

use std::fmt;

/// Errors returned by a remote control-plane API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The target resource does not exist (or is not yet visible).
    #[error("Resource not found: {kind}/{id}")]
    NotFound {
        /// The resource kind.
        kind: String,
        /// The resource id (or a description of the lookup).
        id: String,
    },

    /// The supplied concurrency token is stale.
    #[error("Concurrency token conflict: supplied {supplied}, current {current}")]
    Conflict {
        /// The token sent with the request.
        supplied: String,
        /// The token the remote currently holds.
        current: String,
    },

    /// A lookup that must produce one result produced several.
    #[error("Too many results for {kind}: expected 1, found {count}")]
    TooManyResults {
        /// The resource kind queried.
        kind: String,
        /// How many results came back.
        count: usize,
    },

    /// The remote rejected the request with a service-specific code.
    #[error("{code}: {message}")]
    Api {
        /// Service error code, e.g. `ResourceInUseException`.
        code: String,
        /// Human-readable message returned by the service.
        message: String,
    },

    /// The remote is rate limiting requests.
    #[error("Throttled: {message}")]
    Throttled {
        /// Message returned by the service.
        message: String,
    },

    /// The request was malformed or violated a service limit.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of the violation.
        message: String,
    },

    /// The remote could not be reached.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection failure.
        message: String,
    },

    /// An internal client or service failure.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl RemoteError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(supplied: impl Into<String>, current: impl Into<String>) -> Self {
        Self::Conflict {
            supplied: supplied.into(),
            current: current.into(),
        }
    }

    /// Creates a new `TooManyResults` error.
    #[must_use]
    pub fn too_many_results(kind: impl Into<String>, count: usize) -> Self {
        Self::TooManyResults {
            kind: kind.into(),
            count,
        }
    }

    /// Creates a new `Api` error.
    #[must_use]
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Throttled` error.
    #[must_use]
    pub fn throttled(message: impl Into<String>) -> Self {
        Self::Throttled {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a stale-token conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Short machine-readable code, used when reporting per-item failures.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::Conflict { .. } => "Conflict",
            Self::TooManyResults { .. } => "TooManyResults",
            Self::Api { code, .. } => code,
            Self::Throttled { .. } => "Throttled",
            Self::InvalidRequest { .. } => "InvalidRequest",
            Self::Connection { .. } => "Connection",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Message text without the code prefix.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Api { message, .. }
            | Self::Throttled { message }
            | Self::InvalidRequest { message }
            | Self::Connection { message }
            | Self::Internal { message } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::Throttled { .. } | Self::Connection { .. } => ErrorCategory::Transient,
            Self::TooManyResults { .. } | Self::InvalidRequest { .. } => ErrorCategory::Validation,
            Self::Api { .. } => ErrorCategory::Service,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of remote errors for logging and classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Resource not found.
    NotFound,
    /// Stale concurrency token.
    Conflict,
    /// Throttling or connectivity; always safe to retry.
    Transient,
    /// Request rejected as invalid.
    Validation,
    /// Service-specific error code; retryability depends on the classifier.
    Service,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Transient => write!(f, "transient"),
            Self::Validation => write!(f, "validation"),
            Self::Service => write!(f, "service"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
