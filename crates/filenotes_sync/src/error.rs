//! Error types for the replicator.

use crate::descriptor::Side;
use thiserror::Error;

/// Result type for replication operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while listing, transferring or persisting state.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The cloud service has no usable session.
    #[error("not authenticated with the cloud service")]
    NotAuthenticated,

    /// The provider rejected the stored credentials.
    #[error("authentication expired: {0}")]
    AuthExpired(String),

    /// The provider could not complete a listing or a transfer.
    #[error("provider unavailable: {message}")]
    ProviderUnavailable {
        /// Error message.
        message: String,
        /// Whether trying again later may succeed.
        retryable: bool,
    },

    /// Local filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The provider answered with something we cannot interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A file disappeared between enumeration and transfer.
    #[error("file not found: {0}")]
    NotFound(String),

    /// A name that cannot live in a flat notes directory.
    #[error("invalid file name: {0:?}")]
    InvalidName(String),

    /// A descriptor was handed to an operation for the other side.
    #[error("{name} is not a {expected:?} file")]
    WrongSide {
        /// Name of the offending descriptor.
        name: String,
        /// Side the operation expected.
        expected: Side,
    },

    /// Settings could not be loaded or stored.
    #[error("settings error: {0}")]
    Settings(String),
}

impl SyncError {
    /// Creates a retryable provider error.
    pub fn provider_retryable(message: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable provider error.
    pub fn provider_fatal(message: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if a later run may succeed without user action.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::ProviderUnavailable { retryable, .. } => *retryable,
            SyncError::Io(_) => true,
            SyncError::NotFound(_) => true,
            _ => false,
        }
    }

    /// Returns true if the user has to log in again.
    pub fn requires_login(&self) -> bool {
        matches!(self, SyncError::NotAuthenticated | SyncError::AuthExpired(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::provider_retryable("503").is_retryable());
        assert!(!SyncError::provider_fatal("bad request").is_retryable());
        assert!(SyncError::NotFound("a.txt".into()).is_retryable());
        assert!(!SyncError::NotAuthenticated.is_retryable());
        assert!(!SyncError::InvalidName("..".into()).is_retryable());
    }

    #[test]
    fn login_errors() {
        assert!(SyncError::NotAuthenticated.requires_login());
        assert!(SyncError::AuthExpired("token revoked".into()).requires_login());
        assert!(!SyncError::provider_retryable("timeout").requires_login());
    }

    #[test]
    fn error_display() {
        let err = SyncError::NotAuthenticated;
        assert_eq!(err.to_string(), "not authenticated with the cloud service");

        let err = SyncError::WrongSide {
            name: "a.txt".into(),
            expected: Side::Remote,
        };
        assert_eq!(err.to_string(), "a.txt is not a Remote file");
    }
}
