//! Error types for storage backends.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used by every provider call.
pub type VfsResult<T> = Result<T, VfsError>;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Backend unreachable or the connection dropped.
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Credentials were rejected.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// Path does not exist on the backend.
    #[error("Path not found: {path}")]
    NotFound { path: String },

    /// Access denied by the backend.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: String },

    /// The provider cannot perform this operation.
    #[error("{operation} is not supported by {provider}")]
    Unsupported {
        operation: &'static str,
        provider: String,
    },

    /// Local I/O failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backend answered with something we could not interpret.
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl VfsError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: path.display().to_string(),
            },
            std::io::ErrorKind::NotFound => Self::NotFound {
                path: path.display().to_string(),
            },
            _ => Self::Io { path, source },
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied { path: path.into() }
    }

    pub fn unsupported(operation: &'static str, provider: impl Into<String>) -> Self {
        Self::Unsupported {
            operation,
            provider: provider.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Check if retrying after a reconnect could help.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}
