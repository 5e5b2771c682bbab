//! Errors that end a transfer batch.

use std::path::PathBuf;

use ferryfile_core::VfsError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse failure category shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Connection,
    NotFound,
    Permission,
    Unsupported,
    Timeout,
    Validation,
    Other,
}

/// Why a batch stopped early.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Vfs(#[from] VfsError),

    /// Nobody answered an overwrite query in time.
    #[error("{message}")]
    Timeout { message: String },

    /// The request was rejected before anything ran.
    #[error("{message}")]
    Validation { message: String },

    /// The overwrite handshake broke down.
    #[error("{message}")]
    Negotiation { message: String },

    /// A worker task died.
    #[error("{message}")]
    Task { message: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn task(err: tokio::task::JoinError) -> Self {
        Self::Task {
            message: format!("Task failed: {}", err),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Vfs(e) => match e {
                VfsError::Connection { .. } | VfsError::Protocol { .. } => ErrorKind::Connection,
                VfsError::Auth { .. } | VfsError::PermissionDenied { .. } => ErrorKind::Permission,
                VfsError::NotFound { .. } => ErrorKind::NotFound,
                VfsError::Unsupported { .. } => ErrorKind::Unsupported,
                VfsError::Io { .. } | VfsError::Other { .. } => ErrorKind::Other,
            },
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Io { source, .. } => match source.kind() {
                std::io::ErrorKind::NotFound => ErrorKind::NotFound,
                std::io::ErrorKind::PermissionDenied => ErrorKind::Permission,
                _ => ErrorKind::Other,
            },
            Self::Negotiation { .. } | Self::Task { .. } => ErrorKind::Other,
        }
    }
}
