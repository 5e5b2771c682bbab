//! The provider trait and the shared handle the transfer engine works with.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ferryfile_core::{FileEntry, VfsError, VfsResult};
use serde::{Deserialize, Serialize};

use crate::local::LocalProvider;
use crate::path;

/// Kind of storage behind a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    Local,
    Ftp,
    Sftp,
    Smb,
    Archive,
    CloudDrive,
    SearchResults,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "Local"),
            Self::Ftp => write!(f, "FTP"),
            Self::Sftp => write!(f, "SFTP"),
            Self::Smb => write!(f, "SMB"),
            Self::Archive => write!(f, "Archive"),
            Self::CloudDrive => write!(f, "Cloud drive"),
            Self::SearchResults => write!(f, "Search results"),
        }
    }
}

/// A storage backend that can be browsed and transferred to or from.
///
/// Calls block on I/O. Implementations connect lazily on first use and keep
/// the connection for later calls, reconnecting when a liveness check fails.
pub trait VfsProvider: Send {
    /// Kind of backend.
    fn kind(&self) -> ProviderKind;

    /// Short label such as `sftp://user@host`.
    fn display_name(&self) -> String;

    /// Direct children of `path`, never including `.` or `..`.
    fn list_directory(&mut self, path: &str) -> VfsResult<Vec<FileEntry>>;

    /// Download or extract one file into `local_dir`, returning the local path.
    fn fetch_to_local(&mut self, remote_path: &str, local_dir: &Path) -> VfsResult<PathBuf>;

    /// Upload one local file to `remote_dest`.
    fn push_from_local(&mut self, local_path: &Path, remote_dest: &str) -> VfsResult<()>;

    /// Remove a file, or a directory tree when `is_directory` is set.
    fn delete(&mut self, path: &str, is_directory: bool) -> VfsResult<()>;

    /// Create a directory.
    fn make_directory(&mut self, path: &str) -> VfsResult<()>;

    /// Copy everything under the current location into `dest_dir`.
    ///
    /// The current location is the directory most recently listed.
    fn fetch_all(&mut self, dest_dir: &Path) -> VfsResult<()>;

    /// Release the connection. Calling it twice is harmless.
    fn close(&mut self);

    /// Whether `rename` is implemented natively.
    fn supports_rename(&self) -> bool {
        false
    }

    /// Rename or move within this backend.
    fn rename(&mut self, from: &str, to: &str) -> VfsResult<()> {
        let _ = (from, to);
        Err(VfsError::unsupported("Rename", self.display_name()))
    }

    /// Look up a single entry by listing its parent.
    fn stat(&mut self, path: &str) -> VfsResult<Option<FileEntry>> {
        let name = path::basename(path);
        if name.is_empty() {
            return Ok(None);
        }
        let parent = path::parent(path);
        Ok(self
            .list_directory(&parent)?
            .into_iter()
            .find(|entry| entry.name == name))
    }
}

/// Cloneable, thread-safe handle to a provider.
///
/// The queue serializes batches, so the lock is never contended in practice;
/// it only lets the handle move between the owner and the worker thread.
/// Dropping the last clone drops the provider, which disconnects it.
#[derive(Clone)]
pub struct ProviderHandle {
    inner: Arc<Mutex<Box<dyn VfsProvider>>>,
    kind: ProviderKind,
    label: Arc<str>,
}

impl ProviderHandle {
    pub fn new(provider: impl VfsProvider + 'static) -> Self {
        Self::from_box(Box::new(provider))
    }

    pub fn from_box(provider: Box<dyn VfsProvider>) -> Self {
        let kind = provider.kind();
        let label = Arc::from(provider.display_name());
        Self {
            inner: Arc::new(Mutex::new(provider)),
            kind,
            label,
        }
    }

    /// Handle to the local filesystem.
    pub fn local() -> Self {
        Self::new(LocalProvider::new())
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn is_local(&self) -> bool {
        self.kind == ProviderKind::Local
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether both handles point at the same provider instance.
    pub fn same_as(&self, other: &ProviderHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `f` against the provider on the current thread.
    pub fn with<T>(
        &self,
        f: impl FnOnce(&mut dyn VfsProvider) -> VfsResult<T>,
    ) -> VfsResult<T> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| VfsError::other(format!("{} provider lock poisoned", self.label)))?;
        f(guard.as_mut())
    }

    /// Run `f` against the provider on the blocking thread pool.
    pub async fn run<T, F>(&self, f: F) -> VfsResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn VfsProvider) -> VfsResult<T> + Send + 'static,
    {
        let handle = self.clone();
        tokio::task::spawn_blocking(move || handle.with(f))
            .await
            .map_err(|e| VfsError::other(format!("Provider task failed: {}", e)))?
    }

    /// Close the underlying connection.
    pub fn close(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.close();
        }
    }
}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .finish()
    }
}
