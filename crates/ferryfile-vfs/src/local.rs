//! The real filesystem behind the provider interface.

use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use ferryfile_core::{FileEntry, VfsError, VfsResult};
use filetime::FileTime;
use tracing::debug;

use crate::provider::{ProviderKind, VfsProvider};
use crate::tree;

/// Local disk provider. Paths are native filesystem paths.
#[derive(Debug, Default)]
pub struct LocalProvider {
    location: Option<PathBuf>,
}

impl LocalProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `dir` as the current location.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            location: Some(dir.into()),
        }
    }

    fn current_location(&self) -> VfsResult<PathBuf> {
        match &self.location {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().map_err(|e| VfsError::io(".", e)),
        }
    }
}

/// Build an entry from filesystem metadata.
pub fn entry_from_metadata(name: &str, path: &Path, metadata: &Metadata) -> FileEntry {
    let modified = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let full_path = path.to_string_lossy().into_owned();

    let entry = if metadata.is_dir() {
        FileEntry::directory(name, full_path, modified)
    } else {
        FileEntry::file(name, full_path, metadata.len(), modified)
    };

    with_posix_metadata(entry, metadata)
}

#[cfg(unix)]
fn with_posix_metadata(entry: FileEntry, metadata: &Metadata) -> FileEntry {
    use std::os::unix::fs::MetadataExt;
    entry.with_posix(
        Some(metadata.uid().to_string()),
        Some(metadata.gid().to_string()),
        Some(ferryfile_core::permissions_text(metadata.mode())),
    )
}

#[cfg(not(unix))]
fn with_posix_metadata(entry: FileEntry, _metadata: &Metadata) -> FileEntry {
    entry
}

/// Copy one file, keeping its modification time.
pub fn copy_file_preserving(source: &Path, dest: &Path) -> VfsResult<u64> {
    let metadata = fs::metadata(source).map_err(|e| VfsError::io(source, e))?;
    let bytes = fs::copy(source, dest).map_err(|e| VfsError::io(dest, e))?;
    let mtime = FileTime::from_last_modification_time(&metadata);
    filetime::set_file_mtime(dest, mtime).map_err(|e| VfsError::io(dest, e))?;
    Ok(bytes)
}

impl VfsProvider for LocalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    fn display_name(&self) -> String {
        "Local".to_string()
    }

    fn list_directory(&mut self, path: &str) -> VfsResult<Vec<FileEntry>> {
        let dir = Path::new(path);
        let entries = fs::read_dir(dir).map_err(|e| VfsError::io(dir, e))?;

        let mut listing = Vec::new();
        for entry in entries.flatten() {
            let entry_path = entry.path();
            // Follow symlinks, but still list dangling ones.
            let metadata = match fs::metadata(&entry_path).or_else(|_| entry.metadata()) {
                Ok(m) => m,
                Err(e) => {
                    debug!(path = %entry_path.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            listing.push(entry_from_metadata(&name, &entry_path, &metadata));
        }

        self.location = Some(dir.to_path_buf());
        Ok(listing)
    }

    fn fetch_to_local(&mut self, remote_path: &str, local_dir: &Path) -> VfsResult<PathBuf> {
        let source = Path::new(remote_path);
        let name = source
            .file_name()
            .ok_or_else(|| VfsError::not_found(remote_path))?;
        let dest = local_dir.join(name);
        copy_file_preserving(source, &dest)?;
        Ok(dest)
    }

    fn push_from_local(&mut self, local_path: &Path, remote_dest: &str) -> VfsResult<()> {
        copy_file_preserving(local_path, Path::new(remote_dest)).map(|_| ())
    }

    fn delete(&mut self, path: &str, is_directory: bool) -> VfsResult<()> {
        let result = if is_directory {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        result.map_err(|e| VfsError::io(path, e))
    }

    fn make_directory(&mut self, path: &str) -> VfsResult<()> {
        fs::create_dir_all(path).map_err(|e| VfsError::io(path, e))
    }

    fn fetch_all(&mut self, dest_dir: &Path) -> VfsResult<()> {
        let location = self.current_location()?;
        tree::mirror(self, &location.to_string_lossy(), dest_dir)
    }

    fn close(&mut self) {}

    fn supports_rename(&self) -> bool {
        true
    }

    fn rename(&mut self, from: &str, to: &str) -> VfsResult<()> {
        fs::rename(from, to).map_err(|e| VfsError::io(from, e))
    }

    fn stat(&mut self, path: &str) -> VfsResult<Option<FileEntry>> {
        let target = Path::new(path);
        match fs::metadata(target) {
            Ok(metadata) => {
                let name = target
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.to_string());
                Ok(Some(entry_from_metadata(&name, target, &metadata)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VfsError::io(target, e)),
        }
    }
}
