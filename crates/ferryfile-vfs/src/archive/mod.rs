//! Browse archives as read-only directory trees.
//!
//! Paths inside an archive are `/`-separated member paths; the archive root
//! is `""`. The table of contents is read once, on first use.

mod index;
mod read;

use std::path::{Path, PathBuf};

use ferryfile_core::{FileEntry, VfsError, VfsResult};
use tracing::debug;

pub use index::{ArchiveIndex, IndexedEntry, normalize_member};
pub use read::{contained_path, dos_timestamp};

use crate::path;
use crate::provider::{ProviderKind, VfsProvider};
use crate::tree;

/// Container formats recognised by file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
    TarBz2,
    TarXz,
    SevenZ,
    Rar,
}

impl ArchiveFormat {
    /// Detect the format from the file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        let format = if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Self::TarGz
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") || name.ends_with(".tbz") {
            Self::TarBz2
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Self::TarXz
        } else if name.ends_with(".tar") {
            Self::Tar
        } else if name.ends_with(".zip") || name.ends_with(".jar") {
            Self::Zip
        } else if name.ends_with(".7z") {
            Self::SevenZ
        } else if name.ends_with(".rar") {
            Self::Rar
        } else {
            return None;
        };
        Some(format)
    }
}

/// Whether `path` names an archive that can be browsed.
pub fn is_archive(path: &Path) -> bool {
    ArchiveFormat::from_path(path).is_some()
}

/// Read-only view of an archive file.
#[derive(Debug)]
pub struct ArchiveProvider {
    archive: PathBuf,
    format: ArchiveFormat,
    index: Option<ArchiveIndex>,
    location: String,
}

impl ArchiveProvider {
    /// Wrap `archive`; fails if the extension is not a known format.
    pub fn open(archive: impl Into<PathBuf>) -> VfsResult<Self> {
        let archive = archive.into();
        let format = ArchiveFormat::from_path(&archive).ok_or_else(|| {
            VfsError::unsupported("Archive format", archive.display().to_string())
        })?;
        Ok(Self {
            archive,
            format,
            index: None,
            location: String::new(),
        })
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive
    }

    fn index(&mut self) -> VfsResult<&ArchiveIndex> {
        if self.index.is_none() {
            let index = read::load_index(&self.archive, self.format)?;
            debug!(archive = %self.archive.display(), entries = index.len(), "archive indexed");
            self.index = Some(index);
        }
        self.index
            .as_ref()
            .ok_or_else(|| VfsError::other("archive index unavailable"))
    }

    fn read_only(&self, operation: &'static str) -> VfsError {
        VfsError::unsupported(operation, self.display_name())
    }
}

impl VfsProvider for ArchiveProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Archive
    }

    fn display_name(&self) -> String {
        self.archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.archive.display().to_string())
    }

    fn list_directory(&mut self, dir: &str) -> VfsResult<Vec<FileEntry>> {
        let listing = self
            .index()?
            .children(dir)
            .ok_or_else(|| VfsError::not_found(dir))?;
        self.location = normalize_member(dir);
        Ok(listing)
    }

    fn fetch_to_local(&mut self, member: &str, local_dir: &Path) -> VfsResult<PathBuf> {
        match self.index()?.get(member) {
            Some(entry) if entry.is_dir => return Err(VfsError::protocol(format!("{} is a directory", member))),
            Some(_) => {}
            None => return Err(VfsError::not_found(member)),
        }

        let dest = local_dir.join(tree::safe_name(path::basename(&normalize_member(member)))?);
        read::extract_member(&self.archive, self.format, member, &dest)?;
        Ok(dest)
    }

    fn push_from_local(&mut self, _local_path: &Path, _remote_dest: &str) -> VfsResult<()> {
        Err(self.read_only("Writing into an archive"))
    }

    fn delete(&mut self, _path: &str, _is_directory: bool) -> VfsResult<()> {
        Err(self.read_only("Deleting from an archive"))
    }

    fn make_directory(&mut self, _path: &str) -> VfsResult<()> {
        Err(self.read_only("Creating folders in an archive"))
    }

    /// Extracts the whole archive when at the root, otherwise the
    /// directory most recently listed.
    fn fetch_all(&mut self, dest_dir: &Path) -> VfsResult<()> {
        if self.location.is_empty() {
            return read::extract_all(&self.archive, self.format, dest_dir);
        }
        let location = self.location.clone();
        tree::mirror(self, &location, dest_dir)
    }

    fn close(&mut self) {
        self.index = None;
    }

    fn stat(&mut self, member: &str) -> VfsResult<Option<FileEntry>> {
        let normalized = normalize_member(member);
        if normalized.is_empty() {
            return Ok(None);
        }
        let parent = path::parent(&normalized);
        Ok(self
            .index()?
            .children(&parent)
            .and_then(|children| children.into_iter().find(|e| e.full_path == normalized)))
    }
}
