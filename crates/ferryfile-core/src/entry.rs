//! File entry types shared by every storage backend.

use chrono::{DateTime, Local};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Name reserved for the synthesized parent-directory entry.
pub const PARENT_MARKER: &str = "..";

/// The fields used to decide whether two entries describe the same content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryStamp {
    /// Size in bytes.
    pub size: u64,
    /// Modification time as Unix seconds.
    pub modified: i64,
}

/// Snapshot of one file or directory as seen by a listing call.
///
/// Entries are created by a provider and never mutated afterwards. The
/// `size` and `modified` fields are authoritative; everything shown to a
/// user is derived from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    /// Entry name (not the full path).
    pub name: CompactString,

    /// Extension without the dot, empty for directories.
    pub extension: CompactString,

    /// Whether this entry is a directory.
    pub is_dir: bool,

    /// Backend-relative path. Its meaning depends on the provider.
    pub full_path: String,

    /// Size in bytes, 0 for directories.
    pub size: u64,

    /// Modification time as Unix seconds.
    pub modified: i64,

    /// Owner, for providers exposing POSIX metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Group, for providers exposing POSIX metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Permission string such as `rwxr-xr-x`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
}

impl FileEntry {
    /// Create a file entry. The extension is derived from the name.
    pub fn file(
        name: impl Into<CompactString>,
        full_path: impl Into<String>,
        size: u64,
        modified: i64,
    ) -> Self {
        let name = name.into();
        Self {
            extension: CompactString::from(split_extension(&name)),
            name,
            is_dir: false,
            full_path: full_path.into(),
            size,
            modified,
            owner: None,
            group: None,
            permissions: None,
        }
    }

    /// Create a directory entry.
    pub fn directory(
        name: impl Into<CompactString>,
        full_path: impl Into<String>,
        modified: i64,
    ) -> Self {
        Self {
            name: name.into(),
            extension: CompactString::default(),
            is_dir: true,
            full_path: full_path.into(),
            size: 0,
            modified,
            owner: None,
            group: None,
            permissions: None,
        }
    }

    /// The synthesized `..` entry pointing at `parent_path`.
    pub fn parent_marker(parent_path: impl Into<String>) -> Self {
        Self::directory(PARENT_MARKER, parent_path, 0)
    }

    /// Attach POSIX-style ownership and permission metadata.
    pub fn with_posix(
        mut self,
        owner: Option<String>,
        group: Option<String>,
        permissions: Option<String>,
    ) -> Self {
        self.owner = owner;
        self.group = group;
        self.permissions = permissions;
        self
    }

    /// Check if this is the synthesized parent entry.
    pub fn is_parent_marker(&self) -> bool {
        self.name == PARENT_MARKER
    }

    /// Size and modification time, the only fields used for comparison.
    pub fn stamp(&self) -> EntryStamp {
        EntryStamp {
            size: self.size,
            modified: self.modified,
        }
    }

    /// Check whether two entries carry the same size and modification time.
    pub fn same_stamp(&self, other: &FileEntry) -> bool {
        self.stamp() == other.stamp()
    }

    /// Human readable size, `<DIR>` for directories.
    pub fn size_display(&self) -> String {
        if self.is_dir {
            "<DIR>".to_string()
        } else {
            format_size(self.size)
        }
    }

    /// Modification time formatted as `dd.mm.YYYY HH:MM` in local time.
    pub fn modified_display(&self) -> String {
        format_timestamp(self.modified)
    }
}

/// Format a byte count using binary units.
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Format Unix seconds as `dd.mm.YYYY HH:MM` in local time.
pub fn format_timestamp(secs: i64) -> String {
    match DateTime::from_timestamp(secs, 0) {
        Some(utc) => utc.with_timezone(&Local).format("%d.%m.%Y %H:%M").to_string(),
        None => String::new(),
    }
}

/// Extension of a file name without the dot.
///
/// Leading dots do not start an extension, so `.bashrc` has none.
pub fn split_extension(name: &str) -> &str {
    let stem_start = name.len() - name.trim_start_matches('.').len();
    match name[stem_start..].rfind('.') {
        Some(idx) => &name[stem_start + idx + 1..],
        None => "",
    }
}

/// Render POSIX mode bits as `rwxr-xr-x`.
pub fn permissions_text(mode: u32) -> String {
    const FLAGS: [(u32, char); 9] = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];
    FLAGS
        .iter()
        .map(|&(bit, c)| if mode & bit != 0 { c } else { '-' })
        .collect()
}
