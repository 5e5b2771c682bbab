//! What a caller asks the engine to do.

use ferryfile_core::FileEntry;
use ferryfile_vfs::ProviderHandle;
use serde::{Deserialize, Serialize};

/// One item to act on: a listed entry, or a bare path to look up first.
#[derive(Debug, Clone)]
pub enum Source {
    Entry(FileEntry),
    RawPath(String),
}

impl Source {
    /// Name shown in progress before the source is resolved.
    pub fn display_name(&self) -> &str {
        match self {
            Self::Entry(entry) => entry.name.as_str(),
            Self::RawPath(path) => {
                let trimmed = path.trim_end_matches(['/', '\\']);
                trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed)
            }
        }
    }
}

impl From<FileEntry> for Source {
    fn from(entry: FileEntry) -> Self {
        Self::Entry(entry)
    }
}

impl From<String> for Source {
    fn from(path: String) -> Self {
        Self::RawPath(path)
    }
}

impl From<&str> for Source {
    fn from(path: &str) -> Self {
        Self::RawPath(path.to_string())
    }
}

/// A rename inside the source's own directory.
#[derive(Debug, Clone)]
pub struct RenamePair {
    pub source: Source,
    pub new_name: String,
}

impl RenamePair {
    pub fn new(source: impl Into<Source>, new_name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            new_name: new_name.into(),
        }
    }
}

/// The five operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Copy,
    Move,
    Delete,
    Mkdir,
    Rename,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Copy => write!(f, "Copy"),
            Self::Move => write!(f, "Move"),
            Self::Delete => write!(f, "Delete"),
            Self::Mkdir => write!(f, "Create folder"),
            Self::Rename => write!(f, "Rename"),
        }
    }
}

/// An operation with its operands.
///
/// Paths are in the owning provider's syntax: `target` and `path` belong to
/// the target side, sources to the source side.
#[derive(Debug, Clone)]
pub enum TransferOperation {
    Copy { sources: Vec<Source>, target: String },
    Move { sources: Vec<Source>, target: String },
    Delete { sources: Vec<Source> },
    Mkdir { path: String },
    Rename { pairs: Vec<RenamePair> },
}

impl TransferOperation {
    pub fn copy(sources: Vec<Source>, target: impl Into<String>) -> Self {
        Self::Copy {
            sources,
            target: target.into(),
        }
    }

    pub fn move_to(sources: Vec<Source>, target: impl Into<String>) -> Self {
        Self::Move {
            sources,
            target: target.into(),
        }
    }

    pub fn delete(sources: Vec<Source>) -> Self {
        Self::Delete { sources }
    }

    pub fn mkdir(path: impl Into<String>) -> Self {
        Self::Mkdir { path: path.into() }
    }

    pub fn rename(pairs: Vec<RenamePair>) -> Self {
        Self::Rename { pairs }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Copy { .. } => OperationKind::Copy,
            Self::Move { .. } => OperationKind::Move,
            Self::Delete { .. } => OperationKind::Delete,
            Self::Mkdir { .. } => OperationKind::Mkdir,
            Self::Rename { .. } => OperationKind::Rename,
        }
    }

    pub fn target_path(&self) -> Option<&str> {
        match self {
            Self::Copy { target, .. } | Self::Move { target, .. } => Some(target.as_str()),
            Self::Mkdir { path } => Some(path.as_str()),
            Self::Delete { .. } | Self::Rename { .. } => None,
        }
    }

    pub fn source_count(&self) -> usize {
        match self {
            Self::Copy { sources, .. } | Self::Move { sources, .. } | Self::Delete { sources } => {
                sources.len()
            }
            Self::Mkdir { .. } => 0,
            Self::Rename { pairs } => pairs.len(),
        }
    }
}

/// An operation plus the providers it runs against. `None` means the
/// local filesystem.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub operation: TransferOperation,
    pub source: Option<ProviderHandle>,
    pub target: Option<ProviderHandle>,
}

impl TransferRequest {
    /// Local to local.
    pub fn new(operation: TransferOperation) -> Self {
        Self {
            operation,
            source: None,
            target: None,
        }
    }

    pub fn with_source(mut self, provider: ProviderHandle) -> Self {
        self.source = Some(provider);
        self
    }

    pub fn with_target(mut self, provider: ProviderHandle) -> Self {
        self.target = Some(provider);
        self
    }

    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }

    pub fn source_label(&self) -> String {
        label(&self.source)
    }

    pub fn target_label(&self) -> String {
        label(&self.target)
    }
}

fn label(provider: &Option<ProviderHandle>) -> String {
    provider
        .as_ref()
        .map(|p| p.label().to_string())
        .unwrap_or_else(|| "Local".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_display_name() {
        assert_eq!(Source::from("/a/b/report.pdf").display_name(), "report.pdf");
        assert_eq!(Source::from("/a/dir/").display_name(), "dir");
        assert_eq!(Source::from(r"C:\x\y.txt").display_name(), "y.txt");
        let entry = FileEntry::file("z.txt", "/z.txt", 1, 0);
        assert_eq!(Source::from(entry).display_name(), "z.txt");
    }

    #[test]
    fn test_operation_accessors() {
        let op = TransferOperation::copy(vec!["/a".into(), "/b".into()], "/dst");
        assert_eq!(op.kind(), OperationKind::Copy);
        assert_eq!(op.target_path(), Some("/dst"));
        assert_eq!(op.source_count(), 2);

        let request = TransferRequest::new(TransferOperation::mkdir("/new"));
        assert_eq!(request.source_label(), "Local");
        assert_eq!(request.kind(), OperationKind::Mkdir);
    }
}
