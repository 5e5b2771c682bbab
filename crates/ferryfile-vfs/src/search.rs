//! A flat, read-only view over entries found by a search.

use std::path::{Path, PathBuf};

use ferryfile_core::{FileEntry, VfsError, VfsResult};

use crate::local::LocalProvider;
use crate::provider::{ProviderHandle, ProviderKind, VfsProvider};
use crate::tree;

/// Search hits presented as one directory.
///
/// Entries keep their original `full_path`, so fetching goes back to the
/// provider they were found on, or to the local disk when none is wrapped.
#[derive(Debug)]
pub struct SearchResultsProvider {
    query: String,
    results: Vec<FileEntry>,
    origin: Option<ProviderHandle>,
}

impl SearchResultsProvider {
    /// Results found on the local disk.
    pub fn new(query: impl Into<String>, results: Vec<FileEntry>) -> Self {
        Self {
            query: query.into(),
            results,
            origin: None,
        }
    }

    /// Results found on another provider.
    pub fn over(query: impl Into<String>, results: Vec<FileEntry>, origin: ProviderHandle) -> Self {
        Self {
            origin: Some(origin),
            ..Self::new(query, results)
        }
    }

    pub fn results(&self) -> &[FileEntry] {
        &self.results
    }

    fn fetch_entry(&self, entry: &FileEntry, local_dir: &Path) -> VfsResult<PathBuf> {
        match &self.origin {
            Some(origin) => origin.with(|provider| tree::fetch_tree(provider, entry, local_dir)),
            None => tree::fetch_tree(&mut LocalProvider::new(), entry, local_dir),
        }
    }

    fn read_only(&self, operation: &'static str) -> VfsError {
        VfsError::unsupported(operation, self.display_name())
    }
}

impl VfsProvider for SearchResultsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::SearchResults
    }

    fn display_name(&self) -> String {
        format!("search: {}", self.query)
    }

    fn list_directory(&mut self, _path: &str) -> VfsResult<Vec<FileEntry>> {
        Ok(self.results.clone())
    }

    fn fetch_to_local(&mut self, remote_path: &str, local_dir: &Path) -> VfsResult<PathBuf> {
        let entry = self
            .results
            .iter()
            .find(|e| e.full_path == remote_path)
            .cloned()
            .unwrap_or_else(|| FileEntry::file(crate::path::basename(remote_path), remote_path, 0, 0));
        self.fetch_entry(&entry, local_dir)
    }

    fn push_from_local(&mut self, _local_path: &Path, _remote_dest: &str) -> VfsResult<()> {
        Err(self.read_only("Copying into search results"))
    }

    fn delete(&mut self, _path: &str, _is_directory: bool) -> VfsResult<()> {
        Err(self.read_only("Deleting from search results"))
    }

    fn make_directory(&mut self, _path: &str) -> VfsResult<()> {
        Err(self.read_only("Creating folders in search results"))
    }

    fn fetch_all(&mut self, dest_dir: &Path) -> VfsResult<()> {
        std::fs::create_dir_all(dest_dir).map_err(|e| VfsError::io(dest_dir, e))?;
        for entry in &self.results {
            self.fetch_entry(entry, dest_dir)?;
        }
        Ok(())
    }

    fn close(&mut self) {}

    fn stat(&mut self, target: &str) -> VfsResult<Option<FileEntry>> {
        Ok(self.results.iter().find(|e| e.full_path == target).cloned())
    }
}
