//! In-memory table of contents for an opened archive.

use std::collections::{BTreeMap, HashSet};

use ferryfile_core::{FileEntry, permissions_text};

/// Metadata for one archive member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedEntry {
    /// Normalized `/`-separated path without leading or trailing slashes.
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: i64,
    pub mode: Option<u32>,
}

/// All members of an archive, including directories that only exist
/// implicitly as parents of other members.
#[derive(Debug, Default)]
pub struct ArchiveIndex {
    entries: BTreeMap<String, IndexedEntry>,
    implicit_dirs: HashSet<String>,
}

/// Normalize a member name: `\` to `/`, no `./` prefix, no leading or
/// trailing slash.
pub fn normalize_member(name: &str) -> String {
    let unified = name.replace('\\', "/");
    let mut trimmed = unified.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed.trim_matches('/').to_string()
}

impl ArchiveIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a member and any parent directories it implies.
    pub fn insert(&mut self, raw_name: &str, is_dir: bool, size: u64, modified: i64, mode: Option<u32>) {
        let path = normalize_member(raw_name);
        if path.is_empty() || path == "." {
            return;
        }

        let mut parent = String::new();
        let components: Vec<&str> = path.split('/').collect();
        for component in &components[..components.len() - 1] {
            if !parent.is_empty() {
                parent.push('/');
            }
            parent.push_str(component);
            if !self.entries.contains_key(&parent) {
                self.implicit_dirs.insert(parent.clone());
                self.entries.insert(
                    parent.clone(),
                    IndexedEntry {
                        path: parent.clone(),
                        is_dir: true,
                        size: 0,
                        modified: 0,
                        mode: None,
                    },
                );
            }
        }

        // An explicit directory record replaces an implied one.
        if is_dir && self.entries.contains_key(&path) && !self.implicit_dirs.remove(&path) {
            return;
        }

        self.entries.insert(
            path.clone(),
            IndexedEntry {
                path,
                is_dir,
                size: if is_dir { 0 } else { size },
                modified,
                mode,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&IndexedEntry> {
        self.entries.get(&normalize_member(path))
    }

    /// Direct children of `dir` (`""` for the archive root).
    pub fn children(&self, dir: &str) -> Option<Vec<FileEntry>> {
        let dir = normalize_member(dir);
        if !dir.is_empty() && !self.get(&dir).is_some_and(|e| e.is_dir) {
            return None;
        }

        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };

        Some(
            self.entries
                .range(prefix.clone()..)
                .take_while(|(path, _)| path.starts_with(&prefix))
                .filter(|(path, _)| !path[prefix.len()..].contains('/') && path.len() > prefix.len())
                .map(|(_, entry)| to_file_entry(entry))
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexedEntry> {
        self.entries.values()
    }
}

fn to_file_entry(entry: &IndexedEntry) -> FileEntry {
    let name = entry.path.rsplit('/').next().unwrap_or(&entry.path);
    let file_entry = if entry.is_dir {
        FileEntry::directory(name, entry.path.clone(), entry.modified)
    } else {
        FileEntry::file(name, entry.path.clone(), entry.size, entry.modified)
    };
    file_entry.with_posix(None, None, entry.mode.map(permissions_text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(entries: Vec<FileEntry>) -> Vec<String> {
        entries.into_iter().map(|e| e.name.to_string()).collect()
    }

    #[test]
    fn test_implicit_parents() {
        let mut index = ArchiveIndex::new();
        index.insert("docs/guide/intro.md", false, 10, 0, None);
        index.insert("readme.txt", false, 5, 0, None);

        assert_eq!(names(index.children("").unwrap()), ["docs", "readme.txt"]);
        assert_eq!(names(index.children("docs").unwrap()), ["guide"]);
        assert_eq!(names(index.children("/docs/guide/").unwrap()), ["intro.md"]);
        assert!(index.get("docs/guide").unwrap().is_dir);
    }

    #[test]
    fn test_explicit_dir_after_implicit() {
        let mut index = ArchiveIndex::new();
        index.insert("a/b.txt", false, 1, 0, None);
        index.insert("a/", true, 0, 1_700_000_000, Some(0o755));
        index.insert("a/", true, 0, 5, None);

        let entry = index.get("a").unwrap();
        assert_eq!(entry.modified, 1_700_000_000);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_children_of_file_or_missing() {
        let mut index = ArchiveIndex::new();
        index.insert("./x.txt", false, 1, 0, None);
        assert!(index.children("x.txt").is_none());
        assert!(index.children("nope").is_none());
        assert_eq!(names(index.children("").unwrap()), ["x.txt"]);
    }

    #[test]
    fn test_normalize_member() {
        assert_eq!(normalize_member(r".\dir\file.txt"), "dir/file.txt");
        assert_eq!(normalize_member("./././a/"), "a");
        assert_eq!(normalize_member("/abs/path"), "abs/path");
    }
}
