//! Recursive helpers shared by all providers.
//!
//! Providers only implement single-object primitives; directory trees are
//! walked here so every backend recurses the same way.

use std::fs;
use std::path::{Path, PathBuf};

use ferryfile_core::{FileEntry, VfsError, VfsResult};
use tracing::debug;

use crate::path;
use crate::provider::VfsProvider;

/// Primitives for backends that have no recursive delete.
pub trait TreeRemoval {
    /// Direct children of `dir`.
    fn children(&mut self, dir: &str) -> VfsResult<Vec<FileEntry>>;

    /// Remove one file.
    fn remove_file(&mut self, path: &str) -> VfsResult<()>;

    /// Remove a directory that is already empty.
    fn remove_empty_dir(&mut self, path: &str) -> VfsResult<()>;
}

/// Remove `dir` and everything below it, deepest entries first.
pub fn remove_tree<T: TreeRemoval + ?Sized>(backend: &mut T, dir: &str) -> VfsResult<()> {
    for child in backend.children(dir)? {
        if child.is_parent_marker() {
            continue;
        }
        if child.is_dir {
            remove_tree(backend, &child.full_path)?;
        } else {
            backend.remove_file(&child.full_path)?;
        }
    }
    debug!(dir, "removing emptied directory");
    backend.remove_empty_dir(dir)
}

/// Fetch a file or a whole directory into `local_dir`.
///
/// Returns the local path of the fetched object.
pub fn fetch_tree<P: VfsProvider + ?Sized>(
    provider: &mut P,
    entry: &FileEntry,
    local_dir: &Path,
) -> VfsResult<PathBuf> {
    if !entry.is_dir {
        return provider.fetch_to_local(&entry.full_path, local_dir);
    }

    let dest = local_dir.join(safe_name(&entry.name)?);
    fs::create_dir_all(&dest).map_err(|e| VfsError::io(&dest, e))?;

    for child in provider.list_directory(&entry.full_path)? {
        if child.is_parent_marker() {
            continue;
        }
        fetch_tree(provider, &child, &dest)?;
    }

    Ok(dest)
}

/// Upload a local file or directory tree to `remote_dest`.
pub fn push_tree<P: VfsProvider + ?Sized>(
    provider: &mut P,
    local: &Path,
    remote_dest: &str,
) -> VfsResult<()> {
    let metadata = fs::metadata(local).map_err(|e| VfsError::io(local, e))?;
    if !metadata.is_dir() {
        return provider.push_from_local(local, remote_dest);
    }

    ensure_directory(provider, remote_dest)?;

    let entries = fs::read_dir(local).map_err(|e| VfsError::io(local, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| VfsError::io(local, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        push_tree(provider, &entry.path(), &path::join(remote_dest, &name))?;
    }

    Ok(())
}

/// Create `remote_dir` unless a directory already exists there.
pub fn ensure_directory<P: VfsProvider + ?Sized>(
    provider: &mut P,
    remote_dir: &str,
) -> VfsResult<()> {
    match provider.stat(remote_dir) {
        Ok(Some(existing)) if existing.is_dir => Ok(()),
        _ => provider.make_directory(remote_dir),
    }
}

/// Fetch every entry under `location` into `dest_dir`.
pub fn mirror<P: VfsProvider + ?Sized>(
    provider: &mut P,
    location: &str,
    dest_dir: &Path,
) -> VfsResult<()> {
    fs::create_dir_all(dest_dir).map_err(|e| VfsError::io(dest_dir, e))?;
    for entry in provider.list_directory(location)? {
        if entry.is_parent_marker() {
            continue;
        }
        fetch_tree(provider, &entry, dest_dir)?;
    }
    Ok(())
}

/// Reject names that would escape the destination directory.
pub fn safe_name(name: &str) -> VfsResult<&str> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(VfsError::protocol(format!("Refusing unsafe entry name '{}'", name)));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        calls: Vec<String>,
    }

    impl TreeRemoval for Recorder {
        fn children(&mut self, dir: &str) -> VfsResult<Vec<FileEntry>> {
            Ok(match dir {
                "/d" => vec![
                    FileEntry::file("a", "/d/a", 1, 0),
                    FileEntry::directory("sub", "/d/sub", 0),
                    FileEntry::file("b", "/d/b", 1, 0),
                ],
                "/d/sub" => vec![FileEntry::file("c", "/d/sub/c", 1, 0)],
                _ => Vec::new(),
            })
        }

        fn remove_file(&mut self, path: &str) -> VfsResult<()> {
            self.calls.push(format!("file {}", path));
            Ok(())
        }

        fn remove_empty_dir(&mut self, path: &str) -> VfsResult<()> {
            self.calls.push(format!("dir {}", path));
            Ok(())
        }
    }

    #[test]
    fn test_remove_tree_is_deepest_first() {
        let mut recorder = Recorder { calls: Vec::new() };
        remove_tree(&mut recorder, "/d").unwrap();
        assert_eq!(
            recorder.calls,
            [
                "file /d/a",
                "file /d/sub/c",
                "dir /d/sub",
                "file /d/b",
                "dir /d",
            ]
        );
    }

    #[test]
    fn test_safe_name() {
        assert!(safe_name("report.pdf").is_ok());
        assert!(safe_name("..").is_err());
        assert!(safe_name("../etc").is_err());
        assert!(safe_name("").is_err());
    }
}
