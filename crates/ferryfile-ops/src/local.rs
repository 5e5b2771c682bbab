//! Local filesystem copy, move and removal.

use std::fs;
use std::path::Path;

use ferryfile_core::{VfsError, VfsResult};
use ferryfile_vfs::local::copy_file_preserving;
use tracing::debug;

/// Copy a single file, optionally keeping its modification time.
pub fn copy_file(source: &Path, dest: &Path, preserve_timestamps: bool) -> VfsResult<u64> {
    if preserve_timestamps {
        copy_file_preserving(source, dest)
    } else {
        fs::copy(source, dest).map_err(|e| VfsError::io(dest, e))
    }
}

/// Recursively copy a directory.
pub fn copy_dir_recursive(source: &Path, dest: &Path, preserve_timestamps: bool) -> VfsResult<u64> {
    fs::create_dir_all(dest).map_err(|e| VfsError::io(dest, e))?;

    let mut total_bytes = 0u64;
    let entries = fs::read_dir(source).map_err(|e| VfsError::io(source, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| VfsError::io(source, e))?;
        let path = entry.path();
        let dest_path = dest.join(entry.file_name());

        if path.is_dir() {
            total_bytes += copy_dir_recursive(&path, &dest_path, preserve_timestamps)?;
        } else {
            total_bytes += copy_file(&path, &dest_path, preserve_timestamps)?;
        }
    }

    Ok(total_bytes)
}

/// Copy a file or directory tree.
pub fn copy_item(source: &Path, dest: &Path, preserve_timestamps: bool) -> VfsResult<u64> {
    if source.is_dir() {
        copy_dir_recursive(source, dest, preserve_timestamps)
    } else {
        copy_file(source, dest, preserve_timestamps)
    }
}

/// Move a file or directory: rename when possible, else copy then delete.
pub fn move_item(source: &Path, dest: &Path, preserve_timestamps: bool) -> VfsResult<()> {
    if fs::rename(source, dest).is_ok() {
        return Ok(());
    }

    debug!(source = %source.display(), "rename failed, falling back to copy and delete");
    copy_item(source, dest, preserve_timestamps)?;
    remove_item(source)
}

/// Remove a file or directory tree.
pub fn remove_item(path: &Path) -> VfsResult<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| VfsError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_dir_recursive() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("inner")).unwrap();
        fs::write(src.join("a.txt"), "aaa").unwrap();
        fs::write(src.join("inner/b.txt"), "bb").unwrap();

        let dest = temp.path().join("dest");
        let bytes = copy_item(&src, &dest, true).unwrap();
        assert_eq!(bytes, 5);
        assert_eq!(fs::read_to_string(dest.join("inner/b.txt")).unwrap(), "bb");
    }

    #[test]
    fn test_move_item() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("file.txt");
        fs::write(&src, "moved").unwrap();
        let dest = temp.path().join("renamed.txt");

        move_item(&src, &dest, true).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "moved");
    }

    #[test]
    fn test_remove_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let err = remove_item(&temp.path().join("ghost")).unwrap_err();
        assert!(matches!(err, VfsError::NotFound { .. }));
    }
}
