//! Copy and move across the local/VFS matrix.

use std::path::{Path, PathBuf};

use ferryfile_core::FileEntry;
use ferryfile_vfs::{path, tree};
use tracing::{debug, warn};

use crate::error::TransferError;
use crate::local;
use crate::negotiation::{OverwriteDecision, negotiate};
use crate::progress::{ItemOutcome, TransferOutcome};
use crate::request::Source;
use crate::worker::{Batch, for_each_item};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransferMode {
    Copy,
    Move,
}

pub(crate) async fn run(
    batch: &Batch,
    sources: &[Source],
    target_dir: &str,
    mode: TransferMode,
) -> TransferOutcome {
    for_each_item(batch, sources, move |entry| {
        transfer_item(batch, entry, target_dir, mode)
    })
    .await
}

async fn transfer_item(
    batch: &Batch,
    entry: FileEntry,
    target_dir: &str,
    mode: TransferMode,
) -> Result<ItemOutcome, TransferError> {
    let local_source = batch.source.is_local();
    let local_target = batch.target.is_local();
    let dest = destination(local_target, target_dir, &entry.name);
    let same_remote = !local_source && batch.source.same_as(&batch.target);

    if (local_source && local_target) || same_remote {
        check_not_into_itself(&entry, &dest)?;
    }
    let native_move = mode == TransferMode::Move && same_remote && supports_rename(batch).await?;

    if let Some(existing) = existing_target(batch, target_dir, &entry.name).await {
        let decision = negotiate(
            &batch.events,
            entry.clone(),
            existing.clone(),
            batch.config.conflict_timeout(),
            &batch.cancel,
        )
        .await?;

        match decision {
            OverwriteDecision::Skip => {
                debug!(name = %entry.name, "skipping existing destination");
                return Ok(ItemOutcome::Skipped);
            }
            OverwriteDecision::Cancel => return Ok(ItemOutcome::Cancelled),
            OverwriteDecision::Overwrite => {
                clear_destination(batch, &entry, &existing, native_move).await?
            }
        }
    }

    if native_move {
        let from = entry.full_path.clone();
        let to = dest.clone();
        batch.source.run(move |p| p.rename(&from, &to)).await?;
        return Ok(ItemOutcome::Done);
    }

    match (local_source, local_target) {
        (true, true) => {
            let source = PathBuf::from(&entry.full_path);
            let target = PathBuf::from(&dest);
            let preserve = batch.config.preserve_timestamps;
            tokio::task::spawn_blocking(move || match mode {
                TransferMode::Copy => local::copy_item(&source, &target, preserve).map(|_| ()),
                TransferMode::Move => local::move_item(&source, &target, preserve),
            })
            .await
            .map_err(TransferError::task)??;
            return Ok(ItemOutcome::Done);
        }
        (false, true) => {
            let fetched = entry.clone();
            let local_dir = PathBuf::from(target_dir);
            batch
                .source
                .run(move |p| tree::fetch_tree(p, &fetched, &local_dir))
                .await?;
        }
        (true, false) => {
            let local_path = PathBuf::from(&entry.full_path);
            let remote_dest = dest.clone();
            batch
                .target
                .run(move |p| tree::push_tree(p, &local_path, &remote_dest))
                .await?;
        }
        (false, false) => {
            let staging = batch.staging_dir()?;
            let staging_path = staging.path().to_path_buf();
            let fetched = entry.clone();
            let staged = batch
                .source
                .run(move |p| tree::fetch_tree(p, &fetched, &staging_path))
                .await?;
            let remote_dest = dest.clone();
            batch
                .target
                .run(move |p| tree::push_tree(p, &staged, &remote_dest))
                .await?;
        }
    }

    if mode == TransferMode::Move {
        let FileEntry {
            full_path, is_dir, ..
        } = entry;
        batch.source.run(move |p| p.delete(&full_path, is_dir)).await?;
    }

    Ok(ItemOutcome::Done)
}

fn destination(local_target: bool, target_dir: &str, name: &str) -> String {
    if local_target {
        Path::new(target_dir).join(name).to_string_lossy().into_owned()
    } else {
        path::join(target_dir, name)
    }
}

/// Local guard against copying onto itself or into its own subtree.
fn check_not_into_itself(entry: &FileEntry, dest: &str) -> Result<(), TransferError> {
    let source = Path::new(&entry.full_path);
    let dest = Path::new(dest);

    if source == dest {
        return Err(TransferError::validation(format!(
            "Source and destination are the same file: {}",
            entry.full_path
        )));
    }
    if entry.is_dir && dest.starts_with(source) {
        return Err(TransferError::validation(format!(
            "Cannot copy/move a directory into itself: {}",
            entry.full_path
        )));
    }
    Ok(())
}

/// The object already occupying the destination name, if any.
///
/// A target listing that fails counts as no conflict; the transfer itself
/// will surface the real error.
async fn existing_target(batch: &Batch, target_dir: &str, name: &str) -> Option<FileEntry> {
    let dir = target_dir.to_string();
    match batch.target.run(move |p| p.list_directory(&dir)).await {
        Ok(entries) => entries.into_iter().find(|e| e.name == name),
        Err(e) => {
            warn!(dir = target_dir, error = %e, "could not list target for conflict check");
            None
        }
    }
}

/// Make room for an overwrite.
///
/// Local targets are always cleared, and so is the destination of a native
/// rename, which never replaces an existing name. Other remote targets only
/// when a file would replace a directory or the other way round; uploads
/// replace files in place.
async fn clear_destination(
    batch: &Batch,
    entry: &FileEntry,
    existing: &FileEntry,
    native_move: bool,
) -> Result<(), TransferError> {
    if batch.target.is_local() {
        let path = PathBuf::from(&existing.full_path);
        tokio::task::spawn_blocking(move || local::remove_item(&path))
            .await
            .map_err(TransferError::task)??;
    } else if native_move || existing.is_dir != entry.is_dir {
        let path = existing.full_path.clone();
        let is_dir = existing.is_dir;
        batch.target.run(move |p| p.delete(&path, is_dir)).await?;
    }
    Ok(())
}

async fn supports_rename(batch: &Batch) -> Result<bool, TransferError> {
    Ok(batch.source.run(|p| Ok(p.supports_rename())).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_syntax() {
        assert_eq!(destination(false, "/remote/dir", "a.txt"), "/remote/dir/a.txt");
        assert_eq!(destination(false, "/", "a.txt"), "/a.txt");
        assert_eq!(destination(true, "/tmp/x", "a.txt"), "/tmp/x/a.txt");
    }

    #[test]
    fn test_into_itself_guards() {
        let dir = FileEntry::directory("src", "/data/src", 0);
        assert!(check_not_into_itself(&dir, "/data/src").is_err());
        assert!(check_not_into_itself(&dir, "/data/src/nested/src").is_err());
        assert!(check_not_into_itself(&dir, "/data/other/src").is_ok());

        let file = FileEntry::file("a", "/data/a", 1, 0);
        assert!(check_not_into_itself(&file, "/data/backup/a").is_ok());
    }
}
