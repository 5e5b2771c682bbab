//! Batch rename.
//!
//! The whole batch is validated before the first rename runs. Providers
//! without a native rename get a fetch, upload and delete round trip.

use std::collections::{HashMap, HashSet};

use ferryfile_core::FileEntry;
use ferryfile_vfs::{ProviderHandle, tree};
use tracing::{debug, info, warn};

use crate::error::TransferError;
use crate::progress::{ItemOutcome, Tally, TransferOutcome};
use crate::request::{RenamePair, Source};
use crate::worker::Batch;

struct RenameStep {
    entry: FileEntry,
    original: String,
    to: String,
}

pub(crate) async fn run(batch: &Batch, provider: &ProviderHandle, pairs: &[RenamePair]) -> TransferOutcome {
    let total = pairs.len();
    let mut tally = Tally::new(total);

    let (mut steps, staged) = match plan(batch, provider, pairs).await {
        Ok(plan) => plan,
        Err(e) => return TransferOutcome::failed(batch.kind, &e, &tally),
    };

    let native = match provider.run(|p| Ok(p.supports_rename())).await {
        Ok(native) => native,
        Err(e) => return TransferOutcome::failed(batch.kind, &e.into(), &tally),
    };

    // Names swap or chain inside the batch: park every source under a
    // temporary name first so no rename lands on a live sibling.
    if staged {
        if batch.cancel.is_cancelled() {
            return TransferOutcome::cancelled(batch.kind, &tally);
        }
        debug!(count = steps.len(), "staging renames through temporary names");
        for i in 0..steps.len() {
            let entry = &steps[i].entry;
            let temp = sibling_path(&entry.full_path, &format!(".ferry-rename-{}-{}", i, entry.name));
            if let Err(e) = rename_one(batch, provider, entry, &temp, native).await {
                restore(batch, provider, &steps[..i], native).await;
                return TransferOutcome::failed(batch.kind, &e, &tally);
            }
            steps[i].entry.full_path = temp;
        }
    }

    for (i, step) in steps.iter().enumerate() {
        if !staged && batch.cancel.is_cancelled() {
            info!(done = i, "rename batch cancelled");
            return TransferOutcome::cancelled(batch.kind, &tally);
        }
        batch
            .progress(Tally::floor_percent(i, total), &step.entry.name, &tally)
            .await;

        if step.entry.full_path != step.to {
            if let Err(e) = rename_one(batch, provider, &step.entry, &step.to, native).await {
                if staged {
                    restore(batch, provider, &steps[i..], native).await;
                }
                return TransferOutcome::failed(batch.kind, &e, &tally);
            }
        }
        tally.record(ItemOutcome::Done);
    }

    TransferOutcome::completed(
        batch.kind,
        format!("Multi-Rename completed for {} files.", total),
        &tally,
    )
}

/// Move entries parked under a temporary name back to their original name.
/// Best effort: a failure is logged and the next entry is still tried.
async fn restore(batch: &Batch, provider: &ProviderHandle, steps: &[RenameStep], native: bool) {
    for step in steps.iter().filter(|s| s.entry.full_path != s.original) {
        if let Err(e) = rename_one(batch, provider, &step.entry, &step.original, native).await {
            warn!(
                from = %step.entry.full_path,
                to = %step.original,
                error = %e,
                "could not restore name after failed rename"
            );
        }
    }
}

/// Resolve every pair and run the full validation.
///
/// Returns the steps and whether any destination is currently held by a
/// sibling that the batch itself renames away.
async fn plan(
    batch: &Batch,
    provider: &ProviderHandle,
    pairs: &[RenamePair],
) -> Result<(Vec<RenameStep>, bool), TransferError> {
    validate_renames(pairs)?;

    let mut steps = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let entry = batch.resolve(provider, &pair.source).await?;
        let to = sibling_path(&entry.full_path, &pair.new_name);
        let original = entry.full_path.clone();
        steps.push(RenameStep { entry, original, to });
    }

    let mut listings: HashMap<String, Vec<FileEntry>> = HashMap::new();
    for step in &steps {
        let dir = parent_dir(&step.entry.full_path);
        if !listings.contains_key(&dir) {
            let lookup = dir.clone();
            let children = provider.run(move |p| p.list_directory(&lookup)).await?;
            listings.insert(dir, children);
        }
    }

    let leaving: HashSet<&str> = steps
        .iter()
        .filter(|s| s.entry.full_path != s.to)
        .map(|s| s.entry.full_path.as_str())
        .collect();

    let mut staged = false;
    for (step, pair) in steps.iter().zip(pairs) {
        if step.entry.full_path == step.to {
            continue;
        }
        let dir = parent_dir(&step.entry.full_path);
        let occupied = listings
            .get(&dir)
            .is_some_and(|children| children.iter().any(|c| c.name == pair.new_name));
        if !occupied {
            continue;
        }
        if leaving.contains(step.to.as_str()) {
            staged = true;
        } else {
            return Err(TransferError::validation(format!(
                "'{}' already exists",
                pair.new_name
            )));
        }
    }

    Ok((steps, staged))
}

/// Checks that need no provider: valid names and no two pairs landing on
/// the same destination.
pub fn validate_renames(pairs: &[RenamePair]) -> Result<(), TransferError> {
    let mut destinations = HashSet::new();

    for pair in pairs {
        validate_filename(&pair.new_name).map_err(|reason| {
            TransferError::validation(format!("Invalid name '{}': {}", pair.new_name, reason))
        })?;

        let dir = parent_dir(source_path(&pair.source));
        if !destinations.insert((dir, pair.new_name.as_str())) {
            return Err(TransferError::validation(format!(
                "Duplicate target name '{}'",
                pair.new_name
            )));
        }
    }

    Ok(())
}

async fn rename_one(
    batch: &Batch,
    provider: &ProviderHandle,
    entry: &FileEntry,
    to: &str,
    native: bool,
) -> Result<(), TransferError> {
    let from = entry.full_path.clone();
    let dest = to.to_string();

    if native {
        provider.run(move |p| p.rename(&from, &dest)).await?;
        return Ok(());
    }

    debug!(from = %entry.full_path, to, "emulating rename");
    let staging = batch.staging_dir()?;
    let staging_path = staging.path().to_path_buf();
    let fetched = entry.clone();
    let is_dir = entry.is_dir;
    provider
        .run(move |p| {
            let local = tree::fetch_tree(p, &fetched, &staging_path)?;
            tree::push_tree(p, &local, &dest)?;
            p.delete(&from, is_dir)
        })
        .await?;
    Ok(())
}

fn source_path(source: &Source) -> &str {
    match source {
        Source::Entry(entry) => &entry.full_path,
        Source::RawPath(path) => path,
    }
}

/// Directory holding `path`, in the same syntax.
fn parent_dir(path: &str) -> String {
    let trimmed = path.trim_end_matches(['/', '\\']);
    match trimmed.rfind(['/', '\\']) {
        Some(0) => trimmed[..1].to_string(),
        Some(idx) => trimmed[..idx].to_string(),
        None => String::new(),
    }
}

/// `path` with its last component replaced by `name`.
fn sibling_path(path: &str, name: &str) -> String {
    let trimmed = path.trim_end_matches(['/', '\\']);
    match trimmed.rfind(['/', '\\']) {
        Some(idx) => format!("{}{}", &trimmed[..=idx], name),
        None => name.to_string(),
    }
}

/// Validate a filename for cross-platform compatibility.
pub fn validate_filename(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Name cannot be empty".into());
    }

    if name.len() > 255 {
        return Err("Name is too long (max 255 characters)".into());
    }

    // Remote backends treat a backslash as a separator too.
    for c in ['/', '\\', '\0'] {
        if name.contains(c) {
            return Err(format!("Name cannot contain '{}'", c.escape_default()));
        }
    }

    #[cfg(target_os = "windows")]
    {
        let windows_invalid = [':', '*', '?', '"', '<', '>', '|'];
        for c in windows_invalid {
            if name.contains(c) {
                return Err(format!("Name cannot contain '{}'", c));
            }
        }

        let reserved = [
            "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
            "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
        ];
        let upper_name = name.to_uppercase();
        let base_name = upper_name.split('.').next().unwrap_or("");
        if reserved.contains(&base_name) {
            return Err("Reserved filename".into());
        }
    }

    if name.starts_with(' ') || name.ends_with(' ') {
        return Err("Name cannot start or end with spaces".into());
    }

    if name == "." || name == ".." {
        return Err("'.' and '..' are reserved names".into());
    }

    if name.ends_with('.') {
        return Err("Name cannot end with a dot".into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_filename_valid() {
        assert!(validate_filename("test.txt").is_ok());
        assert!(validate_filename("my-file").is_ok());
        assert!(validate_filename(".hidden").is_ok());
        assert!(validate_filename("file with spaces").is_ok());
    }

    #[test]
    fn test_validate_filename_invalid() {
        assert!(validate_filename("").is_err());
        assert!(validate_filename("test/file").is_err());
        assert!(validate_filename(r"test\file").is_err());
        assert!(validate_filename(".").is_err());
        assert!(validate_filename("..").is_err());
        assert!(validate_filename("file ").is_err());
        assert!(validate_filename(" file").is_err());
        assert!(validate_filename("file.").is_err());
    }

    #[test]
    fn test_duplicate_destinations_rejected() {
        let pairs = vec![
            RenamePair::new("/d/a.txt", "same.txt"),
            RenamePair::new("/d/b.txt", "same.txt"),
        ];
        let err = validate_renames(&pairs).unwrap_err();
        assert!(matches!(err, TransferError::Validation { .. }));
        assert!(err.to_string().contains("same.txt"));

        // Same name in different directories is fine.
        let pairs = vec![
            RenamePair::new("/d/a.txt", "same.txt"),
            RenamePair::new("/e/b.txt", "same.txt"),
        ];
        assert!(validate_renames(&pairs).is_ok());
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(parent_dir("/d/a.txt"), "/d");
        assert_eq!(parent_dir("/a.txt"), "/");
        assert_eq!(parent_dir("docs/a.txt"), "docs");
        assert_eq!(parent_dir("a.txt"), "");
        assert_eq!(sibling_path("/d/a.txt", "b.txt"), "/d/b.txt");
        assert_eq!(sibling_path("/d/sub/", "new"), "/d/new");
        assert_eq!(sibling_path("a.txt", "b.txt"), "b.txt");
    }
}
