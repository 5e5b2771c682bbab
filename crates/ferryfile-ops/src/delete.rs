//! Delete operation.

use ferryfile_core::FileEntry;
use tracing::debug;

use crate::error::TransferError;
use crate::progress::{ItemOutcome, TransferOutcome};
use crate::request::Source;
use crate::worker::{Batch, for_each_item};

/// Delete every source on the source provider, stopping at the first failure.
pub(crate) async fn run(batch: &Batch, sources: &[Source]) -> TransferOutcome {
    for_each_item(batch, sources, move |entry| delete_item(batch, entry)).await
}

async fn delete_item(batch: &Batch, entry: FileEntry) -> Result<ItemOutcome, TransferError> {
    debug!(path = %entry.full_path, is_dir = entry.is_dir, "deleting");
    let FileEntry {
        full_path, is_dir, ..
    } = entry;
    batch.source.run(move |p| p.delete(&full_path, is_dir)).await?;
    Ok(ItemOutcome::Done)
}
