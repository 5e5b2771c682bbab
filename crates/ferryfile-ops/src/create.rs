//! Folder creation.

use ferryfile_vfs::{ProviderHandle, path};
use tracing::debug;

use crate::progress::{ItemOutcome, Tally, TransferOutcome};
use crate::worker::Batch;

/// Create `dir` on `provider`. No progress is reported for this kind.
pub(crate) async fn run(batch: &Batch, provider: &ProviderHandle, dir: &str) -> TransferOutcome {
    let mut tally = Tally::new(1);
    debug!(dir, provider = provider.label(), "creating folder");

    let target = dir.to_string();
    match provider.run(move |p| p.make_directory(&target)).await {
        Ok(()) => {
            tally.record(ItemOutcome::Done);
            let name = path::basename(dir);
            TransferOutcome::completed(batch.kind, format!("Folder created: {}", name), &tally)
        }
        Err(e) => TransferOutcome::failed(batch.kind, &e.into(), &tally),
    }
}
