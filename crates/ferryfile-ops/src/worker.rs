//! The operation worker: runs one request to completion on a Tokio task.

use std::future::Future;

use ferryfile_core::{FileEntry, TransferConfig, VfsError};
use ferryfile_vfs::ProviderHandle;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::TransferError;
use crate::negotiation::ConflictQuery;
use crate::progress::{ItemOutcome, Tally, TransferOutcome, TransferProgress};
use crate::request::{OperationKind, Source, TransferOperation, TransferRequest};
use crate::transfer::TransferMode;
use crate::{create, delete, rename, transfer};

/// Events sent by a running worker. `Complete` is always the last one.
#[derive(Debug)]
pub enum TransferEvent {
    Progress(TransferProgress),
    Conflict(ConflictQuery),
    Complete(TransferOutcome),
}

/// Start executing `request`.
///
/// Returns at once with the receiving end of the worker's event channel.
/// Dropping the receiver does not stop the worker; cancel `cancel` for that.
pub fn start_transfer(
    request: TransferRequest,
    config: TransferConfig,
    cancel: CancellationToken,
) -> mpsc::Receiver<TransferEvent> {
    let (tx, rx) = mpsc::channel(config.channel_size.max(1));

    tokio::spawn(async move {
        let outcome = run_request(request, config, cancel, tx.clone()).await;
        let _ = tx.send(TransferEvent::Complete(outcome)).await;
    });

    rx
}

async fn run_request(
    request: TransferRequest,
    config: TransferConfig,
    cancel: CancellationToken,
    events: mpsc::Sender<TransferEvent>,
) -> TransferOutcome {
    let kind = request.kind();
    let TransferRequest {
        operation,
        source,
        target,
    } = request;

    debug!(%kind, "transfer started");
    let batch = Batch {
        kind,
        source: source.clone().unwrap_or_else(ProviderHandle::local),
        target: target.clone().unwrap_or_else(ProviderHandle::local),
        config,
        cancel,
        events,
    };

    let outcome = match operation {
        TransferOperation::Copy { sources, target } => {
            transfer::run(&batch, &sources, &target, TransferMode::Copy).await
        }
        TransferOperation::Move { sources, target } => {
            transfer::run(&batch, &sources, &target, TransferMode::Move).await
        }
        TransferOperation::Delete { sources } => delete::run(&batch, &sources).await,
        TransferOperation::Mkdir { path } => {
            let provider = target.or(source).unwrap_or_else(ProviderHandle::local);
            create::run(&batch, &provider, &path).await
        }
        TransferOperation::Rename { pairs } => {
            let provider = source.or(target).unwrap_or_else(ProviderHandle::local);
            rename::run(&batch, &provider, &pairs).await
        }
    };

    if outcome.success {
        info!(%kind, message = %outcome.message, "transfer finished");
    } else {
        warn!(%kind, message = %outcome.message, "transfer failed");
    }
    outcome
}

/// Everything a running batch needs.
pub(crate) struct Batch {
    pub kind: OperationKind,
    /// Source side, local when the request named none.
    pub source: ProviderHandle,
    /// Target side, local when the request named none.
    pub target: ProviderHandle,
    pub config: TransferConfig,
    pub cancel: CancellationToken,
    pub events: mpsc::Sender<TransferEvent>,
}

impl Batch {
    /// Turn a source into an entry, looking raw paths up on `provider`.
    pub async fn resolve(&self, provider: &ProviderHandle, source: &Source) -> Result<FileEntry, TransferError> {
        match source {
            Source::Entry(entry) => Ok(entry.clone()),
            Source::RawPath(path) => {
                let lookup = path.clone();
                provider
                    .run(move |p| p.stat(&lookup))
                    .await?
                    .ok_or_else(|| VfsError::not_found(path.as_str()).into())
            }
        }
    }

    pub async fn progress(&self, percent: u8, current_item: &str, tally: &Tally) {
        let progress = TransferProgress {
            kind: self.kind,
            percent,
            current_item: current_item.to_string(),
            items_done: tally.processed,
            items_total: tally.total,
        };
        let _ = self.events.send(TransferEvent::Progress(progress)).await;
    }

    /// A scratch directory for VFS to VFS staging, removed on drop.
    pub fn staging_dir(&self) -> Result<TempDir, TransferError> {
        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("ferryfile-");
            builder
        };
        match &self.config.temp_dir {
            Some(dir) => builder.tempdir_in(dir).map_err(|e| TransferError::io(dir, e)),
            None => builder
                .tempdir()
                .map_err(|e| TransferError::io(std::env::temp_dir(), e)),
        }
    }
}

/// Run `step` for every source in order, stopping at the first error or
/// at a Cancel decision. Progress is reported after each item.
pub(crate) async fn for_each_item<F, Fut>(batch: &Batch, sources: &[Source], mut step: F) -> TransferOutcome
where
    F: FnMut(FileEntry) -> Fut,
    Fut: Future<Output = Result<ItemOutcome, TransferError>>,
{
    let mut tally = Tally::new(sources.len());

    for source in sources {
        if batch.cancel.is_cancelled() {
            return TransferOutcome::cancelled(batch.kind, &tally);
        }

        let result = match batch.resolve(&batch.source, source).await {
            Ok(entry) => step(entry).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(ItemOutcome::Cancelled) => {
                info!(item = source.display_name(), "batch cancelled by user");
                return TransferOutcome::cancelled(batch.kind, &tally);
            }
            Ok(outcome) => {
                tally.record(outcome);
                batch
                    .progress(tally.rounded_percent(), source.display_name(), &tally)
                    .await;
            }
            Err(e) => {
                warn!(item = source.display_name(), error = %e, "item failed, aborting batch");
                return TransferOutcome::failed(batch.kind, &e, &tally);
            }
        }
    }

    TransferOutcome::completed(batch.kind, tally.summary(batch.kind), &tally)
}
