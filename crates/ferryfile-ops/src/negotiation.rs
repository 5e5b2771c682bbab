//! Overwrite negotiation between a running worker and whoever drives it.
//!
//! The worker parks on a oneshot receiver until the answer arrives, the
//! deadline passes or the batch is cancelled.

use std::time::Duration;

use ferryfile_core::FileEntry;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TransferError;
use crate::worker::TransferEvent;

/// Answer to an overwrite query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverwriteDecision {
    Overwrite,
    Skip,
    /// Stop the whole batch.
    Cancel,
}

/// One-shot reply slot for a pending query.
#[derive(Debug)]
pub struct OverwriteResponder(oneshot::Sender<OverwriteDecision>);

impl OverwriteResponder {
    /// Deliver the answer. Returns false if the worker stopped waiting.
    pub fn respond(self, decision: OverwriteDecision) -> bool {
        self.0.send(decision).is_ok()
    }
}

/// A name collision the worker needs a decision on.
#[derive(Debug)]
pub struct ConflictQuery {
    /// The item being transferred.
    pub source: FileEntry,
    /// The object already at the destination.
    pub target: FileEntry,
    pub responder: OverwriteResponder,
}

/// Raise a conflict and wait for the decision.
pub(crate) async fn negotiate(
    events: &mpsc::Sender<TransferEvent>,
    source: FileEntry,
    target: FileEntry,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<OverwriteDecision, TransferError> {
    let (tx, rx) = oneshot::channel();
    debug!(name = %source.name, "raising overwrite query");

    let query = ConflictQuery {
        source,
        target,
        responder: OverwriteResponder(tx),
    };
    events
        .send(TransferEvent::Conflict(query))
        .await
        .map_err(|_| TransferError::Negotiation {
            message: "Nobody is listening for overwrite queries".to_string(),
        })?;

    tokio::select! {
        _ = cancel.cancelled() => Ok(OverwriteDecision::Cancel),
        answer = tokio::time::timeout(timeout, rx) => match answer {
            Ok(Ok(decision)) => Ok(decision),
            Ok(Err(_)) => Err(TransferError::Negotiation {
                message: "Overwrite query was abandoned".to_string(),
            }),
            Err(_) => Err(TransferError::Timeout {
                message: "Overwrite query timed out".to_string(),
            }),
        },
    }
}
