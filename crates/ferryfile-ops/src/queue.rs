//! Serial FIFO transfer queue.
//!
//! At most one request runs at a time. When it ends, successfully or not,
//! the oldest waiting request is promoted unless the queue is paused.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ferryfile_core::{FileEntry, TransferConfig};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::TransferError;
use crate::negotiation::{ConflictQuery, OverwriteDecision, OverwriteResponder};
use crate::progress::CANCELLED_MESSAGE;
use crate::rename::validate_renames;
use crate::request::{OperationKind, TransferOperation, TransferRequest};
use crate::worker::{TransferEvent, start_transfer};

/// Identifier of an enqueued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a queued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueStatus {
    Waiting,
    Running,
    Completed,
    Error,
}

impl QueueStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "Waiting"),
            Self::Running => write!(f, "Running"),
            Self::Completed => write!(f, "Completed"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Snapshot of one queued request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: RequestId,
    pub kind: OperationKind,
    pub status: QueueStatus,
    pub progress_percent: u8,
    pub current_item: String,
    /// Terminal message once the request has finished.
    pub message: String,
    pub target_path: Option<String>,
    pub source_count: usize,
    pub source_label: String,
    pub target_label: String,
}

/// Change notifications broadcast to subscribers.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// Items were added, removed or changed status.
    Updated,
    Progress {
        id: RequestId,
        percent: u8,
        current_item: String,
    },
    /// The running request waits for `resolve_conflict`.
    Conflict {
        id: RequestId,
        source: FileEntry,
        target: FileEntry,
    },
    Finished {
        id: RequestId,
        success: bool,
        message: String,
    },
}

struct QueueEntry {
    snapshot: QueueItem,
    /// Taken when the request is promoted.
    request: Option<TransferRequest>,
}

struct RunningSlot {
    id: RequestId,
    cancel: CancellationToken,
    responder: Option<OverwriteResponder>,
}

#[derive(Default)]
struct QueueInner {
    items: Vec<QueueEntry>,
    paused: bool,
    running: Option<RunningSlot>,
}

impl QueueInner {
    fn entry_mut(&mut self, id: RequestId) -> Option<&mut QueueEntry> {
        self.items.iter_mut().find(|e| e.snapshot.id == id)
    }
}

/// Handle to the transfer queue. Clones share the same queue.
#[derive(Clone)]
pub struct TransferQueue {
    inner: Arc<Mutex<QueueInner>>,
    events: broadcast::Sender<QueueEvent>,
    runtime: Handle,
    config: TransferConfig,
}

impl TransferQueue {
    /// Create a queue whose workers run on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(config: TransferConfig) -> Self {
        Self::with_runtime(config, Handle::current())
    }

    /// Create a queue whose workers run on `runtime`.
    pub fn with_runtime(config: TransferConfig, runtime: Handle) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(Mutex::new(QueueInner::default())),
            events,
            runtime,
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: QueueEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Subscribe to queue events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Append a request, starting it at once when the queue is idle.
    ///
    /// Rename batches with invalid or duplicate names are rejected here.
    pub fn enqueue(&self, request: TransferRequest) -> Result<RequestId, TransferError> {
        if let TransferOperation::Rename { pairs } = &request.operation {
            validate_renames(pairs)?;
        }

        let id = RequestId::new();
        let snapshot = QueueItem {
            id,
            kind: request.kind(),
            status: QueueStatus::Waiting,
            progress_percent: 0,
            current_item: String::new(),
            message: String::new(),
            target_path: request.operation.target_path().map(String::from),
            source_count: request.operation.source_count(),
            source_label: request.source_label(),
            target_label: request.target_label(),
        };
        info!(%id, kind = %snapshot.kind, "request queued");

        self.lock().items.push(QueueEntry {
            snapshot,
            request: Some(request),
        });
        self.notify(QueueEvent::Updated);
        self.promote();
        Ok(id)
    }

    /// Stop promoting waiting requests. The running one continues.
    pub fn pause(&self) {
        self.lock().paused = true;
        debug!("queue paused");
        self.notify(QueueEvent::Updated);
    }

    pub fn resume(&self) {
        self.lock().paused = false;
        debug!("queue resumed");
        self.notify(QueueEvent::Updated);
        self.promote();
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// Remove a waiting or finished request. Running requests are refused.
    pub fn remove(&self, id: RequestId) -> bool {
        let removed = {
            let mut inner = self.lock();
            let position = inner.items.iter().position(|e| e.snapshot.id == id);
            match position {
                Some(idx) if inner.items[idx].snapshot.status != QueueStatus::Running => {
                    inner.items.remove(idx);
                    true
                }
                _ => false,
            }
        };
        if removed {
            self.notify(QueueEvent::Updated);
        }
        removed
    }

    /// Cancel a request.
    ///
    /// A running batch stops before its next item and ends as cancelled. A
    /// waiting one is marked finished without running.
    pub fn cancel(&self, id: RequestId) -> bool {
        let mut inner = self.lock();

        if let Some(slot) = inner.running.as_ref().filter(|s| s.id == id) {
            info!(%id, "cancelling running request");
            slot.cancel.cancel();
            return true;
        }

        let Some(entry) = inner.entry_mut(id) else {
            return false;
        };
        if entry.snapshot.status != QueueStatus::Waiting {
            return false;
        }
        entry.request = None;
        entry.snapshot.status = QueueStatus::Completed;
        entry.snapshot.message = CANCELLED_MESSAGE.to_string();
        drop(inner);

        info!(%id, "cancelled waiting request");
        self.notify(QueueEvent::Finished {
            id,
            success: true,
            message: CANCELLED_MESSAGE.to_string(),
        });
        self.notify(QueueEvent::Updated);
        true
    }

    /// Answer the pending overwrite query of the running request.
    pub fn resolve_conflict(&self, id: RequestId, decision: OverwriteDecision) -> bool {
        let responder = {
            let mut inner = self.lock();
            match inner.running.as_mut() {
                Some(slot) if slot.id == id => slot.responder.take(),
                _ => None,
            }
        };
        match responder {
            Some(responder) => {
                debug!(%id, ?decision, "conflict resolved");
                responder.respond(decision)
            }
            None => false,
        }
    }

    pub fn items(&self) -> Vec<QueueItem> {
        self.lock().items.iter().map(|e| e.snapshot.clone()).collect()
    }

    pub fn get(&self, id: RequestId) -> Option<QueueItem> {
        self.lock()
            .items
            .iter()
            .find(|e| e.snapshot.id == id)
            .map(|e| e.snapshot.clone())
    }

    /// Id of the running request, if any.
    pub fn running(&self) -> Option<RequestId> {
        self.lock().running.as_ref().map(|s| s.id)
    }

    /// Drop every finished request from the list.
    pub fn clear_finished(&self) {
        self.lock().items.retain(|e| !e.snapshot.status.is_terminal());
        self.notify(QueueEvent::Updated);
    }

    /// Start the oldest waiting request when nothing runs and the queue
    /// is not paused.
    fn promote(&self) {
        let (id, request, cancel) = {
            let mut inner = self.lock();
            if inner.paused || inner.running.is_some() {
                return;
            }
            let Some(entry) = inner
                .items
                .iter_mut()
                .find(|e| e.snapshot.status == QueueStatus::Waiting)
            else {
                return;
            };
            let Some(request) = entry.request.take() else {
                return;
            };
            entry.snapshot.status = QueueStatus::Running;
            let id = entry.snapshot.id;
            let cancel = CancellationToken::new();
            inner.running = Some(RunningSlot {
                id,
                cancel: cancel.clone(),
                responder: None,
            });
            (id, request, cancel)
        };

        info!(%id, "starting request");
        self.notify(QueueEvent::Updated);

        let queue = self.clone();
        let config = self.config.clone();
        self.runtime.spawn(async move {
            let events = start_transfer(request, config, cancel);
            queue.drive(id, events).await;
        });
    }

    /// Relay worker events until the batch completes.
    async fn drive(&self, id: RequestId, mut events: mpsc::Receiver<TransferEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                TransferEvent::Progress(progress) => {
                    if let Some(entry) = self.lock().entry_mut(id) {
                        entry.snapshot.progress_percent = progress.percent;
                        entry.snapshot.current_item = progress.current_item.clone();
                    }
                    self.notify(QueueEvent::Progress {
                        id,
                        percent: progress.percent,
                        current_item: progress.current_item,
                    });
                }
                TransferEvent::Conflict(ConflictQuery {
                    source,
                    target,
                    responder,
                }) => {
                    if let Some(slot) = self.lock().running.as_mut().filter(|s| s.id == id) {
                        slot.responder = Some(responder);
                    }
                    self.notify(QueueEvent::Conflict { id, source, target });
                }
                TransferEvent::Complete(outcome) => {
                    self.finish(id, outcome.success, outcome.message);
                    return;
                }
            }
        }

        self.finish(id, false, "Transfer worker stopped unexpectedly".to_string());
    }

    fn finish(&self, id: RequestId, success: bool, message: String) {
        {
            let mut inner = self.lock();
            if let Some(entry) = inner.entry_mut(id) {
                entry.snapshot.status = if success {
                    QueueStatus::Completed
                } else {
                    QueueStatus::Error
                };
                // A failed item keeps the percentage it reached.
                if success {
                    entry.snapshot.progress_percent = 100;
                }
                entry.snapshot.message = message.clone();
            }
            if inner.running.as_ref().is_some_and(|s| s.id == id) {
                inner.running = None;
            }
        }

        debug!(%id, success, "request finished");
        self.notify(QueueEvent::Finished {
            id,
            success,
            message,
        });
        self.notify(QueueEvent::Updated);
        self.promote();
    }
}

impl fmt::Debug for TransferQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("TransferQueue")
            .field("items", &inner.items.len())
            .field("paused", &inner.paused)
            .field("running", &inner.running.as_ref().map(|s| s.id))
            .finish()
    }
}
