//! Transfer engine for ferryfile.
//!
//! This crate executes copy, move, delete, mkdir and rename requests against
//! any pair of providers. Each request runs on a worker task that reports
//! progress and overwrite queries through a channel, and a [`TransferQueue`]
//! runs requests one at a time in FIFO order.

mod create;
mod delete;
mod error;
pub mod local;
mod negotiation;
mod progress;
mod queue;
mod rename;
mod request;
mod transfer;
mod worker;

pub use error::{ErrorKind, TransferError};
pub use negotiation::{ConflictQuery, OverwriteDecision, OverwriteResponder};
pub use progress::{CANCELLED_MESSAGE, ItemOutcome, Tally, TransferOutcome, TransferProgress};
pub use queue::{QueueEvent, QueueItem, QueueStatus, RequestId, TransferQueue};
pub use rename::{validate_filename, validate_renames};
pub use request::{OperationKind, RenamePair, Source, TransferOperation, TransferRequest};
pub use worker::{TransferEvent, start_transfer};
