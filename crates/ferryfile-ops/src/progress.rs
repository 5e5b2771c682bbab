//! Progress and completion reports for a transfer batch.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, TransferError};
use crate::request::OperationKind;

/// Terminal message of a batch the user cancelled.
pub const CANCELLED_MESSAGE: &str = "Operation cancelled by user.";

/// Progress of a running batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    pub kind: OperationKind,
    /// 0 to 100, never decreasing within a batch.
    pub percent: u8,
    pub current_item: String,
    pub items_done: usize,
    pub items_total: usize,
}

/// How a batch ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub kind: OperationKind,
    /// False only for errors; a cancelled batch still succeeds.
    pub success: bool,
    pub cancelled: bool,
    pub message: String,
    pub error_kind: Option<ErrorKind>,
    pub succeeded: usize,
    pub skipped: usize,
}

impl TransferOutcome {
    pub fn completed(kind: OperationKind, message: impl Into<String>, tally: &Tally) -> Self {
        Self {
            kind,
            success: true,
            cancelled: false,
            message: message.into(),
            error_kind: None,
            succeeded: tally.succeeded,
            skipped: tally.skipped,
        }
    }

    pub fn cancelled(kind: OperationKind, tally: &Tally) -> Self {
        Self {
            cancelled: true,
            ..Self::completed(kind, CANCELLED_MESSAGE, tally)
        }
    }

    pub fn failed(kind: OperationKind, error: &TransferError, tally: &Tally) -> Self {
        Self {
            kind,
            success: false,
            cancelled: false,
            message: error.to_string(),
            error_kind: Some(error.kind()),
            succeeded: tally.succeeded,
            skipped: tally.skipped,
        }
    }
}

/// What happened to one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Done,
    Skipped,
    /// The user chose Cancel; the batch stops here.
    Cancelled,
}

/// Per-batch counters and percentage bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct Tally {
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub skipped: usize,
}

impl Tally {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Done => self.succeeded += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Cancelled => return,
        }
        self.processed += 1;
    }

    /// `round(processed / total * 100)`, reported after each item.
    pub fn rounded_percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.processed as f64 / self.total as f64) * 100.0).round() as u8
    }

    /// `floor(index / total * 100)`, reported before each rename.
    pub fn floor_percent(index: usize, total: usize) -> u8 {
        if total == 0 {
            return 0;
        }
        (index * 100 / total) as u8
    }

    /// A summary such as `Copied 3 items` or `Moved 2 items, skipped 1`.
    pub fn summary(&self, kind: OperationKind) -> String {
        let action = match kind {
            OperationKind::Copy => "Copied",
            OperationKind::Move => "Moved",
            OperationKind::Delete => "Deleted",
            OperationKind::Mkdir => "Created",
            OperationKind::Rename => "Renamed",
        };
        let noun = if self.succeeded == 1 { "item" } else { "items" };

        if self.skipped == 0 {
            format!("{} {} {}", action, self.succeeded, noun)
        } else {
            format!("{} {} {}, skipped {}", action, self.succeeded, noun, self.skipped)
        }
    }
}
