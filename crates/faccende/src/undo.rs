//! Optimistic mark-done with an undo window.
//!
//! The UI flips immediately; the actual write-back runs only after the
//! window elapses, unless the user cancels first. One cancellable timer,
//! one pending action at a time: scheduling a new one force-commits the
//! previous one.

use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

/// Default undo window.
pub const UNDO_WINDOW_MS: u64 = 4000;

/// Terminal state of a pending action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoOutcome {
    Committed,
    Cancelled,
}

enum Signal {
    Commit,
    Cancel,
}

struct Active {
    tx: mpsc::Sender<Signal>,
    handle: JoinHandle<UndoOutcome>,
}

/// Holds at most one pending action: Pending -> Committed | Cancelled.
#[derive(Default)]
pub struct UndoSlot {
    active: Mutex<Option<Active>>,
}

impl UndoSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an undo window. After `delay`, `commit` runs; if the window
    /// is cancelled first, `revert` runs instead. A previously pending
    /// action is force-committed before the new window opens.
    pub async fn schedule<C, FC, R, FR>(&self, delay: Duration, commit: C, revert: R)
    where
        C: FnOnce() -> FC + Send + 'static,
        FC: Future<Output = ()> + Send + 'static,
        R: FnOnce() -> FR + Send + 'static,
        FR: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.active.lock().await;

        if let Some(prev) = slot.take() {
            let _ = prev.tx.send(Signal::Commit).await;
            let _ = prev.handle.await;
            debug!("Force-committed previous pending action");
        }

        let (tx, mut rx) = mpsc::channel(1);
        let handle = tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = tokio::time::sleep(delay) => UndoOutcome::Committed,
                sig = rx.recv() => match sig {
                    Some(Signal::Cancel) => UndoOutcome::Cancelled,
                    // Commit signal or a dropped sender both commit
                    _ => UndoOutcome::Committed,
                },
            };
            match outcome {
                UndoOutcome::Committed => commit().await,
                UndoOutcome::Cancelled => revert().await,
            }
            outcome
        });

        *slot = Some(Active { tx, handle });
    }

    /// Cancel the pending action. Returns true when something was
    /// actually cancelled; false when nothing was pending or the window
    /// had already elapsed.
    pub async fn undo(&self) -> bool {
        let mut slot = self.active.lock().await;
        let Some(active) = slot.take() else {
            return false;
        };

        // A closed channel means the timer already fired
        let delivered = active.tx.send(Signal::Cancel).await.is_ok();
        let outcome = active.handle.await.unwrap_or(UndoOutcome::Committed);
        delivered && outcome == UndoOutcome::Cancelled
    }

    /// Commit the pending action right now instead of waiting out the
    /// window. Returns true when an action was committed.
    pub async fn flush(&self) -> bool {
        let mut slot = self.active.lock().await;
        let Some(active) = slot.take() else {
            return false;
        };

        let _ = active.tx.send(Signal::Commit).await;
        let outcome = active.handle.await.unwrap_or(UndoOutcome::Committed);
        outcome == UndoOutcome::Committed
    }

    /// True while an undo window is open.
    pub async fn is_pending(&self) -> bool {
        let slot = self.active.lock().await;
        matches!(&*slot, Some(active) if !active.handle.is_finished())
    }
}
