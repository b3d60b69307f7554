use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Idle,
    WritingScript,
    Synthesizing,
    Assembling,
    Saving,
    Completed,
    Cancelled,
    Failed,
}

impl GenerationStatus {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::WritingScript | Self::Synthesizing | Self::Assembling | Self::Saving
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// Snapshot of the running job, replaced wholesale on every update so a
/// reader never observes a half-written transition.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationState {
    pub status: GenerationStatus,
    pub progress: u8,
    pub message: String,
    pub cancel_requested: bool,
}

impl Default for GenerationState {
    fn default() -> Self {
        Self {
            status: GenerationStatus::Idle,
            progress: 0,
            message: String::new(),
            cancel_requested: false,
        }
    }
}

/// Publisher side of the job state. Cheap to clone; all clones share the
/// same watch channel and cancellation slot.
#[derive(Clone)]
pub struct StateHandle {
    inner: Arc<StateInner>,
}

struct StateInner {
    tx: watch::Sender<GenerationState>,
    cancel: Mutex<CancellationToken>,
}

impl StateHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(GenerationState::default());
        Self {
            inner: Arc::new(StateInner {
                tx,
                cancel: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<GenerationState> {
        self.inner.tx.subscribe()
    }

    pub fn snapshot(&self) -> GenerationState {
        self.inner.tx.borrow().clone()
    }

    /// Issues a fresh cancellation token for a new job. The previous token
    /// (if any) is left behind so a stale cancel cannot leak into this job.
    pub fn begin_job(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.inner.cancel.lock() = token.clone();
        token
    }

    pub fn request_cancel(&self) {
        self.inner.cancel.lock().cancel();
        let mut next = self.snapshot();
        next.cancel_requested = true;
        self.inner.tx.send_replace(next);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.inner.cancel.lock().is_cancelled()
    }

    /// Full-state replacement. Progress is clamped to be non-decreasing
    /// while a job is running; a publish that leaves the active set (a new
    /// job start or the idle reset) takes its value verbatim.
    pub fn publish(&self, status: GenerationStatus, progress: u8, message: impl Into<String>) {
        let prev = self.inner.tx.borrow().clone();
        let progress = if prev.status.is_active() && status != GenerationStatus::Idle {
            progress.max(prev.progress)
        } else {
            progress
        };
        self.inner.tx.send_replace(GenerationState {
            status,
            progress,
            message: message.into(),
            cancel_requested: self.is_cancel_requested(),
        });
    }

    /// Clears a finished job back to idle, but only while `expected` is
    /// still the published status. A newer job that already replaced the
    /// state wins.
    pub fn reset_if(&self, expected: GenerationStatus) {
        let current = self.inner.tx.borrow().status;
        if current == expected {
            self.inner.tx.send_replace(GenerationState::default());
        }
    }
}

impl Default for StateHandle {
    fn default() -> Self {
        Self::new()
    }
}
