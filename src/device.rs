use log::{debug, info};

/// Device resource held for the duration of a job so the host does not
/// sleep mid-synthesis. Best-effort by construction.
pub trait WakeLock: Send + Sync {
    fn acquire(&self);
    fn release(&self);
}

pub struct NoopWakeLock;

impl WakeLock for NoopWakeLock {
    fn acquire(&self) {
        debug!("wake lock acquired");
    }

    fn release(&self) {
        debug!("wake lock released");
    }
}

/// User-facing progress surface (system notification in the original
/// deployment). Failures are ignored by design, hence no Results.
pub trait ProgressNotifier: Send + Sync {
    fn notify(&self, message: &str, percent: u8);
    fn hide(&self);
}

pub struct LogNotifier;

impl ProgressNotifier for LogNotifier {
    fn notify(&self, message: &str, percent: u8) {
        info!("[{:>3}%] {}", percent, message);
    }

    fn hide(&self) {
        debug!("progress notification dismissed");
    }
}
