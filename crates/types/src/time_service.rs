use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock seconds used for commit timestamps and challenge expiry.
pub trait TimeSource: Send + Sync {
    fn now_secs(&self) -> u64;
}

/// Reads the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }
}

/// Manually driven clock for tests and replay.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    now: Arc<Mutex<u64>>,
}

impl ManualTimeSource {
    pub fn new(start: u64) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, secs: u64) {
        *self.now.lock() = secs;
    }

    pub fn advance(&self, secs: u64) {
        let mut now = self.now.lock();
        *now = now.saturating_add(secs);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_secs(&self) -> u64 {
        *self.now.lock()
    }
}
