use std::time::{SystemTime, UNIX_EPOCH};

/// Time source for expiry bookkeeping. Injected so tests can advance time
/// without sleeping.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current wall-clock time in epoch milliseconds.
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis()
            .try_into()
            .unwrap_or(i64::MAX)
    }
}
