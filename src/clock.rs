//! Time source for record timestamps and expiry checks

use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

/// Supplies the current time.
///
/// Stores consult it for expiry decisions and the service uses it to stamp
/// `created_at`. It should not run backwards within one process.
pub trait Clock: Send + Sync {
    /// The current instant
    fn now(&self) -> SystemTime;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> SystemTime {
        (**self).now()
    }
}

/// A clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<SystemTime>>,
}

impl ManualClock {
    /// Start at `start`
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Move forward by `by`
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }

    /// Jump to `instant`
    pub fn set(&self, instant: SystemTime) {
        let mut now = self.now.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now = instant;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
