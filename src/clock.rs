//! Clock abstraction so stores can be tested against a simulated clock.

use chrono::{Datelike, Local, Timelike, Utc};
use std::sync::Arc;

/// Source of "now" for expiry math and time-restriction rules.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;

    /// Current local hour of day, 0-23.
    fn local_hour(&self) -> u32 {
        Local::now().hour()
    }

    /// Current local weekday, 0 = Sunday .. 6 = Saturday.
    fn local_weekday(&self) -> u32 {
        Local::now().weekday().num_days_from_sunday()
    }
}

/// Wall-clock implementation used outside of tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        Utc::now().timestamp_millis().max(0) as u64
    }
}

pub type SharedClock = Arc<dyn Clock>;

pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}
