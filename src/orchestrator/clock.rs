use std::sync::{Arc, Mutex};
use std::time::Duration;

use time::{OffsetDateTime, PrimitiveDateTime};

/// Source of wall-clock time and waiting for the scheduler.
pub trait Clock {
    fn now(&self) -> PrimitiveDateTime;

    fn sleep(&self, duration: Duration);
}

/// Local time of the host; falls back to UTC when the offset is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> PrimitiveDateTime {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        PrimitiveDateTime::new(now.date(), now.time())
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Test clock; `sleep` advances time instantly.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<PrimitiveDateTime>>,
}

impl ManualClock {
    pub fn new(start: PrimitiveDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, value: PrimitiveDateTime) {
        *self.now.lock().unwrap_or_else(|err| err.into_inner()) = value;
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|err| err.into_inner());
        *now += duration;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> PrimitiveDateTime {
        *self.now.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::new(datetime!(2025-01-01 13:00:00));
        let shared = clock.clone();
        clock.sleep(Duration::from_secs(90));
        assert_eq!(shared.now(), datetime!(2025-01-01 13:01:30));
        shared.set(datetime!(2025-01-02 02:00:00));
        assert_eq!(clock.now(), datetime!(2025-01-02 02:00:00));
    }
}
