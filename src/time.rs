//! `TimeSource` (§6): the monotonic clock this runtime consumes for
//! deadlines. Kept as a trait so tests can inject a controllable clock
//! instead of wall time.

use std::time::Instant;

pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
