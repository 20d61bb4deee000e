//! Clock abstractions used by the dispatch engine's advisory-delay gate and
//! back-off state machine.
//!
//! Two distinct notions of time are needed (see spec §9 "Design Notes"):
//! monotonic milliseconds for advisory-delay arithmetic (immune to wall-clock
//! adjustments), and wall-clock UTC for the daily quota back-off boundary,
//! which is defined in terms of a UTC midnight.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::fmt;
use std::time::Instant;

/// Monotonic clock abstraction so advisory-delay timing can be faked in tests.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_millis(&self) -> u64;
}

/// Monotonic clock backed by `Instant::now()`.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self { start: Instant::now() }
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Wall-clock abstraction so the back-off boundary can be faked in tests.
///
/// Must be UTC (not merely monotonic) because the 402 back-off boundary is
/// defined as "the next UTC midnight", a wall-clock concept.
pub trait WallClock: Send + Sync + fmt::Debug {
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Wall clock backed by `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemWallClock;

impl WallClock for SystemWallClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The instant of the next UTC midnight strictly after `now`.
pub fn next_midnight_utc(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = (now + ChronoDuration::days(1)).date_naive();
    Utc.from_utc_datetime(&tomorrow.and_hms_opt(0, 0, 0).expect("midnight is a valid time"))
}

/// Deterministic clock for tests: both monotonic millis and wall-clock UTC
/// are set explicitly and never advance on their own.
#[derive(Debug, Clone)]
pub struct FakeClock {
    inner: std::sync::Arc<std::sync::Mutex<FakeClockState>>,
}

#[derive(Debug)]
struct FakeClockState {
    millis: u64,
    utc: DateTime<Utc>,
}

impl FakeClock {
    pub fn new(utc: DateTime<Utc>) -> Self {
        Self { inner: std::sync::Arc::new(std::sync::Mutex::new(FakeClockState { millis: 0, utc })) }
    }

    pub fn advance_millis(&self, delta: u64) {
        let mut state = self.inner.lock().unwrap();
        state.millis += delta;
        state.utc += ChronoDuration::milliseconds(delta as i64);
    }

    pub fn set_utc(&self, utc: DateTime<Utc>) {
        self.inner.lock().unwrap().utc = utc;
    }
}

impl Clock for FakeClock {
    fn now_millis(&self) -> u64 {
        self.inner.lock().unwrap().millis
    }
}

impl WallClock for FakeClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.inner.lock().unwrap().utc
    }
}
