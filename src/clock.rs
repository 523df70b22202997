/*
 * Clock Seam
 *
 * Aging is the only time-dependent behaviour in the core (§4.6). Reading
 * wall-clock time directly from inside the arbiter would make every test
 * that exercises aging racy against real time, so the clock is injected.
 */

use std::time::{SystemTime, UNIX_EPOCH};

/// A source of monotonic seconds.
pub trait Clock {
    fn now(&self) -> u64;
}

/// Production clock: wall-clock seconds since the Unix epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Deterministic clock for tests: holds a value that the test advances
/// explicitly between ticks. Cloning shares the same underlying cell, so a
/// test can keep a handle to advance time after handing the clock to an
/// arbiter.
#[derive(Debug, Default, Clone)]
pub struct FakeClock {
    now: std::rc::Rc<std::cell::Cell<u64>>,
}

impl FakeClock {
    pub fn new(start: u64) -> Self {
        FakeClock {
            now: std::rc::Rc::new(std::cell::Cell::new(start)),
        }
    }

    pub fn set(&self, t: u64) {
        self.now.set(t);
    }

    pub fn advance(&self, delta: u64) {
        self.now.set(self.now.get() + delta);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> u64 {
        self.now.get()
    }
}
