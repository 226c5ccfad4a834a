use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of acceptance timestamps for client-originated values.
///
/// Readings are nanoseconds since the Unix epoch, saturated to `i64::MAX`,
/// and strictly increasing per clock: a reading never repeats even if the
/// wall clock stalls or steps backwards.
///
/// Uniqueness is per node only. Two nodes accepting values in the same
/// nanosecond produce equal timestamps, and each store keeps whichever of
/// the two reaches it first.
#[derive(Debug, Default)]
pub struct Clock {
    last: AtomicI64,
}

impl Clock {
    pub fn new() -> Self {
        Clock::default()
    }

    pub fn now(&self) -> i64 {
        let wall = wall_nanos();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let next = wall.max(last.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }
}

fn wall_nanos() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX),
        Err(_) => 0,
    }
}
