//! Process-wide monotonic millisecond timestamps.
//!
//! Wall time can step backwards (NTP); message ordering must not. Every
//! timestamp handed out is strictly greater than the previous one.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

static LAST: AtomicI64 = AtomicI64::new(0);

/// Returns the next timestamp, in milliseconds since the Unix epoch.
pub fn next_timestamp() -> i64 {
    let now = Utc::now().timestamp_millis();
    let mut prev = LAST.load(Ordering::Relaxed);
    loop {
        let next = if now > prev { now } else { prev + 1 };
        match LAST.compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_strictly_increasing() {
        let mut last = 0;
        for _ in 0..1000 {
            let ts = next_timestamp();
            assert!(ts > last, "expected {ts} > {last}");
            last = ts;
        }
    }

    #[test]
    fn timestamps_are_increasing_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| (0..200).map(|_| next_timestamp()).collect::<Vec<_>>()))
            .collect();

        let mut all: Vec<i64> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();
        let total = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), total, "timestamps must be unique");
    }
}
