//! Monotonic clock and sleep primitives.
//!
//! Strands are the only time-aware part of the runtime and they reach the
//! host clock exclusively through this module, which keeps the external
//! surface of the library to two functions: a monotonic `now` and a
//! blocking `sleep_until`.

use std::time::Instant;

/// Returns the current instant on the monotonic clock.
#[must_use]
pub fn now() -> Instant {
    Instant::now()
}

/// Blocks the calling thread until `deadline` has passed.
///
/// Returns immediately if the deadline is already in the past.
pub fn sleep_until(deadline: Instant) {
    let start = now();
    if let Some(wait) = deadline.checked_duration_since(start) {
        std::thread::sleep(wait);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn now_is_monotonic() {
        let a = now();
        let b = now();
        assert!(b >= a);
    }

    #[test]
    fn sleep_until_past_deadline_returns() {
        let past = now() - Duration::from_millis(50);
        let before = now();
        sleep_until(past);
        assert!(now() - before < Duration::from_millis(50));
    }

    #[test]
    fn sleep_until_waits() {
        let deadline = now() + Duration::from_millis(20);
        sleep_until(deadline);
        assert!(now() >= deadline);
    }
}
