//! General utilities shared across the engine.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in microseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

/// Returns the current Unix timestamp in milliseconds.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_micros_is_positive_and_monotonic_enough() {
        let a = now_micros();
        let b = now_micros();
        assert!(a > 0);
        assert!(b >= a);
    }
}
