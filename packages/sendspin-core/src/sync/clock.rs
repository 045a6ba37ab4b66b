//! NTP-style four-point clock exchange and server-to-local time conversion.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::protocol_constants::{
    CLOCK_LOST_AFTER_MS, CLOCK_QUALITY_DISCARD_US, CLOCK_QUALITY_GOOD_US,
};

/// Clock synchronization quality, derived from the most recent accepted RTT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncQuality {
    Good,
    Degraded,
    Lost,
}

/// Tracks the relationship between the server's loop-origin clock and this
/// player's local clock, established once via a 4-point exchange and
/// refreshed on every subsequent accepted round.
#[derive(Debug)]
pub struct ClockSync {
    rtt_micros: Option<i64>,
    /// Unix µs at which the server's loop-origin clock reads zero. Computed
    /// exactly once, on the first accepted round, and never recomputed: the
    /// server's loop start is a fixed moment in time.
    server_loop_start_unix: Option<i64>,
    last_update: Option<Instant>,
    synced: bool,
}

impl ClockSync {
    pub fn new() -> Self {
        Self {
            rtt_micros: None,
            server_loop_start_unix: None,
            last_update: None,
            synced: false,
        }
    }

    /// Feeds one round of the exchange:
    /// `t1` = client_transmitted (Unix µs), `t2` = server_received (server
    /// loop µs), `t3` = server_transmitted (server loop µs), `t4` =
    /// client_received (Unix µs).
    ///
    /// Returns `false` if the sample was discarded as a congestion spike.
    pub fn update(&mut self, t1: i64, t2: i64, t3: i64, t4: i64) -> bool {
        let rtt = (t4 - t1) - (t3 - t2);

        if rtt > CLOCK_QUALITY_DISCARD_US {
            log::warn!("[ClockSync] discarding sample: high RTT {rtt}us");
            return false;
        }

        self.rtt_micros = Some(rtt);

        if !self.synced {
            let now_unix = unix_micros_now();
            self.server_loop_start_unix = Some(now_unix - t2);
            self.synced = true;
            log::info!(
                "[ClockSync] established: rtt={rtt}us, server_loop_start_unix={}",
                self.server_loop_start_unix.unwrap()
            );
        }

        self.last_update = Some(Instant::now());
        true
    }

    pub fn rtt_micros(&self) -> Option<i64> {
        self.rtt_micros
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Converts a server loop-clock timestamp (µs) to a local `Instant`.
    /// Returns `None` before the first accepted round.
    pub fn server_to_local_instant(&self, server_micros: i64) -> Option<Instant> {
        let server_start = self.server_loop_start_unix?;
        let unix_micros = server_start + server_micros;
        let now_unix = unix_micros_now();
        let now_instant = Instant::now();
        let delta = unix_micros - now_unix;

        if delta >= 0 {
            Some(now_instant + Duration::from_micros(delta as u64))
        } else {
            now_instant.checked_sub(Duration::from_micros((-delta) as u64))
        }
    }

    pub fn quality(&self) -> SyncQuality {
        match self.rtt_micros {
            Some(rtt) if rtt < CLOCK_QUALITY_GOOD_US => SyncQuality::Good,
            Some(rtt) if rtt < CLOCK_QUALITY_DISCARD_US => SyncQuality::Degraded,
            _ => SyncQuality::Lost,
        }
    }

    /// Whether more than [`CLOCK_LOST_AFTER_MS`] has elapsed since the last
    /// accepted sample, per the `lost` classification in the wire protocol.
    pub fn is_stale(&self) -> bool {
        match self.last_update {
            Some(last) => last.elapsed() > Duration::from_millis(CLOCK_LOST_AFTER_MS),
            None => true,
        }
    }
}

impl Default for ClockSync {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_micros_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn establishes_sync_on_first_good_round() {
        let mut clock = ClockSync::new();
        let t1 = unix_micros_now();
        let t4 = t1 + 10_000;
        assert!(clock.update(t1, 0, 5_000, t4));
        assert!(clock.is_synced());
        assert_eq!(clock.quality(), SyncQuality::Good);
    }

    #[test]
    fn discards_high_rtt_sample_without_establishing_sync() {
        let mut clock = ClockSync::new();
        let t1 = unix_micros_now();
        let t4 = t1 + 200_000;
        assert!(!clock.update(t1, 0, 5_000, t4));
        assert!(!clock.is_synced());
    }

    #[test]
    fn server_loop_start_is_computed_once_and_held_fixed() {
        let mut clock = ClockSync::new();
        let t1 = unix_micros_now();
        clock.update(t1, 0, 5_000, t1 + 10_000);
        let first_start = clock.server_loop_start_unix;

        let t1b = unix_micros_now();
        clock.update(t1b, 1_000_000, 1_005_000, t1b + 10_000);
        assert_eq!(clock.server_loop_start_unix, first_start);
    }

    #[test]
    fn quality_transitions_with_rtt() {
        let mut clock = ClockSync::new();
        let t1 = unix_micros_now();
        clock.update(t1, 0, 80_000, t1 + 80_000);
        assert_eq!(clock.quality(), SyncQuality::Degraded);
    }

    #[test]
    fn unsynced_clock_cannot_convert_timestamps() {
        let clock = ClockSync::new();
        assert!(clock.server_to_local_instant(1_000_000).is_none());
    }
}
