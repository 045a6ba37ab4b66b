//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the sendspin wire protocol itself and changing
//! them would break compatibility with any other compliant server or player.

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Default TCP port the server listens on.
pub const DEFAULT_PORT: u16 = 8927;

/// WebSocket path the server exposes. Historically `/resonate`.
pub const WS_PATH: &str = "/sendspin";

// ─────────────────────────────────────────────────────────────────────────────
// Server streaming pipeline
// ─────────────────────────────────────────────────────────────────────────────

/// Server tick interval (ms). Every tick, the source is read once and the
/// resulting chunk is fanned out to every registered client.
pub const SERVER_TICK_MS: u64 = 20;

/// Lead time (µs) added to the server's current clock to compute a chunk's
/// `playback_ts`. The player must buffer at least this long before its
/// startup gate opens.
pub const LEAD_TIME_US: i64 = 500_000;

// ─────────────────────────────────────────────────────────────────────────────
// Player scheduling pipeline
// ─────────────────────────────────────────────────────────────────────────────

/// Player release-tick interval (ms). Drives the scheduler's decision to
/// hold, release, or drop the head of the jitter heap.
pub const PLAYER_TICK_MS: u64 = 10;

/// Jitter window (µs) around a chunk's `play_at_local`. Inside this window a
/// chunk is on-time; outside it, it's held (too early) or dropped (too late).
pub const JITTER_WINDOW_US: i64 = 50_000;

/// Number of chunks the scheduler's startup gate waits for before releasing
/// the first chunk. At 20 ms/chunk this is ~500 ms, matching the server's
/// lead time.
pub const STARTUP_BUFFER_TARGET: usize = 25;

// ─────────────────────────────────────────────────────────────────────────────
// Clock synchronization
// ─────────────────────────────────────────────────────────────────────────────

/// RTT (µs) below which a sync sample is classified `good`.
pub const CLOCK_QUALITY_GOOD_US: i64 = 50_000;

/// RTT (µs) above which a sync sample is discarded outright as a congestion
/// spike; between this and `CLOCK_QUALITY_GOOD_US` the sample is accepted but
/// classified `degraded`.
pub const CLOCK_QUALITY_DISCARD_US: i64 = 100_000;

/// Wall-clock duration (ms) with no accepted sync sample after which a
/// previously-synced client is considered `lost`.
pub const CLOCK_LOST_AFTER_MS: u64 = 5_000;

/// Number of rapid sync rounds performed on connect, before falling back to
/// the steady-state one-per-second cadence.
pub const CLOCK_SYNC_BURST_ROUNDS: u32 = 5;

/// Spacing (ms) between rounds during the initial sync burst.
pub const CLOCK_SYNC_BURST_INTERVAL_MS: u64 = 100;

/// Steady-state spacing (ms) between `client/time` requests once synced.
pub const CLOCK_SYNC_STEADY_INTERVAL_MS: u64 = 1_000;

// ─────────────────────────────────────────────────────────────────────────────
// Timeouts
// ─────────────────────────────────────────────────────────────────────────────

/// Handshake read timeout (s). Exceeding it is fatal for the connection.
pub const HANDSHAKE_TIMEOUT_SECS: u64 = 5;

/// Write timeout (s) for any frame on the transport. Exceeding it is fatal.
pub const WRITE_TIMEOUT_SECS: u64 = 10;

/// Response timeout (s) for a `client/time` → `server/time` round trip before
/// the client logs and retries on its next tick.
pub const CLOCK_SYNC_RESPONSE_TIMEOUT_SECS: u64 = 2;

/// Backpressure budget (ms) for non-audio outbound messages before they're
/// dropped. Audio frames never wait: a full queue drops the new frame
/// immediately (see `server/pipeline.rs`).
pub const CONTROL_BACKPRESSURE_BUDGET_MS: u64 = 100;

// ─────────────────────────────────────────────────────────────────────────────
// Queue capacities
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of a client's outbound audio queue. Sized to roughly one second
/// of 20 ms chunks; a slow client drops frames rather than stalling the tick.
pub const CLIENT_OUTBOUND_QUEUE_CAPACITY: usize = 50;
