//! Clock synchronization between the server's loop-origin clock and a
//! player's local clock.

pub mod clock;

pub use clock::{ClockSync, SyncQuality};
