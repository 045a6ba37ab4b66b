//! Player-side engine: jitter-buffer scheduling, device/decoder boundaries,
//! and the protocol session loop.

pub mod io;
pub mod scheduler;
pub mod session;

pub use io::{apply_gain, Decoder, Output, PcmDecoder};
pub use scheduler::{ReleaseDecision, ScheduledChunk, SchedulerQueue};
pub use session::PlayerSession;
