//! Server-side engine: client registry, codec negotiation, encoders, and the
//! tick-driven streaming pipeline.

pub mod codec_impl;
pub mod negotiation;
pub mod pipeline;
pub mod registry;

pub use codec_impl::{build_encoder, Encoder, PcmEncoder};
pub use negotiation::negotiate;
pub use pipeline::{AudioSource, LoopClock, MonotonicClock, StreamingPipeline};
pub use registry::{ClientEntry, ClientGuard, ClientRegistry};
