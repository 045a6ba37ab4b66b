//! sendspin-core - shared engine for the sendspin multi-room synchronized
//! audio streaming protocol.
//!
//! This crate provides the core functionality shared between a sendspin
//! server and a sendspin player embedded in a host application. It owns the
//! wire protocol, clock synchronization, the server's tick-driven streaming
//! pipeline, and the player's jitter-buffer scheduler. It does not own audio
//! decoding/encoding, device I/O, or UI concerns - those are external
//! collaborators behind the traits in [`server::pipeline`] and [`player::io`].
//!
//! # Architecture
//!
//! - [`protocol`]: wire message schemas, audio format description, and the
//!   binary audio frame codec.
//! - [`sync`]: NTP-style clock synchronization between server and player.
//! - [`server`]: client registry, codec negotiation, encoders, and the
//!   streaming tick loop.
//! - [`player`]: jitter-buffer scheduling, device/decoder boundaries, and
//!   the protocol session loop.
//! - [`callbacks`]: `OnError`/`OnStateChange`/`OnMetadata` notifications for
//!   a host application embedding the player.
//! - [`bootstrap`]: server-side composition root.
//! - [`error`]: centralized error types.
//!
//! # Abstraction traits
//!
//! - [`server::AudioSource`]: the source of interleaved PCM samples the
//!   streaming pipeline reads from.
//! - [`player::Output`]: the host audio output device.
//! - [`player::Decoder`] / `server::Encoder`: codec boundary, pure PCM
//!   implementations included; Opus/FLAC require an external plugin.
//! - [`callbacks::PlayerCallbacks`]: player event notifications.

#![warn(clippy::all)]

pub mod bootstrap;
pub mod callbacks;
pub mod error;
pub mod lifecycle;
pub mod player;
pub mod protocol;
pub mod protocol_constants;
pub mod server;
pub mod sync;
pub mod utils;

pub use bootstrap::{bootstrap_services, BootstrappedServices};
pub use callbacks::{CallbackBridge, PlayerCallbacks, PlayerEvent, SessionState};
pub use error::{Error, ErrorCode, Result};
pub use lifecycle::{Lifecycle, NoopLifecycle, ServerLifecycle};
pub use player::{Output, PlayerSession, SchedulerQueue};
pub use protocol::{AudioChunk, AudioFormat, Codec, Message, Sample};
pub use server::{ClientRegistry, Encoder, StreamingPipeline};
pub use sync::{ClockSync, SyncQuality};
