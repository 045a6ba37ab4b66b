//! Player callback system: [`OnError`]/[`OnStateChange`]/[`OnMetadata`]
//! notifications for the host application embedding the player.
//!
//! The actual transport (an embedding app's UI layer, a CLI status line, a
//! test harness) is decoupled from the player's session loop via the
//! [`PlayerCallbacks`] trait and the [`CallbackBridge`] broadcast adapter.

mod bridge;
mod emitter;

pub use bridge::CallbackBridge;
pub use emitter::{LoggingPlayerCallbacks, NoopPlayerCallbacks, PlayerCallbacks};

use serde::Serialize;

use crate::error::Error;
use crate::protocol::messages::MetadataState;

/// Player session lifecycle state, reported via `OnStateChange`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Connecting,
    Handshaking,
    Buffering,
    Playing,
    Lost,
    Closed,
}

/// Events broadcast to anything watching a player session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PlayerEvent {
    Error { message: String, code: &'static str },
    StateChange { state: SessionState },
    Metadata { metadata: MetadataState },
}

impl PlayerEvent {
    pub fn error(err: &Error) -> Self {
        Self::Error {
            message: err.to_string(),
            code: err.code(),
        }
    }
}
