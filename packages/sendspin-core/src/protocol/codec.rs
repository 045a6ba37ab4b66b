//! Binary audio frame encoding: `[msg_type:1][timestamp:u64 BE][payload:N]`.

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};

/// Frame header length in bytes: 1-byte msg_type + 8-byte big-endian timestamp.
pub const FRAME_HEADER_LEN: usize = 9;

/// Binary msg_type reserved for player-role audio frames. The range 4..7 is
/// reserved for other binary client roles (artwork, visualizer) not carried
/// by this server.
pub const MSG_TYPE_PLAYER_AUDIO: u8 = 4;

/// A decoded binary audio frame: a server-reference render timestamp (µs)
/// and its codec-dependent payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub playback_ts_us: u64,
    pub payload: Bytes,
}

impl AudioChunk {
    pub fn new(playback_ts_us: u64, payload: Bytes) -> Self {
        Self {
            playback_ts_us,
            payload,
        }
    }

    /// Serializes this chunk as a `msg_type = 4` binary frame.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&[MSG_TYPE_PLAYER_AUDIO]);
        buf.extend_from_slice(&self.playback_ts_us.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// Parses a binary frame. Frames shorter than [`FRAME_HEADER_LEN`] are
    /// invalid per the wire protocol and must be discarded by the caller with
    /// a log record rather than treated as a fatal connection error.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < FRAME_HEADER_LEN {
            return Err(Error::Protocol(format!(
                "binary frame too short: {} bytes, need at least {FRAME_HEADER_LEN}",
                frame.len()
            )));
        }
        let msg_type = frame[0];
        if msg_type != MSG_TYPE_PLAYER_AUDIO {
            return Err(Error::Protocol(format!(
                "unknown binary msg_type {msg_type}"
            )));
        }
        let mut ts_bytes = [0u8; 8];
        ts_bytes.copy_from_slice(&frame[1..9]);
        let playback_ts_us = u64::from_be_bytes(ts_bytes);
        let payload = Bytes::copy_from_slice(&frame[9..]);
        Ok(Self {
            playback_ts_us,
            payload,
        })
    }
}
