//! JSON control message envelope and payload types.
//!
//! Every text frame on the wire is `{ "type": <string>, "payload": <object> }`.
//! [`Message`] is the tagged enum covering every recognized `type`; unrecognized
//! payload fields are ignored by `serde` rather than rejected, per the framing
//! rules each message type is decoded under.

use serde::{Deserialize, Serialize};

/// Top-level protocol message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Message {
    /// Client hello handshake message. Must be the first message on a connection.
    #[serde(rename = "client/hello")]
    ClientHello(ClientHello),

    /// Server hello handshake response. Sent exactly once per accepted connection.
    #[serde(rename = "server/hello")]
    ServerHello(ServerHello),

    /// Server rejection of a handshake (e.g. duplicate client_id).
    #[serde(rename = "server/error")]
    ServerError(ServerError),

    /// Client time synchronization request.
    #[serde(rename = "client/time")]
    ClientTime(ClientTime),

    /// Server time synchronization response.
    #[serde(rename = "server/time")]
    ServerTime(ServerTime),

    /// Client state update (player sync state, volume, mute).
    #[serde(rename = "client/state")]
    ClientState(ClientState),

    /// Server state update (track metadata, controller info).
    #[serde(rename = "server/state")]
    ServerState(ServerState),

    /// Server command to client (volume, mute).
    #[serde(rename = "server/command")]
    ServerCommand(ServerCommand),

    /// Stream start notification; carries the negotiated audio format.
    #[serde(rename = "stream/start")]
    StreamStart(StreamStart),

    /// Stream end notification.
    #[serde(rename = "stream/end")]
    StreamEnd(StreamEnd),

    /// Stream clear notification (empty the jitter buffer, re-arm startup).
    #[serde(rename = "stream/clear")]
    StreamClear(StreamClear),

    /// Group membership/playback-state update.
    #[serde(rename = "group/update")]
    GroupUpdate(GroupUpdate),

    /// Graceful disconnect notice from either side.
    #[serde(rename = "client/goodbye")]
    ClientGoodbye(ClientGoodbye),
}

// =============================================================================
// Handshake
// =============================================================================

/// Client hello message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientHello {
    /// Unique client identifier.
    pub client_id: String,
    /// Human-readable client name.
    pub name: String,
    /// Protocol version number.
    pub version: u32,
    /// List of supported roles with versions (e.g. "player@v1").
    pub supported_roles: Vec<String>,
    /// Device information (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInfo>,
    /// Player capabilities, present iff `player@v1` is in `supported_roles`.
    #[serde(rename = "player@v1_support", skip_serializing_if = "Option::is_none")]
    pub player_v1_support: Option<PlayerV1Support>,
}

/// Device information (all fields optional per the wire schema).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeviceInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_version: Option<String>,
}

/// `player@v1` capability advertisement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerV1Support {
    /// Audio formats the client accepts, in preference order.
    pub supported_formats: Vec<AudioFormatSpec>,
    /// Buffer capacity the client can hold, in chunks.
    pub buffer_capacity: u32,
    /// Playback commands the client accepts (e.g. "volume", "mute").
    pub supported_commands: Vec<String>,
}

/// Wire representation of an audio format, as advertised or negotiated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioFormatSpec {
    pub codec: String,
    pub channels: u8,
    pub sample_rate: u32,
    pub bit_depth: u8,
}

/// Server hello message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerHello {
    pub server_id: String,
    pub name: String,
    pub version: u32,
    /// Roles the server will drive for this client (at most one version
    /// per role family — the first the client supports).
    pub active_roles: Vec<String>,
    pub connection_reason: ConnectionReason,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionReason {
    Discovery,
    Playback,
}

/// Server rejection of a handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    pub error: String,
    pub message: String,
}

impl ServerError {
    /// Constructs the canonical duplicate-client-id rejection.
    pub fn duplicate_client_id(client_id: &str) -> Self {
        Self {
            error: "duplicate_client_id".to_string(),
            message: format!("client_id '{client_id}' is already connected"),
        }
    }
}

// =============================================================================
// Clock synchronization
// =============================================================================

/// Client time sync request. `client_transmitted` is t1, Unix µs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClientTime {
    pub client_transmitted: i64,
}

/// Server time sync response. `server_received`/`server_transmitted` (t2/t3)
/// are expressed in the server's loop-origin clock, not Unix time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ServerTime {
    pub client_transmitted: i64,
    pub server_received: i64,
    pub server_transmitted: i64,
}

// =============================================================================
// State
// =============================================================================

/// Client state update (wraps role-specific state).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<PlayerState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerState {
    pub state: PlayerSyncState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlayerSyncState {
    Synchronized,
    Error,
}

/// Server state update (track metadata, controller info).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<ControllerState>,
}

/// Playback-control surface advertised by the server: what commands a
/// controller can issue, and the current volume/mute state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerState {
    pub supported_commands: Vec<String>,
    pub volume: u8,
    pub muted: bool,
}

/// Metadata state from the server, forwarded to the player via `OnMetadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataState {
    /// Server loop-clock timestamp for progress calculation (µs).
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artwork_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<TrackProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat: Option<RepeatMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shuffle: Option<bool>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrackProgress {
    pub track_progress: i64,
    pub track_duration: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback_speed: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    Off,
    One,
    All,
}

// =============================================================================
// Commands
// =============================================================================

/// Server command message (wraps role-specific commands).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<PlayerCommand>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerCommand {
    /// "volume" or "mute".
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mute: Option<bool>,
}

// =============================================================================
// Stream control
// =============================================================================

/// Stream start message.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StreamStart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<StreamPlayerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamPlayerConfig {
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u8,
    pub bit_depth: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec_header: Option<String>,
}

/// Stream end message.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StreamEnd {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

/// Stream clear message (empty buffers, re-arm startup buffering).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StreamClear {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

// =============================================================================
// Group
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GroupUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback_state: Option<PlaybackState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

// =============================================================================
// Connection lifecycle
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientGoodbye {
    pub reason: GoodbyeReason,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GoodbyeReason {
    AnotherServer,
    Shutdown,
    Restart,
    UserRequest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_hello_round_trips_through_json() {
        let msg = Message::ClientHello(ClientHello {
            client_id: "abc123".to_string(),
            name: "Kitchen".to_string(),
            version: 1,
            supported_roles: vec!["player@v1".to_string()],
            device_info: None,
            player_v1_support: Some(PlayerV1Support {
                supported_formats: vec![AudioFormatSpec {
                    codec: "pcm".to_string(),
                    channels: 2,
                    sample_rate: 48000,
                    bit_depth: 24,
                }],
                buffer_capacity: 100,
                supported_commands: vec!["volume".to_string(), "mute".to_string()],
            }),
        });

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"client/hello\""));
        assert!(json.contains("player@v1_support"));

        let round_tripped: Message = serde_json::from_str(&json).unwrap();
        match round_tripped {
            Message::ClientHello(hello) => assert_eq!(hello.client_id, "abc123"),
            other => panic!("expected ClientHello, got {other:?}"),
        }
    }

    #[test]
    fn unknown_fields_are_ignored_on_decode() {
        let json = r#"{"type":"client/time","payload":{"client_transmitted":1000,"bogus_field":"x"}}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        match msg {
            Message::ClientTime(t) => assert_eq!(t.client_transmitted, 1000),
            other => panic!("expected ClientTime, got {other:?}"),
        }
    }

    #[test]
    fn server_error_message_has_duplicate_client_id_code() {
        let msg = Message::ServerError(ServerError::duplicate_client_id("X"));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("duplicate_client_id"));
    }

    #[test]
    fn missing_required_field_fails_to_parse() {
        let json = r#"{"type":"client/hello","payload":{"name":"no id"}}"#;
        let result: Result<Message, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
