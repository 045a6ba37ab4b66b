//! Wire protocol: JSON control messages, audio format description, and the
//! binary audio frame codec.

pub mod codec;
pub mod format;
pub mod messages;

pub use codec::{AudioChunk, FRAME_HEADER_LEN, MSG_TYPE_PLAYER_AUDIO};
pub use format::{AudioFormat, Codec, Sample};
pub use messages::Message;
