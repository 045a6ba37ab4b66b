//! Centralized error types for the sendspin streaming engine.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Categorizes errors by kind (transport, protocol, codec, timing, resource)

use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

/// Application-wide error type for the sendspin engine.
///
/// Variants are grouped by kind rather than by call site, matching the closed
/// taxonomy this protocol is specified against: a malformed client/hello and an
/// unknown binary msg_type are both `Protocol` errors even though they're raised
/// in different modules.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum Error {
    /// Connect/read/write failure on the underlying transport, or an unexpected
    /// peer close.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed JSON, a missing required field, out-of-order handshake, a
    /// duplicate client_id, or an unrecognized binary msg_type.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Encoder/decoder construction failed, or a chunk failed to decode.
    #[error("codec error: {0}")]
    Codec(String),

    /// Clock sync could not be established, or a sync sample fell outside the
    /// accepted RTT window.
    #[error("timing error: {0}")]
    Timing(String),

    /// A bounded queue is full, or a heap/buffer exceeded its configured cap.
    #[error("resource exhausted: {0}")]
    Resource(String),
}

impl Error {
    /// Returns a machine-readable error code for API responses and logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport_error",
            Self::Protocol(_) => "protocol_error",
            Self::Codec(_) => "codec_error",
            Self::Timing(_) => "timing_error",
            Self::Resource(_) => "resource_exhausted",
        }
    }

    /// Whether this error is fatal for the connection it occurred on, per
    /// the fatal/recoverable split in the error handling design.
    ///
    /// `Protocol` and `Resource` are recoverable by default (log and continue,
    /// or drop-and-continue); callers that hit a genuinely fatal protocol
    /// condition (duplicate client_id, handshake order violation) close the
    /// connection explicitly rather than relying on this classification.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl ErrorCode for Error {
    fn code(&self) -> &'static str {
        Error::code(self)
    }
}

/// Convenient Result alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
