//! Treemesh error types

use thiserror::Error;

/// Wire-level protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Buffer too small
    #[error("buffer too small: need {needed} bytes, got {got}")]
    BufferTooSmall {
        /// Needed size
        needed: usize,
        /// Actual size
        got: usize,
    },

    /// Frame carries a protocol version this crate does not speak
    #[error("unsupported protocol version: {version}")]
    UnsupportedVersion {
        /// Version byte found
        version: u8,
    },

    /// Invalid message type
    #[error("invalid message type code: {type_code}")]
    InvalidMessageType {
        /// Type code taken from bits 2-7 of byte 2
        type_code: u8,
    },

    /// Invalid registration sub-type
    #[error("invalid registration type: {value}")]
    InvalidRegistrationType {
        /// Registration type byte
        value: u8,
    },

    /// Content cannot be split into at most 255 fragments
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Payload size
        size: usize,
        /// Maximum allowed
        max: usize,
    },

    /// Only partial Data/Command messages can be reassembled
    #[error("message is not a data or command fragment")]
    NotAFragment,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
