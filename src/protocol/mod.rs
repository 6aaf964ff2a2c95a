//! Treemesh wire layer
//!
//! This module provides the 32-byte frame format, message types, codec and
//! fragment reassembly.

mod builder;
mod codec;
mod error;
mod header;
mod message;
pub(crate) mod metrics;
mod types;

pub use builder::MessageBuilder;
pub use codec::{decode, encode};
pub use error::{Error, Result};
pub use header::Header;
pub use message::{
    AddRemoveToGroupMessage, CommandMessage, DataMessage, ErrorMessage, Message, PartialMessage,
    PayloadKind, PingMessage, ReDisconnectMessage, RegistrationMessage,
};
pub use metrics::MetricsSnapshot;
pub use types::{MessageType, RegistrationType, TypeAndGroups};

/// Protocol revision carried in byte 0 of every frame
pub const PROTOCOL_VERSION: u8 = 0;

/// Size of one frame on the link (bytes)
pub const FRAME_SIZE: usize = 32;

/// One on-wire frame
pub type Frame = [u8; FRAME_SIZE];

/// Bytes of metadata at the start of every Data/Command fragment
/// (version, receiver, type, package number, origin, message id)
pub const FRAGMENT_METADATA_SIZE: usize = 7;

/// Payload bytes carried by fragments after the first
pub const SLOTS: usize = FRAME_SIZE - FRAGMENT_METADATA_SIZE;

/// Payload bytes carried by the first fragment of a Data message
/// (one byte goes to the fragment count)
pub const FIRST_DATA_SLOTS: usize = SLOTS - 1;

/// Payload bytes carried by the first fragment of a Command message
/// (command byte and fragment count)
pub const FIRST_COMMAND_SLOTS: usize = SLOTS - 2;

/// Maximum number of fragments a single message can be split into
pub const MAX_FRAGMENTS: usize = u8::MAX as usize;

/// Length of the offending-frame excerpt carried by an error message
pub const ERRONEOUS_MESSAGE_SIZE: usize = FRAME_SIZE - 4;

/// Link address that reaches unregistered neighbours
pub const DISCOVERY_CHANNEL: u8 = 255;

/// `extraField` value marking a discovery probe (as opposed to an answer)
pub const DISCOVERY_PROBE: u8 = 255;

/// Device ID of the hub
pub const HUB_ID: u8 = 0;
