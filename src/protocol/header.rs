//! Treemesh frame header
//!
//! The first three bytes of every 32-byte frame.

use super::{Error, FRAME_SIZE, Frame, MessageType, PROTOCOL_VERSION, Result, TypeAndGroups};

/// Common header shared by every message variant
///
/// # Wire Format
///
/// ```text
/// 0                   1                   2
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-- - -
/// |    Version    |   Receiver    | Type  |A|G|  type-specific
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-- - -
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Header {
    /// Protocol version
    pub version: u8,
    /// Receiving device or group
    pub receiver: u8,
    /// Type code and group flags
    pub type_and_groups: TypeAndGroups,
}

impl Header {
    /// Create a header addressed to a single device
    #[must_use]
    pub const fn new(msg_type: MessageType, receiver: u8) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            receiver,
            type_and_groups: TypeAndGroups::new(msg_type),
        }
    }

    /// Create a header addressed to a group
    #[must_use]
    pub const fn group(msg_type: MessageType, group: u8) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            receiver: group,
            type_and_groups: TypeAndGroups::new(msg_type).with_group(true),
        }
    }

    /// Check if the receiver is a group
    #[must_use]
    pub const fn is_group(&self) -> bool {
        self.type_and_groups.is_group()
    }

    /// Check if a group message is still ascending
    #[must_use]
    pub const fn is_group_ascending(&self) -> bool {
        self.type_and_groups.is_group_ascending()
    }

    /// Write the header into the first three bytes of `frame`
    pub fn write_to(&self, frame: &mut Frame) {
        frame[0] = self.version;
        frame[1] = self.receiver;
        frame[2] = self.type_and_groups.as_u8();
    }

    /// Start a zeroed frame carrying this header
    #[must_use]
    pub fn to_frame(&self) -> Frame {
        let mut frame = [0u8; FRAME_SIZE];
        self.write_to(&mut frame);
        frame
    }

    /// Parse from bytes and resolve the message type
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, MessageType)> {
        if bytes.len() < FRAME_SIZE {
            return Err(Error::BufferTooSmall {
                needed: FRAME_SIZE,
                got: bytes.len(),
            });
        }

        let header = Self {
            version: bytes[0],
            receiver: bytes[1],
            type_and_groups: TypeAndGroups::from_u8(bytes[2]),
        };

        if header.version != PROTOCOL_VERSION {
            return Err(Error::UnsupportedVersion {
                version: header.version,
            });
        }

        let msg_type =
            header
                .type_and_groups
                .message_type()
                .ok_or(Error::InvalidMessageType {
                    type_code: header.type_and_groups.type_code(),
                })?;

        Ok((header, msg_type))
    }
}
