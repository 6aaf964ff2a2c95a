//! Treemesh message types and the packed type/group byte

use std::fmt;

/// Message type codes (bits 2-7 of byte 2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Application data, possibly fragmented
    Data = 0,
    /// Discovery, registration, route creation and accept/reject
    Registration = 1,
    /// Ping request or response
    Ping = 2,
    /// Add a device to or remove it from a group
    AddRemoveToGroup = 3,
    /// Error report travelling to the hub
    Error = 4,
    /// Reconnect or disconnect notice
    ReDisconnect = 5,
    /// Application command with a command byte, possibly fragmented.
    ///
    /// Code 6 marks the command fragment layout. Peers that carry data and
    /// commands under a single type 0 cannot exchange frames with this
    /// crate: their commands decode as data here and ours are rejected there.
    Command = 6,
}

impl MessageType {
    /// Convert from a 6-bit type code
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Data),
            1 => Some(Self::Registration),
            2 => Some(Self::Ping),
            3 => Some(Self::AddRemoveToGroup),
            4 => Some(Self::Error),
            5 => Some(Self::ReDisconnect),
            6 => Some(Self::Command),
            _ => None,
        }
    }

    /// Convert to type code
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether messages of this type may span several frames
    #[must_use]
    pub const fn is_fragmented(self) -> bool {
        matches!(self, Self::Data | Self::Command)
    }

    /// Whether every hop on the path has to inspect messages of this type
    ///
    /// Types that return `false` are forwarded untouched by nodes they are
    /// not addressed to.
    #[must_use]
    pub const fn is_hop_processed(self) -> bool {
        matches!(self, Self::Registration | Self::Error | Self::ReDisconnect)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Data => "Data",
            Self::Registration => "Registration",
            Self::Ping => "Ping",
            Self::AddRemoveToGroup => "AddRemoveToGroup",
            Self::Error => "Error",
            Self::ReDisconnect => "ReDisconnect",
            Self::Command => "Command",
        };
        write!(f, "{name}")
    }
}

/// Byte 2 of every frame: group flags and type code
///
/// ```text
///  7 6 5 4 3 2 1 0
/// +-+-+-+-+-+-+-+-+
/// |  type code  |A|G|
/// +-+-+-+-+-+-+-+-+
/// ```
///
/// `G` marks a group receiver, `A` a group message still ascending to the hub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TypeAndGroups(u8);

impl TypeAndGroups {
    /// Receiver is a group
    pub const GROUP: u8 = 1 << 0;
    /// Group message is still ascending to the hub
    pub const GROUP_ASCENDING: u8 = 1 << 1;
    /// Bits holding the flags
    pub const FLAG_MASK: u8 = Self::GROUP | Self::GROUP_ASCENDING;
    /// Shift of the type code
    pub const TYPE_SHIFT: u8 = 2;

    /// Create from a message type with both group flags cleared
    #[must_use]
    pub const fn new(msg_type: MessageType) -> Self {
        Self(msg_type.as_u8() << Self::TYPE_SHIFT)
    }

    /// Create from the raw byte
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        Self(value)
    }

    /// Convert to byte
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Raw 6-bit type code
    #[must_use]
    pub const fn type_code(self) -> u8 {
        self.0 >> Self::TYPE_SHIFT
    }

    /// Decoded message type, if the code is known
    #[must_use]
    pub fn message_type(self) -> Option<MessageType> {
        MessageType::from_u8(self.type_code())
    }

    /// Check if the receiver is a group
    #[must_use]
    pub const fn is_group(self) -> bool {
        self.0 & Self::GROUP != 0
    }

    /// Check if a group message is still ascending
    #[must_use]
    pub const fn is_group_ascending(self) -> bool {
        self.0 & Self::GROUP_ASCENDING != 0
    }

    /// Set or clear the group flag
    #[must_use]
    pub const fn with_group(self, set: bool) -> Self {
        Self::set_bit(self, Self::GROUP, set)
    }

    /// Set or clear the group-ascending flag
    #[must_use]
    pub const fn with_group_ascending(self, set: bool) -> Self {
        Self::set_bit(self, Self::GROUP_ASCENDING, set)
    }

    /// Keep the flags but replace the type code
    #[must_use]
    pub const fn with_type(self, msg_type: MessageType) -> Self {
        Self((self.0 & Self::FLAG_MASK) | (msg_type.as_u8() << Self::TYPE_SHIFT))
    }

    const fn set_bit(self, bit: u8, set: bool) -> Self {
        if set {
            Self(self.0 | bit)
        } else {
            Self(self.0 & !bit)
        }
    }
}

impl fmt::Display for TypeAndGroups {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type={}", self.type_code())?;
        if self.is_group() {
            write!(f, " | GROUP")?;
        }
        if self.is_group_ascending() {
            write!(f, " | ASCENDING")?;
        }
        Ok(())
    }
}

/// Registration sub-types carried in byte 3 of a registration frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RegistrationType {
    /// Discovery probe (`extraField == 255`) or answer (`extraField` = level)
    Discover = 0,
    /// Request to become a child of the receiver
    Register = 1,
    /// Route set-up travelling to the hub
    RouteCreation = 2,
    /// Hub decision travelling back to the new device
    AcceptReject = 3,
}

impl RegistrationType {
    /// Convert from byte
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Discover),
            1 => Some(Self::Register),
            2 => Some(Self::RouteCreation),
            3 => Some(Self::AcceptReject),
            _ => None,
        }
    }

    /// Convert to byte
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}
