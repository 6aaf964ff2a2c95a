//! Treemesh message variants

use bytes::Bytes;

use super::{
    ERRONEOUS_MESSAGE_SIZE, FIRST_COMMAND_SLOTS, FIRST_DATA_SLOTS, Frame, Header, MAX_FRAGMENTS,
    MessageType, RegistrationType, SLOTS,
};

/// Layout family of a fragmented payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    /// Plain data, fragment 0 carries the fragment count
    Data,
    /// Command, fragment 0 carries the command byte and the fragment count
    Command,
}

impl PayloadKind {
    /// Payload bytes in the first fragment
    #[must_use]
    pub const fn first_slots(self) -> usize {
        match self {
            Self::Data => FIRST_DATA_SLOTS,
            Self::Command => FIRST_COMMAND_SLOTS,
        }
    }

    /// Metadata bytes placed before the payload in the first fragment
    #[must_use]
    pub const fn first_metadata(self) -> usize {
        SLOTS - self.first_slots()
    }

    /// Wire type of this payload
    #[must_use]
    pub const fn message_type(self) -> MessageType {
        match self {
            Self::Data => MessageType::Data,
            Self::Command => MessageType::Command,
        }
    }

    /// Number of fragments needed for `content_size` payload bytes
    #[must_use]
    pub const fn fragment_count(self, content_size: usize) -> usize {
        let first = self.first_slots();
        if content_size <= first {
            1
        } else {
            (content_size - first).div_ceil(SLOTS) + 1
        }
    }

    /// Largest content that still fits into 255 fragments
    #[must_use]
    pub const fn max_content_size(self) -> usize {
        self.first_slots() + SLOTS * (MAX_FRAGMENTS - 1)
    }

    /// Size of a reassembled buffer made of `fragments` full slots
    #[must_use]
    pub const fn assembled_size(self, fragments: usize) -> usize {
        self.first_slots() + SLOTS * fragments.saturating_sub(1)
    }
}

/// Application data addressed to a device or group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMessage {
    /// Frame header
    pub header: Header,
    /// Device that created the message
    pub origin: u8,
    /// ID of the message, unique per origin
    pub message_id: u16,
    /// Payload
    pub content: Bytes,
}

impl DataMessage {
    /// Create a data message for a single device
    pub fn new(receiver: u8, origin: u8, message_id: u16, content: impl Into<Bytes>) -> Self {
        Self {
            header: Header::new(MessageType::Data, receiver),
            origin,
            message_id,
            content: content.into(),
        }
    }

    /// Create a data message for a group
    pub fn to_group(group: u8, origin: u8, message_id: u16, content: impl Into<Bytes>) -> Self {
        Self {
            header: Header::group(MessageType::Data, group),
            origin,
            message_id,
            content: content.into(),
        }
    }
}

/// Application command with parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMessage {
    /// Frame header
    pub header: Header,
    /// Command byte
    pub command: u8,
    /// Device that created the message
    pub origin: u8,
    /// ID of the message, unique per origin
    pub message_id: u16,
    /// Command parameters
    pub content: Bytes,
}

impl CommandMessage {
    /// Create a command message for a single device
    pub fn new(
        receiver: u8,
        command: u8,
        origin: u8,
        message_id: u16,
        content: impl Into<Bytes>,
    ) -> Self {
        Self {
            header: Header::new(MessageType::Command, receiver),
            command,
            origin,
            message_id,
            content: content.into(),
        }
    }
}

/// One fragment of a [`DataMessage`] or [`CommandMessage`]
///
/// `content` holds bytes 7..32 of the frame verbatim. For fragment 0 the
/// leading bytes are metadata (see [`PayloadKind::first_metadata`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialMessage {
    /// Frame header
    pub header: Header,
    /// Index of this fragment
    pub package_number: u8,
    /// Device that created the message
    pub origin: u8,
    /// ID of the message, unique per origin
    pub message_id: u16,
    /// Raw fragment body
    pub content: [u8; SLOTS],
}

impl PartialMessage {
    /// Layout family, derived from the header type
    #[must_use]
    pub fn kind(&self) -> PayloadKind {
        match self.header.type_and_groups.message_type() {
            Some(MessageType::Command) => PayloadKind::Command,
            _ => PayloadKind::Data,
        }
    }

    /// Reassembly key
    #[must_use]
    pub const fn key(&self) -> (u8, u16) {
        (self.origin, self.message_id)
    }

    /// Total fragment count, carried only by fragment 0
    #[must_use]
    pub fn package_count(&self) -> Option<u8> {
        if self.package_number != 0 {
            return None;
        }
        match self.kind() {
            PayloadKind::Data => Some(self.content[0]),
            PayloadKind::Command => Some(self.content[1]),
        }
    }

    /// Command byte, carried only by fragment 0 of a command
    #[must_use]
    pub fn command(&self) -> Option<u8> {
        match (self.package_number, self.kind()) {
            (0, PayloadKind::Command) => Some(self.content[0]),
            _ => None,
        }
    }

    /// Payload slots of this fragment (metadata stripped)
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        if self.package_number == 0 {
            &self.content[self.kind().first_metadata()..]
        } else {
            &self.content
        }
    }
}

/// Discovery and registration handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationMessage {
    /// Frame header
    pub header: Header,
    /// Handshake step
    pub registration_type: RegistrationType,
    /// Requested or assigned device ID (0 = unknown)
    pub new_device_id: u8,
    /// Temporary ID identifying a device without permanent ID
    pub temp_id: u32,
    /// Discover: hierarchy level (255 = probe); AcceptReject: accepted flag
    pub extra_field: u8,
}

impl RegistrationMessage {
    /// Create a registration message
    #[must_use]
    pub const fn new(
        receiver: u8,
        registration_type: RegistrationType,
        new_device_id: u8,
        temp_id: u32,
        extra_field: u8,
    ) -> Self {
        Self {
            header: Header::new(MessageType::Registration, receiver),
            registration_type,
            new_device_id,
            temp_id,
            extra_field,
        }
    }

    /// Create an accept/reject decision
    #[must_use]
    pub const fn decision(receiver: u8, new_device_id: u8, temp_id: u32, accept: bool) -> Self {
        Self::new(
            receiver,
            RegistrationType::AcceptReject,
            new_device_id,
            temp_id,
            accept as u8,
        )
    }

    /// For AcceptReject: was the device accepted
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        self.extra_field != 0
    }
}

/// Ping request or response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingMessage {
    /// Frame header
    pub header: Header,
    /// ID of this ping
    pub ping_id: u8,
    /// Sender of this ping (responder, once flipped)
    pub sender_id: u8,
    /// Response flag
    pub is_response: bool,
    /// Time the request left its origin
    pub timestamp: u32,
}

impl PingMessage {
    /// Create a ping request
    #[must_use]
    pub const fn request(receiver: u8, ping_id: u8, sender_id: u8, timestamp: u32) -> Self {
        Self {
            header: Header::new(MessageType::Ping, receiver),
            ping_id,
            sender_id,
            is_response: false,
            timestamp,
        }
    }
}

/// Group membership change for the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddRemoveToGroupMessage {
    /// Frame header
    pub header: Header,
    /// Group concerned
    pub group_id: u8,
    /// Add (`true`) or remove (`false`)
    pub is_add_to_group: bool,
}

impl AddRemoveToGroupMessage {
    /// Create a membership change
    #[must_use]
    pub const fn new(receiver: u8, group_id: u8, is_add_to_group: bool) -> Self {
        Self {
            header: Header::new(MessageType::AddRemoveToGroup, receiver),
            group_id,
            is_add_to_group,
        }
    }
}

/// Error report, consumed by the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorMessage {
    /// Frame header
    pub header: Header,
    /// Application error code
    pub error_code: u8,
    /// First 28 bytes of the frame that caused the error
    pub erroneous_message: [u8; ERRONEOUS_MESSAGE_SIZE],
}

impl ErrorMessage {
    /// Create an error report for the hub from (up to) 28 bytes of `offending`
    #[must_use]
    pub fn new(error_code: u8, offending: &[u8]) -> Self {
        let mut erroneous_message = [0u8; ERRONEOUS_MESSAGE_SIZE];
        let len = offending.len().min(ERRONEOUS_MESSAGE_SIZE);
        erroneous_message[..len].copy_from_slice(&offending[..len]);
        Self {
            header: Header::new(MessageType::Error, super::HUB_ID),
            error_code,
            erroneous_message,
        }
    }
}

/// Reconnect or disconnect notice for the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReDisconnectMessage {
    /// Frame header
    pub header: Header,
    /// Disconnect (`true`) or reconnect (`false`)
    pub is_disconnect: bool,
}

impl ReDisconnectMessage {
    /// Create a notice about `device`
    #[must_use]
    pub const fn new(device: u8, is_disconnect: bool) -> Self {
        Self {
            header: Header::new(MessageType::ReDisconnect, device),
            is_disconnect,
        }
    }
}

/// Any treemesh message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Complete data message
    Data(DataMessage),
    /// Complete command message
    Command(CommandMessage),
    /// Single received fragment of a data or command message
    Partial(PartialMessage),
    /// Registration handshake step
    Registration(RegistrationMessage),
    /// Ping
    Ping(PingMessage),
    /// Group membership change
    AddRemoveToGroup(AddRemoveToGroupMessage),
    /// Error report
    Error(ErrorMessage),
    /// Reconnect / disconnect
    ReDisconnect(ReDisconnectMessage),
}

impl Message {
    /// Get header
    #[must_use]
    pub const fn header(&self) -> &Header {
        match self {
            Self::Data(m) => &m.header,
            Self::Command(m) => &m.header,
            Self::Partial(m) => &m.header,
            Self::Registration(m) => &m.header,
            Self::Ping(m) => &m.header,
            Self::AddRemoveToGroup(m) => &m.header,
            Self::Error(m) => &m.header,
            Self::ReDisconnect(m) => &m.header,
        }
    }

    /// Get mutable header
    pub fn header_mut(&mut self) -> &mut Header {
        match self {
            Self::Data(m) => &mut m.header,
            Self::Command(m) => &mut m.header,
            Self::Partial(m) => &mut m.header,
            Self::Registration(m) => &mut m.header,
            Self::Ping(m) => &mut m.header,
            Self::AddRemoveToGroup(m) => &mut m.header,
            Self::Error(m) => &mut m.header,
            Self::ReDisconnect(m) => &mut m.header,
        }
    }

    /// Get message type
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Data(_) => MessageType::Data,
            Self::Command(_) => MessageType::Command,
            Self::Partial(m) => m.kind().message_type(),
            Self::Registration(_) => MessageType::Registration,
            Self::Ping(_) => MessageType::Ping,
            Self::AddRemoveToGroup(_) => MessageType::AddRemoveToGroup,
            Self::Error(_) => MessageType::Error,
            Self::ReDisconnect(_) => MessageType::ReDisconnect,
        }
    }

    /// Receiving device or group
    #[must_use]
    pub const fn receiver(&self) -> u8 {
        self.header().receiver
    }

    /// Check if the receiver is a group
    #[must_use]
    pub const fn is_group(&self) -> bool {
        self.header().is_group()
    }

    /// Encode message to frames
    pub fn encode(&self) -> super::Result<Vec<Frame>> {
        super::encode(self)
    }

    /// Decode message from one frame
    pub fn decode(bytes: &[u8]) -> super::Result<Self> {
        super::decode(bytes)
    }
}

impl From<DataMessage> for Message {
    fn from(msg: DataMessage) -> Self {
        Self::Data(msg)
    }
}

impl From<CommandMessage> for Message {
    fn from(msg: CommandMessage) -> Self {
        Self::Command(msg)
    }
}

impl From<RegistrationMessage> for Message {
    fn from(msg: RegistrationMessage) -> Self {
        Self::Registration(msg)
    }
}

impl From<PingMessage> for Message {
    fn from(msg: PingMessage) -> Self {
        Self::Ping(msg)
    }
}

impl From<AddRemoveToGroupMessage> for Message {
    fn from(msg: AddRemoveToGroupMessage) -> Self {
        Self::AddRemoveToGroup(msg)
    }
}

impl From<ErrorMessage> for Message {
    fn from(msg: ErrorMessage) -> Self {
        Self::Error(msg)
    }
}

impl From<ReDisconnectMessage> for Message {
    fn from(msg: ReDisconnectMessage) -> Self {
        Self::ReDisconnect(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_count() {
        let kind = PayloadKind::Data;
        assert_eq!(kind.fragment_count(0), 1);
        assert_eq!(kind.fragment_count(FIRST_DATA_SLOTS), 1);
        assert_eq!(kind.fragment_count(FIRST_DATA_SLOTS + 1), 2);
        assert_eq!(kind.fragment_count(FIRST_DATA_SLOTS + SLOTS), 2);
        assert_eq!(kind.fragment_count(FIRST_DATA_SLOTS + SLOTS + 1), 3);
        assert_eq!(kind.fragment_count(kind.max_content_size()), MAX_FRAGMENTS);
        assert_eq!(
            kind.fragment_count(kind.max_content_size() + 1),
            MAX_FRAGMENTS + 1
        );
    }

    #[test]
    fn test_command_has_one_slot_less() {
        assert_eq!(
            PayloadKind::Command.first_slots() + 1,
            PayloadKind::Data.first_slots()
        );
        assert_eq!(PayloadKind::Command.fragment_count(FIRST_DATA_SLOTS), 2);
    }

    #[test]
    fn test_message_accessors() {
        let msg: Message = DataMessage::to_group(4, 1, 99, &b"hi"[..]).into();
        assert!(msg.is_group());
        assert_eq!(msg.receiver(), 4);
        assert_eq!(msg.message_type(), MessageType::Data);
    }

    #[test]
    fn test_error_message_truncates() {
        let offending = [7u8; 40];
        let msg = ErrorMessage::new(3, &offending);
        assert_eq!(msg.erroneous_message, [7u8; ERRONEOUS_MESSAGE_SIZE]);
        assert_eq!(msg.header.receiver, 0);

        let short = ErrorMessage::new(3, &[1, 2]);
        assert_eq!(&short.erroneous_message[..3], &[1, 2, 0]);
    }
}
