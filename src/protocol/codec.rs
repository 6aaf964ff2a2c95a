//! Treemesh message codec (encode/decode)
//!
//! Every message maps to one or more 32-byte frames. Multi-byte integers are
//! little-endian.

use super::{
    AddRemoveToGroupMessage, ERRONEOUS_MESSAGE_SIZE, Error, ErrorMessage, FRAGMENT_METADATA_SIZE,
    FRAME_SIZE, Frame, Header, Message, MessageType, PartialMessage, PayloadKind, PingMessage,
    ReDisconnectMessage, RegistrationMessage, RegistrationType, Result, SLOTS,
};

/// Encode a message to frames
///
/// # Format
///
/// ```text
/// Data/Command, fragment 0:
///   [HDR (3)] [PKG (1)] [ORIGIN (1)] [MSG ID (2)] [(CMD (1))] [COUNT (1)] [PAYLOAD]
/// Data/Command, fragment i >= 1:
///   [HDR (3)] [PKG (1)] [ORIGIN (1)] [MSG ID (2)] [PAYLOAD (25)]
/// Everything else:
///   [HDR (3)] [FIELDS] [ZERO PADDING]
/// ```
///
/// Only Data and Command messages produce more than one frame.
///
/// # Errors
///
/// Returns [`Error::PayloadTooLarge`] if the content needs more than 255
/// fragments.
pub fn encode(message: &Message) -> Result<Vec<Frame>> {
    let frame = match message {
        Message::Data(msg) => {
            return encode_payload(
                &msg.header,
                PayloadKind::Data,
                0,
                msg.origin,
                msg.message_id,
                &msg.content,
            );
        }
        Message::Command(msg) => {
            return encode_payload(
                &msg.header,
                PayloadKind::Command,
                msg.command,
                msg.origin,
                msg.message_id,
                &msg.content,
            );
        }
        Message::Partial(msg) => {
            let mut frame = fragment_template(&msg.header, msg.origin, msg.message_id);
            frame[3] = msg.package_number;
            frame[FRAGMENT_METADATA_SIZE..].copy_from_slice(&msg.content);
            frame
        }
        Message::Registration(msg) => {
            let mut frame = msg.header.to_frame();
            frame[3] = msg.registration_type.as_u8();
            frame[4] = msg.new_device_id;
            frame[5..9].copy_from_slice(&msg.temp_id.to_le_bytes());
            frame[9] = msg.extra_field;
            frame
        }
        Message::Ping(msg) => {
            let mut frame = msg.header.to_frame();
            frame[3] = msg.sender_id;
            frame[4] = msg.ping_id;
            frame[5] = u8::from(msg.is_response);
            frame[6..10].copy_from_slice(&msg.timestamp.to_le_bytes());
            frame
        }
        Message::AddRemoveToGroup(msg) => {
            let mut frame = msg.header.to_frame();
            frame[3] = u8::from(msg.is_add_to_group);
            frame[4] = msg.group_id;
            frame
        }
        Message::Error(msg) => {
            let mut frame = msg.header.to_frame();
            frame[3] = msg.error_code;
            frame[4..].copy_from_slice(&msg.erroneous_message);
            frame
        }
        Message::ReDisconnect(msg) => {
            let mut frame = msg.header.to_frame();
            frame[3] = u8::from(msg.is_disconnect);
            frame
        }
    };

    Ok(vec![frame])
}

/// Decode a message from one frame
///
/// Data and Command frames always decode to [`Message::Partial`]; use
/// [`MessageBuilder`](super::MessageBuilder) to reassemble them.
///
/// # Errors
///
/// Returns an error if:
/// - Buffer is shorter than 32 bytes
/// - Protocol version is unknown
/// - Message type or registration type is unknown
pub fn decode(bytes: &[u8]) -> Result<Message> {
    let (header, msg_type) = Header::from_bytes(bytes)?;

    let message = match msg_type {
        MessageType::Data | MessageType::Command => {
            let mut content = [0u8; SLOTS];
            content.copy_from_slice(&bytes[FRAGMENT_METADATA_SIZE..FRAME_SIZE]);
            Message::Partial(PartialMessage {
                header,
                package_number: bytes[3],
                origin: bytes[4],
                message_id: u16::from_le_bytes([bytes[5], bytes[6]]),
                content,
            })
        }
        MessageType::Registration => {
            let registration_type = RegistrationType::from_u8(bytes[3])
                .ok_or(Error::InvalidRegistrationType { value: bytes[3] })?;
            Message::Registration(RegistrationMessage {
                header,
                registration_type,
                new_device_id: bytes[4],
                temp_id: u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]),
                extra_field: bytes[9],
            })
        }
        MessageType::Ping => Message::Ping(PingMessage {
            header,
            sender_id: bytes[3],
            ping_id: bytes[4],
            is_response: bytes[5] != 0,
            timestamp: u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]),
        }),
        MessageType::AddRemoveToGroup => Message::AddRemoveToGroup(AddRemoveToGroupMessage {
            header,
            is_add_to_group: bytes[3] != 0,
            group_id: bytes[4],
        }),
        MessageType::Error => {
            let mut erroneous_message = [0u8; ERRONEOUS_MESSAGE_SIZE];
            erroneous_message.copy_from_slice(&bytes[4..FRAME_SIZE]);
            Message::Error(ErrorMessage {
                header,
                error_code: bytes[3],
                erroneous_message,
            })
        }
        MessageType::ReDisconnect => Message::ReDisconnect(ReDisconnectMessage {
            header,
            is_disconnect: bytes[3] != 0,
        }),
    };

    Ok(message)
}

fn fragment_template(header: &Header, origin: u8, message_id: u16) -> Frame {
    let mut frame = header.to_frame();
    frame[4] = origin;
    frame[5..7].copy_from_slice(&message_id.to_le_bytes());
    frame
}

fn encode_payload(
    header: &Header,
    kind: PayloadKind,
    command: u8,
    origin: u8,
    message_id: u16,
    content: &[u8],
) -> Result<Vec<Frame>> {
    let max = kind.max_content_size();
    if content.len() > max {
        return Err(Error::PayloadTooLarge {
            size: content.len(),
            max,
        });
    }

    let mut header = *header;
    header.type_and_groups = header.type_and_groups.with_type(kind.message_type());
    let template = fragment_template(&header, origin, message_id);

    let count = kind.fragment_count(content.len());
    let first_slots = kind.first_slots();
    let mut frames = Vec::with_capacity(count);

    for index in 0..count {
        let mut frame = template;
        // count <= 255 after the size check
        frame[3] = index as u8;

        let (start, body) = if index == 0 {
            match kind {
                PayloadKind::Data => frame[7] = count as u8,
                PayloadKind::Command => {
                    frame[7] = command;
                    frame[8] = count as u8;
                }
            }
            (0, FRAGMENT_METADATA_SIZE + kind.first_metadata())
        } else {
            (first_slots + SLOTS * (index - 1), FRAGMENT_METADATA_SIZE)
        };

        let capacity = FRAME_SIZE - body;
        let end = (start + capacity).min(content.len());
        if start < end {
            frame[body..body + (end - start)].copy_from_slice(&content[start..end]);
        }
        frames.push(frame);
    }

    Ok(frames)
}
