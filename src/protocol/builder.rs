//! Reassembly of fragmented Data and Command messages

use std::collections::HashMap;

use bytes::{BufMut, BytesMut};
use tracing::debug;

use super::{
    CommandMessage, DataMessage, Error, Message, PartialMessage, PayloadKind, Result, SLOTS,
};

type Key = (u8, u16);

/// Collects fragments keyed by `(origin, message id)` until a message is complete
///
/// Fragments are placed by package number, so arrival order does not
/// matter. The assembled content always spans whole slots: anything past
/// the original content length is zero padding from the last fragment.
///
/// A package number that is already buffered for its key starts a new
/// message under that key: the buffered fragments belong to an earlier
/// message that lost a fragment, and message IDs are reused after a wrap.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    partial_fragments: HashMap<Key, Vec<PartialMessage>>,
    expected_count: HashMap<Key, u8>,
}

impl MessageBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages currently being reassembled
    #[must_use]
    pub fn pending(&self) -> usize {
        self.partial_fragments.len()
    }

    /// Add a fragment; returns the complete message once every fragment arrived
    ///
    /// A second copy of a buffered package number discards the incomplete
    /// message and restarts reassembly with the new fragment.
    ///
    /// The returned message is [`Message::Data`] or [`Message::Command`].
    pub fn submit(&mut self, fragment: PartialMessage) -> Option<Message> {
        let key = fragment.key();
        let fragments = self.partial_fragments.entry(key).or_default();

        if fragments
            .iter()
            .any(|f| f.package_number == fragment.package_number)
        {
            debug!(
                origin = key.0,
                message_id = key.1,
                package = fragment.package_number,
                dropped = fragments.len(),
                "stale reassembly discarded"
            );
            fragments.clear();
            self.expected_count.remove(&key);
        }

        if let Some(count) = fragment.package_count() {
            self.expected_count.insert(key, count);
        }
        fragments.push(fragment);

        let expected = *self.expected_count.get(&key)?;
        if fragments.len() != usize::from(expected) {
            return None;
        }

        let fragments = self.partial_fragments.remove(&key)?;
        self.expected_count.remove(&key);
        Some(assemble(fragments, expected))
    }

    /// Same as [`submit`](Self::submit) but accepts any message
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAFragment`] for anything but [`Message::Partial`].
    pub fn submit_message(&mut self, message: Message) -> Result<Option<Message>> {
        match message {
            Message::Partial(fragment) => Ok(self.submit(fragment)),
            _ => Err(Error::NotAFragment),
        }
    }
}

fn assemble(fragments: Vec<PartialMessage>, count: u8) -> Message {
    let count = usize::from(count);
    // submit() only assembles once fragment 0 (and thus the count) is present
    let first = fragments
        .iter()
        .find(|f| f.package_number == 0)
        .unwrap_or(&fragments[0]);
    let kind = first.kind();
    let first_slots = kind.first_slots();
    let size = kind.assembled_size(count);

    let mut content = BytesMut::with_capacity(size);
    content.put_bytes(0, size);

    for fragment in &fragments {
        let index = usize::from(fragment.package_number);
        if index >= count {
            continue;
        }
        let offset = if index == 0 {
            0
        } else {
            first_slots + SLOTS * (index - 1)
        };
        let payload = fragment.payload();
        content[offset..offset + payload.len()].copy_from_slice(payload);
    }

    let mut header = first.header;
    header.type_and_groups = header.type_and_groups.with_type(kind.message_type());
    let content = content.freeze();

    match kind {
        PayloadKind::Data => Message::Data(DataMessage {
            header,
            origin: first.origin,
            message_id: first.message_id,
            content,
        }),
        PayloadKind::Command => Message::Command(CommandMessage {
            header,
            command: first.command().unwrap_or_default(),
            origin: first.origin,
            message_id: first.message_id,
            content,
        }),
    }
}
