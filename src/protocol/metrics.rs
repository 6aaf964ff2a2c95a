use super::MessageType;

/// Frame counters kept by one network device.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    snapshot: MetricsSnapshot,
}

/// Direction of frame flow for counting.
#[derive(Clone, Copy)]
pub(crate) enum FrameDirection {
    Sent,
    Received,
}

impl Metrics {
    #[inline]
    pub(crate) fn record_frame(&mut self, direction: FrameDirection, msg_type: MessageType) {
        let counters = &mut self.snapshot;
        match direction {
            FrameDirection::Sent => counters.frames_sent += 1,
            FrameDirection::Received => counters.frames_received += 1,
        }
        let per_type = match msg_type {
            MessageType::Data | MessageType::Command => &mut counters.payload_frames,
            MessageType::Registration => &mut counters.registration_frames,
            MessageType::Ping => &mut counters.ping_frames,
            MessageType::AddRemoveToGroup | MessageType::Error | MessageType::ReDisconnect => {
                &mut counters.control_frames
            }
        };
        *per_type += 1;
    }

    #[inline]
    pub(crate) fn record_forward(&mut self) {
        self.snapshot.frames_forwarded += 1;
    }

    #[inline]
    pub(crate) fn record_write_failure(&mut self) {
        self.snapshot.write_failures += 1;
    }

    #[inline]
    pub(crate) fn record_drop(&mut self) {
        self.snapshot.frames_dropped += 1;
    }

    #[inline]
    pub(crate) fn record_payload(&mut self) {
        self.snapshot.payloads_completed += 1;
    }

    #[inline]
    pub(crate) fn totals(&self) -> MetricsSnapshot {
        self.snapshot
    }
}

/// Lightweight snapshot of a device's counters.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsSnapshot {
    /// Frames handed to the link layer (successfully or not).
    pub frames_sent: u64,
    /// Frames read from the link layer.
    pub frames_received: u64,
    /// Received frames passed on towards another device.
    pub frames_forwarded: u64,
    /// Writes the link layer refused.
    pub write_failures: u64,
    /// Received frames that could not be decoded or had nowhere to go.
    pub frames_dropped: u64,
    /// Data and command messages fully reassembled here.
    pub payloads_completed: u64,
    /// Data and command fragments, both directions.
    pub payload_frames: u64,
    /// Registration frames, both directions.
    pub registration_frames: u64,
    /// Ping frames, both directions.
    pub ping_frames: u64,
    /// Group, error and re/disconnect frames, both directions.
    pub control_frames: u64,
}

impl MetricsSnapshot {
    /// Share of sent frames the link layer refused.
    #[must_use]
    pub fn write_failure_ratio(&self) -> Option<f64> {
        if self.frames_sent == 0 {
            return None;
        }
        Some(self.write_failures as f64 / self.frames_sent as f64)
    }
}
