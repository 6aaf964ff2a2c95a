//! Collaborators the engine is driven through: the frame link and the clock.

use std::time::Instant;

use tracing::error;

use crate::protocol::{ERRONEOUS_MESSAGE_SIZE, Frame};

/// Data-link layer moving 32-byte frames between neighbours.
///
/// Next hops are device IDs; [`DISCOVERY_CHANNEL`](crate::protocol::DISCOVERY_CHANNEL)
/// addresses neighbours that have no ID yet.
pub trait LinkAdapter {
    /// Hand `frame` to the neighbour `next_hop`. Returns `false` if the link refused it.
    fn write(&mut self, frame: &Frame, next_hop: u8) -> bool;

    /// Take the next received frame together with the ID of the neighbour that sent it
    /// ([`DISCOVERY_CHANNEL`](crate::protocol::DISCOVERY_CHANNEL) for a neighbour without an ID).
    fn read(&mut self) -> Option<(Frame, u8)>;

    /// Whether [`read`](Self::read) would return a frame.
    fn frame_available(&self) -> bool;

    /// Sink for error reports reaching the hub.
    fn report_error(&mut self, code: u8, frame: &[u8; ERRONEOUS_MESSAGE_SIZE]) {
        error!(code, frame = ?frame, "device reported an error");
    }
}

/// Monotonic millisecond clock, allowed to wrap at `u32::MAX`.
pub trait Clock {
    /// Current time in milliseconds.
    fn now(&self) -> u32;
}

/// [`Clock`] backed by [`Instant`], counting from its creation.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Start a clock at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> u32 {
        // truncation implements the wrap
        self.origin.elapsed().as_millis() as u32
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> u32 {
        (**self).now()
    }
}
