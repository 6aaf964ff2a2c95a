//! Neighbour discovery run before (re-)registration.
//!
//! Probes every address of the 1-byte ID space once, then waits a fixed time
//! for answers carrying each responder's hierarchy level.

use tracing::{debug, trace};

use super::timer::Timer;
use crate::protocol::{DISCOVERY_PROBE, Message, RegistrationMessage, RegistrationType};

/// Last address probed.
const LAST_CANDIDATE: u8 = 254;

/// A device that answered a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FoundDevice {
    /// ID of the responder.
    pub id: u8,
    /// Depth of the responder in the tree (hub = 0).
    pub hierarchy_level: u8,
}

/// Discovery progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    /// Still emitting probes.
    Probing,
    /// All probes sent, collecting answers until the timer expires.
    WaitingForReplies,
    /// Timer expired.
    Done,
}

/// One discovery attempt.
#[derive(Debug)]
pub struct Discovery {
    state: DiscoveryState,
    next_candidate: u8,
    timer: Timer,
    temp_id: u32,
    found_devices: Vec<FoundDevice>,
}

impl Discovery {
    /// Start a discovery that waits `waiting_ms` after its last probe.
    ///
    /// `temp_id` is echoed by responders so answers can be told apart from
    /// answers to other devices probing at the same time.
    #[must_use]
    pub fn new(waiting_ms: u32, temp_id: u32) -> Self {
        Self {
            state: DiscoveryState::Probing,
            next_candidate: 0,
            timer: Timer::new(waiting_ms),
            temp_id,
            found_devices: Vec::new(),
        }
    }

    /// Advance by one tick.
    ///
    /// Returns whether discovery finished and, while probing, the probe to
    /// send this tick (addressed to the candidate ID).
    pub fn update(&mut self, now: u32) -> (bool, Option<Message>) {
        match self.state {
            DiscoveryState::Probing => {
                let candidate = self.next_candidate;
                let probe = RegistrationMessage::new(
                    candidate,
                    RegistrationType::Discover,
                    candidate,
                    self.temp_id,
                    DISCOVERY_PROBE,
                );
                trace!(candidate, "discovery probe");

                if candidate == LAST_CANDIDATE {
                    self.timer.start(now);
                    self.state = DiscoveryState::WaitingForReplies;
                } else {
                    self.next_candidate += 1;
                }
                (false, Some(probe.into()))
            }
            DiscoveryState::WaitingForReplies => {
                if self.timer.expired(now) {
                    debug!(found = self.found_devices.len(), "discovery finished");
                    self.state = DiscoveryState::Done;
                    return (true, None);
                }
                (false, None)
            }
            DiscoveryState::Done => (true, None),
        }
    }

    /// Record an answer.
    pub fn on_answer(&mut self, id: u8, hierarchy_level: u8) {
        if self.state == DiscoveryState::Done {
            return;
        }
        trace!(id, hierarchy_level, "discovery answer");
        self.found_devices.push(FoundDevice {
            id,
            hierarchy_level,
        });
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> DiscoveryState {
        self.state
    }

    /// Temporary ID carried by the probes.
    #[must_use]
    pub const fn temp_id(&self) -> u32 {
        self.temp_id
    }

    /// Answers collected so far, in arrival order.
    #[must_use]
    pub fn found_devices(&self) -> &[FoundDevice] {
        &self.found_devices
    }

    /// Responder closest to the hub; the earliest answer wins ties.
    #[must_use]
    pub fn best_parent(&self) -> Option<FoundDevice> {
        self.found_devices
            .iter()
            .copied()
            .reduce(|best, candidate| {
                if candidate.hierarchy_level < best.hierarchy_level {
                    candidate
                } else {
                    best
                }
            })
    }
}
