//! Tree links and routing tables of one device.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::protocol::DISCOVERY_CHANNEL;

/// Maximum number of direct children per device.
pub const MAX_CHILDREN: usize = 4;

/// Parent/children links plus the descendant routing tables.
///
/// The routing table maps descendant IDs to the child they are reached
/// through; a destination without an entry is reached through the parent.
/// The temporary table does the same for devices that only have a temp ID.
#[derive(Debug, Default, Clone)]
pub struct Routes {
    parent: Option<u8>,
    children: [u8; MAX_CHILDREN],
    routing_table: BTreeMap<u8, u8>,
    temp_routing_table: HashMap<u32, u8>,
}

impl Routes {
    /// Empty routing state without a parent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parent device, `None` for the hub and unregistered devices.
    #[must_use]
    pub const fn parent(&self) -> Option<u8> {
        self.parent
    }

    /// Replace the parent link.
    pub fn set_parent(&mut self, parent: Option<u8>) {
        self.parent = parent;
    }

    /// Next hop towards `receiver`: the routing entry, else the parent.
    #[must_use]
    pub fn next_hop(&self, receiver: u8) -> Option<u8> {
        self.routing_table.get(&receiver).copied().or(self.parent)
    }

    /// Routing entry for a descendant.
    #[must_use]
    pub fn route(&self, device: u8) -> Option<u8> {
        self.routing_table.get(&device).copied()
    }

    /// Point `device` at `next_hop`, returning the previous entry.
    pub fn set_route(&mut self, device: u8, next_hop: u8) -> Option<u8> {
        debug!(device, next_hop, "route set");
        self.routing_table.insert(device, next_hop)
    }

    /// Remove the entry for `device`, returning it.
    pub fn remove_route(&mut self, device: u8) -> Option<u8> {
        let removed = self.routing_table.remove(&device);
        if removed.is_some() {
            debug!(device, "route removed");
        }
        removed
    }

    /// Put back an entry saved from [`set_route`](Self::set_route).
    pub fn restore_route(&mut self, device: u8, previous: Option<u8>) {
        match previous {
            Some(next_hop) => {
                self.routing_table.insert(device, next_hop);
            }
            None => {
                self.routing_table.remove(&device);
            }
        }
        debug!(device, ?previous, "route rolled back");
    }

    /// Remember the hop towards a device known only by `temp_id`.
    pub fn reserve_temp(&mut self, temp_id: u32, next_hop: u8) {
        self.temp_routing_table.insert(temp_id, next_hop);
    }

    /// Temporary route, if any.
    #[must_use]
    pub fn temp_route(&self, temp_id: u32) -> Option<u8> {
        self.temp_routing_table.get(&temp_id).copied()
    }

    /// Remove and return a temporary route.
    pub fn take_temp(&mut self, temp_id: u32) -> Option<u8> {
        self.temp_routing_table.remove(&temp_id)
    }

    /// Direct children (occupied slots only).
    pub fn children(&self) -> impl Iterator<Item = u8> + '_ {
        self.children.iter().copied().filter(|&c| c != 0)
    }

    /// Whether another child can be accepted.
    #[must_use]
    pub fn has_free_child_slot(&self) -> bool {
        self.children.contains(&0)
    }

    /// Take a child slot for `child`. Returns `false` if the table is full.
    pub fn add_child(&mut self, child: u8) -> bool {
        if self.children.contains(&child) {
            return true;
        }
        match self.children.iter_mut().find(|slot| **slot == 0) {
            Some(slot) => {
                *slot = child;
                true
            }
            None => false,
        }
    }

    /// Free the slot held by `child`, if any.
    pub fn remove_child(&mut self, child: u8) {
        for slot in &mut self.children {
            if *slot == child {
                *slot = 0;
            }
        }
    }

    /// Neighbours a group message is flooded to: every child and the parent,
    /// minus the neighbour it came from.
    #[must_use]
    pub fn flood_targets(&self, sender: Option<u8>) -> Vec<u8> {
        self.children()
            .chain(self.parent)
            .filter(|&hop| Some(hop) != sender)
            .collect()
    }

    /// Lowest ID in `1..=254` without a routing entry.
    #[must_use]
    pub fn lowest_unused_id(&self) -> Option<u8> {
        (1..DISCOVERY_CHANNEL).find(|id| !self.routing_table.contains_key(id))
    }

    /// Number of routing entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routing_table.len()
    }

    /// Whether the routing table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routing_table.is_empty()
    }
}
