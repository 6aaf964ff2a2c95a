//! Treemesh - tree-routed mesh protocol for constrained radio devices
//!
//! Devices exchange fixed 32-byte frames with their neighbours. A hub (ID 0)
//! sits at the root of a tree; every other device discovers neighbours,
//! registers under the one closest to the hub and is assigned a 1-byte ID.
//! Messages travel up towards the hub or down along routing tables built
//! during registration, and payloads larger than one frame are fragmented.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use treemesh::mesh::{LinkAdapter, NetworkDevice, SystemClock};
//! use treemesh::protocol::Frame;
//!
//! struct Radio;
//!
//! impl LinkAdapter for Radio {
//!     fn write(&mut self, _frame: &Frame, _next_hop: u8) -> bool {
//!         // hand the frame to the radio driver
//!         true
//!     }
//!     fn read(&mut self) -> Option<(Frame, u8)> {
//!         None
//!     }
//!     fn frame_available(&self) -> bool {
//!         false
//!     }
//! }
//!
//! let mut device = NetworkDevice::new(0, Radio, SystemClock::new());
//! loop {
//!     if device.update() {
//!         if let Some(payload) = device.receive() {
//!             println!("{} bytes from {}", payload.data.len(), payload.origin);
//!         }
//!     }
//!     if device.is_registered() {
//!         device.send(treemesh::HUB_ID, &b"hello hub"[..])?;
//!     }
//! }
//! # Ok::<(), treemesh::Error>(())
//! ```
//!
//! # Features
//!
//! - **Fixed frame format** - every message fits 32-byte frames, little-endian
//! - **Fragmentation** - data and command payloads up to 255 frames
//! - **Self-organising tree** - discovery, registration and route creation
//! - **Group flooding** - messages to groups of devices
//! - **`serde` feature** - serializable configuration, results and counters

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod mesh;
pub mod protocol;

pub use mesh::{Clock, DeviceConfig, LinkAdapter, NetworkDevice, ReceivedPayload, SystemClock};
pub use protocol::{
    DISCOVERY_CHANNEL, Error, FRAME_SIZE, Frame, HUB_ID, Message, MessageType, Result,
};

/// Treemesh protocol version
pub const VERSION: &str = "0.1.0";
