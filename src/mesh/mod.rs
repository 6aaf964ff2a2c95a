//! Treemesh device layer
//!
//! Everything a single node needs to take part in the tree: the
//! [`NetworkDevice`] engine, its discovery and benchmark state machines,
//! routing tables, timers and the collaborator traits it is driven through.

mod benchmark;
mod config;
mod device;
mod discovery;
mod link;
mod routing;
mod timer;

pub use benchmark::{BenchmarkResult, ConnectionBenchmark, ConnectionBenchmarkWrapper};
pub use config::DeviceConfig;
pub use device::{NetworkDevice, ReceivedPayload};
pub use discovery::{Discovery, DiscoveryState, FoundDevice};
pub use link::{Clock, LinkAdapter, SystemClock};
pub use routing::{MAX_CHILDREN, Routes};
pub use timer::Timer;
