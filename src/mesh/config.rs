//! Device configuration.

/// Tunables of a [`NetworkDevice`](super::NetworkDevice).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceConfig {
    /// Time discovery keeps listening after its last probe (ms).
    pub discovery_timeout_ms: u32,
    /// Time the hub waits for the current holder of a requested ID to answer (ms).
    pub registration_ping_timeout_ms: u32,
    /// Time after which an unanswered application ping is forgotten (ms).
    pub ping_timeout_ms: u32,
    /// Pings sent to every candidate during a connection benchmark.
    pub benchmark_pings: u8,
    /// Benchmark window per candidate (ms).
    pub benchmark_timeout_ms: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            discovery_timeout_ms: 1_000,
            registration_ping_timeout_ms: 1_000,
            ping_timeout_ms: 5_000,
            benchmark_pings: 50,
            benchmark_timeout_ms: 1_000,
        }
    }
}
