//! Cluster configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Interconnect protocol, passed through to every context untouched
    pub protocol: String,
    /// Address every participant advertises in the membership metadata
    pub bind_ip: String,
    /// Port of the coordinator; participant `i` gets `base_port + i`
    pub base_port: u16,
    /// Bound on each participant's part of a fan-out; `None` waits forever
    pub operation_timeout_ms: Option<u64>,
    /// Depth of each worker's request and reply queues
    pub channel_capacity: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            protocol: "UCX".to_string(),
            bind_ip: "0.0.0.0".to_string(),
            base_port: 4000,
            operation_timeout_ms: Some(30_000),
            channel_capacity: 64,
        }
    }
}

impl ClusterConfig {
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn with_bind_ip(mut self, ip: impl Into<String>) -> Self {
        self.bind_ip = ip.into();
        self
    }

    pub fn with_base_port(mut self, port: u16) -> Self {
        self.base_port = port;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Wait for participants without bound
    pub fn without_timeout(mut self) -> Self {
        self.operation_timeout_ms = None;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClusterConfig::default();
        assert_eq!(config.protocol, "UCX");
        assert_eq!(config.bind_ip, "0.0.0.0");
        assert_eq!(config.base_port, 4000);
        assert_eq!(config.operation_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_builder() {
        let config = ClusterConfig::default()
            .with_protocol("TCP")
            .with_base_port(9000)
            .with_operation_timeout(Duration::from_millis(250))
            .with_channel_capacity(8);
        assert_eq!(config.protocol, "TCP");
        assert_eq!(config.base_port, 9000);
        assert_eq!(config.operation_timeout_ms, Some(250));
        assert_eq!(config.channel_capacity, 8);

        assert_eq!(config.without_timeout().operation_timeout(), None);
    }

    #[test]
    fn test_partial_json() {
        let config: ClusterConfig =
            serde_json::from_str(r#"{"protocol": "TCP", "operation_timeout_ms": null}"#).unwrap();
        assert_eq!(config.protocol, "TCP");
        assert_eq!(config.base_port, 4000);
        assert_eq!(config.operation_timeout(), None);
    }
}
