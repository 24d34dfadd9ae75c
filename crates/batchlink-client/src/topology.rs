// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Where the batch servers live.

use std::fmt;
use std::str::FromStr;

use crate::error::BatchError;

/// Address of one batch server (shard).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardEndpoint {
    pub host: String,
    pub port: u16,
}

impl ShardEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ShardEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for ShardEndpoint {
    type Err = BatchError;

    /// Parses `host:port`; IPv6 hosts are written in brackets.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| BatchError::Config(format!("missing port in server '{}'", s)))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(BatchError::Config(format!("missing host in server '{}'", s)));
        }
        let port = port
            .parse()
            .map_err(|e| BatchError::Config(format!("invalid port in server '{}': {}", s, e)))?;
        Ok(Self::new(host, port))
    }
}

/// Source of the shard layout for new connections.
pub trait Topology: Send + Sync {
    /// Number of shards; `0` means no server is known.
    fn shard_count(&self) -> usize;

    /// Address of shard `index`, for `index` in `0..shard_count()`.
    fn shard_descriptor(&self, index: usize) -> Option<ShardEndpoint>;
}

/// Fixed list of shards, usually read from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTopology {
    shards: Vec<ShardEndpoint>,
}

impl StaticTopology {
    pub fn new(shards: Vec<ShardEndpoint>) -> Self {
        Self { shards }
    }
}

impl Topology for StaticTopology {
    fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard_descriptor(&self, index: usize) -> Option<ShardEndpoint> {
        self.shards.get(index).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        let ep: ShardEndpoint = "batch1.example.com:15001".parse().unwrap();
        assert_eq!(ep, ShardEndpoint::new("batch1.example.com", 15001));
        assert_eq!(ep.to_string(), "batch1.example.com:15001");
    }

    #[test]
    fn test_parse_ipv6_endpoint() {
        let ep: ShardEndpoint = "[::1]:15001".parse().unwrap();
        assert_eq!(ep.host, "::1");
        assert_eq!(ep.to_string(), "[::1]:15001");
    }

    #[test]
    fn test_parse_endpoint_errors() {
        assert!("localhost".parse::<ShardEndpoint>().is_err());
        assert!(":15001".parse::<ShardEndpoint>().is_err());
        assert!("localhost:http".parse::<ShardEndpoint>().is_err());
    }

    #[test]
    fn test_static_topology() {
        let topology = StaticTopology::new(vec![
            ShardEndpoint::new("a", 1),
            ShardEndpoint::new("b", 2),
        ]);
        assert_eq!(topology.shard_count(), 2);
        assert_eq!(topology.shard_descriptor(1), Some(ShardEndpoint::new("b", 2)));
        assert_eq!(topology.shard_descriptor(2), None);
    }
}
