// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the batch client.

use std::time::Duration;

use crate::error::{BatchError, Result};
use crate::topology::ShardEndpoint;

const DEFAULT_SERVER: &str = "127.0.0.1:15001";

/// Configuration for the BatchClient.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Servers in registry order. More than one means a sharded deployment.
    pub servers: Vec<ShardEndpoint>,
    /// Server name for TLS verification.
    pub server_name: String,
    /// Skip TLS certificate verification (development only).
    pub skip_cert_verification: bool,
    /// Connection timeout per shard.
    pub connect_timeout: Duration,
    /// Timeout of one request/reply exchange.
    pub request_timeout: Duration,
    /// User name placed in every request header.
    pub user: String,
    /// Run the structural attribute verifier before sending requests.
    pub verify_attributes: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            servers: vec![ShardEndpoint::new("127.0.0.1", 15001)],
            server_name: "localhost".to_string(),
            skip_cert_verification: false,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            user: default_user(),
            verify_attributes: true,
        }
    }
}

fn default_user() -> String {
    std::env::var("USER")
        .ok()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "root".to_string())
}

fn parse_servers(list: &str) -> Result<Vec<ShardEndpoint>> {
    let servers = list
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.parse::<ShardEndpoint>())
        .collect::<Result<Vec<ShardEndpoint>>>()?;
    if servers.is_empty() {
        return Err(BatchError::Config("BATCHLINK_SERVERS is empty".to_string()));
    }
    Ok(servers)
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

impl ClientConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration for localhost development.
    ///
    /// This enables certificate verification skipping.
    pub fn localhost() -> Self {
        Self {
            skip_cert_verification: true,
            ..Self::default()
        }
    }

    /// Create a configuration from environment variables.
    ///
    /// Environment variables:
    /// - `BATCHLINK_SERVERS`: comma separated `host:port` list (default: "127.0.0.1:15001")
    /// - `BATCHLINK_SERVER_NAME`: Server name for TLS (default: "localhost")
    /// - `BATCHLINK_SKIP_CERT_VERIFICATION`: Skip TLS verification (default: "false")
    /// - `BATCHLINK_CONNECT_TIMEOUT_MS`: Connection timeout in milliseconds (default: 10000)
    /// - `BATCHLINK_REQUEST_TIMEOUT_MS`: Request timeout in milliseconds (default: 30000)
    /// - `BATCHLINK_USER`: Requesting user (default: `$USER`, else "root")
    /// - `BATCHLINK_VERIFY_ATTRIBUTES`: Verify attributes client-side (default: "true")
    pub fn from_env() -> Result<Self> {
        let servers = parse_servers(
            &std::env::var("BATCHLINK_SERVERS").unwrap_or_else(|_| DEFAULT_SERVER.to_string()),
        )?;

        let server_name =
            std::env::var("BATCHLINK_SERVER_NAME").unwrap_or_else(|_| "localhost".to_string());

        let skip_cert_verification = std::env::var("BATCHLINK_SKIP_CERT_VERIFICATION")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let connect_timeout_ms: u64 = std::env::var("BATCHLINK_CONNECT_TIMEOUT_MS")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .map_err(|e| {
                BatchError::Config(format!("invalid BATCHLINK_CONNECT_TIMEOUT_MS: {}", e))
            })?;

        let request_timeout_ms: u64 = std::env::var("BATCHLINK_REQUEST_TIMEOUT_MS")
            .unwrap_or_else(|_| "30000".to_string())
            .parse()
            .map_err(|e| {
                BatchError::Config(format!("invalid BATCHLINK_REQUEST_TIMEOUT_MS: {}", e))
            })?;

        let user = std::env::var("BATCHLINK_USER")
            .ok()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(default_user);

        let verify_attributes = std::env::var("BATCHLINK_VERIFY_ATTRIBUTES")
            .map(|v| parse_flag(&v))
            .unwrap_or(true);

        Ok(Self {
            servers,
            server_name,
            skip_cert_verification,
            connect_timeout: Duration::from_millis(connect_timeout_ms),
            request_timeout: Duration::from_millis(request_timeout_ms),
            user,
            verify_attributes,
        })
    }

    /// Replace the server list with a single server.
    pub fn with_server(mut self, server: ShardEndpoint) -> Self {
        self.servers = vec![server];
        self
    }

    /// Set the server list (registry order).
    pub fn with_servers(mut self, servers: Vec<ShardEndpoint>) -> Self {
        self.servers = servers;
        self
    }

    /// Set the server name for TLS.
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Enable or disable certificate verification skipping.
    pub fn with_skip_cert_verification(mut self, skip: bool) -> Self {
        self.skip_cert_verification = skip;
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_verify_attributes(mut self, verify: bool) -> Self {
        self.verify_attributes = verify;
        self
    }
}
