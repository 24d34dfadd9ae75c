// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transport seam between the engine and the network.
//!
//! The engine talks to shards only through [`Transport`] and [`Channel`].
//! [`QuicTransport`] is the production implementation; tests plug in an
//! in-memory one.

use std::time::Duration;

use async_trait::async_trait;
use batchlink_protocol::{Exchange, Frame, LinkConfig, ServerLink};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::ClientConfig;
use crate::topology::ShardEndpoint;

/// Errors raised by a transport or one of its channels.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {endpoint} failed: {reason}")]
    Connect {
        endpoint: ShardEndpoint,
        reason: String,
    },

    #[error("send failed: {0}")]
    Send(String),

    #[error("flush failed: {0}")]
    Flush(String),

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("channel closed")]
    Closed,
}

/// Opens channels to shards.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, endpoint: &ShardEndpoint) -> Result<Box<dyn Channel>, TransportError>;
}

/// A connected channel to one shard. One exchange is `send`, `flush`, then
/// exactly one `receive`.
#[async_trait]
pub trait Channel: Send {
    async fn send(&mut self, frame: &Frame) -> Result<(), TransportError>;

    async fn flush(&mut self) -> Result<(), TransportError>;

    async fn receive(&mut self) -> Result<Frame, TransportError>;

    async fn close(&mut self);
}

/// QUIC transport: one connection per shard, one stream per exchange.
#[derive(Debug, Clone)]
pub struct QuicTransport {
    server_name: String,
    skip_cert_verification: bool,
    connect_timeout: Duration,
}

impl QuicTransport {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            server_name: config.server_name.clone(),
            skip_cert_verification: config.skip_cert_verification,
            connect_timeout: config.connect_timeout,
        }
    }
}

#[async_trait]
impl Transport for QuicTransport {
    #[instrument(skip(self), fields(endpoint = %endpoint))]
    async fn connect(&self, endpoint: &ShardEndpoint) -> Result<Box<dyn Channel>, TransportError> {
        let fail = |reason: String| TransportError::Connect {
            endpoint: endpoint.clone(),
            reason,
        };

        let server_addr = tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|e| fail(e.to_string()))?
            .next()
            .ok_or_else(|| fail("host did not resolve".to_string()))?;

        let link = ServerLink::new(LinkConfig {
            server_addr,
            server_name: self.server_name.clone(),
            dangerous_skip_cert_verification: self.skip_cert_verification,
            connect_timeout_ms: self.connect_timeout.as_millis() as u64,
            ..Default::default()
        })
        .map_err(|e| fail(e.to_string()))?;
        link.connect().await.map_err(|e| fail(e.to_string()))?;

        debug!(%server_addr, "shard channel open");
        Ok(Box::new(QuicChannel {
            link,
            exchange: None,
        }))
    }
}

struct QuicChannel {
    link: ServerLink,
    exchange: Option<Exchange>,
}

#[async_trait]
impl Channel for QuicChannel {
    async fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        // A fresh stream per exchange; a half-finished one is abandoned.
        let mut exchange = self
            .link
            .open_exchange()
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;
        exchange
            .send(frame)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;
        self.exchange = Some(exchange);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        self.exchange
            .as_mut()
            .ok_or(TransportError::Closed)?
            .flush()
            .map_err(|e| TransportError::Flush(e.to_string()))
    }

    async fn receive(&mut self) -> Result<Frame, TransportError> {
        let mut exchange = self.exchange.take().ok_or(TransportError::Closed)?;
        exchange
            .receive()
            .await
            .map_err(|e| TransportError::Receive(e.to_string()))
    }

    async fn close(&mut self) {
        self.exchange = None;
        self.link.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Connect {
            endpoint: ShardEndpoint::new("shard1", 15001),
            reason: "refused".to_string(),
        };
        assert_eq!(err.to_string(), "connect to shard1:15001 failed: refused");
        assert_eq!(TransportError::Closed.to_string(), "channel closed");
    }

    #[tokio::test]
    async fn test_quic_connect_unreachable() {
        let config = ClientConfig::localhost().with_connect_timeout(Duration::from_millis(100));
        let transport = QuicTransport::new(&config);
        let result = transport
            .connect(&ShardEndpoint::new("127.0.0.1", 59997))
            .await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
