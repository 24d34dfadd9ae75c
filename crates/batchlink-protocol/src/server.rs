// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Loopback batch server.
//!
//! Answers framed batch requests over QUIC with a caller-supplied closure.
//! Used by the end-to-end tests and handy as a stand-in shard during
//! development; it does not implement any scheduler semantics itself.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quinn::{Connection, ConnectionError, Endpoint, RecvStream, SendStream, ServerConfig};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::frame::{FrameError, read_frame, write_frame};
use crate::message::{CodecError, Reply, Request};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bind error: {0}")]
    Bind(#[from] std::io::Error),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("stream closed: {0}")]
    ClosedStream(#[from] quinn::ClosedStream),

    #[error("TLS error: {0}")]
    Tls(String),
}

/// Settings for a [`BatchServer`].
#[derive(Debug, Clone)]
pub struct BatchServerConfig {
    pub bind_addr: SocketAddr,
    /// PEM certificate chain
    pub cert_pem: Vec<u8>,
    /// PEM private key
    pub key_pem: Vec<u8>,
    /// Concurrent exchanges a single client may keep open
    pub max_bi_streams: u32,
    pub idle_timeout_ms: u64,
}

impl Default for BatchServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 15001)),
            cert_pem: Vec::new(),
            key_pem: Vec::new(),
            max_bi_streams: 64,
            idle_timeout_ms: 60_000,
        }
    }
}

impl BatchServerConfig {
    /// Defaults overridden by `BATCHLINK_QUIC_MAX_BI_STREAMS` and
    /// `BATCHLINK_QUIC_IDLE_TIMEOUT_MS`. Unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(streams) = env_parse("BATCHLINK_QUIC_MAX_BI_STREAMS") {
            config.max_bi_streams = streams;
        }
        if let Some(idle) = env_parse("BATCHLINK_QUIC_IDLE_TIMEOUT_MS") {
            config.idle_timeout_ms = idle;
        }
        config
    }

    /// Attach a freshly generated self-signed certificate for `localhost`.
    pub fn with_self_signed(mut self) -> Result<Self, ServerError> {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .map_err(|e| ServerError::Tls(e.to_string()))?;
        self.cert_pem = generated.cert.pem().into_bytes();
        self.key_pem = generated.key_pair.serialize_pem().into_bytes();
        Ok(self)
    }

    fn quic_config(&self) -> Result<ServerConfig, ServerError> {
        let mut pem = self.cert_pem.as_slice();
        let chain = rustls_pemfile::certs(&mut pem)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ServerError::Tls(format!("bad certificate PEM: {}", e)))?;
        if chain.is_empty() {
            return Err(ServerError::Tls("certificate PEM is empty".to_string()));
        }
        let mut pem = self.key_pem.as_slice();
        let key = rustls_pemfile::private_key(&mut pem)
            .map_err(|e| ServerError::Tls(format!("bad key PEM: {}", e)))?
            .ok_or_else(|| ServerError::Tls("key PEM is empty".to_string()))?;

        let tls = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(chain, key)
            .map_err(|e| ServerError::Tls(e.to_string()))?;
        let crypto = quinn::crypto::rustls::QuicServerConfig::try_from(tls)
            .map_err(|e| ServerError::Tls(e.to_string()))?;

        let idle = Duration::from_millis(self.idle_timeout_ms)
            .try_into()
            .map_err(|e| ServerError::Tls(format!("idle timeout out of range: {}", e)))?;
        let mut transport = quinn::TransportConfig::default();
        transport
            .max_idle_timeout(Some(idle))
            .max_concurrent_bidi_streams(self.max_bi_streams.into());

        let mut config = ServerConfig::with_crypto(Arc::new(crypto));
        config.transport_config(Arc::new(transport));
        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.parse().ok()
}

/// QUIC endpoint that answers batch requests.
pub struct BatchServer {
    endpoint: Endpoint,
}

impl BatchServer {
    pub fn new(config: BatchServerConfig) -> Result<Self, ServerError> {
        let endpoint = Endpoint::server(config.quic_config()?, config.bind_addr)?;
        info!(addr = %endpoint.local_addr()?, "batch server listening");
        Ok(Self { endpoint })
    }

    /// Self-signed server on `bind_addr`; QUIC tuning comes from the environment.
    pub fn localhost(bind_addr: SocketAddr) -> Result<Self, ServerError> {
        let config = BatchServerConfig {
            bind_addr,
            ..BatchServerConfig::from_env()
        };
        Self::new(config.with_self_signed()?)
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.endpoint.local_addr()?)
    }

    /// Stop accepting; open connections are closed and [`serve`](Self::serve) returns.
    pub fn close(&self) {
        self.endpoint.close(0u32.into(), b"server closing");
    }

    /// Answer every batch request with `handler` until the server is closed.
    ///
    /// Each connection and each exchange runs on its own task, so a slow
    /// handler only holds up its own reply.
    pub async fn serve<H, Fut>(&self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Reply> + Send + 'static,
    {
        while let Some(incoming) = self.endpoint.accept().await {
            let handler = handler.clone();
            tokio::spawn(async move {
                match incoming.await {
                    Ok(connection) => serve_connection(connection, handler).await,
                    Err(e) => warn!("handshake failed: {}", e),
                }
            });
        }
        debug!("batch server stopped accepting");
        Ok(())
    }
}

#[instrument(skip_all, fields(remote = %connection.remote_address()))]
async fn serve_connection<H, Fut>(connection: Connection, handler: H)
where
    H: Fn(Request) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Reply> + Send + 'static,
{
    loop {
        let (send, recv) = match connection.accept_bi().await {
            Ok(streams) => streams,
            Err(ConnectionError::ApplicationClosed(_) | ConnectionError::LocallyClosed) => {
                debug!("client went away");
                return;
            }
            Err(e) => {
                warn!("connection lost: {}", e);
                return;
            }
        };
        let handler = handler.clone();
        tokio::spawn(async move {
            if let Err(e) = answer(send, recv, handler).await {
                warn!("exchange failed: {}", e);
            }
        });
    }
}

/// One exchange: read a request, reply, finish the stream.
async fn answer<H, Fut>(
    mut send: SendStream,
    mut recv: RecvStream,
    handler: H,
) -> Result<(), ServerError>
where
    H: FnOnce(Request) -> Fut,
    Fut: Future<Output = Reply>,
{
    let request = Request::decode(&read_frame(&mut recv).await?)?;
    debug!(function = ?request.function(), user = %request.user(), "batch request");
    let reply = handler(request).await;
    write_frame(&mut send, &reply.encode()?).await?;
    send.finish()?;
    Ok(())
}
