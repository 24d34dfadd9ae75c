// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! QUIC client helpers for talking to one batch server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quinn::{ClientConfig, Connection, Endpoint, RecvStream, SendStream, TransportConfig};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::frame::{Frame, FrameError, read_frame, write_frame};

/// Errors that can occur on a server link
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("connection error: {0}")]
    Connection(#[from] quinn::ConnectionError),

    #[error("connect error: {0}")]
    Connect(#[from] quinn::ConnectError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stream closed: {0}")]
    ClosedStream(#[from] quinn::ClosedStream),

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("no connection established")]
    NotConnected,

    #[error("exchange already flushed")]
    AlreadyFlushed,

    #[error("connection timed out after {0}ms")]
    Timeout(u64),
}

/// Settings for a [`ServerLink`].
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub server_addr: SocketAddr,
    /// Name the server certificate must carry
    pub server_name: String,
    /// Accept any server certificate. Loopback and test shards only.
    pub dangerous_skip_cert_verification: bool,
    /// 0 disables keep-alives
    pub keep_alive_interval_ms: u64,
    pub idle_timeout_ms: u64,
    /// Upper bound on the QUIC handshake
    pub connect_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 15001)),
            server_name: "localhost".to_string(),
            dangerous_skip_cert_verification: false,
            keep_alive_interval_ms: 10_000,
            idle_timeout_ms: 120_000,
            connect_timeout_ms: 10_000,
        }
    }
}

/// QUIC link to a single batch server.
///
/// One QUIC connection per server; every request/reply exchange runs on its
/// own bidirectional stream.
pub struct ServerLink {
    endpoint: Endpoint,
    connection: Mutex<Option<Connection>>,
    config: LinkConfig,
}

impl ServerLink {
    /// Bind a client endpoint. No packets are sent until [`connect`](Self::connect).
    pub fn new(config: LinkConfig) -> Result<Self, LinkError> {
        let bind_addr = if config.server_addr.is_ipv6() {
            SocketAddr::from(([0u16; 8], 0))
        } else {
            SocketAddr::from(([0, 0, 0, 0], 0))
        };
        let mut endpoint = Endpoint::client(bind_addr)?;

        let client_config = Self::build_client_config(&config)?;
        endpoint.set_default_client_config(client_config);

        Ok(Self {
            endpoint,
            connection: Mutex::new(None),
            config,
        })
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    fn build_client_config(config: &LinkConfig) -> Result<ClientConfig, LinkError> {
        let crypto = quinn::crypto::rustls::QuicClientConfig::try_from(tls_config(config))
            .map_err(|e| LinkError::Tls(e.to_string()))?;
        let mut client_config = ClientConfig::new(Arc::new(crypto));
        client_config.transport_config(Arc::new(transport_config(config)?));
        Ok(client_config)
    }

    /// Handshake with the server unless a live connection already exists.
    #[instrument(skip(self), fields(addr = %self.config.server_addr))]
    pub async fn connect(&self) -> Result<(), LinkError> {
        let mut conn_guard = self.connection.lock().await;

        if let Some(ref conn) = *conn_guard
            && conn.close_reason().is_none()
        {
            debug!("reusing existing connection");
            return Ok(());
        }

        info!("connecting to batch server");

        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let connecting = self
            .endpoint
            .connect(self.config.server_addr, &self.config.server_name)?;

        let connection = tokio::time::timeout(timeout, connecting)
            .await
            .map_err(|_| LinkError::Timeout(self.config.connect_timeout_ms))??;

        info!("connected to batch server");
        *conn_guard = Some(connection);
        Ok(())
    }

    /// Open a new request/reply exchange on a fresh bidirectional stream
    pub async fn open_exchange(&self) -> Result<Exchange, LinkError> {
        let conn = {
            let conn_guard = self.connection.lock().await;
            conn_guard.clone().ok_or(LinkError::NotConnected)?
        };
        let (send, recv) = conn.open_bi().await?;
        Ok(Exchange {
            send: Some(send),
            recv,
        })
    }

    /// Close the QUIC connection, if any. The endpoint stays usable for a later `connect`.
    pub async fn close(&self) {
        let mut conn_guard = self.connection.lock().await;
        if let Some(conn) = conn_guard.take() {
            conn.close(0u32.into(), b"client closing");
        }
    }

    pub async fn is_connected(&self) -> bool {
        let conn_guard = self.connection.lock().await;
        if let Some(ref conn) = *conn_guard {
            conn.close_reason().is_none()
        } else {
            false
        }
    }
}

fn tls_config(config: &LinkConfig) -> rustls::ClientConfig {
    let builder = rustls::ClientConfig::builder();
    if config.dangerous_skip_cert_verification {
        return builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(SkipServerVerification))
            .with_no_client_auth();
    }
    let roots = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    builder.with_root_certificates(roots).with_no_client_auth()
}

fn transport_config(config: &LinkConfig) -> Result<TransportConfig, LinkError> {
    let idle = Duration::from_millis(config.idle_timeout_ms)
        .try_into()
        .map_err(|e| LinkError::Tls(format!("idle timeout out of range: {}", e)))?;
    let mut transport = TransportConfig::default();
    transport.max_idle_timeout(Some(idle));
    let keep_alive = (config.keep_alive_interval_ms > 0)
        .then(|| Duration::from_millis(config.keep_alive_interval_ms));
    transport.keep_alive_interval(keep_alive);
    Ok(transport)
}

impl Drop for ServerLink {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.connection.try_lock()
            && let Some(conn) = guard.take()
        {
            conn.close(0u32.into(), b"client dropped");
        }
    }
}

/// One request/reply exchange on a bidirectional stream.
pub struct Exchange {
    send: Option<SendStream>,
    recv: RecvStream,
}

impl Exchange {
    /// Write a frame onto the send half
    pub async fn send(&mut self, frame: &Frame) -> Result<(), LinkError> {
        let send = self.send.as_mut().ok_or(LinkError::AlreadyFlushed)?;
        write_frame(send, frame).await?;
        Ok(())
    }

    /// Finish the send half so the server sees the complete request
    pub fn flush(&mut self) -> Result<(), LinkError> {
        let mut send = self.send.take().ok_or(LinkError::AlreadyFlushed)?;
        send.finish()?;
        Ok(())
    }

    /// Read the reply frame from the receive half
    pub async fn receive(&mut self) -> Result<Frame, LinkError> {
        Ok(read_frame(&mut self.recv).await?)
    }
}

/// Accepts every certificate and signature.
#[derive(Debug)]
struct SkipServerVerification;

impl rustls::client::danger::ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
