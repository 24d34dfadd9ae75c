// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for batchlink-client.
//!
//! Every [`BatchError`] maps onto a stable numeric code (see [`codes`]) so
//! that callers and logs can line up with server-side diagnostics. Status
//! codes returned by a server are carried through verbatim.

use thiserror::Error;

/// Result type using BatchError.
pub type Result<T> = std::result::Result<T, BatchError>;

/// Stable error codes.
pub mod codes {
    pub const NONE: i32 = 0;
    /// Attribute operation without a name.
    pub const NO_ATTRIBUTE: i32 = 15002;
    /// Request rejected before it reached the wire.
    pub const INVALID_REQUEST: i32 = 15004;
    /// Thread context or other internal failure.
    pub const SYSTEM: i32 = 15010;
    /// Attribute value cannot be applied with the requested operation.
    pub const BAD_ATTRIBUTE_VALUE: i32 = 15014;
    pub const PROTOCOL: i32 = 15031;
    /// Topology lists no servers at all.
    pub const NO_SERVER: i32 = 15034;
    pub const BAD_HANDLE: i32 = 15035;
    pub const NO_CONNECTION: i32 = 15137;
}

/// Errors produced by the client engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// Configuration error (missing or invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed, unexpected or missing reply, or a failed exchange.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No server could be reached.
    #[error("no connection to batch server: {0}")]
    NoConnection(String),

    /// The topology has no servers.
    #[error("no batch servers configured")]
    NoServer,

    /// Unknown or torn-down connection handle.
    #[error("unknown connection handle: {0}")]
    BadHandle(u32),

    /// Request rejected by the attribute verifier or by argument checks.
    #[error("invalid request [{code}]: {message}")]
    InvalidRequest { code: i32, message: String },

    /// Server answered with a non-zero status.
    #[error("server error [{code}]: {}", text.as_deref().unwrap_or("no message"))]
    Server { code: i32, text: Option<String> },

    /// Internal failure (thread context unavailable).
    #[error("system error: {0}")]
    System(String),
}

impl BatchError {
    /// Numeric code of this error.
    pub fn code(&self) -> i32 {
        match self {
            BatchError::Config(_) | BatchError::System(_) => codes::SYSTEM,
            BatchError::Protocol(_) => codes::PROTOCOL,
            BatchError::NoConnection(_) => codes::NO_CONNECTION,
            BatchError::NoServer => codes::NO_SERVER,
            BatchError::BadHandle(_) => codes::BAD_HANDLE,
            BatchError::InvalidRequest { code, .. } => *code,
            BatchError::Server { code, .. } => *code,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        BatchError::InvalidRequest {
            code: codes::INVALID_REQUEST,
            message: message.into(),
        }
    }

    pub(crate) fn server(code: i32, text: Option<String>) -> Self {
        BatchError::Server { code, text }
    }
}

impl From<batchlink_protocol::CodecError> for BatchError {
    fn from(err: batchlink_protocol::CodecError) -> Self {
        BatchError::Protocol(err.to_string())
    }
}

impl From<batchlink_protocol::FrameError> for BatchError {
    fn from(err: batchlink_protocol::FrameError) -> Self {
        BatchError::Protocol(err.to_string())
    }
}
