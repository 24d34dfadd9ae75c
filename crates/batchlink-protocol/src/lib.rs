// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Batchlink Protocol - batch request/reply wire layer
//!
//! This crate provides the wire protocol spoken between batch clients and
//! batch servers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    batchlink-protocol                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Typed layer: Request / Reply (message)                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Serialization: Protobuf (prost) in length-prefixed frames  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: QUIC (quinn), one stream per exchange           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use batchlink_protocol::{LinkConfig, Reply, Request, ServerLink, ShutdownManner};
//!
//! let link = ServerLink::new(LinkConfig::default())?;
//! link.connect().await?;
//!
//! let request = Request::shutdown("root", ShutdownManner::default(), None);
//! let mut exchange = link.open_exchange().await?;
//! exchange.send(&request.encode()?).await?;
//! exchange.flush()?;
//! let reply = Reply::decode(&exchange.receive().await?)?;
//! ```

pub mod client;
pub mod frame;
pub mod message;
pub mod server;

// Generated protobuf types for batch requests and replies
pub mod batch_proto {
    include!(concat!(env!("OUT_DIR"), "/batchlink.batch.rs"));
}

pub use client::{Exchange, LinkConfig, LinkError, ServerLink};
pub use frame::{Frame, FrameError, MessageType};
pub use message::{
    AttrOp, Attribute, BatchFunction, CodecError, DeleteStatus, ManagerCommand, ObjectType,
    Reply, ReplyChoice, ReplyPayload, Request, RequestBody, ShutdownManner, ShutdownMode,
};
pub use server::{BatchServer, BatchServerConfig, ServerError};
