// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Batchlink Client
//!
//! Request/reply engine for batch servers, with per-connection locking and
//! fan-out across sharded deployments.
//!
//! # Architecture
//!
//! - [`BatchClient`] owns a registry of connection handles. Each handle holds
//!   one shard (single server) or an ordered list of shards, behind its own
//!   lock.
//! - Point-to-point operations ([`BatchClient::delete`]) run on one shard.
//! - Cluster operations ([`BatchClient::terminate`]) visit every shard in
//!   registry order and aggregate the per-shard outcomes.
//! - The network sits behind the [`Transport`] trait; [`QuicTransport`] is the
//!   default.
//!
//! # Example
//!
//! ```no_run
//! use batchlink_client::{BatchClient, ClientConfig, DeleteRequest, ShutdownManner};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = BatchClient::new(ClientConfig::from_env()?);
//! let handle = client.connect().await?;
//!
//! let statuses = client
//!     .delete(handle, DeleteRequest::jobs(["123.server"]).force())
//!     .await?;
//! for status in statuses {
//!     println!("{}: {}", status.name, status.code);
//! }
//!
//! let outcome = client
//!     .terminate_with_outcome(handle, ShutdownManner::default(), None)
//!     .await?;
//! println!("{} of {} servers stopped", outcome.succeeded(), outcome.attempted());
//!
//! client.disconnect(handle).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
pub mod context;
mod error;
mod executor;
mod fanout;
mod registry;
mod request;
mod topology;
mod transport;
mod verify;

pub use client::BatchClient;
pub use config::ClientConfig;
pub use error::{BatchError, Result, codes};
pub use fanout::{AggregateOutcome, ShardOutcome, ShardStatus};
pub use registry::{ConnectionHandle, Diagnostics, ShardState};
pub use request::{DeleteRequest, DeleteTarget, FORCE_EXTEND};
pub use topology::{ShardEndpoint, StaticTopology, Topology};
pub use transport::{Channel, QuicTransport, Transport, TransportError};
pub use verify::{AttributeVerifier, NoVerification, StructuralVerifier};

pub use batchlink_protocol::{
    AttrOp, Attribute, BatchFunction, DeleteStatus, Frame, ManagerCommand, ObjectType, Reply,
    ReplyChoice, ReplyPayload, Request, ShutdownManner, ShutdownMode,
};
