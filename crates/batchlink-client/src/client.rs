// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! BatchClient: logical batch operations over locked connections.

use std::sync::Arc;

use batchlink_protocol::{
    DeleteStatus, Reply, ReplyChoice, ReplyPayload, Request, ShutdownManner,
};
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::context;
use crate::error::{BatchError, Result, codes};
use crate::executor::execute_on_shard;
use crate::fanout::{AggregateOutcome, fan_out, run_on_shard};
use crate::registry::{
    Connection, ConnectionHandle, ConnectionRegistry, Diagnostics, LockedConnection, Session,
    ShardSlot, ShardState,
};
use crate::request::DeleteRequest;
use crate::topology::{ShardEndpoint, StaticTopology, Topology};
use crate::transport::{QuicTransport, Transport};
use crate::verify::{AttributeVerifier, NoVerification, StructuralVerifier};

const TERMINATE_REPLIES: &[ReplyChoice] = &[ReplyChoice::Null, ReplyChoice::Text];
const DELETE_REPLIES: &[ReplyChoice] = &[ReplyChoice::Null, ReplyChoice::Text, ReplyChoice::Delete];

/// Client for one or more batch servers.
///
/// Every logical operation runs under the lock of its connection handle:
/// at most one request is in flight per handle, while different handles
/// proceed concurrently. A handle backed by several servers fans
/// cluster-wide operations out to all of them.
pub struct BatchClient {
    config: ClientConfig,
    topology: Arc<dyn Topology>,
    transport: Arc<dyn Transport>,
    verifier: Arc<dyn AttributeVerifier>,
    registry: ConnectionRegistry,
}

impl BatchClient {
    /// Create a client with QUIC transport and the configured server list.
    pub fn new(config: ClientConfig) -> Self {
        let transport: Arc<dyn Transport> = Arc::new(QuicTransport::new(&config));
        let topology: Arc<dyn Topology> = Arc::new(StaticTopology::new(config.servers.clone()));
        let verifier: Arc<dyn AttributeVerifier> = if config.verify_attributes {
            Arc::new(StructuralVerifier)
        } else {
            Arc::new(NoVerification)
        };

        Self {
            config,
            topology,
            transport,
            verifier,
            registry: ConnectionRegistry::default(),
        }
    }

    /// Create a client from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(ClientConfig::from_env()?))
    }

    /// Create a client for localhost development.
    pub fn localhost() -> Self {
        Self::new(ClientConfig::localhost())
    }

    /// Replace the transport used for new shard connections.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Replace the topology consulted by [`connect`](Self::connect).
    pub fn with_topology(mut self, topology: Arc<dyn Topology>) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn AttributeVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Number of open connection handles.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    /// Open a logical connection.
    ///
    /// A single server must be reachable. With several servers every shard
    /// is tried and at least one must answer; the rest are retried lazily.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<ConnectionHandle> {
        context::ensure()?;
        let result = self.open_session().await;
        context::record(result.as_ref().err().map_or(codes::NONE, BatchError::code));
        result
    }

    async fn open_session(&self) -> Result<ConnectionHandle> {
        let count = self.topology.shard_count();
        if count == 0 {
            return Err(BatchError::NoServer);
        }

        let mut shards = Vec::with_capacity(count);
        for index in 0..count {
            let endpoint = self.topology.shard_descriptor(index).ok_or_else(|| {
                BatchError::Config(format!("topology has no descriptor for shard {}", index))
            })?;
            shards.push(ShardSlot::new(index, endpoint));
        }

        let mut reachable = 0;
        let mut last_failure = None;
        for slot in &mut shards {
            match slot.connect(&*self.transport).await {
                Ok(()) => reachable += 1,
                Err(e) => {
                    warn!(
                        shard = slot.index,
                        endpoint = %slot.endpoint,
                        error = %e,
                        "shard unreachable"
                    );
                    last_failure = Some(e.to_string());
                }
            }
        }
        if reachable == 0 {
            return Err(BatchError::NoConnection(
                last_failure.unwrap_or_else(|| "no shard reachable".to_string()),
            ));
        }

        let handle = self.registry.insert(Session::new(shards));
        info!(%handle, shards = count, reachable, "connected to batch servers");
        Ok(handle)
    }

    /// Close every shard of `handle` and forget it.
    ///
    /// Waits for an operation in progress on the handle to finish first.
    #[instrument(skip(self))]
    pub async fn disconnect(&self, handle: ConnectionHandle) -> Result<()> {
        context::ensure()?;
        let mut locked = match self.registry.begin(handle).await {
            Ok(locked) => locked,
            Err(e) => return reject(None, e),
        };
        locked.session.close().await;
        drop(locked);
        self.registry.remove(handle);

        info!("disconnected");
        context::record(codes::NONE);
        Ok(())
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Shut down the server, or every server of a sharded handle.
    ///
    /// Returns the error of the last failing shard when any shard failed,
    /// and `NO_CONNECTION` when no shard could be reached.
    pub async fn terminate(
        &self,
        handle: ConnectionHandle,
        manner: ShutdownManner,
        extend: Option<&str>,
    ) -> Result<()> {
        self.terminate_with_outcome(handle, manner, extend)
            .await?
            .into_result()
    }

    /// Like [`terminate`](Self::terminate), but returns every shard's outcome.
    ///
    /// Errors are returned directly only when the request never reached the
    /// shards (verification, unknown handle).
    #[instrument(skip(self))]
    pub async fn terminate_with_outcome(
        &self,
        handle: ConnectionHandle,
        manner: ShutdownManner,
        extend: Option<&str>,
    ) -> Result<AggregateOutcome> {
        context::ensure()?;
        let request = Request::shutdown(
            self.config.user.as_str(),
            manner,
            extend.map(str::to_string),
        );
        if let Err(e) = self.verify(handle, &request) {
            return reject(self.registry.get(handle).ok(), e);
        }

        let mut locked = match self.registry.begin(handle).await {
            Ok(locked) => locked,
            Err(e) => return reject(None, e),
        };
        let connection = locked.connection.clone();
        connection.set_error_text(None);

        let timeout = self.config.request_timeout;
        let transport = &*self.transport;
        let session = &mut *locked.session;
        let outcome = if session.is_sharded() {
            fan_out(
                &connection,
                &mut session.shards,
                transport,
                &request,
                TERMINATE_REPLIES,
                timeout,
            )
            .await
        } else {
            let mut outcomes = Vec::with_capacity(1);
            for slot in session.shards.iter_mut() {
                outcomes.push(
                    run_on_shard(&connection, slot, transport, &request, TERMINATE_REPLIES, timeout)
                        .await,
                );
            }
            AggregateOutcome::new(outcomes)
        };

        settle(&connection, outcome.error().as_ref().map_or(Ok(codes::NONE), Err));
        Ok(outcome)
    }

    /// Delete jobs or reservations.
    ///
    /// The request goes to one server: the first shard in registry order
    /// that is connected or can be connected. Returns the per-object status
    /// list when the server sends one.
    #[instrument(skip(self, request), fields(objects = request.names().len()))]
    pub async fn delete(
        &self,
        handle: ConnectionHandle,
        request: DeleteRequest,
    ) -> Result<Vec<DeleteStatus>> {
        context::ensure()?;
        if request.names().is_empty() {
            return reject(
                self.registry.get(handle).ok(),
                BatchError::invalid("no object names given"),
            );
        }
        let request = request.into_request(&self.config.user);
        if let Err(e) = self.verify(handle, &request) {
            return reject(self.registry.get(handle).ok(), e);
        }

        let mut locked = match self.registry.begin(handle).await {
            Ok(locked) => locked,
            Err(e) => return reject(None, e),
        };
        locked.connection.set_error_text(None);

        let result = self.delete_locked(&mut locked, &request).await;
        settle(&locked.connection, result.as_ref().map(|(code, _)| *code));
        result.map(|(_, statuses)| statuses)
    }

    async fn delete_locked(
        &self,
        locked: &mut LockedConnection,
        request: &Request,
    ) -> Result<(i32, Vec<DeleteStatus>)> {
        let connection = locked.connection.clone();
        let slot = route(&mut locked.session.shards, &*self.transport).await?;
        let reply = execute_on_shard(
            &connection,
            slot,
            request,
            DELETE_REPLIES,
            self.config.request_timeout,
        )
        .await?;

        let Reply { code, payload, .. } = reply;
        match payload {
            // A status list is returned whatever the reply code; the code stays on the handle.
            ReplyPayload::Delete(statuses) => Ok((code, statuses)),
            ReplyPayload::Null | ReplyPayload::Text(_) if code == codes::NONE => {
                Ok((code, Vec::new()))
            }
            ReplyPayload::Null => Err(BatchError::server(code, None)),
            ReplyPayload::Text(text) => Err(BatchError::server(code, Some(text))),
            other => Err(BatchError::Protocol(format!(
                "unexpected reply choice {:?}",
                other.choice()
            ))),
        }
    }

    fn verify(&self, handle: ConnectionHandle, request: &Request) -> Result<()> {
        self.verifier.verify(
            handle,
            request.function(),
            request.object_type(),
            request.command(),
            request.attributes(),
        )
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Error code of the last operation on `handle`.
    pub fn error_code(&self, handle: ConnectionHandle) -> Result<i32> {
        Ok(self.registry.get(handle)?.diagnostics().code)
    }

    /// Error text of the last operation on `handle`, if any.
    pub fn error_text(&self, handle: ConnectionHandle) -> Result<Option<String>> {
        Ok(self.registry.get(handle)?.diagnostics().text)
    }

    pub fn diagnostics(&self, handle: ConnectionHandle) -> Result<Diagnostics> {
        Ok(self.registry.get(handle)?.diagnostics())
    }

    pub fn set_connection_error(&self, handle: ConnectionHandle, code: i32) -> Result<()> {
        self.registry.get(handle)?.set_error(code);
        Ok(())
    }

    pub fn set_connection_error_text(
        &self,
        handle: ConnectionHandle,
        text: Option<String>,
    ) -> Result<()> {
        self.registry.get(handle)?.set_error_text(text);
        Ok(())
    }

    /// Whether an operation currently holds the handle's lock.
    pub fn is_locked(&self, handle: ConnectionHandle) -> Result<bool> {
        self.registry.is_locked(handle)
    }

    /// Connection state of every shard, in registry order.
    ///
    /// Waits for the handle's lock.
    pub async fn shard_states(
        &self,
        handle: ConnectionHandle,
    ) -> Result<Vec<(ShardEndpoint, ShardState)>> {
        let locked = self.registry.begin(handle).await?;
        Ok(locked
            .session
            .shards
            .iter()
            .map(|slot| (slot.endpoint.clone(), slot.state()))
            .collect())
    }
}

/// First shard in registry order that is connected or can be connected.
async fn route<'a>(
    shards: &'a mut [ShardSlot],
    transport: &dyn Transport,
) -> Result<&'a mut ShardSlot> {
    let mut last_failure = None;
    for slot in shards.iter_mut() {
        match slot.connect(transport).await {
            Ok(()) => return Ok(slot),
            Err(e) => {
                warn!(
                    shard = slot.index,
                    endpoint = %slot.endpoint,
                    error = %e,
                    "shard unreachable"
                );
                last_failure = Some(e.to_string());
            }
        }
    }
    Err(BatchError::NoConnection(
        last_failure.unwrap_or_else(|| "no shard reachable".to_string()),
    ))
}

/// Attach the outcome of an operation to the connection and the thread.
fn settle(connection: &Connection, result: std::result::Result<i32, &BatchError>) {
    let code = match result {
        Ok(code) => code,
        Err(e) => e.code(),
    };
    connection.set_error(code);
    if let Err(e @ BatchError::Protocol(_)) = result {
        connection.set_error_text(Some(e.to_string()));
    }
    context::record(code);
    debug!(handle = %connection.handle, code, "operation finished");
}

/// Fail an operation that never took the connection lock.
fn reject<T>(connection: Option<Arc<Connection>>, error: BatchError) -> Result<T> {
    if let Some(connection) = connection {
        connection.set_error(error.code());
    }
    context::record(error.code());
    Err(error)
}
