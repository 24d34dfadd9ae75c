// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Connection registry and per-connection lock discipline.
//!
//! Each [`ConnectionHandle`] owns a session (its shard slots) behind an
//! async mutex. [`ConnectionRegistry::begin`] waits for that mutex and hands
//! back a [`LockedConnection`]; dropping it is the matching `end`, so the
//! lock is released on every exit path. Handles never share a mutex, so
//! operations on different handles run fully in parallel.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

use crate::error::{BatchError, Result};
use crate::topology::ShardEndpoint;
use crate::transport::{Channel, Transport, TransportError};

/// Opaque identifier of a logical session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(u32);

impl ConnectionHandle {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection state of one shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardState {
    Disconnected,
    Connecting,
    Connected,
}

/// Error code and text last attached to a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub code: i32,
    pub text: Option<String>,
}

/// One shard of a session: its address, state and channel.
pub(crate) struct ShardSlot {
    pub(crate) index: usize,
    pub(crate) endpoint: ShardEndpoint,
    state: ShardState,
    channel: Option<Box<dyn Channel>>,
}

impl ShardSlot {
    pub(crate) fn new(index: usize, endpoint: ShardEndpoint) -> Self {
        Self {
            index,
            endpoint,
            state: ShardState::Disconnected,
            channel: None,
        }
    }

    pub(crate) fn state(&self) -> ShardState {
        self.state
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.state == ShardState::Connected && self.channel.is_some()
    }

    /// Connect unless already connected. On failure the slot is left
    /// disconnected.
    pub(crate) async fn connect(
        &mut self,
        transport: &dyn Transport,
    ) -> std::result::Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }

        self.channel = None;
        self.state = ShardState::Connecting;
        match transport.connect(&self.endpoint).await {
            Ok(channel) => {
                self.channel = Some(channel);
                self.state = ShardState::Connected;
                info!(shard = self.index, endpoint = %self.endpoint, "shard connected");
                Ok(())
            }
            Err(e) => {
                self.state = ShardState::Disconnected;
                Err(e)
            }
        }
    }

    pub(crate) fn channel(&mut self) -> Option<&mut (dyn Channel + 'static)> {
        if self.state != ShardState::Connected {
            return None;
        }
        self.channel.as_deref_mut()
    }

    /// Drop the channel after an I/O failure.
    pub(crate) fn mark_disconnected(&mut self) {
        if self.channel.take().is_some() {
            debug!(shard = self.index, endpoint = %self.endpoint, "shard marked disconnected");
        }
        self.state = ShardState::Disconnected;
    }

    /// Close the channel gracefully.
    pub(crate) async fn disconnect(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
        }
        self.state = ShardState::Disconnected;
    }
}

/// Everything guarded by a connection's lock.
pub(crate) struct Session {
    pub(crate) shards: Vec<ShardSlot>,
    closed: bool,
}

impl Session {
    pub(crate) fn new(shards: Vec<ShardSlot>) -> Self {
        Self {
            shards,
            closed: false,
        }
    }

    /// More than one shard means cluster operations fan out.
    pub(crate) fn is_sharded(&self) -> bool {
        self.shards.len() > 1
    }

    pub(crate) async fn close(&mut self) {
        for slot in &mut self.shards {
            slot.disconnect().await;
        }
        self.closed = true;
    }
}

pub(crate) struct Connection {
    pub(crate) handle: ConnectionHandle,
    session: Arc<tokio::sync::Mutex<Session>>,
    diagnostics: Mutex<Diagnostics>,
}

impl Connection {
    fn diag(&self) -> MutexGuard<'_, Diagnostics> {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_error(&self, code: i32) {
        self.diag().code = code;
    }

    pub(crate) fn set_error_text(&self, text: Option<String>) {
        self.diag().text = text;
    }

    pub(crate) fn diagnostics(&self) -> Diagnostics {
        self.diag().clone()
    }
}

/// A connection whose lock is held. Dropping it releases the lock.
pub(crate) struct LockedConnection {
    pub(crate) connection: Arc<Connection>,
    pub(crate) session: OwnedMutexGuard<Session>,
}

/// Maps handles to connections. Owned by one client; no global state.
pub(crate) struct ConnectionRegistry {
    next_handle: AtomicU32,
    connections: RwLock<HashMap<ConnectionHandle, Arc<Connection>>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self {
            next_handle: AtomicU32::new(1),
            connections: RwLock::new(HashMap::new()),
        }
    }
}

impl ConnectionRegistry {
    pub(crate) fn insert(&self, session: Session) -> ConnectionHandle {
        let handle = ConnectionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let connection = Arc::new(Connection {
            handle,
            session: Arc::new(tokio::sync::Mutex::new(session)),
            diagnostics: Mutex::new(Diagnostics::default()),
        });
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, connection);
        handle
    }

    pub(crate) fn get(&self, handle: ConnectionHandle) -> Result<Arc<Connection>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .cloned()
            .ok_or(BatchError::BadHandle(handle.0))
    }

    pub(crate) fn remove(&self, handle: ConnectionHandle) -> Option<Arc<Connection>> {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle)
    }

    /// Wait for the handle's lock.
    ///
    /// Fails with `BAD_HANDLE` when the handle is unknown or was torn down
    /// while waiting.
    pub(crate) async fn begin(&self, handle: ConnectionHandle) -> Result<LockedConnection> {
        let connection = self.get(handle)?;
        let session = connection.session.clone().lock_owned().await;
        if session.closed {
            return Err(BatchError::BadHandle(handle.0));
        }
        Ok(LockedConnection {
            connection,
            session,
        })
    }

    pub(crate) fn is_locked(&self, handle: ConnectionHandle) -> Result<bool> {
        Ok(self.get(handle)?.session.try_lock().is_err())
    }

    pub(crate) fn len(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;
    use std::time::Duration;

    fn single_session() -> Session {
        Session::new(vec![ShardSlot::new(0, ShardEndpoint::new("localhost", 15001))])
    }

    #[tokio::test]
    async fn test_begin_and_release() {
        let registry = ConnectionRegistry::default();
        let handle = registry.insert(single_session());

        let locked = registry.begin(handle).await.unwrap();
        assert!(registry.is_locked(handle).unwrap());
        drop(locked);
        assert!(!registry.is_locked(handle).unwrap());
    }

    #[tokio::test]
    async fn test_unknown_handle() {
        let registry = ConnectionRegistry::default();
        let handle = ConnectionHandle::from_raw(42);
        assert!(matches!(
            registry.begin(handle).await,
            Err(BatchError::BadHandle(42))
        ));
        assert!(registry.is_locked(handle).is_err());
    }

    #[tokio::test]
    async fn test_handles_are_unique() {
        let registry = ConnectionRegistry::default();
        let a = registry.insert(single_session());
        let b = registry.insert(single_session());
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert!(registry.remove(a).is_some());
        assert!(registry.remove(a).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_handles_do_not_block() {
        let registry = ConnectionRegistry::default();
        let a = registry.insert(single_session());
        let b = registry.insert(single_session());

        let _held = registry.begin(a).await.unwrap();
        let other = tokio::time::timeout(Duration::from_millis(200), registry.begin(b)).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn test_waiter_sees_teardown() {
        let registry = Arc::new(ConnectionRegistry::default());
        let handle = registry.insert(single_session());

        let mut locked = registry.begin(handle).await.unwrap();
        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.begin(handle).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        locked.session.close().await;
        drop(locked);
        registry.remove(handle);

        assert!(matches!(
            waiter.await.unwrap(),
            Err(BatchError::BadHandle(_))
        ));
    }

    #[test]
    fn test_diagnostics() {
        let registry = ConnectionRegistry::default();
        let handle = registry.insert(single_session());
        let connection = registry.get(handle).unwrap();
        assert_eq!(connection.diagnostics().code, codes::NONE);

        connection.set_error(15031);
        connection.set_error_text(Some("bad reply".to_string()));
        assert_eq!(
            connection.diagnostics(),
            Diagnostics {
                code: 15031,
                text: Some("bad reply".to_string())
            }
        );
    }
}
