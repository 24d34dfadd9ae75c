// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory transport for engine tests.
//!
//! Every shard follows a script of behaviors, one per exchange. Each
//! send/flush/receive is logged, and every reply buffer handed to the
//! engine is tracked so tests can check it was released.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use batchlink_client::{
    BatchClient, Channel, ClientConfig, Frame, NoVerification, Reply, Request, ShardEndpoint,
    Transport, TransportError,
};
use batchlink_protocol::MessageType;
use bytes::Bytes;

/// What a shard does for one exchange.
#[derive(Debug, Clone)]
pub enum Behavior {
    Reply(Reply),
    FailSend,
    FailFlush,
    FailReceive,
    /// Reply frame whose payload is not a valid message.
    Garbage,
    /// Never answer.
    Hang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Carries the request's extension string, used as an operation tag.
    Send(String),
    Flush,
    Receive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub shard: String,
    pub kind: EventKind,
}

struct ShardScript {
    reachable: bool,
    queue: VecDeque<Behavior>,
    fallback: Behavior,
}

impl Default for ShardScript {
    fn default() -> Self {
        Self {
            reachable: true,
            queue: VecDeque::new(),
            fallback: Behavior::Reply(Reply::ok()),
        }
    }
}

#[derive(Default)]
struct Inner {
    shards: Mutex<HashMap<String, ShardScript>>,
    events: Mutex<Vec<Event>>,
    connects: AtomicUsize,
    issued: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl Inner {
    fn log(&self, shard: &str, kind: EventKind) {
        self.events.lock().unwrap().push(Event {
            shard: shard.to_string(),
            kind,
        });
    }

    fn next_behavior(&self, shard: &str) -> Behavior {
        let mut shards = self.shards.lock().unwrap();
        let script = shards.entry(shard.to_string()).or_default();
        script
            .queue
            .pop_front()
            .unwrap_or_else(|| script.fallback.clone())
    }

    fn tracked_frame(&self, payload: Vec<u8>) -> Frame {
        self.issued.fetch_add(1, Ordering::SeqCst);
        Frame {
            message_type: MessageType::Reply,
            payload: Bytes::from_owner(TrackedBuffer {
                data: payload,
                released: self.released.clone(),
            }),
        }
    }
}

struct TrackedBuffer {
    data: Vec<u8>,
    released: Arc<AtomicUsize>,
}

impl AsRef<[u8]> for TrackedBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for TrackedBuffer {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with_script<F: FnOnce(&mut ShardScript)>(&self, endpoint: &ShardEndpoint, f: F) {
        let mut shards = self.inner.shards.lock().unwrap();
        f(shards.entry(endpoint.to_string()).or_default());
    }

    pub fn set_reachable(&self, endpoint: &ShardEndpoint, reachable: bool) {
        self.with_script(endpoint, |s| s.reachable = reachable);
    }

    /// Queue a behavior for the shard's next exchange.
    pub fn push(&self, endpoint: &ShardEndpoint, behavior: Behavior) {
        self.with_script(endpoint, |s| s.queue.push_back(behavior));
    }

    /// Behavior used once the queue is empty.
    pub fn set_fallback(&self, endpoint: &ShardEndpoint, behavior: Behavior) {
        self.with_script(endpoint, |s| s.fallback = behavior);
    }

    pub fn events(&self) -> Vec<Event> {
        self.inner.events.lock().unwrap().clone()
    }

    pub fn clear_events(&self) {
        self.inner.events.lock().unwrap().clear();
    }

    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Reply buffers handed to the engine.
    pub fn issued(&self) -> usize {
        self.inner.issued.load(Ordering::SeqCst)
    }

    /// Reply buffers the engine has dropped.
    pub fn released(&self) -> usize {
        self.inner.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, endpoint: &ShardEndpoint) -> Result<Box<dyn Channel>, TransportError> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        let shard = endpoint.to_string();
        let reachable = {
            let mut shards = self.inner.shards.lock().unwrap();
            shards.entry(shard.clone()).or_default().reachable
        };
        if !reachable {
            return Err(TransportError::Connect {
                endpoint: endpoint.clone(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(Box::new(MockChannel {
            shard,
            inner: self.inner.clone(),
            current: None,
        }))
    }
}

struct MockChannel {
    shard: String,
    inner: Arc<Inner>,
    current: Option<Behavior>,
}

#[async_trait]
impl Channel for MockChannel {
    async fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let behavior = self.inner.next_behavior(&self.shard);
        if matches!(behavior, Behavior::FailSend) {
            return Err(TransportError::Send("connection reset".to_string()));
        }
        let tag = Request::decode(frame)
            .ok()
            .and_then(|r| r.extend().map(str::to_string))
            .unwrap_or_default();
        self.inner.log(&self.shard, EventKind::Send(tag));
        self.current = Some(behavior);
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        if matches!(self.current, Some(Behavior::FailFlush)) {
            self.current = None;
            return Err(TransportError::Flush("broken pipe".to_string()));
        }
        self.inner.log(&self.shard, EventKind::Flush);
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Frame, TransportError> {
        let behavior = self.current.take().ok_or(TransportError::Closed)?;
        let frame = match behavior {
            Behavior::Reply(reply) => {
                let encoded = reply.encode().expect("reply encodes");
                self.inner.tracked_frame(encoded.payload.to_vec())
            }
            Behavior::Garbage => self.inner.tracked_frame(vec![0xff, 0xff, 0xff]),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Err(TransportError::Closed);
            }
            Behavior::FailReceive => {
                return Err(TransportError::Receive("connection reset".to_string()));
            }
            Behavior::FailSend | Behavior::FailFlush => return Err(TransportError::Closed),
        };
        self.inner.log(&self.shard, EventKind::Receive);
        Ok(frame)
    }

    async fn close(&mut self) {}
}

pub fn endpoint(index: usize) -> ShardEndpoint {
    ShardEndpoint::new(format!("shard{}", index), 15001)
}

pub fn endpoints(count: usize) -> Vec<ShardEndpoint> {
    (0..count).map(endpoint).collect()
}

pub fn config(shards: usize) -> ClientConfig {
    ClientConfig::new()
        .with_servers(endpoints(shards))
        .with_request_timeout(Duration::from_millis(300))
        .with_user("tester")
}

/// Client over `shards` mock shards with the structural verifier.
pub fn client(transport: &Arc<MockTransport>, shards: usize) -> BatchClient {
    BatchClient::new(config(shards)).with_transport(transport.clone())
}

/// Client over `shards` mock shards without attribute verification.
pub fn unverified_client(transport: &Arc<MockTransport>, shards: usize) -> BatchClient {
    client(transport, shards).with_verifier(Arc::new(NoVerification))
}
