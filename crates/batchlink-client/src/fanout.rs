// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Multi-shard fan-out and outcome aggregation.

use std::time::Duration;

use batchlink_protocol::{ReplyChoice, Request};
use tracing::{debug, warn};

use crate::error::{BatchError, codes};
use crate::executor::execute_on_shard;
use crate::registry::{Connection, ShardSlot};
use crate::topology::ShardEndpoint;
use crate::transport::Transport;

/// What happened on one shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardStatus {
    /// Reply with status `0`.
    Succeeded,
    /// Non-zero status or failed exchange.
    Failed(BatchError),
    /// The shard could not be connected.
    Unreachable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardOutcome {
    pub index: usize,
    pub endpoint: ShardEndpoint,
    pub status: ShardStatus,
}

/// Per-shard outcomes of one logical operation, in registry order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateOutcome {
    outcomes: Vec<ShardOutcome>,
}

impl AggregateOutcome {
    pub fn new(outcomes: Vec<ShardOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &[ShardOutcome] {
        &self.outcomes
    }

    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, ShardStatus::Succeeded))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ShardStatus::Failed(_)))
    }

    pub fn unreachable(&self) -> usize {
        self.count(|s| matches!(s, ShardStatus::Unreachable(_)))
    }

    fn count(&self, pred: impl Fn(&ShardStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    /// Error of the whole operation: `NO_CONNECTION` when no shard was
    /// reached, otherwise the last failure in registry order.
    pub fn error(&self) -> Option<BatchError> {
        if self.succeeded() + self.failed() == 0 {
            return Some(BatchError::NoConnection(format!(
                "none of {} servers reachable",
                self.attempted()
            )));
        }
        self.outcomes.iter().rev().find_map(|o| match &o.status {
            ShardStatus::Failed(e) => Some(e.clone()),
            _ => None,
        })
    }

    /// Scalar code of the whole operation, `0` on success.
    pub fn code(&self) -> i32 {
        self.error().map_or(codes::NONE, |e| e.code())
    }

    pub fn into_result(self) -> Result<(), BatchError> {
        match self.error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Run `request` on one shard, connecting it first if needed.
pub(crate) async fn run_on_shard(
    connection: &Connection,
    slot: &mut ShardSlot,
    transport: &dyn Transport,
    request: &Request,
    expected: &[ReplyChoice],
    timeout: Duration,
) -> ShardOutcome {
    let status = match slot.connect(transport).await {
        Err(e) => {
            warn!(shard = slot.index, endpoint = %slot.endpoint, error = %e, "shard unreachable");
            ShardStatus::Unreachable(e.to_string())
        }
        Ok(()) => match execute_on_shard(connection, slot, request, expected, timeout).await {
            Ok(reply) if reply.is_success() => ShardStatus::Succeeded,
            Ok(reply) => {
                let text = reply.message().map(str::to_string);
                warn!(shard = slot.index, code = reply.code, "shard rejected request");
                ShardStatus::Failed(BatchError::server(reply.code, text))
            }
            Err(e) => ShardStatus::Failed(e),
        },
    };

    ShardOutcome {
        index: slot.index,
        endpoint: slot.endpoint.clone(),
        status,
    }
}

/// Run `request` on every shard in registry order.
///
/// Shards are contacted one after another; an unreachable or failing shard
/// never stops the walk, so the result holds one record per shard.
pub(crate) async fn fan_out(
    connection: &Connection,
    shards: &mut [ShardSlot],
    transport: &dyn Transport,
    request: &Request,
    expected: &[ReplyChoice],
    timeout: Duration,
) -> AggregateOutcome {
    let mut outcomes = Vec::with_capacity(shards.len());
    for slot in shards.iter_mut() {
        outcomes.push(run_on_shard(connection, slot, transport, request, expected, timeout).await);
    }

    let aggregate = AggregateOutcome::new(outcomes);
    debug!(
        attempted = aggregate.attempted(),
        succeeded = aggregate.succeeded(),
        failed = aggregate.failed(),
        unreachable = aggregate.unreachable(),
        "fan-out finished"
    );
    aggregate
}
