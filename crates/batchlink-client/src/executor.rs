// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Single-shard request executor.

use std::time::Duration;

use batchlink_protocol::{Reply, ReplyChoice, ReplyPayload, Request};
use tracing::{debug, warn};

use crate::error::BatchError;
use crate::registry::{Connection, ShardSlot};
use crate::transport::{Channel, TransportError};

/// Encode `request`, flush it and wait for exactly one reply.
///
/// Every failure comes back as a protocol error. The caller decides what
/// happens to the channel.
pub(crate) async fn execute(
    channel: &mut dyn Channel,
    request: &Request,
    expected: &[ReplyChoice],
    timeout: Duration,
) -> Result<Reply, BatchError> {
    let frame = request.encode()?;

    let exchange = async {
        channel.send(&frame).await?;
        channel.flush().await?;
        channel.receive().await
    };
    let reply_frame = tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| {
            BatchError::Protocol(format!("no reply within {}ms", timeout.as_millis()))
        })?
        .map_err(|e: TransportError| BatchError::Protocol(e.to_string()))?;

    let reply = Reply::decode(&reply_frame)?;
    drop(reply_frame);

    let choice = reply.choice();
    if !expected.contains(&choice) {
        return Err(BatchError::Protocol(format!(
            "unexpected reply choice {:?} (expected one of {:?})",
            choice, expected
        )));
    }
    Ok(reply)
}

/// Run `request` on one connected shard and attach the outcome to the
/// connection's diagnostics.
///
/// The reply code becomes the connection's error code and a text reply
/// becomes its error text. A failed exchange drops the shard's channel so
/// the next use reconnects.
pub(crate) async fn execute_on_shard(
    connection: &Connection,
    slot: &mut ShardSlot,
    request: &Request,
    expected: &[ReplyChoice],
    timeout: Duration,
) -> Result<Reply, BatchError> {
    let index = slot.index;
    let Some(channel) = slot.channel() else {
        return Err(BatchError::NoConnection(format!(
            "shard {} is not connected",
            index
        )));
    };

    debug!(shard = index, function = ?request.function(), "sending request");
    match execute(channel, request, expected, timeout).await {
        Ok(reply) => {
            debug!(shard = index, code = reply.code, choice = ?reply.choice(), "reply received");
            connection.set_error(reply.code);
            if let ReplyPayload::Text(text) = &reply.payload {
                connection.set_error_text(Some(text.clone()));
            }
            Ok(reply)
        }
        Err(e) => {
            warn!(shard = slot.index, endpoint = %slot.endpoint, error = %e, "exchange failed");
            slot.mark_disconnected();
            Err(e)
        }
    }
}
