// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-thread execution context.
//!
//! Every logical operation makes sure the calling thread has a context
//! before touching a connection. The context holds the thread's last error
//! code, the batch library's equivalent of `errno`.

use std::cell::{Cell, OnceCell};

use crate::error::{BatchError, Result, codes};

#[derive(Debug)]
struct ThreadContext {
    last_error: Cell<i32>,
    operations: Cell<u64>,
}

impl ThreadContext {
    fn new() -> Self {
        Self {
            last_error: Cell::new(codes::NONE),
            operations: Cell::new(0),
        }
    }
}

thread_local! {
    static CONTEXT: OnceCell<ThreadContext> = const { OnceCell::new() };
}

/// Initialize the calling thread's context if it does not exist yet.
///
/// Fails with a system error only when thread-local storage is no longer
/// available (thread teardown).
pub fn ensure() -> Result<()> {
    CONTEXT
        .try_with(|ctx| {
            ctx.get_or_init(ThreadContext::new);
        })
        .map_err(|e| BatchError::System(format!("thread context unavailable: {}", e)))
}

/// Whether the calling thread has a context.
pub fn is_initialized() -> bool {
    CONTEXT
        .try_with(|ctx| ctx.get().is_some())
        .unwrap_or(false)
}

/// Last error code recorded on the calling thread, `0` if none.
pub fn last_error() -> i32 {
    CONTEXT
        .try_with(|ctx| ctx.get().map_or(codes::NONE, |c| c.last_error.get()))
        .unwrap_or(codes::SYSTEM)
}

/// Number of operations finished on the calling thread.
pub fn operations() -> u64 {
    CONTEXT
        .try_with(|ctx| ctx.get().map_or(0, |c| c.operations.get()))
        .unwrap_or(0)
}

/// Record the outcome of an operation on the calling thread.
pub(crate) fn record(code: i32) {
    let _ = CONTEXT.try_with(|ctx| {
        let ctx = ctx.get_or_init(ThreadContext::new);
        ctx.last_error.set(code);
        ctx.operations.set(ctx.operations.get() + 1);
    });
}
