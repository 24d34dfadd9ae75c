// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
use std::io::Result;

fn main() -> Result<()> {
    // Batch request/reply messages carried inside frames
    prost_build::compile_protos(&["proto/batch.proto"], &["proto/"])?;
    Ok(())
}
