// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client-side attribute verification.
//!
//! A verifier runs before the connection lock is taken and before any
//! network I/O; rejecting a request has no transport side effects.

use batchlink_protocol::{AttrOp, Attribute, BatchFunction, ManagerCommand, ObjectType};

use crate::error::{BatchError, codes};
use crate::registry::ConnectionHandle;

/// Validates the attribute list of a request before it is sent.
pub trait AttributeVerifier: Send + Sync {
    fn verify(
        &self,
        handle: ConnectionHandle,
        function: BatchFunction,
        object_type: ObjectType,
        command: Option<ManagerCommand>,
        attributes: &[Attribute],
    ) -> Result<(), BatchError>;
}

/// Accepts everything. Used when verification is turned off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVerification;

impl AttributeVerifier for NoVerification {
    fn verify(
        &self,
        _handle: ConnectionHandle,
        _function: BatchFunction,
        _object_type: ObjectType,
        _command: Option<ManagerCommand>,
        _attributes: &[Attribute],
    ) -> Result<(), BatchError> {
        Ok(())
    }
}

/// Structural checks that need no knowledge of attribute types: names are
/// present, shutdown carries no attributes, increments are numeric.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralVerifier;

impl AttributeVerifier for StructuralVerifier {
    fn verify(
        &self,
        _handle: ConnectionHandle,
        function: BatchFunction,
        _object_type: ObjectType,
        _command: Option<ManagerCommand>,
        attributes: &[Attribute],
    ) -> Result<(), BatchError> {
        if function == BatchFunction::Shutdown && !attributes.is_empty() {
            return Err(BatchError::invalid("shutdown takes no attributes"));
        }

        for attr in attributes {
            if attr.name.trim().is_empty() {
                return Err(BatchError::InvalidRequest {
                    code: codes::NO_ATTRIBUTE,
                    message: "attribute without a name".to_string(),
                });
            }
            if matches!(attr.op, AttrOp::Incr | AttrOp::Decr)
                && attr.value.trim().parse::<i64>().is_err()
            {
                return Err(BatchError::InvalidRequest {
                    code: codes::BAD_ATTRIBUTE_VALUE,
                    message: format!(
                        "attribute '{}' cannot be incremented by '{}'",
                        attr.name, attr.value
                    ),
                });
            }
        }
        Ok(())
    }
}
