// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Builders for client-side requests.

use batchlink_protocol::{
    Attribute, BatchFunction, ManagerCommand, ObjectType, Request, RequestBody,
};

/// Extension string that asks the server to delete unconditionally.
pub const FORCE_EXTEND: &str = "force";

/// Kind of object a delete request removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteTarget {
    #[default]
    Job,
    Reservation,
}

impl DeleteTarget {
    pub fn function(self) -> BatchFunction {
        match self {
            DeleteTarget::Job => BatchFunction::DeleteJob,
            DeleteTarget::Reservation => BatchFunction::DeleteReservation,
        }
    }

    pub fn object_type(self) -> ObjectType {
        match self {
            DeleteTarget::Job => ObjectType::Job,
            DeleteTarget::Reservation => ObjectType::Reservation,
        }
    }
}

/// Delete of one or more jobs or reservations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    target: DeleteTarget,
    names: Vec<String>,
    attributes: Vec<Attribute>,
    extend: Option<String>,
}

impl DeleteRequest {
    pub fn new<I, S>(target: DeleteTarget, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            target,
            names: names.into_iter().map(Into::into).collect(),
            attributes: Vec::new(),
            extend: None,
        }
    }

    pub fn jobs<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(DeleteTarget::Job, names)
    }

    pub fn reservations<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(DeleteTarget::Reservation, names)
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_extend(mut self, extend: impl Into<String>) -> Self {
        self.extend = Some(extend.into());
        self
    }

    /// Delete even if the server would normally refuse.
    pub fn force(self) -> Self {
        self.with_extend(FORCE_EXTEND)
    }

    pub fn target(&self) -> DeleteTarget {
        self.target
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn extend(&self) -> Option<&str> {
        self.extend.as_deref()
    }

    pub(crate) fn into_request(self, user: &str) -> Request {
        Request::new(
            self.target.function(),
            user,
            RequestBody::Manage {
                command: ManagerCommand::Delete,
                object_type: self.target.object_type(),
                object_names: self.names,
                attributes: self.attributes,
            },
            self.extend,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_jobs_request() {
        let request = DeleteRequest::jobs(["12.server", "13.server"])
            .with_attribute(Attribute::set("comment", "cleanup"))
            .force()
            .into_request("root");

        assert_eq!(request.function(), BatchFunction::DeleteJob);
        assert_eq!(request.object_type(), ObjectType::Job);
        assert_eq!(request.command(), Some(ManagerCommand::Delete));
        assert_eq!(request.extend(), Some(FORCE_EXTEND));
        assert_eq!(request.attributes().len(), 1);
        match request.body() {
            RequestBody::Manage { object_names, .. } => {
                assert_eq!(object_names, &["12.server", "13.server"]);
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn test_delete_reservation_target() {
        let request = DeleteRequest::reservations(vec!["R5.server".to_string()]);
        assert_eq!(request.target(), DeleteTarget::Reservation);
        assert_eq!(request.extend(), None);
        let request = request.into_request("alice");
        assert_eq!(request.function(), BatchFunction::DeleteReservation);
        assert_eq!(request.object_type(), ObjectType::Reservation);
        assert_eq!(request.user(), "alice");
    }
}
