// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed batch requests and replies, and their mapping onto the wire.
//!
//! `Request` and `Reply` are the values the client engine works with. The
//! protobuf structs in [`crate::batch_proto`] only exist at the frame
//! boundary; `encode`/`decode` convert between the two and report every
//! malformed shape as a [`CodecError`].

use thiserror::Error;

use crate::batch_proto::{self, batch_reply::Choice, batch_request::Body};
use crate::frame::{Frame, FrameError, MessageType};

/// Protocol type announced in every request header.
pub const PROTOCOL_TYPE: i32 = 2;

/// Protocol version announced in every request header.
pub const PROTOCOL_VERSION: i32 = 2;

/// Errors raised while mapping between typed values and frames.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("request has no header")]
    MissingHeader,

    #[error("request has no body")]
    MissingBody,

    #[error("reply carries no payload choice")]
    MissingChoice,

    #[error("unsupported protocol {protocol_type}/{protocol_version}")]
    UnsupportedProtocol {
        protocol_type: i32,
        protocol_version: i32,
    },

    #[error("unknown {field} value: {value}")]
    UnknownValue { field: &'static str, value: i32 },
}

/// Batch request function codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum BatchFunction {
    DeleteJob = 6,
    Manager = 9,
    Shutdown = 17,
    DeleteReservation = 71,
}

impl TryFrom<i32> for BatchFunction {
    type Error = CodecError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            6 => Ok(BatchFunction::DeleteJob),
            9 => Ok(BatchFunction::Manager),
            17 => Ok(BatchFunction::Shutdown),
            71 => Ok(BatchFunction::DeleteReservation),
            _ => Err(CodecError::UnknownValue {
                field: "function",
                value,
            }),
        }
    }
}

/// Manager sub-commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ManagerCommand {
    Create = 0,
    Delete = 1,
    Set = 2,
    Unset = 3,
    List = 4,
}

impl TryFrom<i32> for ManagerCommand {
    type Error = CodecError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ManagerCommand::Create),
            1 => Ok(ManagerCommand::Delete),
            2 => Ok(ManagerCommand::Set),
            3 => Ok(ManagerCommand::Unset),
            4 => Ok(ManagerCommand::List),
            _ => Err(CodecError::UnknownValue {
                field: "command",
                value,
            }),
        }
    }
}

/// Kinds of objects a request can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ObjectType {
    Server = 0,
    Queue = 1,
    Job = 2,
    Node = 3,
    Reservation = 4,
    Scheduler = 5,
}

impl TryFrom<i32> for ObjectType {
    type Error = CodecError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ObjectType::Server),
            1 => Ok(ObjectType::Queue),
            2 => Ok(ObjectType::Job),
            3 => Ok(ObjectType::Node),
            4 => Ok(ObjectType::Reservation),
            5 => Ok(ObjectType::Scheduler),
            _ => Err(CodecError::UnknownValue {
                field: "object_type",
                value,
            }),
        }
    }
}

/// Operation applied to an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum AttrOp {
    Set = 0,
    Unset = 1,
    Incr = 2,
    Decr = 3,
}

impl TryFrom<i32> for AttrOp {
    type Error = CodecError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AttrOp::Set),
            1 => Ok(AttrOp::Unset),
            2 => Ok(AttrOp::Incr),
            3 => Ok(AttrOp::Decr),
            _ => Err(CodecError::UnknownValue { field: "op", value }),
        }
    }
}

/// One attribute operation carried by a manage-style request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub resource: Option<String>,
    pub value: String,
    pub op: AttrOp,
}

impl Attribute {
    pub fn set(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource: None,
            value: value.into(),
            op: AttrOp::Set,
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    fn to_proto(&self) -> batch_proto::AttributeOp {
        batch_proto::AttributeOp {
            name: self.name.clone(),
            resource: self.resource.clone(),
            value: self.value.clone(),
            op: self.op as i32,
        }
    }

    fn from_proto(attr: batch_proto::AttributeOp) -> Result<Self, CodecError> {
        Ok(Self {
            name: attr.name,
            resource: attr.resource,
            value: attr.value,
            op: AttrOp::try_from(attr.op)?,
        })
    }
}

/// How a server should shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum ShutdownMode {
    #[default]
    Immediate = 0,
    Delay = 1,
    Quick = 2,
}

const SHUTDOWN_MODE_MASK: i32 = 0x0f;
const SHUTDOWN_SCHEDULER: i32 = 0x10;
const SHUTDOWN_MOMS: i32 = 0x20;
const SHUTDOWN_SECONDARY: i32 = 0x40;

/// Shutdown manner: a mode plus the companion daemons to stop with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShutdownManner {
    pub mode: ShutdownMode,
    pub scheduler: bool,
    pub moms: bool,
    pub secondary: bool,
}

impl ShutdownManner {
    pub fn new(mode: ShutdownMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn with_scheduler(mut self) -> Self {
        self.scheduler = true;
        self
    }

    pub fn with_moms(mut self) -> Self {
        self.moms = true;
        self
    }

    pub fn with_secondary(mut self) -> Self {
        self.secondary = true;
        self
    }

    /// Pack into the integer the servers expect.
    pub fn to_wire(self) -> i32 {
        let mut manner = self.mode as i32;
        if self.scheduler {
            manner |= SHUTDOWN_SCHEDULER;
        }
        if self.moms {
            manner |= SHUTDOWN_MOMS;
        }
        if self.secondary {
            manner |= SHUTDOWN_SECONDARY;
        }
        manner
    }

    pub fn from_wire(manner: i32) -> Result<Self, CodecError> {
        let mode = match manner & SHUTDOWN_MODE_MASK {
            0 => ShutdownMode::Immediate,
            1 => ShutdownMode::Delay,
            2 => ShutdownMode::Quick,
            _ => {
                return Err(CodecError::UnknownValue {
                    field: "manner",
                    value: manner,
                });
            }
        };
        Ok(Self {
            mode,
            scheduler: manner & SHUTDOWN_SCHEDULER != 0,
            moms: manner & SHUTDOWN_MOMS != 0,
            secondary: manner & SHUTDOWN_SECONDARY != 0,
        })
    }
}

/// Operation-specific part of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Shutdown(ShutdownManner),
    Manage {
        command: ManagerCommand,
        object_type: ObjectType,
        object_names: Vec<String>,
        attributes: Vec<Attribute>,
    },
}

/// A fully-formed batch request. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    function: BatchFunction,
    user: String,
    body: RequestBody,
    extend: Option<String>,
}

impl Request {
    pub fn new(
        function: BatchFunction,
        user: impl Into<String>,
        body: RequestBody,
        extend: Option<String>,
    ) -> Self {
        Self {
            function,
            user: user.into(),
            body,
            extend,
        }
    }

    /// Server shutdown request.
    pub fn shutdown(
        user: impl Into<String>,
        manner: ShutdownManner,
        extend: Option<String>,
    ) -> Self {
        Self::new(
            BatchFunction::Shutdown,
            user,
            RequestBody::Shutdown(manner),
            extend,
        )
    }

    pub fn function(&self) -> BatchFunction {
        self.function
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn extend(&self) -> Option<&str> {
        self.extend.as_deref()
    }

    /// Object type addressed by this request (shutdown addresses the server).
    pub fn object_type(&self) -> ObjectType {
        match &self.body {
            RequestBody::Shutdown(_) => ObjectType::Server,
            RequestBody::Manage { object_type, .. } => *object_type,
        }
    }

    pub fn command(&self) -> Option<ManagerCommand> {
        match &self.body {
            RequestBody::Shutdown(_) => None,
            RequestBody::Manage { command, .. } => Some(*command),
        }
    }

    pub fn attributes(&self) -> &[Attribute] {
        match &self.body {
            RequestBody::Shutdown(_) => &[],
            RequestBody::Manage { attributes, .. } => attributes,
        }
    }

    pub fn to_proto(&self) -> batch_proto::BatchRequest {
        let body = match &self.body {
            RequestBody::Shutdown(manner) => Body::Shutdown(batch_proto::ShutdownBody {
                manner: manner.to_wire(),
            }),
            RequestBody::Manage {
                command,
                object_type,
                object_names,
                attributes,
            } => Body::Manage(batch_proto::ManageBody {
                command: *command as i32,
                object_type: *object_type as i32,
                object_names: object_names.clone(),
                attributes: attributes.iter().map(Attribute::to_proto).collect(),
            }),
        };

        batch_proto::BatchRequest {
            header: Some(batch_proto::RequestHeader {
                protocol_type: PROTOCOL_TYPE,
                protocol_version: PROTOCOL_VERSION,
                request_type: self.function as i32,
                user: self.user.clone(),
            }),
            body: Some(body),
            extend: self.extend.clone(),
        }
    }

    pub fn from_proto(msg: batch_proto::BatchRequest) -> Result<Self, CodecError> {
        let header = msg.header.ok_or(CodecError::MissingHeader)?;
        if header.protocol_type != PROTOCOL_TYPE || header.protocol_version != PROTOCOL_VERSION {
            return Err(CodecError::UnsupportedProtocol {
                protocol_type: header.protocol_type,
                protocol_version: header.protocol_version,
            });
        }
        let function = BatchFunction::try_from(header.request_type)?;

        let body = match msg.body.ok_or(CodecError::MissingBody)? {
            Body::Shutdown(shutdown) => {
                RequestBody::Shutdown(ShutdownManner::from_wire(shutdown.manner)?)
            }
            Body::Manage(manage) => RequestBody::Manage {
                command: ManagerCommand::try_from(manage.command)?,
                object_type: ObjectType::try_from(manage.object_type)?,
                object_names: manage.object_names,
                attributes: manage
                    .attributes
                    .into_iter()
                    .map(Attribute::from_proto)
                    .collect::<Result<_, _>>()?,
            },
        };

        Ok(Self {
            function,
            user: header.user,
            body,
            extend: msg.extend,
        })
    }

    /// Encode into a request frame.
    pub fn encode(&self) -> Result<Frame, CodecError> {
        Ok(Frame::request(&self.to_proto())?)
    }

    /// Decode from a request frame (server side).
    pub fn decode(frame: &Frame) -> Result<Self, CodecError> {
        frame.expect_type(MessageType::Request)?;
        Self::from_proto(frame.decode()?)
    }
}

/// Per-object result of a delete request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteStatus {
    pub name: String,
    pub code: i32,
}

/// Discriminator of a reply payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyChoice {
    Null,
    Text,
    Queue,
    Locate,
    Delete,
}

/// Payload variants a reply can carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyPayload {
    Null,
    Text(String),
    Queue(String),
    Locate(String),
    Delete(Vec<DeleteStatus>),
}

impl ReplyPayload {
    pub fn choice(&self) -> ReplyChoice {
        match self {
            ReplyPayload::Null => ReplyChoice::Null,
            ReplyPayload::Text(_) => ReplyChoice::Text,
            ReplyPayload::Queue(_) => ReplyChoice::Queue,
            ReplyPayload::Locate(_) => ReplyChoice::Locate,
            ReplyPayload::Delete(_) => ReplyChoice::Delete,
        }
    }
}

/// A decoded batch reply: status code plus tagged payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: i32,
    pub auxcode: i32,
    pub payload: ReplyPayload,
}

impl Reply {
    pub fn new(code: i32, payload: ReplyPayload) -> Self {
        Self {
            code,
            auxcode: 0,
            payload,
        }
    }

    /// Empty acknowledgement with status 0.
    pub fn ok() -> Self {
        Self::new(0, ReplyPayload::Null)
    }

    pub fn text(code: i32, text: impl Into<String>) -> Self {
        Self::new(code, ReplyPayload::Text(text.into()))
    }

    pub fn choice(&self) -> ReplyChoice {
        self.payload.choice()
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Text payload, if the reply carries one.
    pub fn message(&self) -> Option<&str> {
        match &self.payload {
            ReplyPayload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn to_proto(&self) -> batch_proto::BatchReply {
        let choice = match &self.payload {
            ReplyPayload::Null => Choice::Null(batch_proto::NullReply {}),
            ReplyPayload::Text(text) => Choice::Text(text.clone()),
            ReplyPayload::Queue(job_id) => Choice::Queue(job_id.clone()),
            ReplyPayload::Locate(server) => Choice::Locate(server.clone()),
            ReplyPayload::Delete(entries) => Choice::Delete(batch_proto::DeleteStatusList {
                entries: entries
                    .iter()
                    .map(|e| batch_proto::DeleteStatus {
                        name: e.name.clone(),
                        code: e.code,
                    })
                    .collect(),
            }),
        };
        batch_proto::BatchReply {
            code: self.code,
            auxcode: self.auxcode,
            choice: Some(choice),
        }
    }

    pub fn from_proto(msg: batch_proto::BatchReply) -> Result<Self, CodecError> {
        let payload = match msg.choice.ok_or(CodecError::MissingChoice)? {
            Choice::Null(_) => ReplyPayload::Null,
            Choice::Text(text) => ReplyPayload::Text(text),
            Choice::Queue(job_id) => ReplyPayload::Queue(job_id),
            Choice::Locate(server) => ReplyPayload::Locate(server),
            Choice::Delete(list) => ReplyPayload::Delete(
                list.entries
                    .into_iter()
                    .map(|e| DeleteStatus {
                        name: e.name,
                        code: e.code,
                    })
                    .collect(),
            ),
        };
        Ok(Self {
            code: msg.code,
            auxcode: msg.auxcode,
            payload,
        })
    }

    /// Encode into a reply frame (server side).
    pub fn encode(&self) -> Result<Frame, CodecError> {
        Ok(Frame::reply(&self.to_proto())?)
    }

    /// Decode from a reply frame.
    pub fn decode(frame: &Frame) -> Result<Self, CodecError> {
        frame.expect_type(MessageType::Reply)?;
        Self::from_proto(frame.decode()?)
    }
}
