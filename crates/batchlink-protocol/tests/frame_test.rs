// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Frame encoding/decoding tests for batchlink-protocol.

use batchlink_protocol::batch_proto::{BatchReply, NullReply, batch_reply::Choice};
use batchlink_protocol::frame::{Frame, FrameError, HEADER_SIZE, MessageType};
use bytes::{BufMut, BytesMut};

#[test]
fn test_message_type_conversions() {
    assert_eq!(MessageType::try_from(1u16).unwrap(), MessageType::Request);
    assert_eq!(MessageType::try_from(2u16).unwrap(), MessageType::Reply);
    assert!(MessageType::try_from(0u16).is_err());
    assert!(MessageType::try_from(6u16).is_err());
}

#[test]
fn test_reply_frame_header_format() {
    let msg = BatchReply {
        code: 15031,
        auxcode: 0,
        choice: Some(Choice::Text("protocol error".to_string())),
    };
    let frame = Frame::reply(&msg).unwrap();
    let encoded = frame.encode();

    assert_eq!(encoded.len(), HEADER_SIZE + frame.payload.len());
    assert_eq!(&encoded[4..6], &(MessageType::Reply as u16).to_be_bytes());

    let decoded = Frame::decode_from_bytes(encoded).unwrap();
    let reply: BatchReply = decoded.decode().unwrap();
    assert_eq!(reply, msg);
}

#[test]
fn test_decode_garbage_payload() {
    let mut bytes = BytesMut::new();
    bytes.put_u32(3);
    bytes.put_u16(2);
    bytes.put(&[0xff, 0xff, 0xff][..]);

    let frame = Frame::decode_from_bytes(bytes.freeze()).unwrap();
    let result: Result<BatchReply, FrameError> = frame.decode();
    assert!(matches!(result, Err(FrameError::Decode(_))));
}

#[test]
fn test_empty_null_reply_is_small() {
    let msg = BatchReply {
        code: 0,
        auxcode: 0,
        choice: Some(Choice::Null(NullReply {})),
    };
    let frame = Frame::reply(&msg).unwrap();
    assert!(frame.payload.len() <= 4);
    let reply: BatchReply = frame.decode().unwrap();
    assert!(matches!(reply.choice, Some(Choice::Null(_))));
}
