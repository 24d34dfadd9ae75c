// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Delete: status lists, reply validation, verification and routing.

mod common;

use batchlink_client::{
    AttrOp, Attribute, BatchError, ConnectionHandle, DeleteRequest, DeleteStatus, Reply,
    ReplyPayload, codes, context,
};
use common::{Behavior, EventKind, MockTransport, client, endpoint, unverified_client};

fn statuses() -> Vec<DeleteStatus> {
    vec![
        DeleteStatus {
            name: "12.server".to_string(),
            code: 0,
        },
        DeleteStatus {
            name: "13.server".to_string(),
            code: 15001,
        },
    ]
}

#[tokio::test]
async fn test_delete_returns_status_list() {
    let transport = MockTransport::new();
    transport.push(
        &endpoint(0),
        Behavior::Reply(Reply::new(0, ReplyPayload::Delete(statuses()))),
    );
    let client = client(&transport, 1);
    let handle = client.connect().await.unwrap();

    let result = client
        .delete(handle, DeleteRequest::jobs(["12.server", "13.server"]))
        .await
        .unwrap();

    assert_eq!(result, statuses());
    assert_eq!(client.error_code(handle).unwrap(), codes::NONE);
}

#[tokio::test]
async fn test_delete_null_reply_is_empty_list() {
    let transport = MockTransport::new();
    let client = client(&transport, 1);
    let handle = client.connect().await.unwrap();

    let result = client
        .delete(handle, DeleteRequest::reservations(["R7.server"]).force())
        .await
        .unwrap();
    assert!(result.is_empty());

    let sends: Vec<EventKind> = transport
        .events()
        .into_iter()
        .filter(|e| matches!(e.kind, EventKind::Send(_)))
        .map(|e| e.kind)
        .collect();
    assert_eq!(sends, vec![EventKind::Send("force".to_string())]);
}

#[tokio::test]
async fn test_delete_error_status_without_list() {
    let transport = MockTransport::new();
    transport.push(
        &endpoint(0),
        Behavior::Reply(Reply::new(15001, ReplyPayload::Null)),
    );
    transport.push(
        &endpoint(0),
        Behavior::Reply(Reply::text(15007, "Unauthorized Request")),
    );
    let client = client(&transport, 1);
    let handle = client.connect().await.unwrap();

    let err = client
        .delete(handle, DeleteRequest::jobs(["99.server"]))
        .await
        .unwrap_err();
    assert_eq!(err, BatchError::Server { code: 15001, text: None });
    assert_eq!(client.error_code(handle).unwrap(), 15001);

    let err = client
        .delete(handle, DeleteRequest::jobs(["99.server"]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), 15007);
    assert_eq!(
        client.error_text(handle).unwrap().as_deref(),
        Some("Unauthorized Request")
    );
}

#[tokio::test]
async fn test_delete_status_list_keeps_reply_code() {
    let transport = MockTransport::new();
    let failed = vec![DeleteStatus {
        name: "1.server".to_string(),
        code: 15001,
    }];
    transport.push(
        &endpoint(0),
        Behavior::Reply(Reply::new(15001, ReplyPayload::Delete(failed.clone()))),
    );
    transport.push(
        &endpoint(0),
        Behavior::Reply(Reply::new(0, ReplyPayload::Delete(statuses()))),
    );
    let client = client(&transport, 1);
    let handle = client.connect().await.unwrap();

    let result = client
        .delete(handle, DeleteRequest::jobs(["1.server"]))
        .await
        .unwrap();
    assert_eq!(result, failed);
    assert_eq!(client.error_code(handle).unwrap(), 15001);
    assert_eq!(context::last_error(), 15001);

    client
        .delete(handle, DeleteRequest::jobs(["12.server", "13.server"]))
        .await
        .unwrap();
    assert_eq!(client.error_code(handle).unwrap(), codes::NONE);
    assert_eq!(context::last_error(), codes::NONE);
}

#[tokio::test]
async fn test_delete_rejects_unexpected_choice() {
    let transport = MockTransport::new();
    transport.push(
        &endpoint(0),
        Behavior::Reply(Reply::new(0, ReplyPayload::Locate("server2".into()))),
    );
    let client = client(&transport, 1);
    let handle = client.connect().await.unwrap();

    let err = client
        .delete(handle, DeleteRequest::jobs(["1.server"]))
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::Protocol(_)));
    assert_eq!(client.error_code(handle).unwrap(), codes::PROTOCOL);
}

#[tokio::test]
async fn test_delete_garbage_reply() {
    let transport = MockTransport::new();
    transport.push(&endpoint(0), Behavior::Garbage);
    let client = client(&transport, 1);
    let handle = client.connect().await.unwrap();

    let err = client
        .delete(handle, DeleteRequest::jobs(["1.server"]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), codes::PROTOCOL);
    assert!(client.error_text(handle).unwrap().is_some());

    // The next call reconnects and succeeds.
    client
        .delete(handle, DeleteRequest::jobs(["1.server"]))
        .await
        .unwrap();
    assert_eq!(transport.connects(), 2);
}

#[tokio::test]
async fn test_verification_failure_has_no_transport_effects() {
    let transport = MockTransport::new();
    let client = client(&transport, 1);
    let handle = client.connect().await.unwrap();

    let request = DeleteRequest::jobs(["1.server"]).with_attribute(Attribute::set("", "x"));
    let err = client.delete(handle, request).await.unwrap_err();

    assert_eq!(err.code(), codes::NO_ATTRIBUTE);
    assert_eq!(client.error_code(handle).unwrap(), codes::NO_ATTRIBUTE);
    assert!(transport.events().is_empty());
    assert!(!client.is_locked(handle).unwrap());
}

#[tokio::test]
async fn test_verification_can_be_disabled() {
    let transport = MockTransport::new();
    let client = unverified_client(&transport, 1);
    let handle = client.connect().await.unwrap();

    let mut attr = Attribute::set("comment", "not a number");
    attr.op = AttrOp::Incr;
    client
        .delete(handle, DeleteRequest::jobs(["1.server"]).with_attribute(attr))
        .await
        .unwrap();
    assert_eq!(transport.events().len(), 3);
}

#[tokio::test]
async fn test_delete_without_names() {
    let transport = MockTransport::new();
    let client = client(&transport, 1);
    let handle = client.connect().await.unwrap();

    let err = client
        .delete(handle, DeleteRequest::jobs(Vec::<String>::new()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), codes::INVALID_REQUEST);
    assert!(transport.events().is_empty());
}

#[tokio::test]
async fn test_delete_routes_to_first_reachable_shard() {
    let transport = MockTransport::new();
    transport.set_reachable(&endpoint(0), false);
    let client = client(&transport, 3);
    let handle = client.connect().await.unwrap();

    client
        .delete(handle, DeleteRequest::jobs(["5.server"]))
        .await
        .unwrap();

    let shards: Vec<String> = transport.events().into_iter().map(|e| e.shard).collect();
    assert_eq!(shards, vec!["shard1:15001"; 3]);

    // Once shard 0 comes back it is preferred again.
    transport.set_reachable(&endpoint(0), true);
    transport.clear_events();
    client
        .delete(handle, DeleteRequest::jobs(["6.server"]))
        .await
        .unwrap();
    let shards: Vec<String> = transport.events().into_iter().map(|e| e.shard).collect();
    assert_eq!(shards, vec!["shard0:15001"; 3]);
}

#[tokio::test]
async fn test_unknown_handle() {
    let transport = MockTransport::new();
    let client = client(&transport, 1);

    let err = client
        .delete(
            ConnectionHandle::from_raw(77),
            DeleteRequest::jobs(["1.server"]),
        )
        .await
        .unwrap_err();
    assert_eq!(err, BatchError::BadHandle(77));
    assert_eq!(err.code(), codes::BAD_HANDLE);
    assert!(client.error_code(ConnectionHandle::from_raw(77)).is_err());
}
