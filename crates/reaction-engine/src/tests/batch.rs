//! Multi-target query requests.

use serde_json::json;

use super::{insert, next, q, setup};
use crate::{LoadingState, QueryRequest, TargetQuery};

#[tokio::test]
async fn blank_targets_are_skipped() {
    let (engine, _transport) = setup();
    let request = QueryRequest::new(vec![TargetQuery::new("q1"), TargetQuery::new("   ")]);

    let mut stream = engine.query(request).await.unwrap();
    let response = next(&mut stream).await;

    assert_eq!(response.state, LoadingState::Streaming);
    assert_eq!(response.key, "q1");
    assert_eq!(response.data.len(), 1);
    assert!(response.error.is_none());
}

#[tokio::test]
async fn combined_response_carries_every_frame() {
    let (engine, _transport) = setup();
    let request = QueryRequest::new(vec![
        TargetQuery::new("q1").with_ref_id("A"),
        TargetQuery::new("q2").with_ref_id("B"),
    ]);

    let mut stream = engine.query(request).await.unwrap();
    let response = next(&mut stream).await;

    assert_eq!(response.key, "q1,q2");
    let ref_ids: Vec<_> = response.data.iter().map(|f| f.ref_id.as_str()).collect();
    assert_eq!(ref_ids, vec!["A", "B"]);
    assert!(stream.try_recv().is_none());
}

#[tokio::test]
async fn no_valid_targets_is_an_immediate_error() {
    let (engine, transport) = setup();
    let request = QueryRequest::new(vec![TargetQuery::default(), TargetQuery::new(" ")]);

    let mut stream = engine.query(request).await.unwrap();
    let response = next(&mut stream).await;

    assert_eq!(response.state, LoadingState::Error);
    assert_eq!(response.key, "error");
    assert!(response.data.is_empty());
    assert_eq!(response.error.unwrap().message, "No valid query IDs provided");
    assert!(stream.recv().await.is_none());
    assert_eq!(transport.listener_count(), 0);
}

#[tokio::test]
async fn snapshot_on_start_loads_before_the_combined_response() {
    let (engine, transport) = setup();
    transport.set_snapshot(&q("q1"), vec![json!({"id": 1}), json!({"id": 2})]);

    let mut stream = engine
        .query(TargetQuery::new("q1").with_snapshot_on_start(true).into())
        .await
        .unwrap();

    let reloaded = next(&mut stream).await;
    assert_eq!(reloaded.state, LoadingState::Done);
    let ready = next(&mut stream).await;
    assert_eq!(ready.state, LoadingState::Streaming);
    assert_eq!(ready.data[0].row_count(), 2);
}

#[tokio::test]
async fn first_failure_aborts_the_batch() {
    let (engine, transport) = setup();
    transport.fail_reload(&q("q2"), "boom");
    let request = QueryRequest::new(vec![
        TargetQuery::new("q1"),
        TargetQuery::new("q2").with_snapshot_on_start(true),
        TargetQuery::new("q3"),
    ]);

    let mut stream = engine.query(request).await.unwrap();
    let response = next(&mut stream).await;

    assert_eq!(response.state, LoadingState::Error);
    assert_eq!(response.key, "q2");
    assert_eq!(
        response.error.unwrap().message,
        "Failed to setup query \"q2\": Failed to initiate reload: boom"
    );
    assert!(stream.try_recv().is_none());

    // Earlier targets stay live; later ones were never set up.
    assert_eq!(engine.subscriber_count(&q("q1")), 1);
    assert_eq!(engine.subscriber_count(&q("q3")), 0);
    assert_eq!(engine.listener_count(), 2);

    transport.push(&q("q1"), insert(json!({"id": 1})));
    assert_eq!(next(&mut stream).await.key, "q1");
}

#[tokio::test]
async fn connect_failure_is_scoped_to_the_target() {
    let (engine, transport) = setup();
    transport.fail_connect("refused");

    let mut stream = engine.query(TargetQuery::new("q1").into()).await.unwrap();
    let response = next(&mut stream).await;

    assert_eq!(response.key, "q1");
    assert_eq!(
        response.error.unwrap().message,
        "Failed to setup query \"q1\": refused"
    );
}

#[tokio::test]
async fn targets_deserialize_from_host_json() {
    let request: QueryRequest = serde_json::from_value(json!({
        "targets": [
            {"refId": "A", "queryId": "q1", "snapshotOnStart": true},
            {"queryId": "q2"}
        ]
    }))
    .unwrap();

    assert_eq!(request.targets[0].ref_id.as_deref(), Some("A"));
    assert!(request.targets[0].snapshot_on_start);
    assert!(!request.targets[1].snapshot_on_start);
    assert_eq!(request.targets[1].query_id, q("q2"));
}
