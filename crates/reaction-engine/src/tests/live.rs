//! Live fan-out through the engine.

use serde_json::json;

use super::{insert, next, open, q, setup};
use crate::LoadingState;

#[tokio::test]
async fn every_consumer_receives_the_same_frame() {
    let (engine, transport) = setup();
    let mut first = open(&engine, "q1").await;
    let mut second = open(&engine, "q1").await;
    assert_eq!(engine.subscriber_count(&q("q1")), 2);

    transport.push(&q("q1"), insert(json!({"id": 1})));

    let a = next(&mut first).await;
    let b = next(&mut second).await;
    assert_eq!(a, b);
    assert_eq!(a.state, LoadingState::Done);
    assert_eq!(a.key, "q1");
}

#[tokio::test]
async fn consumers_only_see_their_queries() {
    let (engine, transport) = setup();
    let mut orders = open(&engine, "orders").await;
    let _users = open(&engine, "users").await;

    transport.push(&q("users"), insert(json!({"id": 1})));
    transport.push(&q("orders"), insert(json!({"id": 2})));

    let response = next(&mut orders).await;
    assert_eq!(response.key, "orders");
    assert!(orders.try_recv().is_none());
}

#[tokio::test]
async fn detaching_both_consumers_then_notify_reaches_zero() {
    let (engine, transport) = setup();
    let first = open(&engine, "q1").await;
    let second = open(&engine, "q1").await;

    drop(first);
    drop(second);
    assert_eq!(engine.subscriber_count(&q("q1")), 0);

    // The change still lands in the warm dataset.
    assert!(engine
        .apply_notification(&q("q1"), insert(json!({"id": 1})))
        .await
        .unwrap());
    assert_eq!(engine.rows(&q("q1")).await.len(), 1);
    assert_eq!(engine.listener_count(), 1);
    assert_eq!(transport.listener_count(), 1);
}

#[tokio::test]
async fn explicit_detach_keeps_queued_responses() {
    let (engine, _transport) = setup();
    let mut stream = open(&engine, "q1").await;

    engine
        .apply_notification(&q("q1"), insert(json!({"id": 1})))
        .await
        .unwrap();
    stream.detach();
    engine
        .apply_notification(&q("q1"), insert(json!({"id": 2})))
        .await
        .unwrap();

    assert_eq!(stream.try_recv().unwrap().data[0].row_count(), 1);
    assert!(stream.try_recv().is_none());
    assert_eq!(stream.query_ids().count(), 0);
}

#[tokio::test]
async fn one_detach_leaves_the_other_consumer() {
    let (engine, transport) = setup();
    let first = open(&engine, "q1").await;
    let mut second = open(&engine, "q1").await;

    drop(first);
    transport.push(&q("q1"), insert(json!({"id": 1})));

    assert_eq!(next(&mut second).await.data[0].row_count(), 1);
    assert_eq!(engine.subscriber_count(&q("q1")), 1);
}

#[tokio::test]
async fn unchanged_events_send_nothing() {
    let (engine, transport) = setup();
    let mut stream = open(&engine, "q1").await;

    transport.push(&q("q1"), json!({"op": "d", "payload": {"before": {"id": 404}}}));
    transport.push(&q("q1"), insert(json!({"id": 1})));

    // Only the insert produces a frame.
    assert_eq!(next(&mut stream).await.data[0].row_count(), 1);
    assert!(stream.try_recv().is_none());
}
