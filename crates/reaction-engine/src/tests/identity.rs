//! Row identity tests.

use serde_json::json;

use super::{insert, q, setup};
use crate::identity::derive_key;
use crate::Row;

#[tokio::test]
async fn field_order_does_not_change_identity() {
    let (engine, _transport) = setup();

    engine
        .apply_notification(&q("q1"), insert(json!({"id": 1, "name": "a", "ok": true})))
        .await
        .unwrap();
    engine
        .apply_notification(&q("q1"), insert(json!({"ok": true, "name": "a", "id": 1})))
        .await
        .unwrap();

    assert_eq!(engine.rows(&q("q1")).await.len(), 1);
}

#[tokio::test]
async fn redelivered_insert_is_absorbed() {
    let (engine, _transport) = setup();
    let event = insert(json!({"id": 7}));

    for _ in 0..3 {
        assert!(engine.apply_notification(&q("q1"), event.clone()).await.unwrap());
    }
    assert_eq!(engine.rows(&q("q1")).await.len(), 1);
}

#[tokio::test]
async fn distinct_content_is_distinct_rows() {
    let (engine, _transport) = setup();

    engine
        .apply_notification(&q("q1"), insert(json!({"id": 1})))
        .await
        .unwrap();
    engine
        .apply_notification(&q("q1"), insert(json!({"id": 1, "extra": null})))
        .await
        .unwrap();

    assert_eq!(engine.rows(&q("q1")).await.len(), 2);
}

/// djb2 collides on `h*33 + c`: bumping one unit and dropping the next by 33
/// lands on the same hash. Colliding rows share a key, so the later one wins.
#[tokio::test]
async fn colliding_rows_replace_each_other() {
    let first = Row::from_json(json!({"v": "ab"})).unwrap();
    let second = Row::from_json(json!({"v": "bA"})).unwrap();
    assert_ne!(first, second);
    assert_eq!(derive_key(&first), derive_key(&second));

    let (engine, _transport) = setup();
    engine
        .apply_notification(&q("q1"), insert(json!({"v": "ab"})))
        .await
        .unwrap();
    engine
        .apply_notification(&q("q1"), insert(json!({"v": "bA"})))
        .await
        .unwrap();

    let rows = engine.rows(&q("q1")).await;
    assert_eq!(rows, vec![second]);
}
