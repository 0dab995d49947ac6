//! Scenario tests for the reaction engine.
//!
//! - `identity.rs`   - Content-derived keys, redelivery, collisions
//! - `reconcile.rs`  - Insert/Update/Delete through the engine
//! - `reload.rs`     - Snapshot replacement and its failure modes
//! - `projection.rs` - Frames as consumers see them
//! - `live.rs`       - Fan-out, detach, pruning
//! - `batch.rs`      - Multi-target requests
//! - `lifecycle.rs`  - Listener memoization, health, dispose

mod batch;
mod identity;
mod live;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value as Json};

use crate::{Engine, MemoryTransport, QueryId, QueryResponse, QueryStream, TargetQuery};

pub(crate) fn setup() -> (Arc<Engine>, MemoryTransport) {
    let transport = MemoryTransport::new();
    let engine = Engine::new("mem://hub", Arc::new(transport.clone()));
    (engine, transport)
}

pub(crate) fn insert(after: Json) -> Json {
    json!({"op": "i", "payload": {"after": after}})
}

pub(crate) fn update(before: Json, after: Json) -> Json {
    json!({"op": "u", "payload": {"before": before, "after": after}})
}

pub(crate) fn delete(before: Json) -> Json {
    json!({"op": "d", "payload": {"before": before}})
}

/// Waits for the next response, failing the test after a second.
pub(crate) async fn next(stream: &mut QueryStream) -> QueryResponse {
    tokio::time::timeout(Duration::from_secs(1), stream.recv())
        .await
        .expect("timed out waiting for a response")
        .expect("stream ended")
}

/// Opens a single-target stream and consumes its setup response.
pub(crate) async fn open(engine: &Arc<Engine>, query_id: &str) -> QueryStream {
    let mut stream = engine.query(TargetQuery::new(query_id).into()).await.unwrap();
    let ready = next(&mut stream).await;
    assert_eq!(ready.key, query_id);
    stream
}

pub(crate) fn q(id: &str) -> QueryId {
    QueryId::from(id)
}

/// Basic workflow demonstrating the change path end to end.
#[tokio::test]
async fn basic_workflow() {
    let (engine, transport) = setup();
    let mut stream = open(&engine, "orders").await;

    transport.push(&q("orders"), insert(json!({"id": 1, "status": "new"})));
    let response = next(&mut stream).await;
    assert_eq!(response.key, "orders");
    assert_eq!(response.data[0].row_count(), 1);

    transport.push(
        &q("orders"),
        update(json!({"id": 1}), json!({"id": 1, "status": "paid"})),
    );
    let response = next(&mut stream).await;
    assert_eq!(
        response.data[0].field("status").unwrap().values,
        vec![crate::Value::from("paid")]
    );

    transport.push(&q("orders"), delete(json!({"id": 1})));
    let response = next(&mut stream).await;
    assert_eq!(response.data[0].name, "Query orders (empty)");
}
