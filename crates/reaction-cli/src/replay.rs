//! Offline replay of a change stream through the engine.
//!
//! Notifications are pushed through an in-memory transport so they take the
//! same path as live traffic: listener channel, pump, reconciler, live hub.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use reaction_config::Config;
use reaction_engine::{Engine, HealthCheck, MemoryTransport, QueryId, QueryResponse, TargetQuery};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub query_id: String,
    pub ref_id: Option<String>,
    /// JSON array of rows served by the initial reload.
    pub snapshot: Option<PathBuf>,
    /// JSONL change notifications.
    pub events: PathBuf,
    /// How long to wait for further responses once every event is pushed.
    pub idle: Duration,
}

/// Replays `options.events` and writes every response to `out` as one JSON
/// line. Returns the number of responses written.
pub async fn run_replay<W: Write>(
    config: &Config,
    options: &ReplayOptions,
    out: &mut W,
) -> anyhow::Result<usize> {
    let endpoint = config.endpoint_url()?;
    let transport = MemoryTransport::new();
    let query_id = QueryId::from(options.query_id.as_str());

    let snapshot_on_start = match &options.snapshot {
        Some(path) => {
            transport.set_snapshot(&query_id, read_snapshot(path)?);
            true
        }
        None => config.snapshot_on_start,
    };
    let events = read_events(&options.events)?;

    let engine = Engine::new(endpoint.as_str(), Arc::new(transport.clone()));
    let mut target = TargetQuery::new(query_id.clone()).with_snapshot_on_start(snapshot_on_start);
    if let Some(ref_id) = &options.ref_id {
        target = target.with_ref_id(ref_id.clone());
    }
    let mut stream = engine.query(target.into()).await?;

    let mut written = 0;
    let mut setup_error = None;
    while let Some(response) = stream.try_recv() {
        if let Some(error) = &response.error {
            setup_error = Some(error.message.clone());
        }
        write_response(out, &response)?;
        written += 1;
    }
    if let Some(message) = setup_error {
        engine.dispose();
        bail!(message);
    }

    for (index, event) in events.into_iter().enumerate() {
        let delivered = transport.push(&query_id, event);
        debug!(query_id = %query_id, index, delivered, "Notification pushed");
    }

    while let Ok(Some(response)) = tokio::time::timeout(options.idle, stream.recv()).await {
        write_response(out, &response)?;
        written += 1;
    }

    engine.dispose();
    Ok(written)
}

/// Runs the engine health check against the configured endpoint.
///
/// The in-memory transport never refuses a listener, so this only fails when
/// the endpoint URL does not parse.
pub fn check_health(config: &Config) -> anyhow::Result<HealthCheck> {
    let endpoint = config.endpoint_url()?;
    let engine = Engine::new(endpoint.as_str(), Arc::new(MemoryTransport::new()));
    let health = engine.check_health();
    engine.dispose();
    Ok(health)
}

fn read_snapshot(path: &Path) -> anyhow::Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("snapshot {} is not a JSON array", path.display()))
}

/// Blank lines are skipped. Lines that are not JSON are logged and skipped,
/// like any other malformed notification.
fn read_events(path: &Path) -> anyhow::Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read events {}", path.display()))?;

    let mut events = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(event) => events.push(event),
            Err(e) => warn!(line = index + 1, error = %e, "Skipping malformed line"),
        }
    }
    Ok(events)
}

fn write_response<W: Write>(out: &mut W, response: &QueryResponse) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *out, response)?;
    writeln!(out)?;
    Ok(())
}
