//! Prometheus metrics: `lazy_static` gauges/counters, refreshed by
//! sampling the manager's status snapshots rather than wired through
//! every call site.

use lazy_static::lazy_static;
use mcp_ingest_core::{IngestorManager, IngestorState};
use prometheus::{CounterVec, GaugeVec, register_counter_vec, register_gauge_vec};
use tracing::error;

lazy_static! {
    pub static ref EVENTS_RECEIVED: CounterVec = register_counter_vec!(
        "ingestor_events_received_total",
        "Total events received by an ingestor",
        &["alias"]
    )
    .expect("failed to register ingestor_events_received_total");
    pub static ref EVENTS_DEDUPLICATED: CounterVec = register_counter_vec!(
        "ingestor_events_deduplicated_total",
        "Total events dropped as duplicates by an ingestor",
        &["alias"]
    )
    .expect("failed to register ingestor_events_deduplicated_total");
    pub static ref RECONNECTS: CounterVec = register_counter_vec!(
        "ingestor_reconnects_total",
        "Total reconnect attempts scheduled by an ingestor",
        &["alias"]
    )
    .expect("failed to register ingestor_reconnects_total");
    pub static ref STATE: GaugeVec = register_gauge_vec!(
        "ingestor_state",
        "Current lifecycle state of an ingestor (ordinal mirrors IngestorState)",
        &["alias"]
    )
    .expect("failed to register ingestor_state");
}

fn state_ordinal(state: IngestorState) -> f64 {
    match state {
        IngestorState::Stopped => 0.0,
        IngestorState::Starting => 1.0,
        IngestorState::Running => 2.0,
        IngestorState::Reconnecting => 3.0,
        IngestorState::Failed => 4.0,
    }
}

/// `CounterVec` only grows; since our sources are already-cumulative
/// totals we track the last observed value per alias and add the delta.
struct LastSeen {
    received: std::collections::HashMap<String, u64>,
    duplicates: std::collections::HashMap<String, u64>,
    reconnects: std::collections::HashMap<String, u64>,
}

fn advance(map: &mut std::collections::HashMap<String, u64>, alias: &str, total: u64) -> u64 {
    let previous = map.entry(alias.to_string()).or_insert(0);
    let delta = total.saturating_sub(*previous);
    *previous = total;
    delta
}

async fn sample_once(manager: &IngestorManager, last: &mut LastSeen) {
    for status in manager.status().await {
        let alias = status.connection.clone();
        let delta = advance(&mut last.received, &alias, status.total_events_received);
        if delta > 0 {
            EVENTS_RECEIVED.with_label_values(&[&alias]).inc_by(delta as f64);
        }
        STATE.with_label_values(&[&alias]).set(state_ordinal(status.state));
    }

    for (alias, duplicates_dropped, reconnects) in manager.counters().await {
        let dup_delta = advance(&mut last.duplicates, &alias, duplicates_dropped);
        if dup_delta > 0 {
            EVENTS_DEDUPLICATED.with_label_values(&[&alias]).inc_by(dup_delta as f64);
        }
        let reconnect_delta = advance(&mut last.reconnects, &alias, reconnects);
        if reconnect_delta > 0 {
            RECONNECTS.with_label_values(&[&alias]).inc_by(reconnect_delta as f64);
        }
    }
}

/// Spawn a background task that periodically samples the manager's
/// ingestors and updates the Prometheus gauges/counters above.
pub fn spawn_sampler(manager: std::sync::Arc<IngestorManager>) {
    tokio::spawn(async move {
        let mut last = LastSeen {
            received: std::collections::HashMap::new(),
            duplicates: std::collections::HashMap::new(),
            reconnects: std::collections::HashMap::new(),
        };
        loop {
            sample_once(&manager, &mut last).await;
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        }
    });
}

pub fn render() -> String {
    use prometheus::{Encoder, TextEncoder};
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buf = Vec::new();
    match encoder.encode(&families, &mut buf) {
        Ok(()) => String::from_utf8(buf).unwrap_or_default(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            String::new()
        }
    }
}
