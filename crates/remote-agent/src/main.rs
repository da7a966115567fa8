//! # Remote Agent
//!
//! The remote-side process of the two-sided secure proxy: holds
//! credentials, runs the ingestion subsystem's protocol ingestors, and
//! serves the stand-in transport the consumer drives `list_events`/
//! `status` calls through. The real encrypted request/response channel
//! and the agent-facing tool surface live outside this repo; this binary
//! exposes the same operations over plain loopback HTTP so the core can
//! be exercised end-to-end.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       Remote Agent                         │
//! │                                                              │
//! │  ┌────────────┐   ┌────────────┐   ┌────────────┐            │
//! │  │  Discord   │   │  Webhook   │   │    Poll    │   ...      │
//! │  │  Gateway   │   │  listener  │   │   fetcher  │            │
//! │  └─────┬──────┘   └─────┬──────┘   └─────┬──────┘            │
//! │        └────────────────┴────────────────┘                   │
//! │                         │                                    │
//! │                 ┌───────▼────────┐                           │
//! │                 │ IngestorManager│                           │
//! │                 └───────┬────────┘                           │
//! │                         │                                    │
//! │           ┌─────────────┼─────────────┐                      │
//! │     GET /events/:alias  │      GET /status                   │
//! │     GET /health,/ready  │      GET /metrics                  │
//! └────────────────────────────────────────────────────────────┘
//! ```

mod metrics;
mod transport;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use mcp_ingest_core::{IngestorManager, register_builtin_protocols};
use mcp_remote_common::config::RemoteConfig;
use mcp_remote_common::key_bundle::{FileKeyBundleProvider, KeyBundleProvider};
use serde_json::{Value, json};
use tokio::signal;
use tracing::{info, warn};

use transport::{LocalHttpTransport, OutboundTransport};

#[derive(Clone)]
struct AgentState {
    transport: Arc<dyn OutboundTransport>,
    ready: Arc<AtomicBool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = RemoteConfig::from_env_path().context("failed to load remote config")?;

    if config.log_json {
        mcp_remote_common::logging::init_tracing_json();
    } else {
        mcp_remote_common::logging::init_tracing();
    }

    info!(connections = config.connections.len(), "starting remote agent");

    match FileKeyBundleProvider::from_env().and_then(|p| p.load()) {
        Ok(bundle) => info!(fingerprint = %bundle.fingerprint, "loaded key bundle"),
        Err(err) => info!(error = %err, "no key bundle configured, continuing without one"),
    }

    register_builtin_protocols();
    let manager = Arc::new(IngestorManager::new());
    manager.start(&config.connections).await;

    let state = AgentState {
        transport: Arc::new(LocalHttpTransport::new(manager.clone())),
        ready: Arc::new(AtomicBool::new(true)),
    };

    metrics::spawn_sampler(manager.clone());

    let health_handle = {
        let state = state.clone();
        let port = config.health_port;
        tokio::spawn(async move {
            if let Err(err) = serve_health(port, state).await {
                warn!(error = %err, "health server exited");
            }
        })
    };

    let metrics_handle = {
        let port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(err) = serve_metrics(port).await {
                warn!(error = %err, "metrics server exited");
            }
        })
    };

    let agent_handle = {
        let state = state.clone();
        let port = config.agent_port;
        tokio::spawn(async move {
            if let Err(err) = serve_agent_transport(port, state).await {
                warn!(error = %err, "agent transport server exited");
            }
        })
    };

    info!(
        health = config.health_port,
        metrics = config.metrics_port,
        agent = config.agent_port,
        "remote agent ready"
    );

    signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("received shutdown signal, stopping ingestors");

    manager.stop().await;
    health_handle.abort();
    metrics_handle.abort();
    agent_handle.abort();

    info!("remote agent stopped");
    Ok(())
}

async fn serve_health(port: u16, state: AgentState) -> Result<()> {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind health server to {addr}"))?;
    info!(%addr, "health server listening");
    axum::serve(listener, app).await.context("health server failed")?;
    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "remote-agent",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn readiness_check(State(state): State<AgentState>) -> (StatusCode, Json<Value>) {
    if state.ready.load(Ordering::SeqCst) {
        (StatusCode::OK, Json(json!({"ready": true, "service": "remote-agent"})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"ready": false, "service": "remote-agent"})),
        )
    }
}

async fn serve_metrics(port: u16) -> Result<()> {
    let app = Router::new().route("/metrics", get(metrics_endpoint));
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind metrics server to {addr}"))?;
    info!(%addr, "metrics server listening");
    axum::serve(listener, app).await.context("metrics server failed")?;
    Ok(())
}

async fn metrics_endpoint() -> String {
    metrics::render()
}

/// Stand-in `OutboundTransport`: `GET /events/:alias` and `GET /status`,
/// calling `IngestorManager` directly. Not the real encrypted
/// request/response channel; a minimal harness to exercise the core
/// end-to-end.
async fn serve_agent_transport(port: u16, state: AgentState) -> Result<()> {
    let app = Router::new()
        .route("/events/{alias}", get(list_events))
        .route("/status", get(status))
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind agent transport to {addr}"))?;
    info!(%addr, "agent transport listening");
    axum::serve(listener, app).await.context("agent transport failed")?;
    Ok(())
}

async fn list_events(
    State(state): State<AgentState>,
    Path(alias): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let after_id: i64 = params
        .get("after_id")
        .and_then(|v| v.parse().ok())
        .unwrap_or(-1);
    let instance_id = params.get("instance_id").map(String::as_str);

    match state.transport.list_events(&alias, after_id, instance_id).await {
        Some(events) => (StatusCode::OK, Json(json!(events))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("no such connection: {alias}")})),
        ),
    }
}

async fn status(State(state): State<AgentState>) -> Json<Value> {
    Json(json!(state.transport.status().await))
}
