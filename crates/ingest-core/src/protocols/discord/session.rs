//! Pure Gateway session state machine: handshake frame selection,
//! dispatch bookkeeping, close-code classification, and backoff timing.
//! Kept free of any socket I/O so it can be unit tested directly;
//! [`super::client`] wires these decisions around an actual connection.

use std::time::Duration;

use rand::Rng;
use serde_json::{Value, json};

use super::frame::{GatewayFrame, close_code, opcode};

/// Mutable per-connection state that survives a reconnect (but not a
/// fresh `start()`): sequence number, session id, resume URL, heartbeat
/// ack tracking, and the reconnect attempt counter.
#[derive(Debug, Clone)]
pub struct GatewaySession {
    pub sequence_number: Option<i64>,
    pub session_id: Option<String>,
    pub resume_gateway_url: Option<String>,
    pub heartbeat_acked: bool,
    pub reconnect_attempts: u32,
}

impl GatewaySession {
    pub fn new() -> Self {
        Self {
            sequence_number: None,
            session_id: None,
            resume_gateway_url: None,
            heartbeat_acked: true,
            reconnect_attempts: 0,
        }
    }

    pub fn has_resumable_session(&self) -> bool {
        self.session_id.is_some() && self.sequence_number.is_some()
    }

    /// Identify if there's nothing to resume, Resume otherwise.
    pub fn handshake_frame(&self, token: &str, intents: u32) -> Value {
        if self.has_resumable_session() {
            resume_frame(
                token,
                self.session_id.as_deref().unwrap(),
                self.sequence_number.unwrap(),
            )
        } else {
            identify_frame(token, intents)
        }
    }

    /// Update sequence number from every dispatch, and on `READY` capture
    /// the session id / resume URL and reset the reconnect counter.
    pub fn record_dispatch(&mut self, frame: &GatewayFrame) {
        if let Some(seq) = frame.s {
            self.sequence_number = Some(seq);
        }
        if frame.t.as_deref() == Some("READY") {
            if let Some(sid) = frame.d.get("session_id").and_then(Value::as_str) {
                self.session_id = Some(sid.to_string());
            }
            if let Some(url) = frame.d.get("resume_gateway_url").and_then(Value::as_str) {
                self.resume_gateway_url = Some(url.to_string());
            }
            self.reconnect_attempts = 0;
        }
    }

    pub fn clear_session(&mut self) {
        self.session_id = None;
        self.sequence_number = None;
        self.resume_gateway_url = None;
    }

    pub fn connect_url<'a>(&'a self, default_url: &'a str) -> &'a str {
        self.resume_gateway_url.as_deref().unwrap_or(default_url)
    }
}

impl Default for GatewaySession {
    fn default() -> Self {
        Self::new()
    }
}

pub fn identify_frame(token: &str, intents: u32) -> Value {
    json!({
        "op": opcode::IDENTIFY,
        "d": {
            "token": token,
            "intents": intents,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "mcp-secure-proxy",
                "device": "mcp-secure-proxy",
            },
        },
    })
}

pub fn resume_frame(token: &str, session_id: &str, seq: i64) -> Value {
    json!({
        "op": opcode::RESUME,
        "d": {"token": token, "session_id": session_id, "seq": seq},
    })
}

pub fn heartbeat_frame(seq: Option<i64>) -> Value {
    json!({"op": opcode::HEARTBEAT, "d": seq})
}

pub fn heartbeat_ack_frame() -> Value {
    json!({"op": opcode::HEARTBEAT_ACK})
}

/// Whether an event type should be pushed given a configured filter.
/// `READY` is never filtered out — the session bookkeeping above depends
/// on observing it.
pub fn should_push(event_filter: &Option<std::collections::HashSet<String>>, event_type: &str) -> bool {
    event_type == "READY"
        || event_filter
            .as_ref()
            .map(|filter| filter.contains(event_type))
            .unwrap_or(true)
}

pub enum ReconnectDecision {
    /// Close code is fatal; the ingestor transitions to `failed`.
    Fatal(String),
    /// Retryable; the session is preserved and a Resume attempted.
    Retry { preserve_session: bool },
}

pub fn classify_close(code: u16) -> ReconnectDecision {
    if close_code::is_fatal(code) {
        ReconnectDecision::Fatal(format!("fatal gateway close code {code}"))
    } else {
        ReconnectDecision::Retry {
            preserve_session: true,
        }
    }
}

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// `min(base * 2^attempt, cap) + jitter`, jitter uniform in `[0, base]`.
pub fn compute_backoff(attempt: u32) -> Duration {
    let exponent = attempt.min(6); // 2^6 * 1s already exceeds the 60s cap
    let scaled = BACKOFF_BASE.saturating_mul(1u32 << exponent);
    let capped = scaled.min(BACKOFF_CAP);
    let jitter_ms = rand::thread_rng().gen_range(0..=BACKOFF_BASE.as_millis() as u64);
    capped + Duration::from_millis(jitter_ms)
}

/// Invalid Session tells the client to wait a random 1-5s before retrying.
pub fn invalid_session_backoff() -> Duration {
    Duration::from_secs(rand::thread_rng().gen_range(1..=5))
}

/// Jitter the first heartbeat by a random fraction of the interval, per
/// the Gateway docs' guidance to avoid a thundering herd of heartbeats.
pub fn heartbeat_jitter(interval: Duration) -> Duration {
    let bound = interval.as_millis().max(1) as u64;
    Duration::from_millis(rand::thread_rng().gen_range(0..bound))
}
