//! Canonical event shape and ingestor state machine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An immutable event once pushed into a ring buffer.
///
/// Field set and semantics are the external contract for `list_events` —
/// every field here is serialized verbatim to the consumer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngestedEvent {
    /// Monotonically increasing within one ingestor; see [`crate::id_gen`].
    pub id: u64,

    pub idempotency_key: String,

    /// ISO-8601 UTC, millisecond precision.
    pub received_at: String,

    /// Redundant with `received_at`, for numeric comparisons.
    pub received_at_ms: u64,

    /// The connection alias this event came from.
    pub source: String,

    /// Present iff this ingestor is one of several instances for `source`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    /// Protocol-native event type, e.g. `"MESSAGE_CREATE"`.
    pub event_type: String,

    /// Opaque structured payload, whatever the protocol delivered.
    pub data: Value,
}

/// State machine of an ingestor instance.
///
/// `stopped -> starting -> running <-> reconnecting -> stopped`, with a
/// terminal `failed` when `reconnecting` exhausts its attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestorState {
    Stopped,
    Starting,
    Running,
    Reconnecting,
    Failed,
}

impl IngestorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestorState::Stopped => "stopped",
            IngestorState::Starting => "starting",
            IngestorState::Running => "running",
            IngestorState::Reconnecting => "reconnecting",
            IngestorState::Failed => "failed",
        }
    }
}

/// Read-only snapshot of an ingestor, returned by `status()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestorStatus {
    pub connection: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    #[serde(rename = "type")]
    pub ingestor_type: String,

    pub state: IngestorState,

    pub buffered_events: usize,

    pub total_events_received: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_at: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingested_event_round_trips_through_json() {
        let event = IngestedEvent {
            id: 1_753_900_800_000_001,
            idempotency_key: "discord-bot:abc".to_string(),
            received_at: "2026-07-31T00:00:00.000Z".to_string(),
            received_at_ms: 1_753_900_800_000,
            source: "discord-bot".to_string(),
            instance_id: None,
            event_type: "MESSAGE_CREATE".to_string(),
            data: serde_json::json!({"content": "hi"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: IngestedEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn instance_id_omitted_when_absent() {
        let event = IngestedEvent {
            id: 1,
            idempotency_key: "x".to_string(),
            received_at: "2026-07-31T00:00:00.000Z".to_string(),
            received_at_ms: 0,
            source: "discord-bot".to_string(),
            instance_id: None,
            event_type: "READY".to_string(),
            data: Value::Null,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("instanceId").is_none());
    }
}
