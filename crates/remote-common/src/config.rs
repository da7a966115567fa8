//! Configuration / `ConnectionSpec` loading.
//!
//! This is the ambient stand-in for the real interactive-setup
//! collaborator: it loads a JSON document describing the connections to
//! ingest and resolves each connection's secrets from named environment
//! variables, then hands the resolved `{name -> value}` map to the
//! ingestion core pre-resolved — the core never touches the environment
//! itself.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The three ingestor types a `ConnectionSpec` may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestorType {
    Websocket,
    Webhook,
    Poll,
}

impl IngestorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestorType::Websocket => "websocket",
            IngestorType::Webhook => "webhook",
            IngestorType::Poll => "poll",
        }
    }
}

/// Websocket-specific configuration nested under a `ConnectionSpec`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsocketSpec {
    /// Protocol tag, e.g. `"discord"`. Defaults to `"generic"`.
    #[serde(default)]
    pub protocol: Option<String>,

    /// Logical secret name carrying the auth token (resolved via `secretsEnv`).
    #[serde(default)]
    pub token_ref: Option<String>,

    #[serde(default)]
    pub intents: Option<u32>,

    #[serde(default)]
    pub gateway_url: Option<String>,

    #[serde(default)]
    pub event_filter: Option<Vec<String>>,
}

impl WebsocketSpec {
    pub fn protocol_or_generic(&self) -> &str {
        self.protocol.as_deref().unwrap_or("generic")
    }
}

/// One of several parallel ingestors for the same alias (e.g. distinct channels).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub instance_id: String,
}

/// Per-connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSpec {
    pub alias: String,

    #[serde(rename = "type")]
    pub ingestor_type: IngestorType,

    #[serde(default)]
    pub websocket: Option<WebsocketSpec>,

    #[serde(default)]
    pub instances: Option<Vec<InstanceSpec>>,

    #[serde(default)]
    pub buffer_size: Option<usize>,

    /// `{logical secret name -> environment variable name}`. Resolved at
    /// start-up into the `{name -> value}` map the core expects.
    #[serde(default)]
    pub secrets_env: HashMap<String, String>,
}

impl ConnectionSpec {
    /// Resolve this connection's secrets from the process environment.
    pub fn resolve_secrets(&self) -> Result<HashMap<String, String>> {
        let mut resolved = HashMap::with_capacity(self.secrets_env.len());
        for (logical_name, env_var) in &self.secrets_env {
            let value = std::env::var(env_var)
                .map_err(|_| Error::MissingSecret(format!("{logical_name} ({env_var})")))?;
            resolved.insert(logical_name.clone(), value);
        }
        Ok(resolved)
    }
}

/// Top-level process configuration: the set of connections plus the
/// ambient process settings (health/metrics ports, log format).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    pub connections: Vec<ConnectionSpec>,

    #[serde(default = "default_health_port")]
    pub health_port: u16,

    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Loopback port for the stand-in `list_events`/`status` transport;
    /// the real implementation proxies these calls over the opaque
    /// encrypted channel, out of scope here.
    #[serde(default = "default_agent_port")]
    pub agent_port: u16,

    #[serde(default)]
    pub log_json: bool,
}

fn default_health_port() -> u16 {
    8082
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_agent_port() -> u16 {
    8091
}

impl RemoteConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config)
    }

    pub fn from_env_path() -> Result<Self> {
        let path = std::env::var("REMOTE_CONFIG_PATH")
            .map_err(|_| Error::Config("REMOTE_CONFIG_PATH not set".to_string()))?;
        Self::from_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_connection_spec() {
        let json = r#"{
            "connections": [
                {
                    "alias": "discord-bot",
                    "type": "websocket",
                    "websocket": { "protocol": "discord", "tokenRef": "token" },
                    "secretsEnv": { "token": "DISCORD_TOKEN" }
                }
            ]
        }"#;
        let config: RemoteConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.health_port, 8082);
        assert_eq!(config.connections.len(), 1);
        let conn = &config.connections[0];
        assert_eq!(conn.alias, "discord-bot");
        assert_eq!(conn.ingestor_type, IngestorType::Websocket);
        assert_eq!(
            conn.websocket.as_ref().unwrap().protocol_or_generic(),
            "discord"
        );
    }

    #[test]
    fn resolve_secrets_reads_named_env_vars() {
        // SAFETY: test-only, single-threaded access to this process's env.
        unsafe {
            std::env::set_var("TEST_DISCORD_TOKEN", "abc123");
        }
        let spec = ConnectionSpec {
            alias: "discord-bot".to_string(),
            ingestor_type: IngestorType::Websocket,
            websocket: None,
            instances: None,
            buffer_size: None,
            secrets_env: HashMap::from([("token".to_string(), "TEST_DISCORD_TOKEN".to_string())]),
        };
        let secrets = spec.resolve_secrets().unwrap();
        assert_eq!(secrets.get("token").map(String::as_str), Some("abc123"));
        unsafe {
            std::env::remove_var("TEST_DISCORD_TOKEN");
        }
    }

    #[test]
    fn resolve_secrets_errors_on_missing_env_var() {
        let spec = ConnectionSpec {
            alias: "discord-bot".to_string(),
            ingestor_type: IngestorType::Websocket,
            websocket: None,
            instances: None,
            buffer_size: None,
            secrets_env: HashMap::from([(
                "token".to_string(),
                "DEFINITELY_NOT_SET_XYZ".to_string(),
            )]),
        };
        assert!(matches!(
            spec.resolve_secrets(),
            Err(Error::MissingSecret(_))
        ));
    }
}
