//! Discord Gateway v10 ingestor: the reference protocol ingestor
//! implementation, registered under `"websocket:discord"`.

pub mod client;
pub mod frame;
pub mod intents;
pub mod session;

use std::collections::HashMap;
use std::sync::Arc;

use mcp_remote_common::config::ConnectionSpec;
use tracing::error;

use crate::base::{Ingestor, IngestorCore};
use crate::ring_buffer::DEFAULT_BUFFER_SIZE;
use crate::registry::FactoryRegistry;

pub use client::{DiscordConfig, DiscordGatewayIngestor};

const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Register the `"websocket:discord"` factory with the global registry.
/// Idempotent; safe to call more than once (the later registration wins).
pub fn register() {
    FactoryRegistry::global().register(
        "websocket:discord",
        Arc::new(build_ingestor) as _,
    );
}

fn build_ingestor(
    spec: &ConnectionSpec,
    secrets: &HashMap<String, String>,
    instance_id: Option<String>,
) -> Option<Arc<dyn Ingestor>> {
    let ws_spec = spec.websocket.clone().unwrap_or_default();

    let token_ref = ws_spec.token_ref.as_deref().unwrap_or("token");
    let token = match secrets.get(token_ref) {
        Some(token) => token.clone(),
        None => {
            error!(alias = %spec.alias, secret = %token_ref, "discord ingestor missing required token secret");
            return None;
        }
    };

    let intents = ws_spec.intents.unwrap_or(intents::ALL_NON_PRIVILEGED_INTENTS);
    let event_filter = ws_spec
        .event_filter
        .clone()
        .map(|types| types.into_iter().collect());
    let gateway_url = ws_spec
        .gateway_url
        .clone()
        .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string());

    let config = DiscordConfig {
        token,
        intents,
        event_filter,
        gateway_url,
        max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
    };

    let core = IngestorCore::new(
        spec.alias.clone(),
        spec.ingestor_type.as_str(),
        secrets.clone(),
        spec.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE),
        instance_id,
    );

    Some(Arc::new(DiscordGatewayIngestor::new(core, config)) as Arc<dyn Ingestor>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_remote_common::config::{IngestorType, WebsocketSpec};

    #[test]
    fn missing_token_secret_declines_construction() {
        let spec = ConnectionSpec {
            alias: "bot".to_string(),
            ingestor_type: IngestorType::Websocket,
            websocket: Some(WebsocketSpec {
                protocol: Some("discord".to_string()),
                ..Default::default()
            }),
            instances: None,
            buffer_size: None,
            secrets_env: HashMap::new(),
        };
        assert!(build_ingestor(&spec, &HashMap::new(), None).is_none());
    }

    #[test]
    fn present_token_secret_constructs_an_ingestor() {
        let spec = ConnectionSpec {
            alias: "bot".to_string(),
            ingestor_type: IngestorType::Websocket,
            websocket: Some(WebsocketSpec {
                protocol: Some("discord".to_string()),
                token_ref: Some("discordToken".to_string()),
                ..Default::default()
            }),
            instances: None,
            buffer_size: None,
            secrets_env: HashMap::new(),
        };
        let mut secrets = HashMap::new();
        secrets.insert("discordToken".to_string(), "abc123".to_string());
        let ingestor = build_ingestor(&spec, &secrets, None);
        assert!(ingestor.is_some());
        assert_eq!(ingestor.unwrap().get_status().connection, "bot");
    }
}
