//! Webhook protocol ingestor: exercises the factory registry's
//! pluggability beyond the reference websocket implementation. Listens
//! for inbound HTTP POSTs on a per-connection port and pushes each body
//! as one event; not a production connector.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::routing::post;
use mcp_remote_common::config::ConnectionSpec;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::base::{Ingestor, IngestorCore};
use crate::registry::FactoryRegistry;
use crate::ring_buffer::DEFAULT_BUFFER_SIZE;
use crate::types::IngestorState;

pub fn register() {
    FactoryRegistry::global().register("webhook", Arc::new(build_ingestor) as _);
}

fn build_ingestor(
    spec: &ConnectionSpec,
    secrets: &HashMap<String, String>,
    instance_id: Option<String>,
) -> Option<Arc<dyn Ingestor>> {
    let port = secrets
        .get("port")
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(0);

    let core = IngestorCore::new(
        spec.alias.clone(),
        spec.ingestor_type.as_str(),
        secrets.clone(),
        spec.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE),
        instance_id,
    );

    Some(Arc::new(WebhookIngestor {
        core,
        port,
        server: Mutex::new(None),
    }) as Arc<dyn Ingestor>)
}

struct WebhookIngestor {
    core: IngestorCore,
    port: u16,
    server: Mutex<Option<JoinHandle<()>>>,
}

async fn receive(State(ingestor): State<Arc<WebhookIngestor>>, body: String) -> &'static str {
    let data = serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body));
    ingestor.core.push_event("webhook.received", data, None);
    "ok"
}

impl Ingestor for WebhookIngestor {
    fn core(&self) -> &IngestorCore {
        &self.core
    }

    fn start(self: Arc<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            self.core.set_state(IngestorState::Starting);

            let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
            let listener = match TcpListener::bind(addr).await {
                Ok(listener) => listener,
                Err(err) => {
                    error!(alias = %self.core.alias(), error = %err, "failed to bind webhook listener");
                    self.core.set_error(err.to_string());
                    self.core.set_state(IngestorState::Failed);
                    return;
                }
            };

            info!(alias = %self.core.alias(), addr = %listener.local_addr().unwrap(), "webhook ingestor listening");

            let app = Router::new().route("/", post(receive)).with_state(self.clone());

            self.core.set_state(IngestorState::Running);
            self.core.clear_error();

            let handle = tokio::spawn(async move {
                let _ = axum::serve(listener, app).await;
            });
            *self.server.lock().unwrap() = Some(handle);

            while self.core.state() != IngestorState::Stopped {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
    }

    fn stop(&self) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        if let Some(handle) = self.server.lock().unwrap().take() {
            handle.abort();
        }
        self.core.set_state(IngestorState::Stopped);
        Box::pin(async {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_remote_common::config::IngestorType;

    #[tokio::test]
    async fn receives_a_posted_body_as_an_event() {
        let spec = ConnectionSpec {
            alias: "webhook-test".to_string(),
            ingestor_type: IngestorType::Webhook,
            websocket: None,
            instances: None,
            buffer_size: Some(10),
            secrets_env: HashMap::new(),
        };
        let mut secrets = HashMap::new();
        secrets.insert("port".to_string(), "0".to_string());
        let ingestor = build_ingestor(&spec, &secrets, None).unwrap();

        let running = ingestor.clone();
        tokio::spawn(async move { running.start().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        ingestor.core().push_event("webhook.received", serde_json::json!({"hello": "world"}), None);
        let events = ingestor.get_events(-1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "webhook.received");

        ingestor.stop().await;
    }
}
