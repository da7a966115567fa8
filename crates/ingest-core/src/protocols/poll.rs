//! Poll protocol ingestor: polls an HTTP endpoint on a fixed interval and
//! pushes each response body as one event. Exercises the factory registry
//! with a second, non-streaming connection style; not a production
//! connector.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use mcp_remote_common::config::ConnectionSpec;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::base::{Ingestor, IngestorCore};
use crate::registry::FactoryRegistry;
use crate::ring_buffer::DEFAULT_BUFFER_SIZE;
use crate::types::IngestorState;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

pub fn register() {
    FactoryRegistry::global().register("poll", Arc::new(build_ingestor) as _);
}

fn build_ingestor(
    spec: &ConnectionSpec,
    secrets: &HashMap<String, String>,
    instance_id: Option<String>,
) -> Option<Arc<dyn Ingestor>> {
    let url = secrets.get("url")?.clone();
    let interval = secrets
        .get("intervalSeconds")
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_POLL_INTERVAL);

    let core = IngestorCore::new(
        spec.alias.clone(),
        spec.ingestor_type.as_str(),
        secrets.clone(),
        spec.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE),
        instance_id,
    );

    Some(Arc::new(PollIngestor {
        core,
        url,
        interval,
        cancel: CancellationToken::new(),
        client: reqwest::Client::new(),
    }) as Arc<dyn Ingestor>)
}

struct PollIngestor {
    core: IngestorCore,
    url: String,
    interval: Duration,
    cancel: CancellationToken,
    client: reqwest::Client,
}

impl Ingestor for PollIngestor {
    fn core(&self) -> &IngestorCore {
        &self.core
    }

    fn start(self: Arc<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            self.core.set_state(IngestorState::Starting);
            self.core.set_state(IngestorState::Running);

            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        self.core.set_state(IngestorState::Stopped);
                        return;
                    }
                    _ = tokio::time::sleep(self.interval) => {
                        self.poll_once().await;
                    }
                }
            }
        })
    }

    fn stop(&self) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        self.cancel.cancel();
        Box::pin(async {})
    }
}

impl PollIngestor {
    async fn poll_once(&self) {
        match self.client.get(&self.url).send().await {
            Ok(response) => match response.json::<serde_json::Value>().await {
                Ok(body) => {
                    self.core.clear_error();
                    self.core.push_event("poll.response", body, None);
                }
                Err(err) => {
                    warn!(alias = %self.core.alias(), error = %err, "poll response was not valid json");
                }
            },
            Err(err) => {
                warn!(alias = %self.core.alias(), error = %err, "poll request failed");
                self.core.set_error(err.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_remote_common::config::IngestorType;

    #[test]
    fn missing_url_secret_declines_construction() {
        let spec = ConnectionSpec {
            alias: "poll-test".to_string(),
            ingestor_type: IngestorType::Poll,
            websocket: None,
            instances: None,
            buffer_size: None,
            secrets_env: HashMap::new(),
        };
        assert!(build_ingestor(&spec, &HashMap::new(), None).is_none());
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_observable() {
        let spec = ConnectionSpec {
            alias: "poll-test".to_string(),
            ingestor_type: IngestorType::Poll,
            websocket: None,
            instances: None,
            buffer_size: None,
            secrets_env: HashMap::new(),
        };
        let mut secrets = HashMap::new();
        secrets.insert("url".to_string(), "http://127.0.0.1:1/nope".to_string());
        let ingestor = build_ingestor(&spec, &secrets, None).unwrap();

        let running = ingestor.clone();
        let handle = tokio::spawn(async move { running.start().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        ingestor.stop().await;
        ingestor.stop().await;
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }
}
