//! Ingestor Manager: owns a set of ingestors per configured connection;
//! start/stop/fan-in.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mcp_remote_common::config::ConnectionSpec;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::base::Ingestor;
use crate::registry::FactoryRegistry;
use crate::types::{IngestedEvent, IngestorState, IngestorStatus};

/// Bound on how long `stop()` waits for an ingestor's run loop to exit
/// before it gives up waiting.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

struct ManagedIngestor {
    ingestor: Arc<dyn Ingestor>,
    handle: JoinHandle<()>,
}

/// Map key: `(alias, instanceId)`.
type IngestorKey = (String, Option<String>);

pub struct IngestorManager {
    ingestors: Mutex<HashMap<IngestorKey, ManagedIngestor>>,
}

impl IngestorManager {
    pub fn new() -> Self {
        Self {
            ingestors: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve secrets, invoke the factory registry, and start every
    /// ingestor concurrently. A failure to construct one ingestor is
    /// logged and does not block the others.
    pub async fn start(&self, specs: &[ConnectionSpec]) {
        let mut guard = self.ingestors.lock().await;

        for spec in specs {
            let secrets = match spec.resolve_secrets() {
                Ok(secrets) => secrets,
                Err(err) => {
                    error!(alias = %spec.alias, error = %err, "failed to resolve secrets, skipping connection");
                    continue;
                }
            };

            let instance_ids: Vec<Option<String>> = match &spec.instances {
                Some(instances) if !instances.is_empty() => instances
                    .iter()
                    .map(|i| Some(i.instance_id.clone()))
                    .collect(),
                _ => vec![None],
            };

            for instance_id in instance_ids {
                let ingestor =
                    match FactoryRegistry::global().create(spec, &secrets, instance_id.clone()) {
                        Some(ingestor) => ingestor,
                        None => {
                            warn!(alias = %spec.alias, "no ingestor created for connection, skipping");
                            continue;
                        }
                    };

                ingestor.core().set_state(IngestorState::Starting);
                let spawned = ingestor.clone();
                let handle = tokio::spawn(async move {
                    spawned.start().await;
                });

                guard.insert(
                    (spec.alias.clone(), instance_id),
                    ManagedIngestor { ingestor, handle },
                );
            }
        }
    }

    /// Stop every ingestor and await all of them, bounding each wait at
    /// [`STOP_TIMEOUT`].
    pub async fn stop(&self) {
        let mut guard = self.ingestors.lock().await;

        for (key, managed) in guard.drain() {
            managed.ingestor.stop().await;

            match tokio::time::timeout(STOP_TIMEOUT, managed.handle).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    error!(alias = %key.0, error = %join_err, "ingestor task panicked during shutdown");
                }
                Err(_) => {
                    error!(alias = %key.0, "ingestor did not stop within timeout");
                }
            }
        }
    }

    pub async fn list_events(
        &self,
        alias: &str,
        after_id: i64,
        instance_id: Option<&str>,
    ) -> Option<Vec<IngestedEvent>> {
        let guard = self.ingestors.lock().await;
        let key = (alias.to_string(), instance_id.map(str::to_string));
        guard
            .get(&key)
            .map(|managed| managed.ingestor.get_events(after_id))
    }

    pub async fn status(&self) -> Vec<IngestorStatus> {
        let guard = self.ingestors.lock().await;
        guard
            .values()
            .map(|managed| managed.ingestor.get_status())
            .collect()
    }

    /// Ambient observability counters per alias: `(duplicates_dropped,
    /// reconnects)`, not part of [`IngestorStatus`]'s public snapshot.
    pub async fn counters(&self) -> Vec<(String, u64, u64)> {
        let guard = self.ingestors.lock().await;
        guard
            .values()
            .map(|managed| {
                let core = managed.ingestor.core();
                (core.alias().to_string(), core.duplicates_dropped(), core.reconnects())
            })
            .collect()
    }
}

impl Default for IngestorManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_remote_common::config::{IngestorType, WebsocketSpec};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::base::IngestorCore;

    struct StubIngestor {
        core: IngestorCore,
        started: Arc<AtomicBool>,
    }

    impl Ingestor for StubIngestor {
        fn core(&self) -> &IngestorCore {
            &self.core
        }

        fn start(self: Arc<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
            Box::pin(async move {
                self.started.store(true, Ordering::SeqCst);
                self.core.set_state(IngestorState::Running);
                self.core.push_event("READY", serde_json::Value::Null, None);
                // Run until stopped.
                while self.core.state() != IngestorState::Stopped {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
        }

        fn stop(&self) -> Pin<Box<dyn Future<Output = ()> + Send>> {
            self.core.set_state(IngestorState::Stopped);
            Box::pin(async {})
        }
    }

    fn registered_test_key() -> &'static str {
        "websocket:stub-test-protocol"
    }

    fn register_stub_factory() {
        FactoryRegistry::global().register(
            registered_test_key(),
            Arc::new(|spec, secrets, instance_id| {
                let core = IngestorCore::new(
                    spec.alias.clone(),
                    "websocket",
                    secrets.clone(),
                    10,
                    instance_id,
                );
                Some(Arc::new(StubIngestor {
                    core,
                    started: Arc::new(AtomicBool::new(false)),
                }) as Arc<dyn Ingestor>)
            }),
        );
    }

    fn stub_spec(alias: &str) -> ConnectionSpec {
        ConnectionSpec {
            alias: alias.to_string(),
            ingestor_type: IngestorType::Websocket,
            websocket: Some(WebsocketSpec {
                protocol: Some("stub-test-protocol".to_string()),
                ..Default::default()
            }),
            instances: None,
            buffer_size: Some(10),
            secrets_env: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn start_and_list_events_and_stop_round_trip() {
        register_stub_factory();
        let manager = IngestorManager::new();
        manager.start(&[stub_spec("stub-alias")]).await;

        // Give the spawned task a moment to push its READY event.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let events = manager.list_events("stub-alias", -1, None).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "READY");

        let statuses = manager.status().await;
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].state, IngestorState::Running);

        manager.stop().await;
        let statuses_after_stop = manager.status().await;
        assert!(statuses_after_stop.is_empty());
    }

    #[tokio::test]
    async fn unknown_connection_returns_none_not_panic() {
        let manager = IngestorManager::new();
        assert!(manager.list_events("nonexistent", -1, None).await.is_none());
    }

    #[tokio::test]
    async fn missing_factory_does_not_block_sibling_connections() {
        register_stub_factory();
        let manager = IngestorManager::new();
        let bad_spec = ConnectionSpec {
            alias: "missing-protocol".to_string(),
            ingestor_type: IngestorType::Websocket,
            websocket: Some(WebsocketSpec {
                protocol: Some("totally-unregistered".to_string()),
                ..Default::default()
            }),
            instances: None,
            buffer_size: None,
            secrets_env: HashMap::new(),
        };
        manager
            .start(&[bad_spec, stub_spec("sibling-alias")])
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(manager.list_events("missing-protocol", -1, None).await.is_none());
        assert!(manager.list_events("sibling-alias", -1, None).await.is_some());
        manager.stop().await;
    }
}
