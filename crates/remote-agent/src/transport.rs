//! `OutboundTransport` seam: the boundary the real encrypted
//! workstation<->remote channel would implement. This module provides
//! only a minimal, unauthenticated local HTTP stand-in — no encryption,
//! no pairing — sufficient to drive `list_events`/`status` end-to-end
//! in this repo.

use std::sync::Arc;

use mcp_ingest_core::{IngestedEvent, IngestorManager, IngestorStatus};

/// What the consumer-facing side of the proxy needs from whatever channel
/// carries `list_events`/`status` calls to the remote process.
#[async_trait::async_trait]
pub trait OutboundTransport: Send + Sync {
    async fn list_events(
        &self,
        alias: &str,
        after_id: i64,
        instance_id: Option<&str>,
    ) -> Option<Vec<IngestedEvent>>;

    async fn status(&self) -> Vec<IngestorStatus>;
}

/// Unauthenticated local transport: directly calls the manager. Stands in
/// for the production encrypted channel, which is out of scope here.
pub struct LocalHttpTransport {
    manager: Arc<IngestorManager>,
}

impl LocalHttpTransport {
    pub fn new(manager: Arc<IngestorManager>) -> Self {
        Self { manager }
    }
}

#[async_trait::async_trait]
impl OutboundTransport for LocalHttpTransport {
    async fn list_events(
        &self,
        alias: &str,
        after_id: i64,
        instance_id: Option<&str>,
    ) -> Option<Vec<IngestedEvent>> {
        self.manager.list_events(alias, after_id, instance_id).await
    }

    async fn status(&self) -> Vec<IngestorStatus> {
        self.manager.status().await
    }
}
