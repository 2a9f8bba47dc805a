use anyhow::Result;
use async_trait::async_trait;

use crate::api::ApiClient;
use crate::models::Snapshot;

/// The bulk snapshot read the scheduler performs once per cycle.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<Snapshot>;
}

#[async_trait]
impl SnapshotSource for ApiClient {
    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        Ok(self.fetch_bulk_snapshot().await?)
    }
}
