use crate::processor::types::TableWriteSummary;
use chrono::{DateTime, Utc};
use common::config::WriteMode;
use common::{Error, Result};
use datafusion::datasource::listing::ListingTableUrl;
use datafusion::prelude::SessionContext;
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub const SUCCESS_MARKER: &str = "_SUCCESS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMarker {
    pub table: String,
    pub rows_written: u64,
    pub partition_columns: Vec<String>,
    pub created_at: DateTime<Utc>,
}

pub struct StorageManager {
    ctx: Arc<SessionContext>,
}

impl StorageManager {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    fn resolve(&self, target_path: &str) -> Result<(Arc<dyn ObjectStore>, Path)> {
        let table_url = ListingTableUrl::parse(target_path)?;
        let store = self.ctx.runtime_env().object_store(table_url.object_store())?;
        Ok((store, table_url.prefix().clone()))
    }

    async fn list_existing(&self, store: &dyn ObjectStore, prefix: &Path) -> Result<Vec<Path>> {
        let existing: Vec<Path> = store
            .list(Some(prefix))
            .map_ok(|meta| meta.location)
            .try_collect()
            .await?;
        Ok(existing)
    }

    /// Makes `target_path` ready for a fresh table write according to `mode`.
    ///
    /// `ErrorIfExists` refuses any non-empty target; `Overwrite` deletes every
    /// object below it first. There is no merge of old and new data.
    pub async fn prepare_target(&self, target_path: &str, mode: WriteMode) -> Result<()> {
        let (store, prefix) = self.resolve(target_path)?;
        let existing = self.list_existing(&*store, &prefix).await?;

        if existing.is_empty() {
            return Ok(());
        }

        match mode {
            WriteMode::ErrorIfExists => Err(Error::PathCollision(format!(
                "{} ({} existing objects)",
                target_path,
                existing.len()
            ))),
            WriteMode::Overwrite => {
                info!(
                    target_path,
                    objects = existing.len(),
                    "Clearing existing table data before overwrite"
                );
                for location in existing {
                    store.delete(&location).await?;
                }
                Ok(())
            }
        }
    }

    pub async fn write_marker(&self, summary: &TableWriteSummary) -> Result<()> {
        let marker = TableMarker {
            table: summary.table.clone(),
            rows_written: summary.rows_written,
            partition_columns: summary.partition_columns.clone(),
            created_at: Utc::now(),
        };
        let marker_json = serde_json::to_vec_pretty(&marker)?;

        let (store, prefix) = self.resolve(&summary.path)?;
        let marker_key = prefix.child(SUCCESS_MARKER);

        debug!(marker = %marker_key, "Writing success marker");
        store.put(&marker_key, PutPayload::from(marker_json)).await?;

        Ok(())
    }

    #[cfg(test)]
    pub async fn read_marker(&self, target_path: &str) -> Result<Option<TableMarker>> {
        let (store, prefix) = self.resolve(target_path)?;
        match store.get(&prefix.child(SUCCESS_MARKER)).await {
            Ok(result) => {
                let bytes = result.bytes().await?;
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
