use crate::processor::udf::register_udfs;
use crate::storage::{S3Config, S3Manager};
use crate::utils::paths::s3_bucket;
use common::config::Settings;
use common::{Error, Result};
use datafusion::execution::context::SessionContext;
use datafusion::prelude::SessionConfig;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

/// Engine options taken from the `[engine]` settings. Sub-directory listing
/// stays enabled so nested source trees and partitioned tables are read whole.
pub fn session_config(settings: &Settings) -> SessionConfig {
    let mut config = SessionConfig::new()
        .set_bool("datafusion.execution.listing_table_ignore_subdirectory", false);

    if let Some(target_partitions) = settings.engine.target_partitions {
        config = config.with_target_partitions(target_partitions);
    }
    if let Some(batch_size) = settings.engine.batch_size {
        config = config.with_batch_size(batch_size);
    }
    config
}

/// Builds the one session shared by every stage of the job.
///
/// Buckets named by the input and output roots are checked and registered
/// before anything is read. Local roots use DataFusion's built-in file store.
pub async fn create_session(settings: &Settings) -> Result<Arc<SessionContext>> {
    let ctx = SessionContext::new_with_config(session_config(settings));
    register_udfs(&ctx)?;

    let buckets: BTreeSet<String> = [&settings.input_data, &settings.output_data]
        .into_iter()
        .filter_map(|root| s3_bucket(root))
        .collect();

    if !buckets.is_empty() {
        let storage = settings.storage.as_ref().ok_or_else(|| {
            Error::Auth(format!(
                "S3 roots {:?} configured without [storage] credentials",
                buckets
            ))
        })?;
        let s3_manager = S3Manager::new(S3Config::from(storage));

        for bucket in &buckets {
            s3_manager.verify_bucket_exists(bucket).await?;
            s3_manager.register_object_store(&ctx, bucket)?;
        }
    }

    info!(
        target_partitions = ctx.state().config().target_partitions(),
        buckets = buckets.len(),
        "Session ready"
    );
    Ok(Arc::new(ctx))
}
