use crate::processor::storage::StorageManager;
use crate::processor::types::{StarTable, TableWriteSummary};
use arrow::array::{Array, UInt64Array};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use common::config::WriteMode;
use common::{Error, Result};
use datafusion::common::config::TableParquetOptions;
use datafusion::dataframe::DataFrameWriteOptions;
use datafusion::prelude::*;
use std::sync::Arc;
use tracing::info;

pub const TABLE_NAME_KEY: &str = "datalake.table";
pub const PARTITION_COLUMNS_KEY: &str = "datalake.partition_columns";

#[async_trait]
pub trait TableStore: Send + Sync + 'static {
    /// Writes `df` as `table` below `path` and returns what was written.
    async fn write_table(
        &self,
        df: DataFrame,
        table: StarTable,
        path: &str,
    ) -> Result<TableWriteSummary>;

    /// Reads a table written by [`TableStore::write_table`], partition
    /// columns included.
    async fn read_table(&self, table: StarTable, path: &str) -> Result<DataFrame>;
}

pub struct ParquetTableStore {
    ctx: Arc<SessionContext>,
    storage: StorageManager,
    write_mode: WriteMode,
}

impl ParquetTableStore {
    pub fn new(ctx: Arc<SessionContext>, write_mode: WriteMode) -> Self {
        let storage = StorageManager::new(ctx.clone());
        Self {
            ctx,
            storage,
            write_mode,
        }
    }

    /// Orders the columns as declared for `table`. Partition columns become
    /// text so they can be spelled out in directory names.
    fn conform(&self, df: DataFrame, table: StarTable) -> Result<DataFrame> {
        let partitions = table.partition_columns();
        let columns = table
            .schema()
            .fields()
            .iter()
            .map(|field| {
                let target = if partitions.contains(&field.name().as_str()) {
                    DataType::Utf8
                } else {
                    field.data_type().clone()
                };
                cast(col(field.name()), target).alias(field.name())
            })
            .collect::<Vec<_>>();
        Ok(df.select(columns)?)
    }

    fn parquet_options(&self, table: StarTable) -> TableParquetOptions {
        let mut options = TableParquetOptions::new();
        options
            .key_value_metadata
            .insert(TABLE_NAME_KEY.to_string(), Some(table.as_str().to_string()));
        options.key_value_metadata.insert(
            PARTITION_COLUMNS_KEY.to_string(),
            Some(table.partition_columns().join(",")),
        );
        options
    }
}

#[async_trait]
impl TableStore for ParquetTableStore {
    async fn write_table(
        &self,
        df: DataFrame,
        table: StarTable,
        path: &str,
    ) -> Result<TableWriteSummary> {
        self.storage.prepare_target(path, self.write_mode).await?;

        let partition_columns: Vec<String> = table
            .partition_columns()
            .iter()
            .map(|c| c.to_string())
            .collect();
        let write_options =
            DataFrameWriteOptions::new().with_partition_by(partition_columns.clone());

        let result = self
            .conform(df, table)?
            .write_parquet(path, write_options, Some(self.parquet_options(table)))
            .await?;
        let rows_written = rows_in_write_result(&result)?;

        info!(
            table = table.as_str(),
            path,
            rows_written,
            partitioned_by = ?partition_columns,
            "Wrote table"
        );

        let summary = TableWriteSummary {
            table: table.as_str().to_string(),
            path: path.to_string(),
            rows_written,
            partition_columns,
        };
        self.storage.write_marker(&summary).await?;

        Ok(summary)
    }

    async fn read_table(&self, table: StarTable, path: &str) -> Result<DataFrame> {
        let file_schema = table.file_schema();
        let options = ParquetReadOptions::default()
            .schema(&file_schema)
            .table_partition_cols(table.partition_fields());

        let df = self.ctx.read_parquet(path, options).await?;
        let columns: Vec<_> = table
            .schema()
            .fields()
            .iter()
            .map(|f| col(f.name()))
            .collect();
        Ok(df.select(columns)?)
    }
}

/// DataFusion reports a write as a single `count` column.
fn rows_in_write_result(batches: &[RecordBatch]) -> Result<u64> {
    let mut rows = 0;
    for batch in batches {
        let counts = batch
            .column(0)
            .as_any()
            .downcast_ref::<UInt64Array>()
            .ok_or_else(|| Error::Storage("Unexpected write result type".to_string()))?;
        rows += counts.iter().flatten().sum::<u64>();
    }
    Ok(rows)
}
