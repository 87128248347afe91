pub mod activity;
pub mod catalog;
mod core;
pub mod fact;
pub mod reader;
pub mod session;
pub mod storage;
pub mod table;
pub mod types;
mod udf;

#[cfg(test)]
pub(crate) mod test_util;

pub use activity::{ActivityTables, ActivityTransformer};
pub use catalog::{CatalogTables, CatalogTransformer};
pub use self::core::DataLakeProcessor;
pub use fact::{FactAssembler, FactOutput};
pub use reader::{JsonDatasetReader, LoadedDataset};
pub use session::create_session;
pub use storage::{StorageManager, TableMarker};
pub use table::{ParquetTableStore, TableStore};
pub use types::{JobReport, StarTable, TableWriteSummary};
pub use udf::{epoch_millis_to_datetime, register_udfs};
