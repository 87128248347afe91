pub mod datalake;
pub use datalake::DataLakeService;
