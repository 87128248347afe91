use crate::schema::{artists_schema, songplays_schema, songs_schema, time_schema, users_schema};
use arrow::datatypes::{DataType, Schema};
use serde::Serialize;
use std::collections::BTreeMap;

// All tables of the star schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StarTable {
    Songs,
    Artists,
    Users,
    Time,
    Songplays,
}

impl StarTable {
    pub const ALL: [StarTable; 5] = [
        Self::Songs,
        Self::Artists,
        Self::Users,
        Self::Time,
        Self::Songplays,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Songs => "songs",
            Self::Artists => "artists",
            Self::Users => "users",
            Self::Time => "time",
            Self::Songplays => "songplays",
        }
    }

    pub fn directory(&self) -> &'static str {
        match self {
            Self::Songs => "songs_table",
            Self::Artists => "artists_table",
            Self::Users => "users_table",
            Self::Time => "time_table",
            Self::Songplays => "songplays_table",
        }
    }

    /// Hive partition columns, outermost directory level first.
    pub fn partition_columns(&self) -> &'static [&'static str] {
        match self {
            Self::Songs => &["year", "artist_id"],
            Self::Time | Self::Songplays => &["year", "month"],
            Self::Artists | Self::Users => &[],
        }
    }

    pub fn schema(&self) -> Schema {
        match self {
            Self::Songs => songs_schema(),
            Self::Artists => artists_schema(),
            Self::Users => users_schema(),
            Self::Time => time_schema(),
            Self::Songplays => songplays_schema(),
        }
    }

    /// Columns stored inside the parquet files: the table schema minus the
    /// partition columns, which only live in the directory names.
    pub fn file_schema(&self) -> Schema {
        let partitions = self.partition_columns();
        let fields: Vec<_> = self
            .schema()
            .fields()
            .iter()
            .filter(|f| !partitions.contains(&f.name().as_str()))
            .map(|f| f.as_ref().clone())
            .collect();
        Schema::new(fields)
    }

    /// Partition columns with the types they are read back as.
    pub fn partition_fields(&self) -> Vec<(String, DataType)> {
        let schema = self.schema();
        self.partition_columns()
            .iter()
            .filter_map(|name| {
                schema
                    .field_with_name(name)
                    .ok()
                    .map(|f| (name.to_string(), f.data_type().clone()))
            })
            .collect()
    }
}

impl std::fmt::Display for StarTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one table write.
#[derive(Debug, Clone, Serialize)]
pub struct TableWriteSummary {
    pub table: String,
    pub path: String,
    pub rows_written: u64,
    pub partition_columns: Vec<String>,
}

/// Counters gathered over one batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobReport {
    pub tables: BTreeMap<String, TableWriteSummary>,
    pub song_files: usize,
    pub log_files: usize,
    pub song_records: usize,
    pub log_records: usize,
    pub skipped_song_lines: usize,
    pub skipped_log_lines: usize,
    pub play_events: usize,
    pub unmatched_plays: usize,
    pub untimed_plays: usize,
}

impl JobReport {
    pub fn record_write(&mut self, summary: TableWriteSummary) {
        self.tables.insert(summary.table.clone(), summary);
    }

    pub fn rows_written(&self, table: StarTable) -> Option<u64> {
        self.tables.get(table.as_str()).map(|s| s.rows_written)
    }
}
