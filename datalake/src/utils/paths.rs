use crate::processor::StarTable;
use common::config::join_prefix;
use url::Url;

pub struct PathBuilder {
    root: String,
}

impl PathBuilder {
    pub fn new(root: &str) -> Self {
        Self {
            root: root.to_string(),
        }
    }

    /// Directory for a star table, e.g. `s3://bucket/songs_table/`.
    pub fn build_table_path(&self, table: StarTable) -> String {
        join_prefix(&self.root, table.directory())
    }
}

/// Bucket named by an `s3://` path. Local paths have none.
pub fn s3_bucket(path: &str) -> Option<String> {
    let url = Url::parse(path).ok()?;
    if url.scheme() != "s3" {
        return None;
    }
    url.host_str().map(|host| host.to_string())
}
