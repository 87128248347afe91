use arrow::datatypes::SchemaRef;
use arrow::json::reader::ReaderBuilder;
use arrow::record_batch::RecordBatch;
use common::Result;
use datafusion::datasource::MemTable;
use datafusion::datasource::listing::ListingTableUrl;
use datafusion::prelude::*;
use futures::{StreamExt, TryStreamExt};
use object_store::{ObjectMeta, ObjectStore};
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, info, warn};

const JSON_EXTENSION: &str = ".json";

/// Objects fetched from the store at the same time.
const MAX_CONCURRENT_FETCHES: usize = 32;

/// A raw document tree parsed into a single DataFrame.
pub struct LoadedDataset {
    pub df: DataFrame,
    pub files: usize,
    pub records: usize,
    /// Lines dropped because they were not a UTF-8 JSON object or did not fit the schema.
    pub skipped_lines: usize,
}

/// Decoded content of one document.
struct DecodedDocument {
    batches: Vec<RecordBatch>,
    skipped_lines: usize,
}

pub struct JsonDatasetReader {
    ctx: Arc<SessionContext>,
    batch_size: usize,
    target_partitions: usize,
}

impl JsonDatasetReader {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        let config = ctx.state().config().clone();
        Self {
            ctx,
            batch_size: config.batch_size(),
            target_partitions: config.target_partitions().max(1),
        }
    }

    /// Reads every `*.json` object below `source_path`, at any depth, as
    /// line-delimited JSON decoded against `schema`.
    ///
    /// Objects are fetched concurrently and their batches are spread over
    /// the session's target partitions, so later stages scan them in parallel.
    pub async fn load_data(&self, source_path: &str, schema: SchemaRef) -> Result<LoadedDataset> {
        let table_url = ListingTableUrl::parse(source_path)?;
        let store = self.ctx.runtime_env().object_store(table_url.object_store())?;

        let files = self.list_json_files(&*store, &table_url).await?;
        info!(source_path, files = files.len(), "Reading JSON documents");

        let documents: Vec<DecodedDocument> = futures::stream::iter(files.iter())
            .map(|file| self.read_document(&*store, file, schema.clone()))
            .buffered(MAX_CONCURRENT_FETCHES)
            .try_collect()
            .await?;

        let mut partitions = vec![Vec::new(); self.target_partitions];
        let mut skipped_lines = 0;
        let mut records = 0;
        let mut next = 0;
        for document in documents {
            skipped_lines += document.skipped_lines;
            for batch in document.batches {
                records += batch.num_rows();
                partitions[next % self.target_partitions].push(batch);
                next += 1;
            }
        }

        let table = MemTable::try_new(schema, partitions)?;
        let df = self.ctx.read_table(Arc::new(table))?;

        Ok(LoadedDataset {
            df,
            files: files.len(),
            records,
            skipped_lines,
        })
    }

    /// Builds a DataFrame from in-memory JSON lines with the same lenient
    /// rules as [`JsonDatasetReader::load_data`].
    #[cfg(test)]
    pub fn from_json_lines(&self, content: &str, schema: SchemaRef) -> Result<LoadedDataset> {
        let document = self.decode_document(content.as_bytes(), schema.clone())?;
        let records = document.batches.iter().map(|b| b.num_rows()).sum();
        let table = MemTable::try_new(schema, vec![document.batches])?;

        Ok(LoadedDataset {
            df: self.ctx.read_table(Arc::new(table))?,
            files: 0,
            records,
            skipped_lines: document.skipped_lines,
        })
    }

    async fn list_json_files(
        &self,
        store: &dyn ObjectStore,
        table_url: &ListingTableUrl,
    ) -> Result<Vec<ObjectMeta>> {
        let mut files: Vec<ObjectMeta> = store
            .list(Some(table_url.prefix()))
            .try_filter(|meta| futures::future::ready(meta.location.as_ref().ends_with(JSON_EXTENSION)))
            .try_collect()
            .await?;

        // Listing order is store dependent
        files.sort_by(|a, b| a.location.cmp(&b.location));
        Ok(files)
    }

    async fn read_document(
        &self,
        store: &dyn ObjectStore,
        file: &ObjectMeta,
        schema: SchemaRef,
    ) -> Result<DecodedDocument> {
        let bytes = store.get(&file.location).await?.bytes().await?;
        let document = self.decode_document(&bytes, schema)?;

        if document.skipped_lines > 0 {
            warn!(
                file = %file.location,
                skipped = document.skipped_lines,
                "Skipped malformed JSON lines"
            );
        }
        Ok(document)
    }

    fn decode_document(&self, content: &[u8], schema: SchemaRef) -> Result<DecodedDocument> {
        let lines = parse_json_lines(content);
        let (batches, rejected) = self.json_strings_to_batches(&lines.valid, schema)?;
        Ok(DecodedDocument {
            batches,
            skipped_lines: lines.invalid + rejected,
        })
    }

    /// Decodes the lines against `schema`. Returns the batches and the number
    /// of lines rejected by the typed decoder.
    fn json_strings_to_batches(
        &self,
        json_strings: &[&str],
        schema: SchemaRef,
    ) -> Result<(Vec<RecordBatch>, usize)> {
        if json_strings.is_empty() {
            return Ok((vec![], 0));
        }

        match self.decode(json_strings, schema.clone()) {
            Ok(batches) => Ok((batches, 0)),
            Err(e) => {
                debug!("Batch decode failed ({}), retrying line by line", e);
                let mut batches = Vec::new();
                let mut rejected = 0;
                for line in json_strings {
                    match self.decode(&[line], schema.clone()) {
                        Ok(decoded) => batches.extend(decoded),
                        Err(e) => {
                            debug!("Rejected JSON line: {}", e);
                            rejected += 1;
                        }
                    }
                }
                Ok((batches, rejected))
            }
        }
    }

    fn decode(&self, json_strings: &[&str], schema: SchemaRef) -> Result<Vec<RecordBatch>> {
        let mut cursor = Cursor::new(json_strings.join("\n"));
        let reader = ReaderBuilder::new(schema)
            .with_batch_size(self.batch_size)
            .with_coerce_primitive(true)
            .build(&mut cursor)?;

        let mut batches = Vec::new();
        for batch in reader {
            let batch = batch?;
            if batch.num_rows() > 0 {
                batches.push(batch);
            }
        }
        Ok(batches)
    }
}

struct JsonLines<'a> {
    valid: Vec<&'a str>,
    invalid: usize,
}

/// Splits a document into candidate records. Blank lines are ignored; lines
/// that are not UTF-8 or not a JSON object are counted as invalid.
fn parse_json_lines(content: &[u8]) -> JsonLines<'_> {
    let mut valid = Vec::new();
    let mut invalid = 0;

    for line in content.split(|b| *b == b'\n') {
        let Ok(line) = std::str::from_utf8(line) else {
            invalid += 1;
            continue;
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(_)) => valid.push(trimmed),
            _ => invalid += 1,
        }
    }

    JsonLines { valid, invalid }
}
