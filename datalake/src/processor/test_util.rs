use crate::processor::reader::JsonDatasetReader;
use crate::processor::udf::register_udfs;
use arrow::array::{Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, SchemaRef};
use datafusion::prelude::*;
use std::sync::Arc;

pub fn session() -> Arc<SessionContext> {
    let ctx = SessionContext::new();
    register_udfs(&ctx).unwrap();
    Arc::new(ctx)
}

pub fn df_from_json(ctx: &Arc<SessionContext>, lines: &[&str], schema: SchemaRef) -> DataFrame {
    JsonDatasetReader::new(ctx.clone())
        .from_json_lines(&lines.join("\n"), schema)
        .unwrap()
        .df
}

/// Sorted values of a text column, whatever string encoding the plan produced.
pub async fn strings(df: &DataFrame, column: &str) -> Vec<Option<String>> {
    let mut values = Vec::new();
    for batch in df.clone().select_columns(&[column]).unwrap().collect().await.unwrap() {
        let array = cast(batch.column(0), &DataType::Utf8).unwrap();
        let array = array.as_any().downcast_ref::<StringArray>().unwrap();
        for i in 0..array.len() {
            values.push(array.is_valid(i).then(|| array.value(i).to_string()));
        }
    }
    values.sort();
    values
}

/// Sorted values of an integer or timestamp column widened to i64.
pub async fn ints(df: &DataFrame, column: &str) -> Vec<Option<i64>> {
    let mut values = Vec::new();
    for batch in df.clone().select_columns(&[column]).unwrap().collect().await.unwrap() {
        let array = cast(batch.column(0), &DataType::Int64).unwrap();
        let array = array.as_any().downcast_ref::<Int64Array>().unwrap();
        values.extend(array.iter());
    }
    values.sort();
    values
}
