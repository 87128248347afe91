use crate::schema::start_time_type;
use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};
use common::Result;
use datafusion::arrow::array::{Int32Array, Int64Array, StringArray, TimestampMillisecondArray};
use datafusion::arrow::datatypes::DataType;
use datafusion::common::DataFusionError;
use datafusion::execution::context::SessionContext;
use datafusion::logical_expr::ColumnarValue;
use datafusion::logical_expr::{ScalarUDF, Volatility, create_udf};
use std::sync::Arc;

pub const EPOCH_MILLIS_TO_TIMESTAMP: &str = "epoch_millis_to_timestamp";
pub const TS_HOUR: &str = "ts_hour";
pub const TS_DAY: &str = "ts_day";
pub const TS_WEEK: &str = "ts_week";
pub const TS_MONTH: &str = "ts_month";
pub const TS_YEAR: &str = "ts_year";
pub const TS_WEEKDAY: &str = "ts_weekday";

type TimestampPart = fn(&NaiveDateTime) -> i32;

const TIMESTAMP_PARTS: [(&str, TimestampPart); 5] = [
    (TS_HOUR, |dt| dt.hour() as i32),
    (TS_DAY, |dt| dt.day() as i32),
    (TS_WEEK, |dt| dt.iso_week().week() as i32),
    (TS_MONTH, |dt| dt.month() as i32),
    (TS_YEAR, |dt| dt.year()),
];

/// Registers all UDFs with the SessionContext
pub fn register_udfs(ctx: &SessionContext) -> Result<()> {
    // Epoch milliseconds to timestamp conversion UDF
    let to_timestamp = create_udf(
        EPOCH_MILLIS_TO_TIMESTAMP,
        vec![DataType::Int64],
        start_time_type(),
        Volatility::Immutable,
        Arc::new(|args: &[ColumnarValue]| {
            convert_to_timestamp(args).map_err(|e| DataFusionError::Internal(e.to_string()))
        }),
    );
    ctx.register_udf(to_timestamp);

    // Calendar field UDFs
    for (name, part) in TIMESTAMP_PARTS {
        ctx.register_udf(timestamp_part_udf(name, part));
    }

    // Weekday name UDF
    let weekday = create_udf(
        TS_WEEKDAY,
        vec![start_time_type()],
        DataType::Utf8,
        Volatility::Immutable,
        Arc::new(|args: &[ColumnarValue]| {
            extract_weekday_name(args).map_err(|e| DataFusionError::Internal(e.to_string()))
        }),
    );
    ctx.register_udf(weekday);

    Ok(())
}

fn timestamp_part_udf(name: &str, part: TimestampPart) -> ScalarUDF {
    create_udf(
        name,
        vec![start_time_type()],
        DataType::Int32,
        Volatility::Immutable,
        Arc::new(move |args: &[ColumnarValue]| {
            extract_timestamp_part(args, part)
                .map_err(|e| DataFusionError::Internal(e.to_string()))
        }),
    )
}

/// Splits epoch milliseconds into whole seconds and the millisecond
/// remainder, then builds the UTC wall-clock time from both.
pub fn epoch_millis_to_datetime(millis: i64) -> Option<NaiveDateTime> {
    let seconds = millis.div_euclid(1000);
    let remainder_ms = millis.rem_euclid(1000) as u32;
    DateTime::from_timestamp(seconds, remainder_ms * 1_000_000).map(|dt| dt.naive_utc())
}

fn timestamp_to_datetime(millis: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

/// Converts Unix timestamp (milliseconds) to Arrow Timestamp
fn convert_to_timestamp(args: &[ColumnarValue]) -> Result<ColumnarValue> {
    let arrays = ColumnarValue::values_to_arrays(args)?;
    let int_array = arrays[0]
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| DataFusionError::Internal("Expected int64 array".to_string()))?;

    let result: TimestampMillisecondArray = int_array
        .iter()
        .map(|opt_ts| {
            opt_ts
                .and_then(epoch_millis_to_datetime)
                .map(|dt| dt.and_utc().timestamp_millis())
        })
        .collect();

    Ok(ColumnarValue::Array(Arc::new(result)))
}

fn timestamp_array(arrays: &[datafusion::arrow::array::ArrayRef]) -> Result<&TimestampMillisecondArray> {
    let ts_array = arrays[0]
        .as_any()
        .downcast_ref::<TimestampMillisecondArray>()
        .ok_or_else(|| DataFusionError::Internal("Expected timestamp(ms) array".to_string()))?;
    Ok(ts_array)
}

fn extract_timestamp_part(args: &[ColumnarValue], part: TimestampPart) -> Result<ColumnarValue> {
    let arrays = ColumnarValue::values_to_arrays(args)?;
    let ts_array = timestamp_array(&arrays)?;

    let result: Int32Array = ts_array
        .iter()
        .map(|opt_ts| opt_ts.and_then(timestamp_to_datetime).map(|dt| part(&dt)))
        .collect();

    Ok(ColumnarValue::Array(Arc::new(result)))
}

fn extract_weekday_name(args: &[ColumnarValue]) -> Result<ColumnarValue> {
    let arrays = ColumnarValue::values_to_arrays(args)?;
    let ts_array = timestamp_array(&arrays)?;

    let result: StringArray = ts_array
        .iter()
        .map(|opt_ts| {
            opt_ts
                .and_then(timestamp_to_datetime)
                .map(|dt| dt.format("%A").to_string())
        })
        .collect();

    Ok(ColumnarValue::Array(Arc::new(result)))
}
