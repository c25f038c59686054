//! Parquet codec for [`OverviewTable`].
//!
//! The table layout (hz, signals, aggregators, time base, row accounting) is
//! stored as one JSON document in the Parquet key/value metadata under
//! [`OVERVIEW_METADATA_KEY`](crate::OVERVIEW_METADATA_KEY). Arrow schema
//! metadata stays empty so encoding the same table always yields the same
//! bytes.

use ap_common::AggFunc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::table::OverviewTable;

/// Errors raised while encoding or decoding an overview file.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("parquet codec error: {0}")]
    Codec(String),

    #[error("malformed overview: {0}")]
    Malformed(String),

    #[error("incompatible overview schema version {found} (reader {expected})")]
    IncompatibleSchema { found: String, expected: String },

    #[error("{0} support is not compiled in")]
    Unavailable(&'static str),
}

/// Layout document persisted alongside the columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OverviewMeta {
    schema_version: String,
    hz: f64,
    time_col: Option<String>,
    synthetic_time: bool,
    signals: Vec<String>,
    aggs: Vec<AggFunc>,
    dropped_rows: u64,
    source_time_regressions: u64,
}

impl OverviewMeta {
    #[cfg_attr(not(feature = "parquet"), allow(dead_code))]
    fn of(table: &OverviewTable) -> Self {
        OverviewMeta {
            schema_version: ap_common::SCHEMA_VERSION.to_string(),
            hz: table.hz,
            time_col: table.time_col.clone(),
            synthetic_time: table.synthetic_time,
            signals: table.signals.clone(),
            aggs: table.aggs.clone(),
            dropped_rows: table.dropped_rows,
            source_time_regressions: table.source_time_regressions,
        }
    }
}

/// Whether this build can read and write overview files.
pub fn is_available() -> bool {
    cfg!(feature = "parquet")
}

#[cfg(feature = "parquet")]
pub fn encode_overview(table: &OverviewTable) -> Result<Vec<u8>, CodecError> {
    table.check_invariants().map_err(CodecError::Malformed)?;
    write_overview(table, &OverviewMeta::of(table))
}

/// Columns of `table` with `meta` as the layout document.
#[cfg(feature = "parquet")]
fn write_overview(table: &OverviewTable, meta: &OverviewMeta) -> Result<Vec<u8>, CodecError> {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Float64Array, Int64Array, UInt64Array};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;
    use parquet::basic::{Compression, ZstdLevel};
    use parquet::file::properties::WriterProperties;
    use parquet::format::KeyValue;

    let schema = Arc::new(crate::schema::overview_schema(&table.signals, &table.aggs));
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(table.buckets.iter().map(|b| b.index))),
        Arc::new(Float64Array::from_iter_values(
            table.buckets.iter().map(|b| b.start_time),
        )),
        Arc::new(Float64Array::from_iter_values(
            table.buckets.iter().map(|b| b.end_time),
        )),
        Arc::new(UInt64Array::from_iter_values(
            table.buckets.iter().map(|b| b.row_count),
        )),
    ];
    let width = table.signals.len() * table.aggs.len();
    for slot in 0..width {
        let values: Float64Array = table.buckets.iter().map(|b| b.values[slot]).collect();
        columns.push(Arc::new(values));
    }

    let batch = RecordBatch::try_new(schema.clone(), columns)
        .map_err(|e| CodecError::Codec(e.to_string()))?;

    let meta = serde_json::to_string(meta)
        .map_err(|e| CodecError::Codec(e.to_string()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .set_key_value_metadata(Some(vec![KeyValue::new(
            crate::OVERVIEW_METADATA_KEY.to_string(),
            meta,
        )]))
        .build();

    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, schema, Some(props))
        .map_err(|e| CodecError::Codec(e.to_string()))?;
    writer
        .write(&batch)
        .map_err(|e| CodecError::Codec(e.to_string()))?;
    writer
        .close()
        .map_err(|e| CodecError::Codec(e.to_string()))?;

    tracing::debug!(
        buckets = table.buckets.len(),
        columns = 4 + width,
        bytes = buf.len(),
        "encoded overview"
    );
    Ok(buf)
}

#[cfg(feature = "parquet")]
pub fn decode_overview(data: Vec<u8>) -> Result<OverviewTable, CodecError> {
    use arrow::array::{Array, Float64Array, Int64Array, UInt64Array};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    use crate::schema::{column_names, BUCKET_END_TIME, BUCKET_INDEX, BUCKET_START_TIME, ROW_COUNT};
    use crate::table::Bucket;

    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes::Bytes::from(data))
        .map_err(|e| CodecError::Codec(e.to_string()))?;

    let raw_meta = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .and_then(|kvs| {
            kvs.iter()
                .find(|kv| kv.key == crate::OVERVIEW_METADATA_KEY)
                .and_then(|kv| kv.value.clone())
        })
        .ok_or_else(|| CodecError::Malformed("missing overview metadata".to_string()))?;
    let meta: OverviewMeta = serde_json::from_str(&raw_meta)
        .map_err(|e| CodecError::Malformed(format!("overview metadata: {}", e)))?;
    if !ap_common::schema::is_compatible(&meta.schema_version) {
        return Err(CodecError::IncompatibleSchema {
            found: meta.schema_version,
            expected: ap_common::SCHEMA_VERSION.to_string(),
        });
    }

    let expected = column_names(&meta.signals, &meta.aggs);
    let found: Vec<&String> = builder.schema().fields().iter().map(|f| f.name()).collect();
    if found.len() != expected.len() || found.iter().zip(&expected).any(|(f, e)| *f != e) {
        return Err(CodecError::Malformed(format!(
            "columns {:?} do not match the overview layout {:?}",
            found, expected
        )));
    }
    let value_columns = &expected[4..];

    let reader = builder
        .build()
        .map_err(|e| CodecError::Codec(e.to_string()))?;

    let mut buckets = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| CodecError::Codec(e.to_string()))?;

        macro_rules! column {
            ($name:expr, $ty:ty) => {
                batch
                    .column_by_name($name)
                    .and_then(|c| c.as_any().downcast_ref::<$ty>())
                    .ok_or_else(|| CodecError::Malformed(format!("column {} missing or mistyped", $name)))?
            };
        }

        let index = column!(BUCKET_INDEX, Int64Array);
        let start = column!(BUCKET_START_TIME, Float64Array);
        let end = column!(BUCKET_END_TIME, Float64Array);
        let rows = column!(ROW_COUNT, UInt64Array);
        let mut values = Vec::with_capacity(value_columns.len());
        for name in value_columns {
            values.push(column!(name.as_str(), Float64Array));
        }

        for i in 0..batch.num_rows() {
            buckets.push(Bucket {
                index: index.value(i),
                start_time: start.value(i),
                end_time: end.value(i),
                row_count: rows.value(i),
                values: values
                    .iter()
                    .map(|col| (!col.is_null(i)).then(|| col.value(i)))
                    .collect(),
            });
        }
    }

    let table = OverviewTable {
        hz: meta.hz,
        signals: meta.signals,
        aggs: meta.aggs,
        time_col: meta.time_col,
        synthetic_time: meta.synthetic_time,
        dropped_rows: meta.dropped_rows,
        source_time_regressions: meta.source_time_regressions,
        buckets,
    };
    table.check_invariants().map_err(CodecError::Malformed)?;
    tracing::debug!(buckets = table.buckets.len(), "decoded overview");
    Ok(table)
}

#[cfg(not(feature = "parquet"))]
pub fn encode_overview(_table: &OverviewTable) -> Result<Vec<u8>, CodecError> {
    Err(CodecError::Unavailable("parquet"))
}

#[cfg(not(feature = "parquet"))]
pub fn decode_overview(_data: Vec<u8>) -> Result<OverviewTable, CodecError> {
    Err(CodecError::Unavailable("parquet"))
}
