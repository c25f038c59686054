//! Arrow schema for the persisted overview table.
//!
//! Columns: `bucket_index`, `bucket_start_time`, `bucket_end_time`,
//! `row_count`, then one nullable `Float64` column per signal × aggregator,
//! named `<signal>__<agg>`, in signal-major order.

use ap_common::AggFunc;

pub const BUCKET_INDEX: &str = "bucket_index";
pub const BUCKET_START_TIME: &str = "bucket_start_time";
pub const BUCKET_END_TIME: &str = "bucket_end_time";
pub const ROW_COUNT: &str = "row_count";

/// Column name of one signal aggregate.
pub fn signal_column(signal: &str, agg: AggFunc) -> String {
    format!("{}__{}", signal, agg.as_str())
}

/// Column names in schema order.
pub fn column_names(signals: &[String], aggs: &[AggFunc]) -> Vec<String> {
    let mut names = vec![
        BUCKET_INDEX.to_string(),
        BUCKET_START_TIME.to_string(),
        BUCKET_END_TIME.to_string(),
        ROW_COUNT.to_string(),
    ];
    for signal in signals {
        for agg in aggs {
            names.push(signal_column(signal, *agg));
        }
    }
    names
}

#[cfg(feature = "parquet")]
pub fn overview_schema(signals: &[String], aggs: &[AggFunc]) -> arrow::datatypes::Schema {
    use arrow::datatypes::{DataType, Field, Schema};

    let mut fields = vec![
        Field::new(BUCKET_INDEX, DataType::Int64, false),
        Field::new(BUCKET_START_TIME, DataType::Float64, false),
        Field::new(BUCKET_END_TIME, DataType::Float64, false),
        Field::new(ROW_COUNT, DataType::UInt64, false),
    ];
    for signal in signals {
        for agg in aggs {
            fields.push(Field::new(
                signal_column(signal, *agg),
                DataType::Float64,
                true,
            ));
        }
    }
    Schema::new(fields)
}
