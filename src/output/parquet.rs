//! Columnar output: one Arrow RecordBatch per group, written as Parquet.
//!
//! Selected output fields become typed columns. The Parquet bytes flow
//! through the compression layer like any other format, so the layering
//! stays uniform even though Parquet has internal compression of its own.

use arrow::array::{
    ArrayRef, BinaryArray, Int32Array, Int64Array, RecordBatch, StringArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use parquet::arrow::ArrowWriter;
use snafu::prelude::*;
use std::io::Write;
use std::sync::Arc;

use super::headers_json;
use crate::error::{ArrowSnafu, ParquetSnafu, WriteError};
use crate::record::{OutputField, Record};

fn schema(fields: &[OutputField]) -> Schema {
    let arrow_fields: Vec<Field> = fields
        .iter()
        .map(|field| match field {
            OutputField::Key => Field::new("key", DataType::Binary, true),
            OutputField::Value => Field::new("value", DataType::Binary, false),
            OutputField::Offset => Field::new("offset", DataType::Int64, false),
            OutputField::Timestamp => Field::new(
                "timestamp",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
            OutputField::Headers => Field::new("headers", DataType::Utf8, false),
            OutputField::Topic => Field::new("topic", DataType::Utf8, false),
            OutputField::Partition => Field::new("partition", DataType::Int32, false),
        })
        .collect();
    Schema::new(arrow_fields)
}

fn column(field: OutputField, records: &[Record]) -> Result<ArrayRef, WriteError> {
    Ok(match field {
        OutputField::Key => {
            let keys: Vec<Option<&[u8]>> = records
                .iter()
                .map(|r| r.key.as_ref().map(|k| k.as_ref()))
                .collect();
            Arc::new(BinaryArray::from_opt_vec(keys))
        }
        OutputField::Value => {
            let values: Vec<&[u8]> = records.iter().map(|r| r.value.as_ref()).collect();
            Arc::new(BinaryArray::from_vec(values))
        }
        OutputField::Offset => {
            Arc::new(Int64Array::from_iter_values(records.iter().map(|r| r.offset)))
        }
        OutputField::Timestamp => Arc::new(
            TimestampMicrosecondArray::from_iter_values(
                records.iter().map(|r| r.timestamp.timestamp_micros()),
            )
            .with_timezone("UTC"),
        ),
        OutputField::Headers => {
            let rendered: Vec<String> = records
                .iter()
                .map(headers_json)
                .collect::<Result<_, _>>()?;
            Arc::new(StringArray::from(rendered))
        }
        OutputField::Topic => Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.topic.as_str()),
        )),
        OutputField::Partition => Arc::new(Int32Array::from_iter_values(
            records.iter().map(|r| r.partition),
        )),
    })
}

/// Serialize a group of records as a single-batch Parquet file into `out`,
/// returning the sink for finalization by the caller.
pub(super) fn write_group<W: Write + Send>(
    out: W,
    fields: &[OutputField],
    records: &[Record],
) -> Result<W, WriteError> {
    let schema = Arc::new(schema(fields));

    let columns: Vec<ArrayRef> = fields
        .iter()
        .map(|field| column(*field, records))
        .collect::<Result<_, _>>()?;

    let batch = RecordBatch::try_new(schema.clone(), columns).context(ArrowSnafu)?;

    let mut writer = ArrowWriter::try_new(out, schema, None).context(ParquetSnafu)?;
    writer.write(&batch).context(ParquetSnafu)?;
    writer.into_inner().context(ParquetSnafu)
}
