//! The per-group output pipeline: envelope -> format serializer ->
//! compression -> byte sink.
//!
//! A pipeline is built fresh for each group in a flush and consumed by a
//! single [`OutputPipeline::write_records`] call. When that call returns
//! `Ok`, all format framing and compression trailers have been flushed and
//! the sink holds a complete, independently decodable unit.

pub mod compression;
mod parquet;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use snafu::prelude::*;
use std::collections::HashMap;
use std::io::Write;

use crate::error::{IoSnafu, JsonSnafu, SerializationSnafu, WriteError};
use crate::record::{OutputField, Record};

pub use compression::{Compression, CompressionWriter};

/// Output format variants.
///
/// Each variant defines how a record's selected fields map to bytes;
/// compression and envelope are orthogonal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON document per record, newline-terminated.
    #[default]
    Jsonl,
    /// A single JSON array of per-record documents.
    Json,
    /// One comma-separated line per record; key and value base64-encoded.
    Csv,
    /// Columnar: one Arrow batch per group written as Parquet.
    Parquet,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Jsonl => "jsonl",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
        }
    }
}

/// Everything needed to build a pipeline, carried by configuration.
#[derive(Debug, Clone)]
pub struct WriterSettings {
    pub format: OutputFormat,
    pub compression: Compression,
    /// Ordered, non-empty field selection.
    pub output_fields: Vec<OutputField>,
    /// When false, exactly one field is written bare (no metadata wrapper).
    pub envelope: bool,
    /// Opaque properties handed through from configuration. None of the
    /// built-in formats read these; they exist for host-defined format
    /// extensions.
    pub external_properties: HashMap<String, String>,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            compression: Compression::default(),
            output_fields: vec![OutputField::Value],
            envelope: true,
            external_properties: HashMap::new(),
        }
    }
}

/// A composed output pipeline bound to a single byte sink.
pub struct OutputPipeline<W: Write + Send> {
    writer: CompressionWriter<W>,
    format: OutputFormat,
    fields: Vec<OutputField>,
    envelope: bool,
}

impl<W: Write + Send> OutputPipeline<W> {
    /// Compose the pipeline over `sink` per the given settings.
    pub fn build(sink: W, settings: &WriterSettings) -> Result<Self, WriteError> {
        let writer = CompressionWriter::new(settings.compression, sink).context(IoSnafu)?;
        Ok(Self {
            writer,
            format: settings.format,
            fields: settings.output_fields.clone(),
            envelope: settings.envelope,
        })
    }

    /// Serialize `records` in order, then flush and finalize every layer.
    ///
    /// Consumes the pipeline: after an error the sink may hold partial
    /// content, but the sink itself is dropped with the pipeline on every
    /// exit path.
    pub fn write_records(self, records: &[Record]) -> Result<(), WriteError> {
        let fields = self.fields;
        let envelope = self.envelope;
        let mut writer = self.writer;

        match self.format {
            OutputFormat::Jsonl => {
                for record in records {
                    let line = render_line(record, &fields, envelope)?;
                    writer.write_all(&line).context(IoSnafu)?;
                    writer.write_all(b"\n").context(IoSnafu)?;
                }
            }
            OutputFormat::Json => {
                writer.write_all(b"[").context(IoSnafu)?;
                for (i, record) in records.iter().enumerate() {
                    if i > 0 {
                        writer.write_all(b",").context(IoSnafu)?;
                    }
                    writer.write_all(b"\n").context(IoSnafu)?;
                    let doc = render_document(record, &fields, envelope)?;
                    serde_json::to_writer(&mut writer, &doc).context(JsonSnafu)?;
                }
                writer.write_all(b"\n]").context(IoSnafu)?;
            }
            OutputFormat::Csv => {
                for record in records {
                    let cells: Vec<String> = fields
                        .iter()
                        .map(|field| csv_cell(record, *field))
                        .collect::<Result<_, _>>()?;
                    writer
                        .write_all(cells.join(",").as_bytes())
                        .context(IoSnafu)?;
                    writer.write_all(b"\n").context(IoSnafu)?;
                }
            }
            OutputFormat::Parquet => {
                let writer = parquet::write_group(writer, &fields, records)?;
                writer.finish().context(IoSnafu)?;
                return Ok(());
            }
        }

        writer.finish().context(IoSnafu)?;
        Ok(())
    }
}

/// One jsonl line: an enveloped document, or the single selected field bare.
fn render_line(
    record: &Record,
    fields: &[OutputField],
    envelope: bool,
) -> Result<Vec<u8>, WriteError> {
    if envelope {
        let doc = render_document(record, fields, true)?;
        serde_json::to_vec(&doc).context(JsonSnafu)
    } else {
        bare_bytes(record, fields[0])
    }
}

/// The JSON document for a record: an object of selected fields, or a single
/// JSON value when the envelope is disabled.
fn render_document(
    record: &Record,
    fields: &[OutputField],
    envelope: bool,
) -> Result<Value, WriteError> {
    if !envelope {
        return field_value(record, fields[0]);
    }
    let mut doc = serde_json::Map::with_capacity(fields.len());
    for field in fields {
        doc.insert(field.as_str().to_string(), field_value(record, *field)?);
    }
    Ok(Value::Object(doc))
}

fn field_value(record: &Record, field: OutputField) -> Result<Value, WriteError> {
    Ok(match field {
        OutputField::Key => match &record.key {
            None => Value::Null,
            Some(key) => Value::String(utf8(key, record, "key")?.to_string()),
        },
        OutputField::Value => Value::String(utf8(&record.value, record, "value")?.to_string()),
        OutputField::Offset => json!(record.offset),
        OutputField::Timestamp => Value::String(rfc3339(record)),
        OutputField::Headers => headers_value(record)?,
        OutputField::Topic => Value::String(record.topic.clone()),
        OutputField::Partition => json!(record.partition),
    })
}

/// Raw (unquoted) rendering of a single field for non-enveloped output.
fn bare_bytes(record: &Record, field: OutputField) -> Result<Vec<u8>, WriteError> {
    Ok(match field {
        OutputField::Key => record
            .key
            .as_ref()
            .context(SerializationSnafu {
                offset: record.offset,
                reason: "bare key output requires a record key",
            })?
            .to_vec(),
        OutputField::Value => record.value.to_vec(),
        OutputField::Offset => record.offset.to_string().into_bytes(),
        OutputField::Timestamp => rfc3339(record).into_bytes(),
        OutputField::Headers => headers_json(record)?.into_bytes(),
        OutputField::Topic => record.topic.clone().into_bytes(),
        OutputField::Partition => record.partition.to_string().into_bytes(),
    })
}

/// One CSV cell. Binary fields are base64-encoded; headers have no CSV
/// representation and are rejected. Cells containing a delimiter, quote,
/// or newline are quoted per RFC 4180.
fn csv_cell(record: &Record, field: OutputField) -> Result<String, WriteError> {
    let cell = match field {
        OutputField::Key => record
            .key
            .as_ref()
            .map(|key| BASE64.encode(key))
            .unwrap_or_default(),
        OutputField::Value => BASE64.encode(&record.value),
        OutputField::Offset => record.offset.to_string(),
        OutputField::Timestamp => rfc3339(record),
        OutputField::Headers => {
            return SerializationSnafu {
                offset: record.offset,
                reason: "headers are not supported by the csv format",
            }
            .fail();
        }
        OutputField::Topic => record.topic.clone(),
        OutputField::Partition => record.partition.to_string(),
    };
    Ok(csv_escape(cell))
}

fn csv_escape(cell: String) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell
    }
}

/// Headers rendered as a JSON array of `{key, value}` objects.
///
/// Shared with the Parquet format, which stores the same rendering in a
/// string column.
fn headers_json(record: &Record) -> Result<String, WriteError> {
    serde_json::to_string(&headers_value(record)?).context(JsonSnafu)
}

fn headers_value(record: &Record) -> Result<Value, WriteError> {
    let headers: Vec<Value> = record
        .headers
        .iter()
        .map(|header| {
            Ok(json!({
                "key": header.key,
                "value": utf8(&header.value, record, "header value")?,
            }))
        })
        .collect::<Result<_, WriteError>>()?;
    Ok(Value::Array(headers))
}

fn rfc3339(record: &Record) -> String {
    record
        .timestamp
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn utf8<'a>(bytes: &'a [u8], record: &Record, what: &str) -> Result<&'a str, WriteError> {
    std::str::from_utf8(bytes).ok().context(SerializationSnafu {
        offset: record.offset,
        reason: format!("{what} is not valid UTF-8"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::io::Read;

    fn records() -> Vec<Record> {
        let ts = Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap();
        vec![
            Record::new("events", 0, 0, ts, r#"{"n":1}"#).with_key("a"),
            Record::new("events", 0, 1, ts, r#"{"n":2}"#).with_key("b"),
        ]
    }

    fn settings(format: OutputFormat, fields: &[OutputField], envelope: bool) -> WriterSettings {
        WriterSettings {
            format,
            compression: Compression::None,
            output_fields: fields.to_vec(),
            envelope,
            external_properties: HashMap::new(),
        }
    }

    fn serialize(settings: &WriterSettings, records: &[Record]) -> Vec<u8> {
        let mut buf = Vec::new();
        OutputPipeline::build(&mut buf, settings)
            .unwrap()
            .write_records(records)
            .unwrap();
        buf
    }

    #[test]
    fn test_jsonl_envelope() {
        let out = serialize(
            &settings(
                OutputFormat::Jsonl,
                &[OutputField::Key, OutputField::Value, OutputField::Offset],
                true,
            ),
            &records(),
        );
        let lines: Vec<&str> = std::str::from_utf8(&out).unwrap().lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["key"], "a");
        assert_eq!(first["value"], r#"{"n":1}"#);
        assert_eq!(first["offset"], 0);

        // Field order follows the configured selection.
        assert!(lines[0].starts_with(r#"{"key""#));
    }

    #[test]
    fn test_jsonl_bare_value() {
        let out = serialize(
            &settings(OutputFormat::Jsonl, &[OutputField::Value], false),
            &records(),
        );
        assert_eq!(out, b"{\"n\":1}\n{\"n\":2}\n");
    }

    #[test]
    fn test_json_array() {
        let out = serialize(
            &settings(
                OutputFormat::Json,
                &[OutputField::Value, OutputField::Timestamp],
                true,
            ),
            &records(),
        );
        let parsed: Value = serde_json::from_slice(&out).unwrap();
        let docs = parsed.as_array().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1]["value"], r#"{"n":2}"#);
        assert_eq!(docs[0]["timestamp"], "2026-03-07T12:00:00.000Z");
    }

    #[test]
    fn test_json_array_empty_group() {
        let out = serialize(
            &settings(OutputFormat::Json, &[OutputField::Value], true),
            &[],
        );
        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_csv_base64_cells() {
        let out = serialize(
            &settings(
                OutputFormat::Csv,
                &[OutputField::Key, OutputField::Value, OutputField::Offset],
                true,
            ),
            &records(),
        );
        let text = std::str::from_utf8(&out).unwrap();
        let first_line = text.lines().next().unwrap();
        let cells: Vec<&str> = first_line.split(',').collect();
        assert_eq!(cells[0], BASE64.encode("a"));
        assert_eq!(
            BASE64.decode(cells[1]).unwrap(),
            br#"{"n":1}"#
        );
        assert_eq!(cells[2], "0");
    }

    #[test]
    fn test_csv_missing_key_is_empty_cell() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap();
        let record = Record::new("t", 0, 0, ts, "v");
        let out = serialize(
            &settings(OutputFormat::Csv, &[OutputField::Key, OutputField::Value], true),
            &[record],
        );
        assert!(std::str::from_utf8(&out).unwrap().starts_with(','));
    }

    #[test]
    fn test_csv_quotes_topic_with_delimiter() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap();
        let record = Record::new(r#"a,b"c"#, 0, 0, ts, "v");
        let out = serialize(
            &settings(
                OutputFormat::Csv,
                &[OutputField::Topic, OutputField::Offset],
                true,
            ),
            &[record],
        );
        let line = std::str::from_utf8(&out).unwrap().lines().next().unwrap();
        // Quoted cell with the inner quote doubled; offset column intact.
        assert_eq!(line, r#""a,b""c",0"#);
    }

    #[test]
    fn test_csv_rejects_headers_field() {
        let err = OutputPipeline::build(
            &mut Vec::new(),
            &settings(OutputFormat::Csv, &[OutputField::Headers], true),
        )
        .unwrap()
        .write_records(&records())
        .unwrap_err();
        assert!(matches!(err, WriteError::Serialization { offset: 0, .. }));
    }

    #[test]
    fn test_non_utf8_value_fails_text_format() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap();
        let record = Record::new("t", 0, 7, ts, vec![0xff, 0xfe]);
        let err = OutputPipeline::build(
            &mut Vec::new(),
            &settings(OutputFormat::Jsonl, &[OutputField::Value], true),
        )
        .unwrap()
        .write_records(&[record])
        .unwrap_err();
        assert!(matches!(err, WriteError::Serialization { offset: 7, .. }));
    }

    #[test]
    fn test_gzip_jsonl_roundtrip() {
        let mut s = settings(OutputFormat::Jsonl, &[OutputField::Value], true);
        s.compression = Compression::Gzip;
        let out = serialize(&s, &records());

        let mut decoder = flate2::read::GzDecoder::new(out.as_slice());
        let mut text = String::new();
        decoder.read_to_string(&mut text).unwrap();

        let docs: Vec<Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["value"], r#"{"n":1}"#);
    }

    #[test]
    fn test_zstd_bare_value_roundtrip() {
        let mut s = settings(OutputFormat::Jsonl, &[OutputField::Value], false);
        s.compression = Compression::Zstd;
        let out = serialize(&s, &records());

        let decoded = zstd::decode_all(out.as_slice()).unwrap();
        assert_eq!(decoded, b"{\"n\":1}\n{\"n\":2}\n");
    }

    #[test]
    fn test_headers_field_in_envelope() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap();
        let record = Record::new("t", 0, 0, ts, "v").with_header("trace", "abc");
        let out = serialize(
            &settings(OutputFormat::Jsonl, &[OutputField::Headers], true),
            &[record],
        );
        let doc: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(doc["headers"][0]["key"], "trace");
        assert_eq!(doc["headers"][0]["value"], "abc");
    }

    #[test]
    fn test_write_order_preserved() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap();
        let batch: Vec<Record> = (0..50)
            .map(|i| Record::new("t", 0, i, ts, format!("v{i}")))
            .collect();
        let out = serialize(
            &settings(OutputFormat::Jsonl, &[OutputField::Offset], true),
            &batch,
        );
        let offsets: Vec<i64> = std::str::from_utf8(&out)
            .unwrap()
            .lines()
            .map(|line| {
                serde_json::from_str::<Value>(line).unwrap()["offset"]
                    .as_i64()
                    .unwrap()
            })
            .collect();
        assert_eq!(offsets, (0..50).collect::<Vec<_>>());
    }
}
