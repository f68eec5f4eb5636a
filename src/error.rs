//! Error types for floe using snafu.
//!
//! One enum per concern, with context selectors, plus a top-level
//! [`SinkError`] that the sink task surfaces to its host.

use snafu::prelude::*;

use crate::sink::TaskState;

/// Errors from filename template parsing and evaluation.
///
/// Parse-time variants surface during configuration validation; only the
/// key-related variants can occur at evaluation time.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TemplateError {
    /// Template references a variable this engine does not know.
    #[snafu(display("Unknown template variable '{name}'"))]
    UnknownVariable { name: String },

    /// Variable given a parameter it does not support.
    #[snafu(display("Unsupported parameter '{parameter}' for template variable '{name}'"))]
    UnknownParameter { name: String, parameter: String },

    /// Variable missing a required parameter.
    #[snafu(display("Template variable '{name}' requires parameter '{parameter}'"))]
    MissingParameter { name: String, parameter: String },

    /// Unbalanced or otherwise malformed placeholder syntax.
    #[snafu(display("Malformed template near '{fragment}'"))]
    Malformed { fragment: String },

    /// Template uses `{{key}}` but the record has no key.
    #[snafu(display("Template requires a record key but the record has none"))]
    MissingKey,

    /// Template uses `{{key}}` but the key is not valid UTF-8.
    #[snafu(display("Record key is not valid UTF-8"))]
    NonUtf8Key { source: std::str::Utf8Error },
}

/// Errors from grouping a record.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum GroupingError {
    /// The file key for the record could not be computed.
    #[snafu(display("Failed to evaluate file key: {source}"))]
    KeyEvaluation { source: TemplateError },

    /// The target group is at its record limit and the policy rejects
    /// overflow. The record was not retained.
    #[snafu(display("Group '{file_key}' is full ({limit} records)"))]
    GroupFull { file_key: String, limit: usize },
}

/// Errors from serializing a group of records through an output pipeline.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WriteError {
    /// A record cannot be encoded in the chosen format.
    #[snafu(display("Record at offset {offset} cannot be encoded: {reason}"))]
    Serialization { offset: i64, reason: String },

    /// Sink or compression-layer write failed.
    #[snafu(display("Failed to write to output sink: {source}"))]
    Io { source: std::io::Error },

    /// JSON encoding failed.
    #[snafu(display("Failed to encode JSON: {source}"))]
    Json { source: serde_json::Error },

    /// Parquet writer failed.
    #[snafu(display("Parquet write failed: {source}"))]
    Parquet {
        source: parquet::errors::ParquetError,
    },

    /// Arrow batch construction failed.
    #[snafu(display("Arrow batch construction failed: {source}"))]
    Arrow { source: arrow::error::ArrowError },
}

/// Errors from storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Destination URL did not match any supported backend.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error"))]
    StorageIo { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error"))]
    S3Config { source: object_store::Error },

    /// GCS configuration error.
    #[snafu(display("GCS configuration error"))]
    GcsConfig { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition.
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

/// Errors from loading or validating configuration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Failed to read the config file.
    #[snafu(display("Failed to read config file: {source}"))]
    ReadFile { source: std::io::Error },

    /// Failed to parse YAML.
    #[snafu(display("Failed to parse config: {source}"))]
    Parse { source: serde_yaml::Error },

    /// Environment variable interpolation failed.
    #[snafu(display("Config interpolation failed: {}", errors.join("; ")))]
    Interpolation { errors: Vec<String> },

    /// Filename template failed validation.
    #[snafu(display("Invalid filename template: {source}"))]
    Template { source: TemplateError },

    /// No output fields selected.
    #[snafu(display("output_fields must not be empty"))]
    NoOutputFields,

    /// Bare (non-enveloped) output needs exactly one field.
    #[snafu(display("envelope=false requires exactly one output field, got {count}"))]
    BareFieldCount { count: usize },
}

/// Errors from metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to install the Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus exporter: {source}"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// Configured bind address did not parse.
    #[snafu(display("Invalid metrics address '{address}': {source}"))]
    InvalidAddress {
        address: String,
        source: std::net::AddrParseError,
    },
}

/// A failed flush cycle, wrapping the first group-level failure.
///
/// Grouper state is preserved when this is returned; the next flush retries
/// every group, including any already written in the failed attempt.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FlushError {
    /// Serializing one group failed.
    #[snafu(display("Failed to serialize group '{file_key}': {source}"))]
    GroupWrite { file_key: String, source: WriteError },

    /// Uploading one group's blob failed.
    #[snafu(display("Failed to upload '{path}': {source}"))]
    Upload { path: String, source: StorageError },
}

/// Top-level sink task errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// A record could not be grouped.
    #[snafu(display("Grouping error: {source}"))]
    Grouping { source: GroupingError },

    /// A flush cycle failed; accumulated records are retained.
    #[snafu(display("Flush failed: {source}"))]
    Flush { source: FlushError },

    /// Operation invoked in a state that does not allow it.
    #[snafu(display("Operation '{operation}' is invalid in state {state:?}"))]
    InvalidState {
        operation: &'static str,
        state: TaskState,
    },

    /// Metrics error.
    #[snafu(display("Metrics error: {source}"))]
    Metrics { source: MetricsError },
}

impl From<ConfigError> for SinkError {
    fn from(source: ConfigError) -> Self {
        SinkError::Config { source }
    }
}

impl From<GroupingError> for SinkError {
    fn from(source: GroupingError) -> Self {
        SinkError::Grouping { source }
    }
}

impl From<FlushError> for SinkError {
    fn from(source: FlushError) -> Self {
        SinkError::Flush { source }
    }
}

impl From<MetricsError> for SinkError {
    fn from(source: MetricsError) -> Self {
        SinkError::Metrics { source }
    }
}
