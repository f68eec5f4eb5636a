//! Configuration for the floe sink.
//!
//! A static, validated set of options consumed once at task construction;
//! never re-read mid-run.

mod vars;

pub use vars::{InterpolationResult, interpolate};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;

use crate::error::{
    BareFieldCountSnafu, ConfigError, InterpolationSnafu, NoOutputFieldsSnafu, ParseSnafu,
    ReadFileSnafu, TemplateSnafu,
};
use crate::grouper::GroupLimitPolicy;
use crate::output::{Compression, OutputFormat, WriterSettings};
use crate::record::OutputField;
use crate::template::Template;

/// Metrics configuration for the Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

/// Main configuration for the sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Destination URL (supports `s3://`, `gs://`, `file://`, local paths).
    pub destination_uri: String,
    /// Prefix prepended to every evaluated file key.
    #[serde(default)]
    pub prefix: String,
    /// Filename template; see the template module for syntax.
    #[serde(default = "default_filename_template")]
    pub filename_template: String,
    /// Output format.
    #[serde(default)]
    pub format: OutputFormat,
    /// Output compression.
    #[serde(default)]
    pub compression: Compression,
    /// Ordered selection of record fields to write.
    #[serde(default = "default_output_fields")]
    pub output_fields: Vec<OutputField>,
    /// Wrap each record in a metadata envelope of the selected fields.
    #[serde(default = "default_envelope")]
    pub envelope: bool,
    /// Per-file record limit; 0 = unlimited.
    #[serde(default)]
    pub max_records_per_file: usize,
    /// What to do when a file reaches its record limit.
    #[serde(default)]
    pub on_full: GroupLimitPolicy,
    /// Storage options for the destination (credentials, region, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
    /// Opaque properties passed through to format implementations.
    #[serde(default)]
    pub external_properties: HashMap<String, String>,
    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_filename_template() -> String {
    "{{topic}}-{{partition}}-{{start_offset}}".to_string()
}

fn default_output_fields() -> Vec<OutputField> {
    vec![OutputField::Value]
}

fn default_envelope() -> bool {
    true
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).context(ReadFileSnafu)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, interpolating environment
    /// variables and validating the result.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let result = interpolate(contents);
        ensure!(
            result.is_ok(),
            InterpolationSnafu {
                errors: result.errors,
            }
        );

        let config: Config = serde_yaml::from_str(&result.text).context(ParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, returning the parsed filename template.
    ///
    /// This is the eager, configuration-time check: a bad template or field
    /// selection fails here rather than mid-batch.
    pub fn validate(&self) -> Result<Template, ConfigError> {
        let template = Template::parse(&self.filename_template).context(TemplateSnafu)?;

        ensure!(!self.output_fields.is_empty(), NoOutputFieldsSnafu);
        if !self.envelope {
            ensure!(
                self.output_fields.len() == 1,
                BareFieldCountSnafu {
                    count: self.output_fields.len(),
                }
            );
        }

        Ok(template)
    }

    /// Writer settings derived from this configuration.
    pub fn writer_settings(&self) -> WriterSettings {
        WriterSettings {
            format: self.format,
            compression: self.compression,
            output_fields: self.output_fields.clone(),
            envelope: self.envelope,
            external_properties: self.external_properties.clone(),
        }
    }
}
