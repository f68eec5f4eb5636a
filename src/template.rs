//! Filename template parsing and evaluation.
//!
//! Templates name the output files that groups of records are flushed into.
//! They consist of literal text and `{{variable}}` placeholders, optionally
//! with parameters:
//!
//! - `{{topic}}` - topic name
//! - `{{partition}}` / `{{partition:padding=true}}` - partition number,
//!   optionally zero-padded to 10 digits
//! - `{{start_offset}}` / `{{start_offset:padding=true}}` - offset of the
//!   first record in the file, optionally zero-padded to 20 digits
//! - `{{timestamp:unit=U}}` - record timestamp, `U` one of `yyyy`, `MM`,
//!   `dd`, `HH` (the `unit` parameter is required)
//! - `{{key}}` - record key as UTF-8
//!
//! Unknown variables and parameters are rejected at parse time so a bad
//! template fails configuration validation rather than mid-batch.

use chrono::{DateTime, Datelike, Timelike, Utc};
use snafu::prelude::*;
use std::fmt;

use crate::error::{
    MalformedSnafu, MissingKeySnafu, MissingParameterSnafu, NonUtf8KeySnafu, TemplateError,
    UnknownParameterSnafu, UnknownVariableSnafu,
};

/// Timestamp granularity for the `{{timestamp}}` variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampUnit {
    Year,
    Month,
    Day,
    Hour,
}

impl TimestampUnit {
    fn render(self, ts: DateTime<Utc>) -> String {
        match self {
            TimestampUnit::Year => format!("{:04}", ts.year()),
            TimestampUnit::Month => format!("{:02}", ts.month()),
            TimestampUnit::Day => format!("{:02}", ts.day()),
            TimestampUnit::Hour => format!("{:02}", ts.hour()),
        }
    }
}

/// A template variable with its parsed parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Variable {
    Topic,
    Partition { padding: bool },
    StartOffset { padding: bool },
    Timestamp { unit: TimestampUnit },
    Key,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(Variable),
}

/// Variables a template is evaluated against.
///
/// `start_offset` comes from the head record of the group being named;
/// `timestamp` and `key` come from the record being placed, so either
/// changing rolls the group onto a new file.
#[derive(Debug, Clone, Copy)]
pub struct TemplateVars<'a> {
    pub topic: &'a str,
    pub partition: i32,
    pub start_offset: i64,
    pub timestamp: DateTime<Utc>,
    pub key: Option<&'a [u8]>,
}

/// A parsed, validated filename template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
    source: String,
}

impl Template {
    /// Parse a template string, rejecting unknown variables and parameters.
    pub fn parse(input: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = input;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after_open = &rest[open + 2..];
            let close = after_open.find("}}").context(MalformedSnafu {
                fragment: &rest[open..],
            })?;
            let placeholder = &after_open[..close];
            segments.push(Segment::Variable(Self::parse_variable(placeholder)?));
            rest = &after_open[close + 2..];
        }
        if !rest.is_empty() {
            ensure!(!rest.contains("}}"), MalformedSnafu { fragment: rest });
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            segments,
            source: input.to_string(),
        })
    }

    fn parse_variable(placeholder: &str) -> Result<Variable, TemplateError> {
        let (name, params) = match placeholder.split_once(':') {
            Some((name, params)) => (name.trim(), Some(params)),
            None => (placeholder.trim(), None),
        };

        match name {
            "topic" => {
                Self::reject_params(name, params)?;
                Ok(Variable::Topic)
            }
            "partition" => Ok(Variable::Partition {
                padding: Self::parse_padding(name, params)?,
            }),
            "start_offset" => Ok(Variable::StartOffset {
                padding: Self::parse_padding(name, params)?,
            }),
            "timestamp" => Ok(Variable::Timestamp {
                unit: Self::parse_unit(name, params)?,
            }),
            "key" => {
                Self::reject_params(name, params)?;
                Ok(Variable::Key)
            }
            _ => UnknownVariableSnafu { name }.fail(),
        }
    }

    fn reject_params(name: &str, params: Option<&str>) -> Result<(), TemplateError> {
        match params {
            None => Ok(()),
            Some(p) => UnknownParameterSnafu { name, parameter: p }.fail(),
        }
    }

    fn parse_padding(name: &str, params: Option<&str>) -> Result<bool, TemplateError> {
        match params {
            None => Ok(false),
            Some("padding=true") => Ok(true),
            Some("padding=false") => Ok(false),
            Some(p) => UnknownParameterSnafu { name, parameter: p }.fail(),
        }
    }

    fn parse_unit(name: &str, params: Option<&str>) -> Result<TimestampUnit, TemplateError> {
        let params = params.context(MissingParameterSnafu {
            name,
            parameter: "unit",
        })?;
        match params {
            "unit=yyyy" => Ok(TimestampUnit::Year),
            "unit=MM" => Ok(TimestampUnit::Month),
            "unit=dd" => Ok(TimestampUnit::Day),
            "unit=HH" => Ok(TimestampUnit::Hour),
            p => UnknownParameterSnafu { name, parameter: p }.fail(),
        }
    }

    /// Evaluate the template against the given variables.
    ///
    /// Pure: identical inputs always produce an identical key. The only
    /// runtime failure mode is `{{key}}` against a record whose key is
    /// missing or not valid UTF-8.
    pub fn evaluate(&self, vars: &TemplateVars<'_>) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable(var) => match var {
                    Variable::Topic => out.push_str(vars.topic),
                    Variable::Partition { padding: false } => {
                        out.push_str(&vars.partition.to_string());
                    }
                    Variable::Partition { padding: true } => {
                        out.push_str(&format!("{:010}", vars.partition));
                    }
                    Variable::StartOffset { padding: false } => {
                        out.push_str(&vars.start_offset.to_string());
                    }
                    Variable::StartOffset { padding: true } => {
                        out.push_str(&format!("{:020}", vars.start_offset));
                    }
                    Variable::Timestamp { unit } => out.push_str(&unit.render(vars.timestamp)),
                    Variable::Key => {
                        let key = vars.key.context(MissingKeySnafu)?;
                        out.push_str(std::str::from_utf8(key).context(NonUtf8KeySnafu)?);
                    }
                },
            }
        }
        Ok(out)
    }

    /// The original template string.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
