//! Record and output-field types.
//!
//! A [`Record`] is a single unit ingested from a partitioned log. Records
//! arrive in offset order within a partition; there is no ordering guarantee
//! across partitions.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single header attached to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub key: String,
    pub value: Bytes,
}

/// An immutable unit ingested from the partitioned log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Topic the record was read from.
    pub topic: String,
    /// Partition within the topic.
    pub partition: i32,
    /// Offset within the partition. Monotonic per partition.
    pub offset: i64,
    /// Record timestamp.
    pub timestamp: DateTime<Utc>,
    /// Optional record key.
    pub key: Option<Bytes>,
    /// Record value.
    pub value: Bytes,
    /// Record headers, in original order.
    pub headers: Vec<Header>,
}

impl Record {
    /// Create a record with no key and no headers.
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        timestamp: DateTime<Utc>,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            timestamp,
            key: None,
            value: value.into(),
            headers: Vec::new(),
        }
    }

    /// Attach a key.
    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Attach a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.headers.push(Header {
            key: key.into(),
            value: value.into(),
        });
        self
    }
}

/// A record field that can be selected for output.
///
/// Each output format defines how the selected fields map to bytes; formats
/// may reject fields they cannot represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputField {
    Key,
    Value,
    Offset,
    Timestamp,
    Headers,
    Topic,
    Partition,
}

impl OutputField {
    /// Field name as it appears in serialized output and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputField::Key => "key",
            OutputField::Value => "value",
            OutputField::Offset => "offset",
            OutputField::Timestamp => "timestamp",
            OutputField::Headers => "headers",
            OutputField::Topic => "topic",
            OutputField::Partition => "partition",
        }
    }
}
