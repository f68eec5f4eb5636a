//! floe - a partitioned-record sink for object storage.
//!
//! floe groups records from partitioned topics into files named by a
//! configurable template, serializes each file in a configurable format
//! (jsonl, json, csv, parquet) with optional compression, and uploads the
//! result to S3, GCS, or a local filesystem.
//!
//! The embedding host drives a [`SinkTask`]: feed it batches of records
//! with `put`, then `flush` to write every accumulated group to storage.
//! Groups are cleared only after the whole flush succeeds, so a failed
//! flush is safely retried.

pub mod config;
pub mod error;
pub mod grouper;
pub mod metrics;
pub mod output;
pub mod record;
pub mod sink;
pub mod storage;
pub mod template;

pub use config::Config;
pub use error::SinkError;
pub use grouper::RecordGrouper;
pub use output::OutputPipeline;
pub use record::Record;
pub use sink::{FlushStats, SinkTask, TaskState};
pub use storage::{BlobStore, StorageProvider};
pub use template::Template;
