//! The sink task: lifecycle state machine and flush coordination.
//!
//! A [`SinkTask`] owns the grouper and orchestrates flushes: for every
//! accumulated group it evaluates the target object path, serializes the
//! group through a fresh output pipeline into a buffer, and uploads the
//! buffer through the injected [`BlobStore`]. Grouper state is cleared only
//! after every group has been durably written; any failure preserves state
//! so the next flush naturally retries all groups (at-least-once).

use bytes::Bytes;
use snafu::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::emit;
use crate::error::{
    FlushError, GroupWriteSnafu, GroupingSnafu, InvalidStateSnafu, SinkError, UploadSnafu,
};
use crate::grouper::RecordGrouper;
use crate::metrics::events::{FileWritten, FlushCompleted, FlushFailed, RecordsGrouped};
use crate::output::{OutputPipeline, WriterSettings};
use crate::record::Record;
use crate::storage::BlobStore;

/// Lifecycle state of a sink task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Constructed but not started.
    Uninitialized,
    /// Accepting records and flush triggers.
    Ready,
    /// A flush cycle is in progress.
    Flushing,
    /// Stopped; no further operations are accepted.
    Stopped,
}

/// Outcome of a successful flush cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlushStats {
    pub files_written: usize,
    pub records_written: usize,
    pub bytes_written: usize,
}

/// The record-grouping and flush-coordinating core of the sink.
///
/// The host invokes `put`/`flush`/`stop` serially; `&mut self` receivers
/// make concurrent mutation unrepresentable for a single owner.
pub struct SinkTask {
    state: TaskState,
    grouper: RecordGrouper,
    settings: WriterSettings,
    prefix: String,
    store: Arc<dyn BlobStore>,
}

impl SinkTask {
    /// Construct a task from validated configuration and a blob store.
    ///
    /// The filename template is parsed here, so a bad template fails at
    /// construction rather than on the first record.
    pub fn new(config: &Config, store: Arc<dyn BlobStore>) -> Result<Self, SinkError> {
        let template = config.validate()?;

        Ok(Self {
            state: TaskState::Uninitialized,
            grouper: RecordGrouper::new(
                template,
                config.max_records_per_file,
                config.on_full,
            ),
            settings: config.writer_settings(),
            prefix: config.prefix.clone(),
            store,
        })
    }

    /// Begin accepting records.
    pub fn start(&mut self) -> Result<(), SinkError> {
        ensure!(
            self.state == TaskState::Uninitialized,
            InvalidStateSnafu {
                operation: "start",
                state: self.state,
            }
        );
        self.state = TaskState::Ready;
        info!(prefix = %self.prefix, format = self.settings.format.as_str(), "Sink task started");
        Ok(())
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Group a batch of records.
    ///
    /// Fails on the first record that cannot be grouped; records before it
    /// in the batch remain accumulated, the failing record is not retained.
    pub fn put(&mut self, records: Vec<Record>) -> Result<(), SinkError> {
        ensure!(
            self.state == TaskState::Ready,
            InvalidStateSnafu {
                operation: "put",
                state: self.state,
            }
        );

        let count = records.len() as u64;
        debug!(count, "Grouping records");
        for record in records {
            self.grouper.put(record).context(GroupingSnafu)?;
        }
        emit!(RecordsGrouped { count });
        Ok(())
    }

    /// Flush all accumulated groups to storage.
    ///
    /// On failure the grouper keeps every group, including any already
    /// written in this attempt; the next flush re-writes them all.
    pub async fn flush(&mut self) -> Result<FlushStats, SinkError> {
        ensure!(
            self.state == TaskState::Ready,
            InvalidStateSnafu {
                operation: "flush",
                state: self.state,
            }
        );

        if self.grouper.is_empty() {
            return Ok(FlushStats::default());
        }

        self.state = TaskState::Flushing;
        let start = Instant::now();
        let result = self.write_groups().await;
        self.state = TaskState::Ready;

        match result {
            Ok(stats) => {
                self.grouper.clear();
                emit!(FlushCompleted {
                    files: stats.files_written as u64,
                    records: stats.records_written as u64,
                    duration: start.elapsed(),
                });
                info!(
                    files = stats.files_written,
                    records = stats.records_written,
                    bytes = stats.bytes_written,
                    "Flush completed"
                );
                Ok(stats)
            }
            Err(source) => {
                emit!(FlushFailed);
                warn!(
                    groups = self.grouper.group_count(),
                    records = self.grouper.record_count(),
                    error = %source,
                    "Flush failed; accumulated groups retained for retry"
                );
                Err(SinkError::Flush { source })
            }
        }
    }

    /// Stop the task. Accumulated but unflushed records are dropped; the
    /// host is expected to flush before stopping.
    pub fn stop(&mut self) {
        if self.grouper.record_count() > 0 {
            warn!(
                records = self.grouper.record_count(),
                "Stopping with unflushed records"
            );
        }
        self.state = TaskState::Stopped;
    }

    async fn write_groups(&self) -> Result<FlushStats, FlushError> {
        let mut stats = FlushStats::default();

        for (file_key, records) in self.grouper.records() {
            let path = format!(
                "{}{}{}",
                self.prefix,
                file_key,
                self.settings.compression.extension()
            );

            let mut buf = Vec::new();
            OutputPipeline::build(&mut buf, &self.settings)
                .context(GroupWriteSnafu { file_key })?
                .write_records(records)
                .context(GroupWriteSnafu { file_key })?;

            let bytes = buf.len();
            self.store
                .put(&path, Bytes::from(buf))
                .await
                .context(UploadSnafu { path: &path })?;

            emit!(FileWritten {
                bytes: bytes as u64,
                records: records.len() as u64,
            });
            debug!(path = %path, records = records.len(), bytes, "Wrote file");

            stats.files_written += 1;
            stats.records_written += records.len();
            stats.bytes_written += bytes;
        }

        Ok(stats)
    }
}
