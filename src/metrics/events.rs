//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the sink.
//! Events implement the `InternalEvent` trait which records the
//! corresponding Prometheus metric.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when records are accepted into the grouper.
pub struct RecordsGrouped {
    pub count: u64,
}

impl InternalEvent for RecordsGrouped {
    fn emit(self) {
        trace!(count = self.count, "Records grouped");
        counter!("floe_records_grouped_total").increment(self.count);
    }
}

/// Event emitted when a group's blob is written to storage.
pub struct FileWritten {
    pub bytes: u64,
    pub records: u64,
}

impl InternalEvent for FileWritten {
    fn emit(self) {
        trace!(bytes = self.bytes, records = self.records, "File written");
        counter!("floe_files_written_total").increment(1);
        counter!("floe_bytes_written_total").increment(self.bytes);
    }
}

/// Event emitted when a flush cycle completes.
pub struct FlushCompleted {
    pub files: u64,
    pub records: u64,
    pub duration: Duration,
}

impl InternalEvent for FlushCompleted {
    fn emit(self) {
        trace!(files = self.files, records = self.records, "Flush completed");
        counter!("floe_flushes_total", "status" => "success").increment(1);
        histogram!("floe_flush_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a flush cycle fails; grouper state is retained.
pub struct FlushFailed;

impl InternalEvent for FlushFailed {
    fn emit(self) {
        trace!("Flush failed");
        counter!("floe_flushes_total", "status" => "failure").increment(1);
    }
}
