//! Telemetry sinks.

use crate::telemetry::events::UsageRecord;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Destination for usage records. `record` must return without waiting on I/O.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    fn record(&self, record: UsageRecord);

    /// Wait (bounded) for queued records to be delivered. Called once at run end.
    async fn flush(&self) {}
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn record(&self, _record: UsageRecord) {}
}

/// Emits each record as a structured log event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn record(&self, record: UsageRecord) {
        info!(
            target: "deepflow::usage",
            stage = %record.stage_name,
            model = %record.model,
            prompt_tokens = record.prompt_tokens,
            completion_tokens = record.completion_tokens,
            cached_tokens = record.cached_tokens,
            "stage usage"
        );
    }
}

/// Keeps records in memory; handy for inspecting a run.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    records: Arc<Mutex<Vec<UsageRecord>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().clone()
    }
}

impl TelemetrySink for RecordingSink {
    fn record(&self, record: UsageRecord) {
        self.records.lock().push(record);
    }
}
