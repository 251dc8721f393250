//! HTTP collector sink. Records are queued on the bus and posted by a background task to the
//! collector's batch ingestion endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::telemetry::events::UsageRecord;
use crate::telemetry::routing::bus::{BusMessage, UsageBus};
use crate::telemetry::sinks::TelemetrySink;

const COLLECTOR_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Where and how to deliver records.
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub host: String,
    pub public_key: String,
    pub secret_key: String,
    pub flush_timeout: Duration,
}

impl CollectorSettings {
    pub fn new(host: impl Into<String>, public_key: String, secret_key: String) -> Self {
        Self {
            host: host.into(),
            public_key,
            secret_key,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }

    fn ingestion_url(&self) -> String {
        format!("{}/api/public/ingestion", self.host.trim_end_matches('/'))
    }
}

/// Sink that forwards records to a remote collector without blocking the caller.
pub struct CollectorSink {
    bus: UsageBus,
    flush_timeout: Duration,
}

impl CollectorSink {
    /// Start the delivery task on the current tokio runtime.
    pub fn spawn(settings: CollectorSettings) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(COLLECTOR_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                PipelineError::ConfigError(format!("Failed to create collector client: {}", e))
            })?;
        let (bus, receiver) = UsageBus::new_pair();
        let flush_timeout = settings.flush_timeout;
        tokio::spawn(deliver(client, settings, receiver));
        Ok(Self { bus, flush_timeout })
    }
}

#[async_trait]
impl TelemetrySink for CollectorSink {
    fn record(&self, record: UsageRecord) {
        if !self.bus.emit(record) {
            warn!("telemetry collector worker stopped; usage record dropped");
        }
    }

    async fn flush(&self) {
        let Some(wait) = self.bus.flush_request() else {
            return;
        };
        if tokio::time::timeout(self.flush_timeout, wait).await.is_err() {
            warn!(timeout = ?self.flush_timeout, "telemetry flush timed out");
        }
    }
}

async fn deliver(
    client: Client,
    settings: CollectorSettings,
    mut receiver: UnboundedReceiver<BusMessage>,
) {
    let url = settings.ingestion_url();
    let mut sequence = 0u64;
    while let Some(message) = receiver.recv().await {
        match message {
            BusMessage::Record(record) => {
                sequence += 1;
                let id = event_id(&record, sequence);
                let body = json!({ "batch": [record.to_ingestion_event(&id)] });
                let sent = client
                    .post(&url)
                    .basic_auth(&settings.public_key, Some(&settings.secret_key))
                    .json(&body)
                    .send()
                    .await;
                match sent {
                    Ok(response) if response.status().is_success() => {
                        debug!(event_id = %id, stage = %record.stage_name, "usage record delivered");
                    }
                    Ok(response) => {
                        warn!(status = %response.status(), stage = %record.stage_name, "collector rejected usage record");
                    }
                    Err(err) => {
                        warn!(error = %err, stage = %record.stage_name, "failed to deliver usage record");
                    }
                }
            }
            BusMessage::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

/// Collector event id, unique per process and delivery task.
fn event_id(record: &UsageRecord, sequence: u64) -> String {
    format!(
        "usage-{}-{}-{sequence}",
        record.recorded_at,
        std::process::id()
    )
}
