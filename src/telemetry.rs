//! Telemetry domain: per-call usage records, sinks, and background delivery to a collector.
//!
//! Recording is fire-and-forget. A sink never blocks a stage and never fails a run; delivery
//! problems end up in the log and nowhere else.

pub mod events;
pub mod routing;
pub mod sinks;

pub use events::UsageRecord;
pub use routing::collector::{CollectorSettings, CollectorSink};
pub use sinks::{LogSink, NoopSink, RecordingSink, TelemetrySink};
