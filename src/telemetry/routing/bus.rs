//! In-process bus carrying usage records to the delivery worker.

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

use crate::telemetry::events::UsageRecord;

#[derive(Debug)]
pub enum BusMessage {
    Record(UsageRecord),
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct UsageBus {
    sender: UnboundedSender<BusMessage>,
}

impl UsageBus {
    pub fn new_pair() -> (Self, UnboundedReceiver<BusMessage>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Queue a record. Returns false once the worker has gone away.
    pub fn emit(&self, record: UsageRecord) -> bool {
        self.sender.send(BusMessage::Record(record)).is_ok()
    }

    /// Ask the worker to acknowledge once everything queued before this call is handled.
    pub fn flush_request(&self) -> Option<oneshot::Receiver<()>> {
        let (ack, wait) = oneshot::channel();
        self.sender.send(BusMessage::Flush(ack)).ok().map(|_| wait)
    }
}
