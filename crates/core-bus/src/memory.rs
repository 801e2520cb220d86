//! In-process broker.

use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::topic::matches;
use crate::{BusClient, BusError, BusMessage};

struct Subscription {
    patterns: Vec<String>,
    tx: UnboundedSender<BusMessage>,
}

/// In-process pub/sub broker implementing [`BusClient`].
///
/// Every `publish` fans out synchronously to all live subscriptions whose
/// pattern list matches the topic; closed subscriptions are dropped on the
/// way. Used directly by tests and as the default bus of the binary.
#[derive(Default)]
pub struct MemoryBus {
    subs: Mutex<Vec<Subscription>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BusClient for MemoryBus {
    fn publish(&self, topic: &str, payload: Value) -> Result<(), BusError> {
        if topic.is_empty() || topic.contains(['+', '#']) {
            return Err(BusError::InvalidTopic(topic.to_string()));
        }
        tracing::trace!(target: "bus.memory", topic, "publish");
        let mut subs = self.subs.lock().unwrap_or_else(|e| e.into_inner());
        subs.retain(|sub| {
            if !sub.patterns.iter().any(|p| matches(p, topic)) {
                return !sub.tx.is_closed();
            }
            sub.tx
                .send(BusMessage::new(topic, payload.clone()))
                .is_ok()
        });
        Ok(())
    }

    fn subscribe(&self, patterns: &[&str]) -> UnboundedReceiver<BusMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subs = self.subs.lock().unwrap_or_else(|e| e.into_inner());
        subs.push(Subscription {
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            tx,
        });
        rx
    }
}
