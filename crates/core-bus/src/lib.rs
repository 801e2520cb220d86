//! Bus contract and in-process broker.
//!
//! The daemon talks to the outside world through a narrow pub/sub surface:
//! `publish(topic, json)` outbound, `subscribe(patterns)` inbound. A concrete
//! broker client (MQTT or similar) adapts to [`BusClient`] outside this
//! workspace; reconnection and backoff are that adapter's problem, the daemon
//! only re-subscribes when told a connection is fresh. [`MemoryBus`] is the
//! shipped implementation: an in-process broker used by the test suites and
//! by the binary when no external broker is configured.

use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

pub mod events;
pub mod memory;
pub mod sink;
pub mod topic;

pub use events::{AckEvent, ErrorEvent, FrameOkEvent, MetricsEvent, SceneStateEvent, VersionStamp};
pub use memory::MemoryBus;
pub use sink::{BusEventSink, EventSink, NullSink, RecordingSink, SinkRecord, TeeSink};
pub use topic::CommandTopic;

/// One message as seen by a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Value,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus connection closed")]
    Closed,
    #[error("invalid topic `{0}`")]
    InvalidTopic(String),
}

/// Minimal pub/sub client surface consumed by the daemon.
///
/// Subscriptions are pattern lists (MQTT-style `+` / `#` wildcards, see
/// [`topic::matches`]); each call returns an independent delivery channel.
/// Delivery is at-most-once and in-memory; nothing here is durable.
pub trait BusClient: Send + Sync {
    fn publish(&self, topic: &str, payload: Value) -> Result<(), BusError>;
    fn subscribe(&self, patterns: &[&str]) -> UnboundedReceiver<BusMessage>;
}
