//! Event emission seam.
//!
//! The scheduler and manager never publish to the bus directly; they talk to
//! an [`EventSink`] injected at construction. [`BusEventSink`] maps events to
//! their topics; [`RecordingSink`] captures them in order for assertions and
//! doubles as a feed for an operator UI channel.

use std::sync::{Arc, Mutex};

use crate::events::{AckEvent, ErrorEvent, FrameOkEvent, MetricsEvent, SceneStateEvent};
use crate::BusClient;

pub trait EventSink: Send + Sync {
    fn frame_ok(&self, host: &str, ev: &FrameOkEvent);
    fn metrics(&self, host: &str, ev: &MetricsEvent);
    fn scene_state(&self, host: &str, ev: &SceneStateEvent);
    fn error(&self, host: &str, ev: &ErrorEvent);
    fn ack(&self, host: &str, ev: &AckEvent);
}

/// Publishes events on the bus using the process-wide topic configuration.
pub struct BusEventSink {
    bus: Arc<dyn BusClient>,
    cmd_prefix: String,
    state_base: String,
}

impl BusEventSink {
    pub fn new(bus: Arc<dyn BusClient>, cmd_prefix: &str, state_base: &str) -> Self {
        Self {
            bus,
            cmd_prefix: cmd_prefix.to_string(),
            state_base: state_base.to_string(),
        }
    }

    fn publish<T: serde::Serialize>(&self, topic: String, ev: &T) {
        match serde_json::to_value(ev) {
            Ok(payload) => {
                if let Err(e) = self.bus.publish(&topic, payload) {
                    tracing::warn!(target: "bus", topic, error = %e, "publish_failed");
                }
            }
            Err(e) => tracing::error!(target: "bus", topic, error = %e, "event_encode_failed"),
        }
    }
}

impl EventSink for BusEventSink {
    fn frame_ok(&self, host: &str, ev: &FrameOkEvent) {
        self.publish(format!("{}/{host}/scene/ok", self.state_base), ev);
    }

    fn metrics(&self, host: &str, ev: &MetricsEvent) {
        self.publish(format!("{}/{host}/metrics", self.state_base), ev);
    }

    fn scene_state(&self, host: &str, ev: &SceneStateEvent) {
        self.publish(format!("{}/{host}/scene/state", self.state_base), ev);
    }

    fn error(&self, host: &str, ev: &ErrorEvent) {
        self.publish(format!("{}/{host}/error", self.cmd_prefix), ev);
    }

    fn ack(&self, host: &str, ev: &AckEvent) {
        self.publish(format!("{}/{host}/ack", self.cmd_prefix), ev);
    }
}

/// One captured emission, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkRecord {
    FrameOk { host: String, ev: FrameOkEvent },
    Metrics { host: String, ev: MetricsEvent },
    SceneState { host: String, ev: SceneStateEvent },
    Error { host: String, ev: ErrorEvent },
    Ack { host: String, ev: AckEvent },
}

/// Captures every event for later inspection.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<SinkRecord>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SinkRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Scene-state transitions for `host`, as `(status, generation)` pairs.
    pub fn transitions(&self, host: &str) -> Vec<(String, u64)> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                SinkRecord::SceneState { host: h, ev } if h == host => {
                    Some((ev.status, ev.generation_id))
                }
                _ => None,
            })
            .collect()
    }

    /// Frame-ok events for `host` in emission order.
    pub fn frame_oks(&self, host: &str) -> Vec<FrameOkEvent> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                SinkRecord::FrameOk { host: h, ev } if h == host => Some(ev),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self, host: &str) -> Vec<ErrorEvent> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                SinkRecord::Error { host: h, ev } if h == host => Some(ev),
                _ => None,
            })
            .collect()
    }

    fn push(&self, record: SinkRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }
}

impl EventSink for RecordingSink {
    fn frame_ok(&self, host: &str, ev: &FrameOkEvent) {
        self.push(SinkRecord::FrameOk {
            host: host.to_string(),
            ev: ev.clone(),
        });
    }

    fn metrics(&self, host: &str, ev: &MetricsEvent) {
        self.push(SinkRecord::Metrics {
            host: host.to_string(),
            ev: ev.clone(),
        });
    }

    fn scene_state(&self, host: &str, ev: &SceneStateEvent) {
        self.push(SinkRecord::SceneState {
            host: host.to_string(),
            ev: ev.clone(),
        });
    }

    fn error(&self, host: &str, ev: &ErrorEvent) {
        self.push(SinkRecord::Error {
            host: host.to_string(),
            ev: ev.clone(),
        });
    }

    fn ack(&self, host: &str, ev: &AckEvent) {
        self.push(SinkRecord::Ack {
            host: host.to_string(),
            ev: ev.clone(),
        });
    }
}

/// Fan-out to several sinks (bus plus UI channel, bus plus recorder in tests).
pub struct TeeSink(pub Vec<Arc<dyn EventSink>>);

impl EventSink for TeeSink {
    fn frame_ok(&self, host: &str, ev: &FrameOkEvent) {
        for s in &self.0 {
            s.frame_ok(host, ev);
        }
    }
    fn metrics(&self, host: &str, ev: &MetricsEvent) {
        for s in &self.0 {
            s.metrics(host, ev);
        }
    }
    fn scene_state(&self, host: &str, ev: &SceneStateEvent) {
        for s in &self.0 {
            s.scene_state(host, ev);
        }
    }
    fn error(&self, host: &str, ev: &ErrorEvent) {
        for s in &self.0 {
            s.error(host, ev);
        }
    }
    fn ack(&self, host: &str, ev: &AckEvent) {
        for s in &self.0 {
            s.ack(host, ev);
        }
    }
}

/// Placeholder for wiring paths that need a sink but no observer.
pub struct NullSink;

impl EventSink for NullSink {
    fn frame_ok(&self, _host: &str, _ev: &FrameOkEvent) {}
    fn metrics(&self, _host: &str, _ev: &MetricsEvent) {}
    fn scene_state(&self, _host: &str, _ev: &SceneStateEvent) {}
    fn error(&self, _host: &str, _ev: &ErrorEvent) {}
    fn ack(&self, _host: &str, _ev: &AckEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{epoch_ms, VersionStamp};
    use crate::MemoryBus;

    fn state_ev(status: &str, generation: u64) -> SceneStateEvent {
        SceneStateEvent {
            current_scene: Some("fill".into()),
            target_scene: None,
            status: status.into(),
            generation_id: generation,
            stamp: VersionStamp::current(),
            ts: epoch_ms(),
        }
    }

    #[tokio::test]
    async fn bus_sink_routes_to_configured_topics() {
        let bus = Arc::new(MemoryBus::new());
        let mut rx = bus.subscribe(&["#"]);
        let sink = BusEventSink::new(bus.clone(), "pixeld/cmd", "pixeld/state");

        sink.scene_state("desk", &state_ev("running", 3));
        sink.error(
            "desk",
            &ErrorEvent {
                scene: None,
                error: "boom".into(),
                generation_id: Some(3),
                ts: epoch_ms(),
            },
        );

        assert_eq!(rx.try_recv().unwrap().topic, "pixeld/state/desk/scene/state");
        assert_eq!(rx.try_recv().unwrap().topic, "pixeld/cmd/desk/error");
    }

    #[test]
    fn recording_sink_orders_transitions() {
        let sink = RecordingSink::new();
        sink.scene_state("desk", &state_ev("switching", 4));
        sink.scene_state("desk", &state_ev("running", 4));
        sink.scene_state("attic", &state_ev("running", 9));
        assert_eq!(
            sink.transitions("desk"),
            vec![("switching".to_string(), 4), ("running".to_string(), 4)]
        );
    }
}
