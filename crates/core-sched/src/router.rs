//! Inbound command dispatch.
//!
//! Topics follow `<cmd_prefix>/<host>/<section>/<action>`:
//!
//! | topic                | payload                                     |
//! |----------------------|---------------------------------------------|
//! | `.../scene/set`      | `{name}`: per-device default scene          |
//! | `.../driver/set`     | `{driver: "real"\|"mock"}`: hot-swap        |
//! | `.../reset/set`      | `{}`: best-effort device reset              |
//! | `.../state/upd`      | `{scene?, clear?, ...params}`: the switch   |
//!
//! Every `state/upd` is authoritative: it always goes through the manager's
//! full switch sequence and bumps the generation, even when the target
//! equals the current scene. Payloads carrying an `_isAnimationFrame` flag
//! are a legacy external cadence source and are dropped with a debug log;
//! the scheduler is the only source of frame timing. Validation failures
//! turn into error events on `<cmd_prefix>/<host>/error`; nothing a message
//! contains can take the router down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use core_bus::events::{epoch_ms, AckEvent, ErrorEvent};
use core_bus::{BusClient, BusMessage, CommandTopic, EventSink};
use core_driver::DriverKind;
use serde_json::Value;

use crate::SceneManager;

/// Scene used when neither the payload nor the per-device default names one.
pub const FALLBACK_SCENE: &str = "empty";

pub struct CommandRouter {
    bus: Arc<dyn BusClient>,
    sink: Arc<dyn EventSink>,
    manager: Arc<SceneManager>,
    cmd_prefix: String,
    /// Per-device default scene, set via `scene/set`.
    defaults: StdMutex<HashMap<String, String>>,
}

impl CommandRouter {
    pub fn new(
        bus: Arc<dyn BusClient>,
        sink: Arc<dyn EventSink>,
        manager: Arc<SceneManager>,
        cmd_prefix: &str,
    ) -> Self {
        Self {
            bus,
            sink,
            manager,
            cmd_prefix: cmd_prefix.to_string(),
            defaults: StdMutex::new(HashMap::new()),
        }
    }

    pub fn subscription_pattern(&self) -> String {
        format!("{}/+/+/+", self.cmd_prefix)
    }

    /// Subscribe and dispatch until the bus side closes. Call again after a
    /// broker reconnect; subscription state is not assumed to survive.
    pub async fn run(self: Arc<Self>) {
        let pattern = self.subscription_pattern();
        let mut rx = self.bus.subscribe(&[&pattern]);
        tracing::info!(target: "router", pattern = %pattern, "subscribed");
        while let Some(msg) = rx.recv().await {
            self.handle(msg).await;
        }
        tracing::info!(target: "router", "bus_closed");
    }

    pub async fn handle(&self, msg: BusMessage) {
        let topic = match CommandTopic::parse(&msg.topic, &self.cmd_prefix) {
            Ok(t) => t,
            Err(e) => {
                // Not attributable to a device; log and move on.
                tracing::warn!(target: "router", topic = %msg.topic, error = %e, "bad_topic");
                return;
            }
        };
        tracing::debug!(
            target: "router",
            host = %topic.host,
            section = %topic.section,
            action = %topic.action,
            "command"
        );
        match (topic.section.as_str(), topic.action.as_str()) {
            ("scene", "set") => self.scene_set(&topic.host, &msg.payload).await,
            ("driver", "set") => self.driver_set(&topic.host, &msg.payload).await,
            ("reset", "set") => self.reset_set(&topic.host).await,
            ("state", "upd") => self.state_upd(&topic.host, &msg.payload).await,
            _ => {
                self.publish_error(
                    &topic.host,
                    &format!(
                        "unsupported command `{}/{}`",
                        topic.section, topic.action
                    ),
                );
            }
        }
    }

    /// Update the per-device default scene used by `state/upd` when the
    /// payload names none.
    async fn scene_set(&self, host: &str, payload: &Value) {
        let Some(name) = payload.get("name").and_then(Value::as_str) else {
            self.publish_error(host, "scene/set payload needs a string `name`");
            return;
        };
        if !self.manager.has_scene(name) {
            self.publish_error(host, &format!("unknown scene `{name}`"));
            return;
        }
        self.defaults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(host.to_string(), name.to_string());
        tracing::info!(target: "router", host, scene = name, "default_scene_set");
        self.publish_ack(host, "scene", "set", true, Some(name.to_string()));
    }

    async fn driver_set(&self, host: &str, payload: &Value) {
        let Some(kind) = payload
            .get("driver")
            .and_then(Value::as_str)
            .and_then(DriverKind::parse)
        else {
            self.publish_error(host, "driver/set payload needs `driver`: \"real\" or \"mock\"");
            return;
        };
        match self.manager.switch_driver(host, kind).await {
            Ok(staged) => {
                let detail = if staged { "staged" } else { "unchanged" };
                self.publish_ack(host, "driver", "set", true, Some(detail.to_string()));
            }
            Err(e) => {
                self.publish_error(host, &e.to_string());
                self.publish_ack(host, "driver", "set", false, Some(e.to_string()));
            }
        }
    }

    async fn reset_set(&self, host: &str) {
        match self.manager.reset_device(host).await {
            Ok(()) => self.publish_ack(host, "reset", "set", true, None),
            Err(e) => {
                self.publish_error(host, &e.to_string());
                self.publish_ack(host, "reset", "set", false, Some(e.to_string()));
            }
        }
    }

    /// The principal command: resolve the target scene and switch.
    async fn state_upd(&self, host: &str, payload: &Value) {
        if is_animation_frame(payload) {
            tracing::debug!(target: "router", host, "animation_frame_dropped");
            return;
        }
        if !payload.is_object() {
            self.publish_error(host, "state/upd payload must be an object");
            return;
        }
        let scene = payload
            .get("scene")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| {
                self.defaults
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .get(host)
                    .cloned()
            })
            .unwrap_or_else(|| FALLBACK_SCENE.to_string());
        // Manager publishes the switch transitions and any failure events.
        if let Err(e) = self
            .manager
            .switch_scene(host, &scene, payload.clone())
            .await
        {
            tracing::warn!(target: "router", host, scene = %scene, error = %e, "switch_rejected");
        }
    }

    fn publish_error(&self, host: &str, error: &str) {
        tracing::warn!(target: "router", host, error, "command_rejected");
        self.sink.error(
            host,
            &ErrorEvent {
                scene: None,
                error: error.to_string(),
                generation_id: None,
                ts: epoch_ms(),
            },
        );
    }

    fn publish_ack(&self, host: &str, section: &str, action: &str, ok: bool, detail: Option<String>) {
        self.sink.ack(
            host,
            &AckEvent {
                section: section.to_string(),
                action: action.to_string(),
                ok,
                detail,
                ts: epoch_ms(),
            },
        );
    }
}

/// Legacy animation-continuation marker: present and not explicitly false.
fn is_animation_frame(payload: &Value) -> bool {
    payload
        .get("_isAnimationFrame")
        .map(|v| v.as_bool().unwrap_or(true))
        .unwrap_or(false)
}
