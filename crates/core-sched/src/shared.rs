//! Tables shared between the manager, the router and the device workers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use core_bus::events::{epoch_ms, ErrorEvent, MetricsEvent, SceneStateEvent, VersionStamp};
use core_bus::EventSink;
use core_driver::{DevicePanel, PanelMetricsSnapshot};
use core_scene::{SceneRegistry, StateStore};

use crate::state::{DeviceRun, Pacing, RunSnapshot, RunStatus};

pub(crate) struct DeviceSlot {
    pub panel: Arc<DevicePanel>,
    pub run: DeviceRun,
    /// Serializes switch/stop sequences per host; frame rendering never
    /// takes this lock.
    pub switch_serial: Arc<tokio::sync::Mutex<()>>,
}

/// Single ownership point for all per-device state (no process globals).
pub(crate) struct Shared {
    pub registry: Arc<SceneRegistry>,
    pub store: Arc<StateStore>,
    pub sink: Arc<dyn EventSink>,
    pub pacing: Pacing,
    pub stamp: VersionStamp,
    pub devices: StdMutex<HashMap<String, DeviceSlot>>,
}

impl Shared {
    pub fn with_slot<T>(&self, host: &str, f: impl FnOnce(&mut DeviceSlot) -> T) -> Option<T> {
        let mut devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
        devices.get_mut(host).map(f)
    }

    pub fn run_snapshot(&self, host: &str) -> Option<RunSnapshot> {
        self.with_slot(host, |slot| slot.run.snapshot())
    }

    pub fn generation(&self, host: &str) -> Option<u64> {
        self.with_slot(host, |slot| slot.run.generation)
    }

    /// A frame rendered under `generation` may only produce side effects
    /// while that generation is still current and the device is running.
    pub fn is_frame_current(&self, host: &str, generation: u64) -> bool {
        self.with_slot(host, |slot| {
            slot.run.generation == generation && slot.run.status == RunStatus::Running
        })
        .unwrap_or(false)
    }

    pub fn panel(&self, host: &str) -> Option<Arc<DevicePanel>> {
        self.with_slot(host, |slot| slot.panel.clone())
    }

    pub fn set_last_delay(&self, host: &str, delay: Duration) {
        self.with_slot(host, |slot| slot.run.last_delay = delay);
    }

    pub fn bump_frames_pushed(&self, host: &str) {
        self.with_slot(host, |slot| slot.run.frames_pushed += 1);
    }

    /// Worker-side transition out of `Running` at a frame boundary (stop
    /// sentinel or fatal render error). Only applies while the observed
    /// generation is still current; a concurrent switch wins otherwise.
    pub fn begin_loop_stop(&self, host: &str, generation: u64) -> bool {
        self.with_slot(host, |slot| {
            if slot.run.generation == generation && slot.run.status == RunStatus::Running {
                slot.run.status = RunStatus::Stopping;
                true
            } else {
                false
            }
        })
        .unwrap_or(false)
    }

    /// Second half of the worker-side stop, after `cleanup` ran.
    pub fn finish_loop_stop(&self, host: &str, generation: u64, status: RunStatus) -> bool {
        let applied = self
            .with_slot(host, |slot| {
                if slot.run.generation == generation && slot.run.status == RunStatus::Stopping {
                    slot.run.status = status;
                    slot.run.play = crate::state::PlayState::Stopped;
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);
        if applied {
            self.publish_state(host);
        }
        applied
    }

    /// Build a transition event from the current run state.
    pub fn state_event(&self, run: &DeviceRun) -> SceneStateEvent {
        SceneStateEvent {
            current_scene: run.current_scene.clone(),
            target_scene: run.target_scene.clone(),
            status: run.status.as_str().to_string(),
            generation_id: run.generation,
            stamp: self.stamp,
            ts: epoch_ms(),
        }
    }

    pub fn publish_state(&self, host: &str) {
        if let Some(ev) = self.with_slot(host, |slot| self.state_event(&slot.run)) {
            tracing::debug!(
                target: "sched",
                host,
                status = %ev.status,
                generation = ev.generation_id,
                "scene_state"
            );
            self.sink.scene_state(host, &ev);
        }
    }

    pub fn publish_error(
        &self,
        host: &str,
        scene: Option<&str>,
        generation: Option<u64>,
        error: &str,
    ) {
        self.sink.error(
            host,
            &ErrorEvent {
                scene: scene.map(str::to_string),
                error: error.to_string(),
                generation_id: generation,
                ts: epoch_ms(),
            },
        );
    }

    pub fn metrics_event(&self, m: &PanelMetricsSnapshot) -> MetricsEvent {
        MetricsEvent {
            pushes: m.pushes,
            skipped: m.skipped,
            errors: m.errors,
            last_frametime: m.last_frametime_ms,
            last_seen_ts: m.last_seen_ts,
            ts: epoch_ms(),
        }
    }
}
