//! Scene scheduling and dispatch.
//!
//! [`SceneManager`] owns every per-device worker and all runtime state, and
//! is the only component that moves a device between scenes. A switch is
//! always authoritative: it bumps the device generation, waits (bounded) for
//! the in-flight frame, runs `cleanup` of the outgoing scene before `init`
//! of the incoming one, resets the incoming scene's scratchpad, and
//! publishes `switching` → `running` in that order. Stale frames from the
//! preempted scene are disposed of by generation gating in the worker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use core_bus::events::{epoch_ms, SceneStateEvent, VersionStamp};
use core_bus::EventSink;
use core_driver::{DevicePanel, DriverKind, PanelMetricsSnapshot, Size};
use core_scene::{
    FrameContext, FrameStamp, SceneInfo, SceneLog, SceneLogLevel, SceneRegistry, StateStore,
};
use serde_json::Value;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

pub mod router;
pub mod scheduler;
pub mod state;

mod shared;

pub use router::CommandRouter;
pub use scheduler::WorkerPhase;
pub use state::{DeviceRun, Pacing, PlayState, RunSnapshot, RunStatus};

use scheduler::Worker;
use shared::{DeviceSlot, Shared};

#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    #[error("unknown scene `{0}`")]
    UnknownScene(String),
    #[error("unknown device `{0}`")]
    UnknownDevice(String),
    #[error("scene init failed: {0}")]
    InitFailed(String),
    #[error("device reset failed: {0}")]
    ResetFailed(String),
}

/// Inventory entry handed to `register_device`.
#[derive(Debug, Clone)]
pub struct DeviceSpec {
    pub host: String,
    pub ip: String,
    pub size: Size,
    pub kind: DriverKind,
    pub startup_scene: Option<String>,
    pub brightness: Option<u8>,
    pub log_level: Option<SceneLogLevel>,
}

struct WorkerHandle {
    wake: Arc<Notify>,
    shutdown: Arc<AtomicBool>,
    phase_rx: watch::Receiver<WorkerPhase>,
    join: JoinHandle<()>,
}

pub struct SceneManager {
    shared: Arc<Shared>,
    workers: StdMutex<HashMap<String, WorkerHandle>>,
    default_kind: DriverKind,
    default_size: Size,
}

impl SceneManager {
    pub fn new(
        registry: Arc<SceneRegistry>,
        store: Arc<StateStore>,
        sink: Arc<dyn EventSink>,
        pacing: Pacing,
        default_kind: DriverKind,
        default_size: Size,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry,
                store,
                sink,
                pacing,
                stamp: VersionStamp::current(),
                devices: StdMutex::new(HashMap::new()),
            }),
            workers: StdMutex::new(HashMap::new()),
            default_kind,
            default_size,
        }
    }

    // ---------------------------------------------------------------------
    // Device inventory
    // ---------------------------------------------------------------------

    /// Register one device. Returns false (and keeps the existing entry)
    /// when the host is already known.
    pub async fn register_device(&self, spec: DeviceSpec) -> bool {
        {
            let devices = self.shared.devices.lock().unwrap_or_else(|e| e.into_inner());
            if devices.contains_key(&spec.host) {
                tracing::warn!(target: "sched.manager", host = %spec.host, "device_already_registered");
                return false;
            }
        }
        let panel = Arc::new(DevicePanel::new(&spec.host, &spec.ip, spec.size, spec.kind));
        if let Some(level) = spec.brightness {
            panel.set_brightness(level).await;
        }
        let log_level = spec
            .log_level
            .unwrap_or_else(|| SceneLogLevel::default_for(spec.kind));
        let mut devices = self.shared.devices.lock().unwrap_or_else(|e| e.into_inner());
        devices.insert(
            spec.host.clone(),
            DeviceSlot {
                panel,
                run: DeviceRun::new(log_level),
                switch_serial: Arc::new(tokio::sync::Mutex::new(())),
            },
        );
        tracing::info!(
            target: "sched.manager",
            host = %spec.host,
            driver = spec.kind.as_str(),
            width = spec.size.width,
            height = spec.size.height,
            "device_registered"
        );
        true
    }

    /// Commands may address hosts missing from the inventory; those get a
    /// default-driver panel on first use.
    async fn ensure_device(&self, host: &str) {
        let known = {
            let devices = self.shared.devices.lock().unwrap_or_else(|e| e.into_inner());
            devices.contains_key(host)
        };
        if !known {
            self.register_device(DeviceSpec {
                host: host.to_string(),
                ip: host.to_string(),
                size: self.default_size,
                kind: self.default_kind,
                startup_scene: None,
                brightness: None,
                log_level: None,
            })
            .await;
        }
    }

    pub fn hosts(&self) -> Vec<String> {
        let devices = self.shared.devices.lock().unwrap_or_else(|e| e.into_inner());
        let mut hosts: Vec<String> = devices.keys().cloned().collect();
        hosts.sort();
        hosts
    }

    // ---------------------------------------------------------------------
    // Registry passthrough
    // ---------------------------------------------------------------------

    pub fn has_scene(&self, name: &str) -> bool {
        self.shared.registry.contains(name)
    }

    pub fn scene_names(&self) -> Vec<String> {
        self.shared.registry.names()
    }

    pub fn scene_list(&self) -> Vec<SceneInfo> {
        self.shared.registry.list()
    }

    // ---------------------------------------------------------------------
    // Scene lifecycle
    // ---------------------------------------------------------------------

    /// Authoritative switch: runs the full sequence (generation bump,
    /// stop-ack, cleanup, scratchpad reset, init) even when `scene_name`
    /// equals the current scene.
    pub async fn switch_scene(
        &self,
        host: &str,
        scene_name: &str,
        payload: Value,
    ) -> Result<(), SwitchError> {
        let scene = self.shared.registry.get(scene_name).map_err(|e| {
            self.shared
                .publish_error(host, Some(scene_name), None, &e.to_string());
            SwitchError::UnknownScene(scene_name.to_string())
        })?;
        self.ensure_device(host).await;
        let serial = self
            .shared
            .with_slot(host, |slot| slot.switch_serial.clone())
            .ok_or_else(|| SwitchError::UnknownDevice(host.to_string()))?;
        let _switching = serial.lock().await;

        // Capture previous run, bump the generation, mark switching.
        let (prev_scene, prev_status, generation, last_delay, log_level, panel) = self
            .shared
            .with_slot(host, |slot| {
                let prev_scene = slot.run.current_scene.clone();
                let prev_status = slot.run.status;
                let last_delay = slot.run.last_delay;
                slot.run.generation += 1;
                slot.run.status = RunStatus::Switching;
                slot.run.target_scene = Some(scene_name.to_string());
                (
                    prev_scene,
                    prev_status,
                    slot.run.generation,
                    last_delay,
                    slot.run.log_level,
                    slot.panel.clone(),
                )
            })
            .ok_or_else(|| SwitchError::UnknownDevice(host.to_string()))?;

        tracing::info!(
            target: "sched.manager",
            host,
            from = prev_scene.as_deref(),
            to = scene_name,
            generation,
            "switch_scene"
        );
        self.shared.publish_state(host);
        // Nudge the worker so an in-flight render observes the preemption.
        self.wake(host);

        // Bounded stop acknowledgement for an in-flight frame. On timeout
        // the frame is abandoned; the bumped generation gates it out.
        if prev_status == RunStatus::Running {
            let timeout = self.shared.pacing.stop_timeout(last_delay);
            if !self.await_worker_idle(host, timeout).await {
                tracing::warn!(
                    target: "sched.manager",
                    host,
                    timeout_ms = timeout.as_millis() as u64,
                    "switch_stop_timeout"
                );
                self.shared.publish_error(
                    host,
                    prev_scene.as_deref(),
                    Some(generation),
                    "switch stop timeout: in-flight frame abandoned",
                );
            }
        }

        // Cleanup of the outgoing scene happens before init of the incoming
        // one. Only owed when the outgoing scene was actually running; a
        // stopped or errored scene already ran its cleanup.
        if prev_status == RunStatus::Running {
            if let Some(prev) = prev_scene.as_deref() {
                if let Ok(prev_scene_obj) = self.shared.registry.get(prev) {
                    let null = Value::Null;
                    let mut ctx = FrameContext::new(
                        &panel,
                        &self.shared.store,
                        prev,
                        &null,
                        FrameStamp {
                            generation,
                            ..FrameStamp::default()
                        },
                        SceneLog::new(host, prev, log_level),
                    );
                    if let Err(e) = prev_scene_obj.cleanup(&mut ctx).await {
                        tracing::warn!(target: "sched.manager", host, scene = prev, error = %e, "cleanup_failed");
                        self.shared
                            .publish_error(host, Some(prev), Some(generation), &e.to_string());
                    }
                }
            }
        }

        // Clean start: the incoming scratchpad is empty before init runs.
        self.shared.store.clear(host, scene_name);
        if payload.get("clear").and_then(Value::as_bool).unwrap_or(false) {
            let _ = panel.clear().await;
        }

        {
            let mut ctx = FrameContext::new(
                &panel,
                &self.shared.store,
                scene_name,
                &payload,
                FrameStamp {
                    generation,
                    ..FrameStamp::default()
                },
                SceneLog::new(host, scene_name, log_level),
            );
            if let Err(e) = scene.init(&mut ctx).await {
                self.shared.with_slot(host, |slot| {
                    slot.run.status = RunStatus::Error;
                    slot.run.play = PlayState::Stopped;
                });
                self.shared.publish_state(host);
                self.shared.publish_error(
                    host,
                    Some(scene_name),
                    Some(generation),
                    &format!("init failed: {e}"),
                );
                return Err(SwitchError::InitFailed(e.to_string()));
            }
        }

        // Publish `running` before flipping the status so the first
        // frame-ok of the new scene always trails the transition.
        self.shared.sink.scene_state(
            host,
            &SceneStateEvent {
                current_scene: Some(scene_name.to_string()),
                target_scene: None,
                status: RunStatus::Running.as_str().to_string(),
                generation_id: generation,
                stamp: self.shared.stamp,
                ts: epoch_ms(),
            },
        );
        let min_interval = self.shared.pacing.min_interval;
        self.shared.with_slot(host, |slot| {
            slot.run.current_scene = Some(scene_name.to_string());
            slot.run.target_scene = None;
            slot.run.status = RunStatus::Running;
            slot.run.play = PlayState::Playing;
            slot.run.frames_pushed = 0;
            slot.run.started_at = Instant::now();
            slot.run.payload = payload;
            slot.run.last_delay = min_interval;
        });
        self.ensure_worker(host, panel);
        self.wake(host);
        Ok(())
    }

    /// Drive the device to `stopped`, running cleanup. Returns false when
    /// nothing was running.
    pub async fn stop_scene(&self, host: &str) -> bool {
        let Some(serial) = self.shared.with_slot(host, |slot| slot.switch_serial.clone()) else {
            return false;
        };
        let _switching = serial.lock().await;

        let Some((scene_name, generation, last_delay, log_level, panel)) =
            self.shared.with_slot(host, |slot| {
                if slot.run.status != RunStatus::Running {
                    return None;
                }
                let scene = slot.run.current_scene.clone()?;
                slot.run.status = RunStatus::Stopping;
                Some((
                    scene,
                    slot.run.generation,
                    slot.run.last_delay,
                    slot.run.log_level,
                    slot.panel.clone(),
                ))
            }).flatten()
        else {
            return false;
        };

        let timeout = self.shared.pacing.stop_timeout(last_delay);
        self.await_worker_idle(host, timeout).await;

        if let Ok(scene) = self.shared.registry.get(&scene_name) {
            let null = Value::Null;
            let mut ctx = FrameContext::new(
                &panel,
                &self.shared.store,
                &scene_name,
                &null,
                FrameStamp {
                    generation,
                    ..FrameStamp::default()
                },
                SceneLog::new(host, &scene_name, log_level),
            );
            if let Err(e) = scene.cleanup(&mut ctx).await {
                tracing::warn!(target: "sched.manager", host, scene = %scene_name, error = %e, "cleanup_failed");
            }
        }

        self.shared.with_slot(host, |slot| {
            slot.run.status = RunStatus::Stopped;
            slot.run.play = PlayState::Stopped;
        });
        self.shared.publish_state(host);
        tracing::info!(target: "sched.manager", host, scene = %scene_name, "scene_stopped");
        true
    }

    /// Suspend rendering; gating and state stay live. Returns false when
    /// the device is not playing.
    pub fn pause_scene(&self, host: &str) -> bool {
        let paused = self
            .shared
            .with_slot(host, |slot| {
                if slot.run.status == RunStatus::Running && slot.run.play == PlayState::Playing {
                    slot.run.play = PlayState::Paused;
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);
        if paused {
            tracing::info!(target: "sched.manager", host, "scene_paused");
        }
        paused
    }

    pub fn resume_scene(&self, host: &str) -> bool {
        let resumed = self
            .shared
            .with_slot(host, |slot| {
                if slot.run.status == RunStatus::Running && slot.run.play == PlayState::Paused {
                    slot.run.play = PlayState::Playing;
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);
        if resumed {
            self.wake(host);
            tracing::info!(target: "sched.manager", host, "scene_resumed");
        }
        resumed
    }

    // ---------------------------------------------------------------------
    // Driver control
    // ---------------------------------------------------------------------

    /// Stage a driver hot-swap. The generation is untouched; an active loop
    /// applies the swap at its next frame boundary and re-renders, an idle
    /// device swaps immediately. Returns true when a swap was staged.
    pub async fn switch_driver(&self, host: &str, kind: DriverKind) -> Result<bool, SwitchError> {
        self.ensure_device(host).await;
        let panel = self
            .shared
            .panel(host)
            .ok_or_else(|| SwitchError::UnknownDevice(host.to_string()))?;
        let staged = panel.request_swap(kind);
        if !staged {
            return Ok(false);
        }
        self.shared.with_slot(host, |slot| {
            slot.run.log_level = SceneLogLevel::default_for(kind);
        });
        let rendering = self
            .shared
            .with_slot(host, |slot| {
                slot.run.status == RunStatus::Running && slot.run.play == PlayState::Playing
            })
            .unwrap_or(false);
        if rendering {
            // Re-render of the current scene with the last-known payload,
            // not a switch: the worker wakes, applies the swap, and draws
            // the same generation.
            self.wake(host);
        } else {
            panel.apply_pending_swap().await;
        }
        Ok(true)
    }

    /// Best-effort hardware reset through the active driver.
    pub async fn reset_device(&self, host: &str) -> Result<(), SwitchError> {
        self.ensure_device(host).await;
        let panel = self
            .shared
            .panel(host)
            .ok_or_else(|| SwitchError::UnknownDevice(host.to_string()))?;
        panel
            .reset()
            .await
            .map_err(|e| SwitchError::ResetFailed(e.to_string()))
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    pub fn device_state(&self, host: &str) -> Option<RunSnapshot> {
        self.shared.run_snapshot(host)
    }

    pub fn device_metrics(&self, host: &str) -> Option<PanelMetricsSnapshot> {
        self.shared.panel(host).map(|p| p.metrics())
    }

    /// Active driver kind; staged swaps do not show until applied.
    pub fn device_driver(&self, host: &str) -> Option<DriverKind> {
        self.shared.panel(host).map(|p| p.current_kind())
    }

    /// On-demand metrics snapshot onto the bus.
    pub fn publish_metrics(&self, host: &str) {
        if let Some(m) = self.device_metrics(host) {
            let ev = self.shared.metrics_event(&m);
            self.shared.sink.metrics(host, &ev);
        }
    }

    // ---------------------------------------------------------------------
    // Shutdown
    // ---------------------------------------------------------------------

    /// Stop every scene (bounded), stop every worker, log final state.
    pub async fn shutdown(&self) {
        for host in self.hosts() {
            self.stop_scene(&host).await;
        }
        let handles: Vec<(String, WorkerHandle)> = {
            let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            workers.drain().collect()
        };
        for (host, handle) in handles {
            handle.shutdown.store(true, Ordering::Relaxed);
            handle.wake.notify_one();
            if tokio::time::timeout(Duration::from_secs(1), handle.join)
                .await
                .is_err()
            {
                tracing::warn!(target: "sched.manager", host = %host, "worker_join_timeout");
            }
        }
        for host in self.hosts() {
            if let (Some(run), Some(metrics)) =
                (self.device_state(&host), self.device_metrics(&host))
            {
                tracing::info!(
                    target: "sched.manager",
                    host = %host,
                    scene = run.scene.as_deref(),
                    status = run.status.as_str(),
                    generation = run.generation,
                    pushes = metrics.pushes,
                    errors = metrics.errors,
                    "final_device_state"
                );
            }
        }
    }

    // ---------------------------------------------------------------------
    // Worker plumbing
    // ---------------------------------------------------------------------

    fn ensure_worker(&self, host: &str, panel: Arc<DevicePanel>) {
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        if workers.contains_key(host) {
            return;
        }
        let wake = Arc::new(Notify::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let (phase_tx, phase_rx) = watch::channel(WorkerPhase::Idle);
        let worker = Worker {
            host: host.to_string(),
            panel,
            shared: self.shared.clone(),
            wake: wake.clone(),
            shutdown: shutdown.clone(),
            phase_tx,
        };
        let join = tokio::spawn(worker.run());
        workers.insert(
            host.to_string(),
            WorkerHandle {
                wake,
                shutdown,
                phase_rx,
                join,
            },
        );
    }

    fn wake(&self, host: &str) {
        let workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = workers.get(host) {
            handle.wake.notify_one();
        }
    }

    /// Wait for the worker to leave its render phase. True when idle was
    /// observed (or no worker exists) within the bound.
    async fn await_worker_idle(&self, host: &str, timeout: Duration) -> bool {
        let Some(mut phase_rx) = ({
            let workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            workers.get(host).map(|h| h.phase_rx.clone())
        }) else {
            return true;
        };
        if *phase_rx.borrow() == WorkerPhase::Idle {
            return true;
        }
        tokio::time::timeout(timeout, async move {
            while phase_rx.changed().await.is_ok() {
                if *phase_rx.borrow() == WorkerPhase::Idle {
                    return;
                }
            }
        })
        .await
        .is_ok()
    }
}
