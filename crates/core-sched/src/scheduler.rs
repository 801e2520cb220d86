//! The per-device render loop.
//!
//! One worker task per device, spawned on the first scene start and kept for
//! the device's lifetime; scene switches reuse it. The loop is the only
//! place `render` executes for its host, and under the scheduler-push
//! contract it is also the only place frames are pushed.
//!
//! Every iteration renders against a value snapshot of the runtime state.
//! After `render`, and again after `push` before the frame-ok event, the
//! snapshot generation is compared with the live one; a mismatch means a
//! switch preempted this frame and it is dropped (counted as `skipped`),
//! which is what keeps zombie frames of a just-preempted scene off the bus.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use core_bus::events::{epoch_ms, FrameOkEvent};
use core_driver::DevicePanel;
use core_scene::{FrameContext, FrameStamp, Scene, SceneLog, SceneTick};
use tokio::sync::{watch, Notify};

use crate::shared::Shared;
use crate::state::{PlayState, RunStatus};

/// What the worker is doing right now; the manager awaits `Idle` as the
/// stop acknowledgement during switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Idle,
    Rendering,
}

pub(crate) struct Worker {
    pub host: String,
    pub panel: Arc<DevicePanel>,
    pub shared: Arc<Shared>,
    pub wake: Arc<Notify>,
    pub shutdown: Arc<AtomicBool>,
    pub phase_tx: watch::Sender<WorkerPhase>,
}

impl Worker {
    pub async fn run(self) {
        tracing::info!(target: "sched", host = %self.host, "worker_started");
        // Per-scene-run counters, reset whenever the generation moves.
        let mut epoch_generation = 0u64;
        let mut frame_count = 0u64;
        let mut entered = Instant::now();

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }
            let Some(snap) = self.shared.run_snapshot(&self.host) else {
                self.idle_wait().await;
                continue;
            };
            if snap.status != RunStatus::Running || snap.play != PlayState::Playing {
                self.idle_wait().await;
                continue;
            }
            let Some(scene_name) = snap.scene.clone() else {
                self.idle_wait().await;
                continue;
            };
            let scene = match self.shared.registry.get(&scene_name) {
                Ok(scene) => scene,
                Err(e) => {
                    // Registry entries never disappear; reaching this means a
                    // switch was accepted for a name that was never there.
                    tracing::error!(target: "sched", host = %self.host, error = %e, "scene_lookup_failed");
                    self.idle_wait().await;
                    continue;
                }
            };

            // Staged driver changes land between frames, never inside one.
            self.panel.apply_pending_swap().await;

            if epoch_generation != snap.generation {
                epoch_generation = snap.generation;
                frame_count = 0;
                entered = Instant::now();
            }

            let stamp = FrameStamp {
                generation: snap.generation,
                frame_count,
                elapsed_ms: entered.elapsed().as_millis() as u64,
                frametime_ms: if frame_count == 0 {
                    0
                } else {
                    self.panel.metrics().last_frametime_ms
                },
                loop_driven: scene.info().wants_loop,
            };

            let _ = self.phase_tx.send(WorkerPhase::Rendering);
            let t0 = Instant::now();
            // The render future is raced against preemption: when a switch
            // bumps the generation (or shutdown begins) the in-flight frame
            // is abandoned by dropping the future, so a hung or slow scene
            // cannot delay its successor beyond the stop timeout.
            let tick = {
                let mut ctx = FrameContext::new(
                    &self.panel,
                    &self.shared.store,
                    &scene_name,
                    &snap.payload,
                    stamp,
                    SceneLog::new(&self.host, &scene_name, snap.log_level),
                );
                tokio::select! {
                    tick = scene.render(&mut ctx) => Some(tick),
                    _ = self.preempted(snap.generation) => None,
                }
            };
            let render_time = t0.elapsed();
            let _ = self.phase_tx.send(WorkerPhase::Idle);
            let Some(tick) = tick else {
                self.panel.note_skipped();
                tracing::debug!(
                    target: "sched",
                    host = %self.host,
                    scene = %scene_name,
                    generation = snap.generation,
                    "render_abandoned"
                );
                continue;
            };

            if render_time > self.shared.pacing.slow_frame_warn {
                tracing::warn!(
                    target: "sched",
                    host = %self.host,
                    scene = %scene_name,
                    render_ms = render_time.as_millis() as u64,
                    "slow_frame"
                );
            }

            // Generation gate: a switch or stop happened while we rendered.
            if !self.shared.is_frame_current(&self.host, snap.generation) {
                self.panel.note_skipped();
                tracing::trace!(
                    target: "sched",
                    host = %self.host,
                    scene = %scene_name,
                    generation = snap.generation,
                    "frame_gated"
                );
                continue;
            }

            match tick {
                Err(e) if e.is_fatal() => {
                    self.panel.note_error();
                    self.shared.publish_error(
                        &self.host,
                        Some(&scene_name),
                        Some(snap.generation),
                        &e.to_string(),
                    );
                    self.stop_scene_from_loop(&scene_name, &scene, snap.generation, RunStatus::Error)
                        .await;
                }
                Err(e) => {
                    self.panel.note_error();
                    self.shared.publish_error(
                        &self.host,
                        Some(&scene_name),
                        Some(snap.generation),
                        &e.to_string(),
                    );
                    self.backoff_sleep().await;
                }
                Ok(SceneTick::Done) => {
                    self.stop_scene_from_loop(
                        &scene_name,
                        &scene,
                        snap.generation,
                        RunStatus::Stopped,
                    )
                    .await;
                }
                Ok(SceneTick::Continue(requested)) => {
                    frame_count += 1;
                    let delay = self.shared.pacing.clamp(requested);
                    self.shared.set_last_delay(&self.host, delay);

                    match self.panel.push().await {
                        Ok(outcome) => {
                            // Re-check before the event leaves: the push may
                            // have straddled a switch.
                            if self.shared.is_frame_current(&self.host, snap.generation) {
                                self.shared.bump_frames_pushed(&self.host);
                                let m = self.panel.metrics();
                                self.shared.sink.frame_ok(
                                    &self.host,
                                    &FrameOkEvent {
                                        scene: scene_name.clone(),
                                        frametime: outcome.frametime_ms,
                                        diff_pixels: outcome.diff_pixels,
                                        pushes: m.pushes,
                                        skipped: m.skipped,
                                        errors: m.errors,
                                        generation_id: snap.generation,
                                        stamp: self.shared.stamp,
                                        ts: epoch_ms(),
                                    },
                                );
                                self.shared
                                    .sink
                                    .metrics(&self.host, &self.shared.metrics_event(&m));
                            } else {
                                self.panel.note_skipped();
                            }
                        }
                        Err(e) => {
                            // Counted by the panel; the display keeps its
                            // last frame and the loop retries after backoff.
                            self.shared.publish_error(
                                &self.host,
                                Some(&scene_name),
                                Some(snap.generation),
                                &e.to_string(),
                            );
                            self.backoff_sleep().await;
                            continue;
                        }
                    }

                    // Pace from the start of the render: push latency eats
                    // into the requested delay and can only make the next
                    // frame immediate, never late beyond the deadline.
                    let deadline = t0 + delay;
                    self.sleep_until(deadline.into()).await;
                }
            }
        }
        let _ = self.phase_tx.send(WorkerPhase::Idle);
        tracing::info!(target: "sched", host = %self.host, "worker_exited");
    }

    /// Transition Running → Stopping → (Stopped | Error) at a frame
    /// boundary, running the scene's cleanup in between. A concurrent
    /// switch that already moved the generation wins and this becomes a
    /// no-op.
    async fn stop_scene_from_loop(
        &self,
        scene_name: &str,
        scene: &Arc<dyn Scene>,
        generation: u64,
        final_status: RunStatus,
    ) {
        if !self.shared.begin_loop_stop(&self.host, generation) {
            return;
        }
        let snap = self.shared.run_snapshot(&self.host);
        let payload = serde_json::Value::Null;
        let mut ctx = FrameContext::new(
            &self.panel,
            &self.shared.store,
            scene_name,
            &payload,
            FrameStamp {
                generation,
                ..FrameStamp::default()
            },
            SceneLog::new(
                &self.host,
                scene_name,
                snap.map(|s| s.log_level)
                    .unwrap_or(core_scene::SceneLogLevel::Silent),
            ),
        );
        if let Err(e) = scene.cleanup(&mut ctx).await {
            tracing::warn!(target: "sched", host = %self.host, scene = scene_name, error = %e, "cleanup_failed");
        }
        self.shared
            .finish_loop_stop(&self.host, generation, final_status);
        tracing::info!(
            target: "sched",
            host = %self.host,
            scene = scene_name,
            status = final_status.as_str(),
            "scene_finished"
        );
    }

    /// Resolves when the observed generation is no longer current (or the
    /// worker is shutting down). Pending until then; spurious wakes loop.
    async fn preempted(&self, generation: u64) {
        loop {
            self.wake.notified().await;
            if self.shutdown.load(Ordering::Relaxed)
                || self.shared.generation(&self.host) != Some(generation)
            {
                return;
            }
        }
    }

    /// Park until woken or the idle tick elapses.
    async fn idle_wait(&self) {
        tokio::select! {
            _ = self.wake.notified() => {}
            _ = tokio::time::sleep(self.shared.pacing.idle_tick) => {}
        }
    }

    async fn backoff_sleep(&self) {
        tokio::select! {
            _ = self.wake.notified() => {}
            _ = tokio::time::sleep(self.shared.pacing.error_backoff) => {}
        }
    }

    /// Inter-frame sleep; a wake (re-render request, shutdown) cuts it short.
    async fn sleep_until(&self, deadline: tokio::time::Instant) {
        tokio::select! {
            _ = self.wake.notified() => {}
            _ = tokio::time::sleep_until(deadline) => {}
        }
    }
}
