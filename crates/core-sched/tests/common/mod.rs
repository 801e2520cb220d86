//! Shared fixture for the scheduler scenario tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use core_bus::{BusClient, BusMessage, MemoryBus, RecordingSink};
use core_driver::{DriverKind, Size};
use core_scene::{
    FrameContext, Scene, SceneError, SceneInfo, SceneLogLevel, SceneRegistry, SceneTick,
    StateStore,
};
use core_sched::{CommandRouter, DeviceSpec, Pacing, SceneManager};
use serde_json::{json, Value};

pub const HOST: &str = "desk";
pub const PREFIX: &str = "pixeld/cmd";

/// Ordered lifecycle journal written by the probe scenes.
pub type Journal = Arc<StdMutex<Vec<String>>>;

pub fn journal_entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

fn note(journal: &Journal, entry: String) {
    journal.lock().unwrap().push(entry);
}

/// Animated probe: fixed inter-frame delay, journals every lifecycle call,
/// and marks whether its scratchpad was clean on each render.
pub struct TickScene {
    pub name: &'static str,
    pub delay: Duration,
    pub journal: Journal,
}

#[async_trait]
impl Scene for TickScene {
    fn name(&self) -> &str {
        self.name
    }

    fn info(&self) -> SceneInfo {
        SceneInfo {
            name: self.name.into(),
            description: "tick probe".into(),
            category: "test".into(),
            wants_loop: true,
            dev: true,
        }
    }

    async fn init(&self, ctx: &mut FrameContext<'_>) -> Result<(), SceneError> {
        note(&self.journal, format!("init {}", self.name));
        ctx.set_state("inited", json!(true));
        Ok(())
    }

    async fn render(&self, ctx: &mut FrameContext<'_>) -> Result<SceneTick, SceneError> {
        let touched = ctx.get_state("touched", json!(false)) == json!(true);
        note(
            &self.journal,
            format!(
                "render {} {}",
                self.name,
                if touched { "dirty" } else { "clean" }
            ),
        );
        ctx.set_state("touched", json!(true));
        Ok(SceneTick::Continue(self.delay))
    }

    async fn cleanup(&self, _ctx: &mut FrameContext<'_>) -> Result<(), SceneError> {
        note(&self.journal, format!("cleanup {}", self.name));
        Ok(())
    }
}

/// Render blocks for `hold` before completing; used to provoke the stop
/// acknowledgement timeout and generation gating.
pub struct SlowScene {
    pub name: &'static str,
    pub hold: Duration,
    pub journal: Journal,
}

#[async_trait]
impl Scene for SlowScene {
    fn name(&self) -> &str {
        self.name
    }

    fn info(&self) -> SceneInfo {
        SceneInfo {
            name: self.name.into(),
            description: "slow probe".into(),
            category: "test".into(),
            wants_loop: true,
            dev: true,
        }
    }

    async fn render(&self, _ctx: &mut FrameContext<'_>) -> Result<SceneTick, SceneError> {
        note(&self.journal, format!("render {}", self.name));
        tokio::time::sleep(self.hold).await;
        Ok(SceneTick::Continue(Duration::from_millis(10)))
    }
}

/// Fails every `every`-th render with a recoverable error; the first render
/// is call 1.
pub struct FlakyScene {
    pub name: &'static str,
    pub every: u64,
    pub calls: Arc<StdMutex<u64>>,
}

#[async_trait]
impl Scene for FlakyScene {
    fn name(&self) -> &str {
        self.name
    }

    fn info(&self) -> SceneInfo {
        SceneInfo {
            name: self.name.into(),
            description: "flaky probe".into(),
            category: "test".into(),
            wants_loop: true,
            dev: true,
        }
    }

    async fn render(&self, _ctx: &mut FrameContext<'_>) -> Result<SceneTick, SceneError> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        if *calls % self.every == 0 {
            return Err(SceneError::Render("flaky probe failure".into()));
        }
        Ok(SceneTick::Continue(Duration::from_millis(10)))
    }
}

/// Fatal on the very first render.
pub struct FatalScene {
    pub name: &'static str,
}

#[async_trait]
impl Scene for FatalScene {
    fn name(&self) -> &str {
        self.name
    }

    fn info(&self) -> SceneInfo {
        SceneInfo {
            name: self.name.into(),
            description: "fatal probe".into(),
            category: "test".into(),
            wants_loop: false,
            dev: true,
        }
    }

    async fn render(&self, _ctx: &mut FrameContext<'_>) -> Result<SceneTick, SceneError> {
        Err(SceneError::Fatal("fatal probe failure".into()))
    }
}

/// Continues for `frames` renders, then returns the stop sentinel.
pub struct DoneAfterScene {
    pub name: &'static str,
    pub frames: u64,
}

#[async_trait]
impl Scene for DoneAfterScene {
    fn name(&self) -> &str {
        self.name
    }

    fn info(&self) -> SceneInfo {
        SceneInfo {
            name: self.name.into(),
            description: "stop sentinel probe".into(),
            category: "test".into(),
            wants_loop: true,
            dev: true,
        }
    }

    async fn render(&self, ctx: &mut FrameContext<'_>) -> Result<SceneTick, SceneError> {
        if ctx.stamp.frame_count >= self.frames {
            return Ok(SceneTick::Done);
        }
        Ok(SceneTick::Continue(Duration::from_millis(20)))
    }
}

pub struct Harness {
    pub manager: Arc<SceneManager>,
    pub sink: Arc<RecordingSink>,
    pub router: Arc<CommandRouter>,
    pub bus: Arc<MemoryBus>,
    pub journal: Journal,
}

fn test_pacing() -> Pacing {
    Pacing {
        min_interval: Duration::from_millis(10),
        max_interval: Duration::from_secs(60),
        stop_timeout_floor: Duration::from_millis(150),
        error_backoff: Duration::from_millis(30),
        slow_frame_warn: Duration::from_millis(300),
        idle_tick: Duration::from_millis(20),
    }
}

/// Build a manager + router over a recording sink, with one mock device
/// (`desk`), a long-lived `blank` scene, and the probes produced by
/// `probes` (which receives the harness journal).
pub async fn harness(probes: impl FnOnce(&Journal) -> Vec<Arc<dyn Scene>>) -> Harness {
    let journal: Journal = Arc::new(StdMutex::new(Vec::new()));
    let mut registry = SceneRegistry::new();
    registry
        .register(Arc::new(TickScene {
            name: "blank",
            delay: Duration::from_millis(1000),
            journal: journal.clone(),
        }))
        .unwrap();
    registry.register_all(probes(&journal));

    let sink = Arc::new(RecordingSink::new());
    let manager = Arc::new(SceneManager::new(
        Arc::new(registry),
        Arc::new(StateStore::new()),
        sink.clone(),
        test_pacing(),
        DriverKind::Mock,
        Size::new(16, 8),
    ));
    manager
        .register_device(DeviceSpec {
            host: HOST.into(),
            ip: "127.0.0.1".into(),
            size: Size::new(16, 8),
            kind: DriverKind::Mock,
            startup_scene: None,
            brightness: None,
            log_level: Some(SceneLogLevel::Silent),
        })
        .await;

    let bus = Arc::new(MemoryBus::new());
    let bus_dyn: Arc<dyn BusClient> = bus.clone();
    let router = Arc::new(CommandRouter::new(
        bus_dyn,
        sink.clone(),
        manager.clone(),
        PREFIX,
    ));
    Harness {
        manager,
        sink,
        router,
        bus,
        journal,
    }
}

impl Harness {
    pub async fn command(&self, section: &str, action: &str, payload: Value) {
        self.router
            .handle(BusMessage::new(
                format!("{PREFIX}/{HOST}/{section}/{action}"),
                payload,
            ))
            .await;
    }

    pub async fn state_upd(&self, payload: Value) {
        self.command("state", "upd", payload).await;
    }
}

/// Poll `cond` every 10ms until it holds or `timeout` elapses.
pub async fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
