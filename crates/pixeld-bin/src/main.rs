//! pixeld entrypoint.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use core_bus::{BusClient, BusEventSink, EventSink, MemoryBus};
use core_config::ConfigFile;
use core_driver::{DriverKind, Size};
use core_scene::{SceneLogLevel, SceneRegistry, StateStore};
use core_sched::{CommandRouter, DeviceSpec, Pacing, SceneManager};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "pixeld", version, about = "Pixel display scene daemon")]
struct Args {
    /// Optional configuration file path (overrides discovery of `pixeld.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
}

fn configure_logging() -> Option<WorkerGuard> {
    let file_appender = tracing_appender::rolling::never(Path::new("."), "pixeld.log");
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .try_init()
    {
        Ok(_) => Some(guard),
        Err(_) => {
            // Global subscriber already installed; drop the guard so the
            // writer shuts down.
            None
        }
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "runtime.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

fn pacing_from(cfg: &ConfigFile) -> Pacing {
    Pacing {
        min_interval: Duration::from_millis(cfg.pacing.min_interval_ms),
        max_interval: Duration::from_millis(cfg.pacing.max_interval_ms),
        stop_timeout_floor: Duration::from_millis(cfg.pacing.stop_timeout_ms),
        error_backoff: Duration::from_millis(cfg.pacing.error_backoff_ms),
        slow_frame_warn: Duration::from_millis(cfg.pacing.slow_frame_warn_ms),
        ..Pacing::default()
    }
}

async fn register_inventory(cfg: &ConfigFile, manager: &SceneManager) -> Vec<(String, String)> {
    let default_kind =
        DriverKind::parse(&cfg.daemon.default_driver).unwrap_or(DriverKind::Mock);
    let mut startup = Vec::new();
    for dev in &cfg.devices {
        let (width, height) = dev.size(cfg.daemon.default_width, cfg.daemon.default_height);
        let kind = dev
            .driver
            .as_deref()
            .and_then(DriverKind::parse)
            .unwrap_or(default_kind);
        manager
            .register_device(DeviceSpec {
                host: dev.name.clone(),
                ip: dev.ip.clone(),
                size: Size::new(width, height),
                kind,
                startup_scene: dev.startup_scene.clone(),
                brightness: dev.brightness,
                log_level: dev.log_level.as_deref().and_then(SceneLogLevel::parse),
            })
            .await;
        if let Some(scene) = &dev.startup_scene {
            startup.push((dev.name.clone(), scene.clone()));
        }
    }
    startup
}

async fn run(cfg: ConfigFile) -> Result<()> {
    let mut registry = SceneRegistry::new();
    let registered = scenes::register_builtins(&mut registry);
    info!(target: "runtime", scenes = registered, "scene_registry_populated");
    let registry = Arc::new(registry);

    // In-process bus; an external broker adapter would slot in here.
    let bus: Arc<dyn BusClient> = Arc::new(MemoryBus::new());
    let sink: Arc<dyn EventSink> = Arc::new(BusEventSink::new(
        bus.clone(),
        &cfg.daemon.cmd_prefix,
        &cfg.daemon.state_topic_base,
    ));

    let default_kind =
        DriverKind::parse(&cfg.daemon.default_driver).unwrap_or(DriverKind::Mock);
    let manager = Arc::new(SceneManager::new(
        registry,
        Arc::new(StateStore::new()),
        sink.clone(),
        pacing_from(&cfg),
        default_kind,
        Size::new(cfg.daemon.default_width, cfg.daemon.default_height),
    ));

    let startup = register_inventory(&cfg, &manager).await;

    let router = Arc::new(CommandRouter::new(
        bus.clone(),
        sink,
        manager.clone(),
        &cfg.daemon.cmd_prefix,
    ));
    let router_task = tokio::spawn(router.clone().run());

    for (host, scene) in startup {
        if let Err(e) = manager
            .switch_scene(&host, &scene, serde_json::json!({}))
            .await
        {
            error!(target: "runtime", host = %host, scene = %scene, error = %e, "startup_scene_failed");
        }
    }

    info!(
        target: "runtime",
        devices = manager.hosts().len(),
        cmd_prefix = %cfg.daemon.cmd_prefix,
        "daemon_ready"
    );

    wait_for_shutdown_signal().await;

    info!(target: "runtime", "shutdown_begin");
    manager.shutdown().await;
    router_task.abort();
    info!(target: "runtime", "shutdown_complete");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(term) => term,
            Err(e) => {
                error!(target: "runtime", error = %e, "sigterm_handler_failed");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => info!(target: "runtime", "sigint"),
            _ = term.recv() => info!(target: "runtime", "sigterm"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!(target: "runtime", "sigint");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = configure_logging();
    install_panic_hook();
    info!(target: "runtime", "startup");

    let args = Args::parse();
    // Bootstrap config failures are the one fatal error class: bubble up
    // for a non-zero exit.
    let cfg = core_config::load_from(args.config.clone())?;
    run(cfg).await
}
