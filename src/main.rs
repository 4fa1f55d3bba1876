//! MIDI Pedal - foot controller gateway
//!
//! Reads six foot buttons, turns gestures into MIDI command sequences and
//! serves the configuration page.

use anyhow::Result;
use clap::Parser;
use midi_pedal::api::{self, ApiState};
use midi_pedal::config::{AppConfig, MidiConfig, StorageBackend};
use midi_pedal::controller::{ControllerHandle, PedalController};
use midi_pedal::dispatch::Dispatcher;
use midi_pedal::midi::{self, DeviceSink, InputListener, InputMap, MidiSink, NullSink, PortSink};
use midi_pedal::paths::AppPaths;
use midi_pedal::storage::{
    CoalescingStorage, FileStorage, FlusherHandle, MemoryStorage, SledStorage, Storage,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Button event queue between the MIDI input thread and the controller
const EVENT_QUEUE: usize = 256;

/// MIDI Pedal - map foot-switch gestures to MIDI command sequences
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to the app directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); overrides the config file
    #[arg(short, long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Print the stored configuration of every button and exit
    #[arg(long)]
    dump: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let paths = AppPaths::detect();

    let config_path = args.config.clone().unwrap_or_else(|| paths.config.clone());
    let config = if config_path.exists() {
        AppConfig::load(&config_path).await?
    } else {
        AppConfig::default()
    };

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let log_dir = config.logging.file.then(|| paths.logs_dir.clone());
    let _log_guard = init_logging(&level, log_dir);

    info!("Starting MIDI Pedal v{}...", env!("CARGO_PKG_VERSION"));
    if config_path.exists() {
        info!("Configuration file: {}", config_path.display());
    } else {
        warn!(
            "No configuration at {}, using defaults",
            config_path.display()
        );
    }

    if args.list_ports {
        midi::print_ports(&midi::list_ports()?);
        return Ok(());
    }

    paths.ensure_directories()?;
    info!("Data directory: {}", paths.base_dir().display());

    let (storage, flusher) = open_storage(&config, &paths)?;

    if args.dump {
        dump_buttons(storage, &config);
        return Ok(());
    }

    let sink = open_sink(&config.midi)?;
    let controller = PedalController::init(
        Arc::clone(&storage),
        sink,
        Dispatcher::new(config.midi.compact_two_byte_messages),
        Instant::now(),
    );

    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
    let _listener = match &config.midi.input_port {
        Some(port) => {
            let listener = InputListener::connect(port, InputMap::new(&config.buttons), event_tx)?;
            info!("Buttons read from input port: {}", listener.port_name());
            Some(listener)
        }
        None => {
            warn!("No midi.input_port configured, buttons are only reachable through the API");
            None
        }
    };

    let (handle, controller_task) = ControllerHandle::spawn(controller, event_rx);

    let static_dir = config
        .web
        .static_dir
        .clone()
        .unwrap_or_else(|| paths.www_dir());
    run_app(&config, handle.clone(), static_dir).await?;

    // Cleanup
    info!("Shutting down...");
    handle.shutdown().await;
    if let Err(e) = controller_task.await {
        error!("Controller task failed: {}", e);
    }
    if let Some(flusher) = flusher {
        flusher.shutdown().await;
    }

    info!("MIDI Pedal shutdown complete");
    Ok(())
}

/// Serve the configuration page until Ctrl+C
async fn run_app(config: &AppConfig, handle: ControllerHandle, static_dir: PathBuf) -> Result<()> {
    let server = async {
        if !config.web.enabled {
            info!("Configuration server disabled");
            return std::future::pending::<Result<()>>().await;
        }

        let page = match &config.web.template {
            Some(path) => Some(tokio::fs::read_to_string(path).await.map_err(|e| {
                anyhow::anyhow!("Failed to read template {}: {}", path.display(), e)
            })?),
            None => None,
        };
        let state = Arc::new(ApiState::new(handle, page).with_static_dir(static_dir));
        api::start_server(state, &config.web.bind, config.web.port).await
    };

    info!("Ready to process button events!");

    tokio::select! {
        result = server => result,
        _ = shutdown_signal() => Ok(()),
    }
}

/// Open the configured backend, wrapped for write coalescing when enabled
fn open_storage(
    config: &AppConfig,
    paths: &AppPaths,
) -> Result<(Arc<dyn Storage>, Option<FlusherHandle>)> {
    let backend = config.storage.backend;
    let path = config
        .storage
        .path
        .clone()
        .unwrap_or_else(|| paths.storage_path(backend));

    let inner: Arc<dyn Storage> = match backend {
        StorageBackend::Files => Arc::new(FileStorage::open(&path)?),
        StorageBackend::Sled => Arc::new(SledStorage::open(&path)?),
        StorageBackend::Memory => {
            warn!("Memory storage selected, changes are lost on exit");
            Arc::new(MemoryStorage::new())
        }
    };

    let debounce_ms = config.storage_debounce_ms();
    if debounce_ms == 0 {
        return Ok((inner, None));
    }

    let coalescing = CoalescingStorage::new(inner, debounce_ms);
    let flusher = coalescing.spawn_flusher();
    let storage: Arc<dyn Storage> = coalescing;
    Ok((storage, Some(flusher)))
}

/// Pick the MIDI output: a port, a device node, or nothing
fn open_sink(config: &MidiConfig) -> Result<Box<dyn MidiSink>> {
    if let Some(port) = &config.output_port {
        return Ok(Box::new(PortSink::connect(port)?));
    }
    if let Some(device) = &config.output_device {
        return Ok(Box::new(DeviceSink::open(device)?));
    }
    warn!("No MIDI output configured, commands are discarded");
    Ok(Box::new(NullSink))
}

fn dump_buttons(storage: Arc<dyn Storage>, config: &AppConfig) {
    use colored::*;

    let controller = PedalController::init(
        storage,
        Box::new(NullSink),
        Dispatcher::new(config.midi.compact_two_byte_messages),
        Instant::now(),
    );

    println!("\n{}", "=== Button Configuration ===".bold().cyan());
    for view in controller.views() {
        println!("\n{}", format!("Button {}", view.button).bold());
        println!("  push:        {}", view.push.green());
        println!("  hold:        {}", view.hold.green());
        println!("  double-push: {}", view.double_push.green());
        println!(
            "  repeat:      {}",
            if view.repeat_on_hold { "yes".yellow() } else { "no".dimmed() }
        );
        println!(
            "  variable:    {} ({}..={})",
            view.var_value, view.var_min, view.var_max
        );
    }
    println!();
}

fn init_logging(
    level: &str,
    log_dir: Option<PathBuf>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "midi-pedal.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(file_layer)
        .init();

    guard
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
