//! BrainBox - pedalboard patch controller
//!
//! Loads the rig configuration, restores the persisted selection, and runs
//! the remote surfaces until a shutdown signal arrives.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use brainbox::config::AppConfig;
use brainbox::controller::{build_controller, ControllerActor, SelectionState, SelectionStore};
use brainbox::hw::{LogMidiOut, LogPin, MidiOut};
use brainbox::server::{self, HttpState};

/// BrainBox - banks of patches driving relay footswitches and MIDI presets
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("Starting BrainBox...");
    info!("Configuration file: {}", args.config);

    let config = AppConfig::load(&args.config).await?;

    let persisted = SelectionState::load(&config.selection_file);
    let selection = SelectionStore::spawn(config.selection_file.clone(), persisted);

    let midi_out = open_midi_out(&config)?;
    let controller = build_controller(&config, persisted, selection.clone(), midi_out, |sw| {
        Box::new(LogPin::new(format!("{} (pin {})", sw.name, sw.pin)))
    });
    let handle = ControllerActor::spawn(controller);

    let events = server::event_channel();

    // Periodic state push to SSE subscribers
    tokio::spawn(server::run_broadcaster(
        handle.clone(),
        events.clone(),
        config.remote.broadcast_interval_ms,
    ));

    // Web remote
    let http_state = Arc::new(HttpState {
        controller: handle.clone(),
        events,
    });
    let http_port = config.remote.http_port;
    tokio::spawn(async move {
        if let Err(e) = server::run_http(http_state, http_port).await {
            error!("web remote failed: {e:#}");
        }
    });

    // UDP remote
    let udp_handle = handle.clone();
    let udp_config = config.remote.udp.clone();
    tokio::spawn(async move {
        if let Err(e) = server::run_udp(udp_handle, udp_config).await {
            error!("UDP remote failed: {e:#}");
        }
    });

    // BLE remote
    #[cfg(feature = "ble")]
    if config.remote.ble.enabled {
        let ble_handle = handle.clone();
        let ble_config = config.remote.ble.clone();
        tokio::spawn(async move {
            if let Err(e) = server::run_ble(ble_handle, ble_config).await {
                error!("BLE remote failed: {e:#}");
            }
        });
    }
    #[cfg(not(feature = "ble"))]
    if config.remote.ble.enabled {
        warn!("BLE remote is enabled in the configuration but this build has no BLE support");
    }

    shutdown_signal().await;

    // Let pending commands drain, then make sure the selection hit the disk.
    handle.shutdown();
    selection.flush().await;
    selection.shutdown();

    info!("BrainBox shutdown complete");
    Ok(())
}

#[cfg(feature = "midir-backend")]
fn open_midi_out(config: &AppConfig) -> Result<Box<dyn MidiOut>> {
    match &config.midi.port {
        Some(port) => {
            let out = brainbox::hw::MidirOut::open(port)?;
            info!("MIDI output connected to port matching '{port}'");
            Ok(Box::new(out))
        }
        None => {
            warn!("no MIDI output port configured; MIDI messages will only be logged");
            Ok(Box::new(LogMidiOut))
        }
    }
}

#[cfg(not(feature = "midir-backend"))]
fn open_midi_out(config: &AppConfig) -> Result<Box<dyn MidiOut>> {
    if config.midi.port.is_some() {
        warn!(
            "MIDI port configured but this build has no MIDI backend; messages will only be logged"
        );
    }
    Ok(Box::new(LogMidiOut))
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutdown signal received");
}
