//! Coverdeck Kiosk - headless front end for an MPD jukebox.
//!
//! Keeps the current-artwork image up to date for whatever the server is
//! playing, reads 4-digit keypad entries from the terminal, and publishes UI
//! events for a separate renderer.

mod config;
mod keypad;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use coverdeck_core::{
    bootstrap_services, BootstrappedServices, KioskEvent, LoggingDisplay, LoggingEventEmitter,
};
use crossterm::event::EventStream;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;

use crate::config::KioskConfig;

/// How UI events leave the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum UiEvents {
    /// One JSON object per line on stdout.
    Json,
    /// Through the log only.
    Log,
}

/// Coverdeck Kiosk - album art and keypad queueing for MPD.
#[derive(Parser, Debug)]
#[command(name = "coverdeck-kiosk")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace). Overrides the config file.
    #[arg(short, long, env = "COVERDECK_LOG_LEVEL")]
    log_level: Option<log::LevelFilter>,

    /// Music server host (overrides config file).
    #[arg(long, env = "COVERDECK_MPD_HOST")]
    mpd_host: Option<String>,

    /// Music server port (overrides config file).
    #[arg(long, env = "COVERDECK_MPD_PORT")]
    mpd_port: Option<u16>,

    /// Where UI events go.
    #[arg(long, value_enum, default_value = "json")]
    ui_events: UiEvents,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first; it may name the log file
    let mut config =
        KioskConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    apply_cli_overrides(&args, &mut config);
    init_logging(args.log_level, &config)?;

    log::info!("Coverdeck Kiosk v{}", env!("CARGO_PKG_VERSION"));
    log::info!(
        "Configuration: mpd={}:{}, ui_events={:?}",
        config.mpd.host,
        config.mpd.port,
        args.ui_events
    );

    let core_config = config
        .to_core_config()
        .context("Invalid configuration")?;
    let services = bootstrap_services(core_config, Arc::new(LoggingDisplay))
        .await
        .context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    match args.ui_events {
        UiEvents::Json => spawn_json_events(&services),
        UiEvents::Log => services
            .event_bridge
            .set_external_emitter(Arc::new(LoggingEventEmitter)),
    }

    // Keypad: every key press on the terminal goes to the dispatcher
    let raw_mode = match keypad::RawModeGuard::enable() {
        Ok(guard) => {
            let dispatcher = Arc::clone(&services.dispatcher);
            tokio::spawn(keypad::forward_keys(
                EventStream::new(),
                move |key| dispatcher.press(key),
                services.cancel_token.clone(),
            ));
            Some(guard)
        }
        Err(e) => {
            log::warn!("[Keypad] No terminal for keypad input, keys disabled: {}", e);
            None
        }
    };

    services.start_background_tasks();

    // Wait for shutdown signal, or Ctrl-C typed on the keypad terminal
    tokio::select! {
        _ = shutdown_signal() => {},
        _ = services.cancel_token.cancelled() => {},
    }

    log::info!("Shutdown signal received, cleaning up...");

    services.shutdown().await;
    drop(raw_mode);

    log::info!("Shutdown complete");
    Ok(())
}

/// Applies command-line overrides on top of the loaded configuration.
fn apply_cli_overrides(args: &Args, config: &mut KioskConfig) {
    if let Some(host) = &args.mpd_host {
        config.mpd.host = host.clone();
    }
    if let Some(port) = args.mpd_port {
        config.mpd.port = port;
    }
}

/// Initializes env_logger, appending to the configured log file if any.
fn init_logging(cli_level: Option<log::LevelFilter>, config: &KioskConfig) -> Result<()> {
    let level = match (cli_level, config.logging.level.as_deref()) {
        (Some(level), _) => level,
        (None, Some(name)) => name
            .parse()
            .with_context(|| format!("Invalid logging.level: {}", name))?,
        (None, None) => log::LevelFilter::Info,
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format_timestamp_millis();

    if let Some(path) = config.log_file() {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

/// Writes every UI event to stdout as a JSON line.
fn spawn_json_events(services: &BootstrappedServices) {
    let mut rx = services.event_bridge.subscribe();
    let cancel = services.cancel_token.clone();

    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => event,
            };
            match event {
                Ok(event) => write_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("[UiEvents] Subscriber lagged, {} event(s) skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn write_event(event: &KioskEvent) {
    match serde_json::to_string(event) {
        Ok(line) => {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = writeln!(stdout, "{}", line).and_then(|()| stdout.flush()) {
                log::warn!("[UiEvents] Failed to write event: {}", e);
            }
        }
        Err(e) => log::warn!("[UiEvents] Failed to serialize event: {}", e),
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_replace_server_address() {
        let args = Args::parse_from([
            "coverdeck-kiosk",
            "--mpd-host",
            "jukebox.local",
            "--mpd-port",
            "6601",
            "--log-level",
            "debug",
        ]);
        let mut config = KioskConfig::default();

        apply_cli_overrides(&args, &mut config);

        // Overrides are borrowed, args stay usable for logging setup
        assert_eq!(config.mpd.host, "jukebox.local");
        assert_eq!(config.mpd.port, 6601);
        assert_eq!(args.mpd_host.as_deref(), Some("jukebox.local"));
        assert_eq!(args.log_level, Some(log::LevelFilter::Debug));
    }

    #[test]
    fn missing_cli_overrides_keep_config_values() {
        let args = Args::parse_from(["coverdeck-kiosk", "--ui-events", "log"]);
        let mut config = KioskConfig::default();
        config.mpd.host = "music.lan".to_string();
        config.mpd.port = 6700;

        apply_cli_overrides(&args, &mut config);

        assert_eq!(config.mpd.host, "music.lan");
        assert_eq!(config.mpd.port, 6700);
        assert_eq!(args.ui_events, UiEvents::Log);
    }
}
