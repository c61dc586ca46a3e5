//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. The binary only supplies a
//! [`Config`] and a [`DisplaySink`]; tests supply a fake [`SessionFactory`]
//! as well.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::artwork::{normalize, ArtResolver};
use crate::config::Config;
use crate::display::DisplaySink;
use crate::error::{KioskError, KioskResult};
use crate::events::{BroadcastEventBridge, EventEmitter};
use crate::mpd::{SessionFactory, TcpSessionFactory};
use crate::protocol_constants::EVENT_CHANNEL_CAPACITY;
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::services::{ConnectionManager, InputDispatcher, SongWatcher};
use crate::state::KioskState;
use crate::track_list::TrackReferenceList;

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Session for status queries, pictures and keypad commands.
    pub commands: Arc<ConnectionManager>,
    /// Session dedicated to idle waits.
    pub events: Arc<ConnectionManager>,
    /// Writes the artwork artifact.
    pub resolver: Arc<ArtResolver>,
    /// Now-playing loop.
    pub watcher: Arc<SongWatcher>,
    /// Keypad entry point.
    pub dispatcher: Arc<InputDispatcher>,
    /// Queue length and now-playing shared by the services.
    pub state: Arc<KioskState>,
    /// Event bridge for UI subscribers.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
    config: Arc<Config>,
}

impl BootstrappedServices {
    /// Returns the configuration the services were built from.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Starts the watcher loop.
    pub fn start_background_tasks(&self) {
        let watcher = Arc::clone(&self.watcher);
        let cancel = self.cancel_token.clone();
        self.spawner.spawn(watcher.run(cancel));
        log::info!("[Bootstrap] Background tasks started");
    }

    /// Initiates graceful shutdown of all services.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        // Signal cancellation to all background tasks
        self.cancel_token.cancel();

        self.events.close().await;
        self.commands.close().await;

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Bootstraps all services against the TCP music server in `config`.
///
/// # Errors
///
/// See [`bootstrap_services_with_factory`].
pub async fn bootstrap_services(
    config: Config,
    display: Arc<dyn DisplaySink>,
) -> KioskResult<BootstrappedServices> {
    let factory = Arc::new(TcpSessionFactory::new(config.mpd.clone()));
    bootstrap_services_with_factory(config, factory, display).await
}

/// Bootstraps all services with an explicit session factory.
///
/// Services are created in dependency order:
///
/// 1. Environment (directories, placeholder, track list)
/// 2. Event bridge and shared state
/// 3. Both connection managers, then the first connect
/// 4. Artwork resolver (depends on the command session)
/// 5. Watcher and dispatcher
///
/// # Errors
///
/// - [`KioskError::Configuration`] if `config` does not validate
/// - [`KioskError::Initialization`] if the placeholder cannot be created or
///   the server cannot be reached on the first connect
pub async fn bootstrap_services_with_factory(
    config: Config,
    factory: Arc<dyn SessionFactory>,
    display: Arc<dyn DisplaySink>,
) -> KioskResult<BootstrappedServices> {
    config.validate().map_err(KioskError::Configuration)?;
    let config = Arc::new(config);

    prepare_environment(&config)?;

    let spawner = TokioSpawner::current();
    let cancel_token = CancellationToken::new();
    let event_bridge = Arc::new(BroadcastEventBridge::new(EVENT_CHANNEL_CAPACITY));
    let emitter = Arc::clone(&event_bridge) as Arc<dyn EventEmitter>;
    let state = Arc::new(KioskState::default());

    let commands = Arc::new(ConnectionManager::new(
        "commands",
        Arc::clone(&factory),
        config.retry.clone(),
        Arc::clone(&emitter),
    ));
    let events = Arc::new(ConnectionManager::new(
        "events",
        Arc::clone(&factory),
        config.retry.clone(),
        Arc::clone(&emitter),
    ));

    // Only the first connect is fatal; later outages are retried forever
    if !commands.ensure_connected().await.is_connected() {
        return Err(KioskError::Initialization(format!(
            "cannot reach music server at {} after {} attempt(s)",
            factory.describe(),
            config.retry.max_attempts
        )));
    }
    if !events.ensure_connected().await.is_connected() {
        log::warn!("[Bootstrap] Event session not up yet; the watcher will retry");
    }

    let resolver = Arc::new(ArtResolver::with_default_strategies(
        Arc::clone(&commands),
        &config.paths,
        &config.artwork,
    ));

    let watcher = Arc::new(SongWatcher::new(
        Arc::clone(&commands),
        Arc::clone(&events),
        Arc::clone(&resolver),
        Arc::clone(&state),
        Arc::clone(&display),
        Arc::clone(&emitter),
        config.watcher.clone(),
    ));

    let dispatcher = Arc::new(InputDispatcher::new(
        Arc::clone(&commands),
        TrackReferenceList::new(&config.paths.track_list),
        Arc::clone(&state),
        display,
        emitter,
        config.input.clone(),
        spawner.clone(),
    ));

    log::info!("[Bootstrap] Services ready ({})", factory.describe());

    Ok(BootstrappedServices {
        commands,
        events,
        resolver,
        watcher,
        dispatcher,
        state,
        event_bridge,
        spawner,
        cancel_token,
        config,
    })
}

/// Creates output directories, the placeholder and an empty track list.
fn prepare_environment(config: &Config) -> KioskResult<()> {
    let paths = &config.paths;

    for file in [&paths.artifact, &paths.placeholder] {
        if let Some(parent) = non_empty_parent(file) {
            fs::create_dir_all(parent).map_err(|e| {
                KioskError::Initialization(format!(
                    "cannot create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let created = normalize::ensure_placeholder(
        &paths.placeholder,
        config.artwork.placeholder_size,
        config.artwork.placeholder_color,
    )
    .map_err(|e| KioskError::Initialization(e.to_string()))?;
    if created {
        log::info!(
            "[Bootstrap] Created placeholder {}",
            paths.placeholder.display()
        );
    }

    if !paths.music_library.is_dir() {
        log::warn!(
            "[Bootstrap] Music library {} not found; only server artwork will work",
            paths.music_library.display()
        );
    }

    if !paths.track_list.exists() {
        let created = non_empty_parent(&paths.track_list)
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| fs::write(&paths.track_list, ""));
        match created {
            Ok(()) => log::info!(
                "[Bootstrap] Created empty track list {}",
                paths.track_list.display()
            ),
            Err(e) => log::warn!(
                "[Bootstrap] Track list {} unavailable: {}",
                paths.track_list.display(),
                e
            ),
        }
    }

    Ok(())
}

fn non_empty_parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}
