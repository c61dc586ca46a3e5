//! Now-playing watcher.
//!
//! One long-lived task runs [`SongWatcher::run`]. Each cycle:
//!
//! 1. makes sure the command session is up (escalating back-off if not)
//! 2. polls status and the current track, resolving artwork on a change
//! 3. blocks on the server's idle primitive until something changes
//!
//! Artwork resolution happens inline, so at most one resolution is ever in
//! flight and the next poll waits for it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::artwork::ArtResolver;
use crate::config::WatcherConfig;
use crate::display::DisplaySink;
use crate::events::{ArtworkEvent, EventEmitter, QueueEvent, TrackEvent};
use crate::mpd::{PlayerStatus, Track};
use crate::services::ConnectionManager;
use crate::state::KioskState;
use crate::utils::{now_millis, right_justify};

/// Result of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Same reference as last time; nothing resolved.
    SameTrack,
    /// A different track is current; artwork was resolved for it.
    TrackChanged(Track),
    /// Nothing is selected on the server.
    NoTrack,
    /// The queries failed; the cycle should back off.
    Error,
}

/// Watches the server for track and queue changes.
pub struct SongWatcher {
    commands: Arc<ConnectionManager>,
    events: Arc<ConnectionManager>,
    resolver: Arc<ArtResolver>,
    state: Arc<KioskState>,
    display: Arc<dyn DisplaySink>,
    emitter: Arc<dyn EventEmitter>,
    config: WatcherConfig,
    /// Reference of the last track artwork was resolved for.
    last_reference: Mutex<Option<String>>,
    /// Consecutive cycles that found the command session down.
    failures: AtomicU32,
}

impl SongWatcher {
    /// Creates a new SongWatcher.
    ///
    /// # Arguments
    /// * `commands` - Session used for status, current track and pictures
    /// * `events` - Session dedicated to idle waits
    /// * `resolver` - Produces the artwork artifact
    /// * `state` - Shared queue / now-playing state
    /// * `display` - Queue length display
    /// * `emitter` - UI event sink
    /// * `config` - Delays and retry counts
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        commands: Arc<ConnectionManager>,
        events: Arc<ConnectionManager>,
        resolver: Arc<ArtResolver>,
        state: Arc<KioskState>,
        display: Arc<dyn DisplaySink>,
        emitter: Arc<dyn EventEmitter>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            commands,
            events,
            resolver,
            state,
            display,
            emitter,
            config,
            last_reference: Mutex::new(None),
            failures: AtomicU32::new(0),
        }
    }

    /// Runs cycles until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        log::info!("[SongWatcher] Started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.run_cycle() => {}
            }
        }
        log::info!("[SongWatcher] Stopped");
    }

    /// One connect-poll-wait cycle.
    pub async fn run_cycle(&self) {
        if let Some(delay) = self.connection_backoff().await {
            tokio::time::sleep(delay).await;
            return;
        }

        match self.poll().await {
            PollOutcome::Error => tokio::time::sleep(self.config.error_delay).await,
            _ => {
                let changed = self.wait_for_change().await;
                if !changed.is_empty() {
                    log::debug!("[SongWatcher] Changed: {}", changed.join(", "));
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connection gate
    // ─────────────────────────────────────────────────────────────────────────

    /// Checks the command session; returns how long to wait if it is down.
    ///
    /// Failed cycles wait `retry_delay`. Once more than `max_failures`
    /// accumulate the watcher waits `long_delay` and resumes counting at
    /// `resume_failures`, so long outages settle into a slow cadence.
    pub async fn connection_backoff(&self) -> Option<Duration> {
        let state = self.commands.ensure_connected().await;
        if state.is_connected() {
            let previous = self.failures.swap(0, Ordering::SeqCst);
            if previous > 0 {
                log::info!("[SongWatcher] Connection restored after {} failed cycle(s)", previous);
            }
            return None;
        }

        let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures > self.config.max_failures {
            log::error!(
                "[SongWatcher] {} consecutive connection failures, waiting {:?}",
                failures,
                self.config.long_delay
            );
            self.failures
                .store(self.config.resume_failures, Ordering::SeqCst);
            Some(self.config.long_delay)
        } else {
            log::warn!(
                "[SongWatcher] Not connected ({}/{}), retrying in {:?}",
                failures,
                self.config.max_failures,
                self.config.retry_delay
            );
            Some(self.config.retry_delay)
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Polling
    // ─────────────────────────────────────────────────────────────────────────

    /// Queries status and the current track and reacts to differences.
    pub async fn poll(&self) -> PollOutcome {
        let status = match self.commands.status().await {
            Ok(status) => status,
            Err(e) => {
                log::warn!("[SongWatcher] Status query failed: {}", e);
                return PollOutcome::Error;
            }
        };
        let current = match self.commands.current_track().await {
            Ok(current) => current,
            Err(e) => {
                log::warn!("[SongWatcher] Current track query failed: {}", e);
                return PollOutcome::Error;
            }
        };

        let outcome = match current {
            None => self.clear_track(),
            Some(track) => self.observe_track(track).await,
        };
        self.refresh_queue(&status);
        outcome
    }

    fn clear_track(&self) -> PollOutcome {
        let previous = self.last_reference.lock().take();
        self.state.set_now_playing(None);
        if previous.is_some() {
            log::info!("[SongWatcher] Nothing playing");
            self.emitter.emit_track(TrackEvent::Cleared {
                timestamp: now_millis(),
            });
        }
        PollOutcome::NoTrack
    }

    async fn observe_track(&self, track: Track) -> PollOutcome {
        {
            let mut last = self.last_reference.lock();
            if last.as_deref() == Some(track.reference.as_str()) {
                return PollOutcome::SameTrack;
            }
            *last = Some(track.reference.clone());
        }

        log::info!("[SongWatcher] Now playing: {}", track.summary());
        self.state.set_now_playing(Some(track.clone()));
        self.emitter.emit_track(TrackEvent::Changed {
            reference: track.reference.clone(),
            artist: track.display_artist().to_string(),
            title: track.display_title().to_string(),
            timestamp: now_millis(),
        });

        match self.resolver.resolve(&track).await {
            Ok(resolution) => {
                self.emitter.emit_artwork(ArtworkEvent::Updated {
                    path: self.resolver.artifact_path().to_path_buf(),
                    source: resolution.source(),
                    timestamp: now_millis(),
                });
            }
            Err(e) => {
                log::error!(
                    "[SongWatcher] Artwork update failed for {}: {}",
                    track.reference,
                    e
                );
            }
        }
        PollOutcome::TrackChanged(track)
    }

    fn refresh_queue(&self, status: &PlayerStatus) {
        let length = status.queue_length;
        if self.state.set_queue_length(length) {
            self.emitter.emit_queue(QueueEvent::LengthChanged {
                length,
                timestamp: now_millis(),
            });
        }
        self.display
            .show_queue_length(&right_justify(&length.to_string()));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Idle wait
    // ─────────────────────────────────────────────────────────────────────────

    /// Blocks until the server reports a change or the retries run out.
    ///
    /// Returns the changed subsystem names; empty after a timeout or when
    /// every retry failed.
    pub async fn wait_for_change(&self) -> Vec<String> {
        let retries = self.config.idle_retries;

        for attempt in 1..=retries {
            let result = self
                .events
                .wait_for_events(&self.config.subsystems, self.config.idle_timeout)
                .await;
            let e = match result {
                Ok(changed) => return changed,
                Err(e) => e,
            };

            if e.is_recoverable() {
                log::warn!(
                    "[SongWatcher] Idle failed (attempt {}/{}): {}",
                    attempt,
                    retries,
                    e
                );
                if self.events.reconnect().await.is_connected() {
                    continue;
                }
            } else {
                log::error!("[SongWatcher] Idle rejected (attempt {}/{}): {}", attempt, retries, e);
            }
            tokio::time::sleep(self.config.idle_retry_delay).await;
        }

        log::warn!(
            "[SongWatcher] Idle retries exhausted, pausing {:?}",
            self.config.idle_exhausted_delay
        );
        tokio::time::sleep(self.config.idle_exhausted_delay).await;
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use tempfile::TempDir;

    use crate::artwork::normalize;
    use crate::config::{ArtworkConfig, PathsConfig, RetryConfig};
    use crate::display::tests::RecordingDisplay;
    use crate::events::RecordingEmitter;
    use crate::mpd::test_fixtures::{FakeFactory, FakeServer};

    struct Harness {
        _dir: TempDir,
        server: Arc<FakeServer>,
        emitter: Arc<RecordingEmitter>,
        display: Arc<RecordingDisplay>,
        state: Arc<KioskState>,
        watcher: SongWatcher,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let paths = PathsConfig {
            artifact: dir.path().join("art.png"),
            placeholder: dir.path().join("placeholder.png"),
            music_library: dir.path().to_path_buf(),
            track_list: dir.path().join("song_list.txt"),
        };
        normalize::ensure_placeholder(&paths.placeholder, (10, 10), [0, 0, 0]).unwrap();

        let server = FakeServer::new();
        let emitter = Arc::new(RecordingEmitter::default());
        let display = Arc::new(RecordingDisplay::default());
        let state = Arc::new(KioskState::default());
        let manager = |channel| {
            Arc::new(ConnectionManager::new(
                channel,
                FakeFactory::new(&server),
                RetryConfig::default(),
                Arc::clone(&emitter) as Arc<dyn EventEmitter>,
            ))
        };
        let commands = manager("commands");
        let events = manager("events");

        // No strategies: every resolution installs the placeholder
        let resolver = Arc::new(ArtResolver::new(
            Vec::new(),
            &paths,
            &ArtworkConfig::default(),
        ));
        let watcher = SongWatcher::new(
            commands,
            events,
            resolver,
            Arc::clone(&state),
            Arc::clone(&display) as Arc<dyn DisplaySink>,
            Arc::clone(&emitter) as Arc<dyn EventEmitter>,
            WatcherConfig::default(),
        );

        Harness {
            _dir: dir,
            server,
            emitter,
            display,
            state,
            watcher,
        }
    }

    #[tokio::test]
    async fn new_track_resolves_artwork_once() {
        let h = harness();
        h.server.set_current(Some(Track::new("Artist/Album/01.flac")));

        let outcome = h.watcher.poll().await;
        assert_eq!(
            outcome,
            PollOutcome::TrackChanged(Track::new("Artist/Album/01.flac"))
        );
        assert_eq!(h.watcher.poll().await, PollOutcome::SameTrack);

        assert_eq!(h.emitter.tracks.lock().len(), 1);
        assert_eq!(h.emitter.artwork.lock().len(), 1);
        assert!(h.watcher.resolver.artifact_path().exists());
        assert_eq!(
            h.state.now_playing().map(|t| t.reference),
            Some("Artist/Album/01.flac".to_string())
        );
    }

    #[tokio::test]
    async fn track_event_falls_back_to_file_name() {
        let h = harness();
        h.server.set_current(Some(Track::new("Artist/Album/01 Intro.flac")));

        h.watcher.poll().await;

        let tracks = h.emitter.tracks.lock();
        match &tracks[0] {
            TrackEvent::Changed { artist, title, .. } => {
                assert_eq!(artist, "Unknown Artist");
                assert_eq!(title, "01 Intro.flac");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn no_track_clears_memory_so_replay_resolves_again() {
        let h = harness();
        h.server.set_current(Some(Track::new("A/01.flac")));
        h.watcher.poll().await;

        h.server.set_current(None);
        assert_eq!(h.watcher.poll().await, PollOutcome::NoTrack);
        assert_eq!(h.watcher.poll().await, PollOutcome::NoTrack);

        h.server.set_current(Some(Track::new("A/01.flac")));
        assert!(matches!(
            h.watcher.poll().await,
            PollOutcome::TrackChanged(_)
        ));

        assert_eq!(h.emitter.artwork.lock().len(), 2);
        let cleared = h
            .emitter
            .tracks
            .lock()
            .iter()
            .filter(|e| matches!(e, TrackEvent::Cleared { .. }))
            .count();
        assert_eq!(cleared, 1);
    }

    #[tokio::test]
    async fn queue_length_reaches_display() {
        let h = harness();
        h.server.set_queue_length(4);

        h.watcher.poll().await;
        h.watcher.poll().await;

        assert_eq!(h.display.last_queue().as_deref(), Some("   4"));
        assert_eq!(h.state.queue().length, 4);
        // Length events only on change
        assert_eq!(h.emitter.queue.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_server_polls_as_error() {
        let h = harness();
        h.server.connect_failures.store(100, Ordering::SeqCst);

        assert_eq!(h.watcher.poll().await, PollOutcome::Error);
        assert!(h.display.last_queue().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn connection_backoff_escalates_then_resumes_counting() {
        let h = harness();
        h.server.connect_failures.store(u32::MAX, Ordering::SeqCst);

        for _ in 0..10 {
            assert_eq!(
                h.watcher.connection_backoff().await,
                Some(Duration::from_secs(2))
            );
        }
        assert_eq!(
            h.watcher.connection_backoff().await,
            Some(Duration::from_secs(30))
        );

        // Counting resumes at 5: five short waits, then the long one again
        for _ in 0..5 {
            assert_eq!(
                h.watcher.connection_backoff().await,
                Some(Duration::from_secs(2))
            );
        }
        assert_eq!(
            h.watcher.connection_backoff().await,
            Some(Duration::from_secs(30))
        );

        h.server.connect_failures.store(0, Ordering::SeqCst);
        assert_eq!(h.watcher.connection_backoff().await, None);
        assert_eq!(h.watcher.failures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_returns_reported_changes() {
        let h = harness();
        h.watcher.events.ensure_connected().await;
        h.server
            .idle_results
            .lock()
            .push_back(vec!["player".to_string()]);

        assert_eq!(h.watcher.wait_for_change().await, vec!["player"]);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_failure_reconnects_and_retries_immediately() {
        let h = harness();
        h.watcher.events.ensure_connected().await;
        h.server.idle_failures.store(1, Ordering::SeqCst);
        h.server
            .idle_results
            .lock()
            .push_back(vec!["player".to_string()]);

        let started = tokio::time::Instant::now();
        assert_eq!(h.watcher.wait_for_change().await, vec!["player"]);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(h.server.idle_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_exhaustion_pauses_before_returning() {
        let h = harness();
        h.watcher.events.ensure_connected().await;
        h.server.idle_failures.store(3, Ordering::SeqCst);

        let started = tokio::time::Instant::now();
        assert!(h.watcher.wait_for_change().await.is_empty());
        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert_eq!(h.server.idle_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_cancel() {
        let h = harness();
        let watcher = Arc::new(h.watcher);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(Arc::clone(&watcher).run(cancel.clone()));
        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("watcher should stop")
            .unwrap();
        // The first cycle polled and then parked in idle
        assert!(h.server.idle_calls.load(Ordering::SeqCst) >= 1);
    }
}
