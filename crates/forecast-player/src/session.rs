//! Session — per-station owner of cache, controller and freshness monitor.
//!
//! Runs as a single-owner event loop: key presses, staleness notices and
//! rebuild retries all arrive as `SessionEvent`s on one mpsc channel, and
//! only this loop touches the controller. When the monitor reports a newer
//! forecast run the session tears everything down and rebuilds from scratch
//! (fresh listing, position 0, stopped) so frames from two runs never mix.

use std::sync::Arc;
use std::time::Duration;

use forecast_proto::config::Config;
use forecast_proto::ForecastRunId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheError, ForecastCache};
use crate::freshness::FreshnessMonitor;
use crate::input::{InputRouter, Intent};
use crate::playback::{FrameSink, PlaybackController};
use crate::source::ForecastSource;

// ── SessionEvent ──────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SessionEvent {
    /// A mapped user input.
    Input(Intent),
    /// The freshness monitor saw a newer forecast run.
    Stale(ForecastRunId),
    /// Retry a rebuild that failed earlier.
    Retry,
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub station: String,
    pub period_ms: u64,
    pub poll_interval: Duration,
    pub prefetch: bool,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            station: config.playback.station.clone(),
            period_ms: config.playback.period_ms(),
            poll_interval: config.freshness.poll_interval(),
            prefetch: config.playback.prefetch,
        }
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

pub struct Session<S> {
    settings: SessionSettings,
    cache: ForecastCache<S>,
    router: InputRouter,
    sink: Arc<dyn FrameSink>,
    event_tx: mpsc::Sender<SessionEvent>,
    controller: Option<PlaybackController<S>>,
    monitor: Option<FreshnessMonitor>,
    prefetch: Option<JoinHandle<()>>,
    run: Option<ForecastRunId>,
}

impl<S: ForecastSource> Session<S> {
    pub fn new(
        source: Arc<S>,
        settings: SessionSettings,
        router: InputRouter,
        sink: Arc<dyn FrameSink>,
        event_tx: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            settings,
            cache: ForecastCache::new(source),
            router,
            sink,
            event_tx,
            controller: None,
            monitor: None,
            prefetch: None,
            run: None,
        }
    }

    pub fn controller(&self) -> Option<&PlaybackController<S>> {
        self.controller.as_ref()
    }

    pub fn cache(&self) -> &ForecastCache<S> {
        &self.cache
    }

    /// Forecast run the current controller was built against, if known.
    pub fn run_id(&self) -> Option<&ForecastRunId> {
        self.run.as_ref()
    }

    /// Build cache state, controller and monitor for the current forecast run
    /// and show its first frame.
    pub async fn build(&mut self) -> Result<(), CacheError> {
        let station = self.settings.station.clone();
        let source = Arc::clone(self.cache.source());

        // Capture the run before listing, so a run published in between is
        // caught by the first poll rather than missed.
        let run = match source.latest_run(&station).await {
            Ok(run) => Some(run),
            Err(e) => {
                warn!("station {}: could not read latest run: {}", station, e);
                None
            }
        };

        let sequence = self.cache.list_timestamps(&station).await?;
        info!(
            "station {}: session built on run {:?} with {} frames",
            station,
            run,
            sequence.len()
        );

        let controller = PlaybackController::new(
            self.cache.clone(),
            station.clone(),
            sequence,
            self.settings.period_ms,
            Arc::clone(&self.sink),
        );

        let event_tx = self.event_tx.clone();
        self.monitor = Some(FreshnessMonitor::start(
            source,
            station.clone(),
            run.clone(),
            self.settings.poll_interval,
            // The monitor stops after this notice, so it must not be lost to
            // a full queue; wait for capacity off the polling task.
            move |latest| {
                tokio::spawn(async move {
                    if event_tx.send(SessionEvent::Stale(latest)).await.is_err() {
                        debug!("stale notice after session end");
                    }
                });
            },
        ));

        if self.settings.prefetch {
            let cache = self.cache.clone();
            self.prefetch = Some(tokio::spawn(async move {
                cache.prefetch_all(&station).await;
            }));
        }

        controller.seek_first().await;
        self.controller = Some(controller);
        self.run = run;
        Ok(())
    }

    /// Discard controller, monitor and cached frames.
    pub fn teardown(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.stop();
        }
        if let Some(controller) = self.controller.take() {
            controller.shutdown();
        }
        if let Some(prefetch) = self.prefetch.take() {
            prefetch.abort();
        }
        self.cache.invalidate_all();
        self.run = None;
    }

    /// Apply one event. Returns `false` once the session should end.
    pub async fn handle(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Shutdown => {
                info!("session: shutdown requested");
                false
            }
            SessionEvent::Input(intent) => match &self.controller {
                Some(controller) => self.router.apply(intent, controller).await,
                None if intent == Intent::Quit => false,
                None => {
                    debug!("session: no forecast loaded, ignoring {:?}", intent);
                    true
                }
            },
            SessionEvent::Stale(latest) => {
                info!(
                    "station {}: rebuilding for forecast run {}",
                    self.settings.station, latest
                );
                self.teardown();
                self.rebuild().await;
                true
            }
            SessionEvent::Retry => {
                if self.controller.is_none() {
                    self.rebuild().await;
                }
                true
            }
        }
    }

    async fn rebuild(&mut self) {
        if let Err(e) = self.build().await {
            error!("session rebuild failed: {}", e);
            self.schedule_retry();
        }
    }

    fn schedule_retry(&self) {
        let tx = self.event_tx.clone();
        let delay = self.settings.poll_interval;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SessionEvent::Retry).await;
        });
    }

    /// Build the session, then run the event loop until quit, shutdown or
    /// channel close. Failing to list the forecast on startup is fatal.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<SessionEvent>) -> anyhow::Result<()> {
        info!("session: starting for station {}", self.settings.station);
        self.build().await?;

        while let Some(event) = event_rx.recv().await {
            if !self.handle(event).await {
                break;
            }
        }

        self.teardown();
        info!("session: stopped");
        Ok(())
    }
}
