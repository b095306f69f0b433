//! PlaybackController — position/speed/lifecycle over one forecast sequence.
//!
//! State machine `{Stopped, Running}` crossed with a position in
//! `[0, len)`. Every move resolves the target frame through the cache first,
//! then commits the position and reports the frame to the `FrameSink`. A
//! failed resolve still commits the position but reports the frame as
//! unavailable, leaving the last good image on screen.
//!
//! The ticker task is guarded by an epoch: `play`, `stop` and `shutdown`
//! each bump it, and the ticker re-checks `running && epoch` after every
//! suspension before touching state. A woken ticker from an earlier run or a
//! retired controller therefore exits without side effects.
//!
//! Direct moves are guarded the same way by a move counter: every seek, step,
//! play and halt bumps it, so a slow direct move never commits over a newer
//! one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use forecast_proto::config::clamp_period_ms;
use forecast_proto::Timestamp;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::ForecastCache;
use crate::source::ForecastSource;

/// What the display should show for a committed position.
#[derive(Debug, Clone)]
pub enum FrameView {
    Ready {
        image: Arc<[u8]>,
        metric: Option<f64>,
    },
    /// The frame could not be fetched; keep the previous image.
    Unavailable,
}

/// Reported after every committed position change.
#[derive(Debug, Clone)]
pub struct FrameUpdate {
    pub index: usize,
    pub len: usize,
    pub timestamp: Timestamp,
    pub view: FrameView,
}

impl FrameUpdate {
    pub fn metric(&self) -> Option<f64> {
        match &self.view {
            FrameView::Ready { metric, .. } => *metric,
            FrameView::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.view, FrameView::Ready { .. })
    }
}

/// Display callback.
pub trait FrameSink: Send + Sync + 'static {
    fn on_frame(&self, update: FrameUpdate);
}

impl<F> FrameSink for F
where
    F: Fn(FrameUpdate) + Send + Sync + 'static,
{
    fn on_frame(&self, update: FrameUpdate) {
        self(update)
    }
}

#[derive(Debug, Clone)]
pub struct PlaybackState {
    pub sequence: Arc<[Timestamp]>,
    pub position: usize,
    pub running: bool,
    pub period_ms: u64,
    epoch: u64,
    moves: u64,
    retired: bool,
    /// Running state to restore when the pointer leaves the display.
    hover_resume: Option<bool>,
}

impl PlaybackState {
    fn new(sequence: Arc<[Timestamp]>, period_ms: u64) -> Self {
        Self {
            sequence,
            position: 0,
            running: false,
            period_ms: clamp_period_ms(period_ms),
            epoch: 0,
            moves: 0,
            retired: false,
            hover_resume: None,
        }
    }

    fn ticker_current(&self, epoch: u64) -> bool {
        !self.retired && self.running && self.epoch == epoch
    }

    fn halt(&mut self) {
        self.running = false;
        self.epoch += 1;
        self.moves += 1;
    }

    /// Stop the loop if needed and claim the next direct move.
    fn begin_move(&mut self) -> Mover {
        if self.running {
            self.halt();
        }
        self.moves += 1;
        Mover::Direct(self.moves)
    }

    fn may_commit(&self, mover: Mover) -> bool {
        if self.retired {
            return false;
        }
        match mover {
            Mover::Direct(moves) => self.moves == moves,
            Mover::Ticker(epoch) => self.ticker_current(epoch),
        }
    }
}

/// Who drives a `show`: a direct move or the ticker of some epoch.
#[derive(Debug, Clone, Copy)]
enum Mover {
    Direct(u64),
    Ticker(u64),
}

/// Wrapping index arithmetic used by `step_by`.
pub fn wrap_index(position: usize, delta: i64, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let len = len as i64;
    let pos = position as i64 % len;
    (((pos + delta % len) % len + len) % len) as usize
}

/// Clamping index arithmetic used by `seek_to`.
pub fn clamp_index(index: i64, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    index.clamp(0, len as i64 - 1) as usize
}

struct Shared<S> {
    station: String,
    cache: ForecastCache<S>,
    sink: Arc<dyn FrameSink>,
    state: Mutex<PlaybackState>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

pub struct PlaybackController<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for PlaybackController<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: ForecastSource> PlaybackController<S> {
    pub fn new(
        cache: ForecastCache<S>,
        station: impl Into<String>,
        sequence: Arc<[Timestamp]>,
        period_ms: u64,
        sink: Arc<dyn FrameSink>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                station: station.into(),
                cache,
                sink,
                state: Mutex::new(PlaybackState::new(sequence, period_ms)),
                ticker: Mutex::new(None),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, PlaybackState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> PlaybackState {
        self.state().clone()
    }

    pub fn position(&self) -> usize {
        self.state().position
    }

    pub fn len(&self) -> usize {
        self.state().sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_running(&self) -> bool {
        self.state().running
    }

    pub fn period_ms(&self) -> u64 {
        self.state().period_ms
    }

    pub fn station(&self) -> &str {
        &self.shared.station
    }

    pub fn current_timestamp(&self) -> Option<Timestamp> {
        let state = self.state();
        state.sequence.get(state.position).cloned()
    }

    /// Absolute positioning, clamped into the sequence. Stops playback.
    pub async fn seek_to(&self, index: i64) {
        let (target, mover) = {
            let mut state = self.state();
            let mover = state.begin_move();
            (clamp_index(index, state.sequence.len()), mover)
        };
        self.show(target, mover).await;
    }

    /// Relative positioning, wrapping in both directions. Stops playback.
    pub async fn step_by(&self, delta: i64) {
        let (target, mover) = {
            let mut state = self.state();
            let mover = state.begin_move();
            (wrap_index(state.position, delta, state.sequence.len()), mover)
        };
        self.show(target, mover).await;
    }

    pub async fn seek_first(&self) {
        self.seek_to(0).await;
    }

    pub async fn seek_last(&self) {
        self.seek_to(i64::MAX).await;
    }

    /// Set the tick period, clamped into `[50, 1000]` ms. Returns the value
    /// actually applied.
    pub fn set_speed(&self, period_ms: u64) -> u64 {
        let mut state = self.state();
        state.period_ms = clamp_period_ms(period_ms);
        debug!("playback period {} ms", state.period_ms);
        state.period_ms
    }

    pub fn play(&self) {
        let epoch = {
            let mut state = self.state();
            if state.running || state.retired {
                return;
            }
            if state.sequence.is_empty() {
                debug!("station {}: nothing to play", self.shared.station);
                return;
            }
            state.running = true;
            state.epoch += 1;
            state.moves += 1;
            state.epoch
        };
        info!("station {}: playback started", self.shared.station);
        self.spawn_ticker(epoch);
    }

    pub fn stop(&self) {
        let mut state = self.state();
        if state.running {
            state.halt();
            info!("station {}: playback stopped", self.shared.station);
        }
    }

    pub fn toggle(&self) {
        if self.is_running() {
            self.stop();
        } else {
            self.play();
        }
    }

    /// Pointer entered the display: pause, remembering whether we were
    /// running. Repeated enters keep the first remembered state.
    pub fn hover_enter(&self) {
        let mut state = self.state();
        if state.hover_resume.is_none() {
            state.hover_resume = Some(state.running);
            if state.running {
                state.halt();
            }
        }
    }

    /// Pointer left the display: resume if playback was running on enter.
    pub fn hover_leave(&self) {
        let resume = self.state().hover_resume.take();
        if resume == Some(true) {
            self.play();
        }
    }

    /// Retire this controller: stop the ticker and make every pending
    /// continuation a no-op.
    pub fn shutdown(&self) {
        {
            let mut state = self.state();
            state.halt();
            state.retired = true;
        }
        let handle = self
            .shared
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
        debug!("station {}: playback controller retired", self.shared.station);
    }

    fn spawn_ticker(&self, epoch: u64) {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                let target = {
                    let state = this.state();
                    if !state.ticker_current(epoch) {
                        break;
                    }
                    wrap_index(state.position, 1, state.sequence.len())
                };
                this.show(target, Mover::Ticker(epoch)).await;

                let period = {
                    let state = this.state();
                    if !state.ticker_current(epoch) {
                        break;
                    }
                    state.period_ms
                };
                tokio::time::sleep(Duration::from_millis(period)).await;
            }
            debug!("station {}: ticker {} exited", this.shared.station, epoch);
        });
        let previous = self
            .shared
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Resolve `target`, then commit it and notify the sink unless a newer
    /// move or a stop happened while resolving.
    async fn show(&self, target: usize, mover: Mover) {
        let (timestamp, len) = {
            let state = self.state();
            if state.retired {
                return;
            }
            match state.sequence.get(target) {
                Some(ts) => (ts.clone(), state.sequence.len()),
                None => return,
            }
        };

        let outcome = self.shared.cache.resolve(&self.shared.station, &timestamp).await;

        {
            let mut state = self.state();
            if !state.may_commit(mover) {
                debug!(
                    "station {}: {:?} superseded, not showing {}",
                    self.shared.station, mover, timestamp
                );
                return;
            }
            state.position = target;
        }

        let view = match outcome {
            Ok(frame) => FrameView::Ready {
                image: frame.image,
                metric: frame.metric,
            },
            Err(e) => {
                warn!("{}", e);
                FrameView::Unavailable
            }
        };
        self.shared.sink.on_frame(FrameUpdate {
            index: target,
            len,
            timestamp,
            view,
        });
    }
}
