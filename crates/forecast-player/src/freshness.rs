//! FreshnessMonitor — notices when the station serves a newer forecast run.
//!
//! Polls `latest_run` on a fixed interval and compares against the run the
//! session was built from. The first mismatch fires `on_stale` once and ends
//! polling; the session is expected to rebuild. Transport failures are logged
//! and retried on the next tick, never reported as staleness.

use std::sync::Arc;
use std::time::Duration;

use forecast_proto::ForecastRunId;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::source::ForecastSource;

pub struct FreshnessMonitor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl FreshnessMonitor {
    /// Begin polling. `baseline` is the run the session was built against;
    /// `None` lets the first successful poll establish it.
    pub fn start<S, F>(
        source: Arc<S>,
        station: impl Into<String>,
        baseline: Option<ForecastRunId>,
        interval: Duration,
        on_stale: F,
    ) -> Self
    where
        S: ForecastSource,
        F: FnOnce(ForecastRunId) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let station = station.into();
        let handle = tokio::spawn(poll_loop(
            source,
            station,
            baseline,
            interval,
            cancel.clone(),
            on_stale,
        ));
        Self { cancel, handle }
    }

    /// Halt polling. Safe to call more than once.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// True once stopped, either explicitly or after reporting staleness.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.handle.is_finished()
    }
}

impl Drop for FreshnessMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_loop<S, F>(
    source: Arc<S>,
    station: String,
    mut baseline: Option<ForecastRunId>,
    interval: Duration,
    cancel: CancellationToken,
    on_stale: F,
) where
    S: ForecastSource,
    F: FnOnce(ForecastRunId) + Send + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the baseline is already fresh.
    ticker.tick().await;

    debug!(
        "station {}: freshness polling every {:?} (baseline {:?})",
        station, interval, baseline
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let polled = tokio::select! {
            _ = cancel.cancelled() => break,
            polled = source.latest_run(&station) => polled,
        };

        match polled {
            Ok(latest) => match &baseline {
                None => {
                    debug!("station {}: freshness baseline {}", station, latest);
                    baseline = Some(latest);
                }
                Some(current) if *current == latest => {
                    debug!("station {}: forecast run {} still current", station, latest);
                }
                Some(current) => {
                    info!(
                        "station {}: forecast run changed {} -> {}",
                        station, current, latest
                    );
                    cancel.cancel();
                    on_stale(latest);
                    return;
                }
            },
            Err(e) => {
                warn!("station {}: freshness poll failed: {}", station, e);
            }
        }
    }
    debug!("station {}: freshness polling stopped", station);
}
