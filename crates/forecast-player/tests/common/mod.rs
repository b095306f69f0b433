//! Scripted in-memory forecast source shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use forecast_player::playback::FrameUpdate;
use forecast_player::{ForecastSource, SourceError};
use forecast_proto::metadata::MARKER;
use forecast_proto::{ForecastRunId, Timestamp};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::{mpsc, Semaphore};

pub const STATION: &str = "51201";

/// PNG-ish payload with `hs` stamped after the first `tEXt` tag.
pub fn png_with_metric(hs: f64) -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\x02X\0\0\x02X\0\0\0\x19".to_vec();
    bytes.extend_from_slice(&MARKER);
    bytes.extend_from_slice(&hs.to_le_bytes());
    bytes.extend_from_slice(b"Software\0matplotlib\0\0\0\0IEND");
    bytes
}

pub fn ts(raw: &str) -> Timestamp {
    Timestamp::parse(raw).unwrap()
}

/// `count` hourly timestamps starting 2024-01-01 00:00.
pub fn hourly(count: usize) -> Vec<Timestamp> {
    (0..count)
        .map(|i| ts(&format!("202401{:02}{:02}", 1 + i / 24, i % 24)))
        .collect()
}

#[derive(Default)]
struct Script {
    times: Option<Vec<Timestamp>>,
    run: Option<ForecastRunId>,
    images: HashMap<Timestamp, Vec<u8>>,
}

/// Source whose responses are set by the test.
///
/// A missing listing answers 500, a missing run fails at the transport level
/// and a missing image answers 404. With `gated`, listing and image fetches
/// wait for one `release` permit each before completing; the response is
/// captured when the request is issued.
pub struct ScriptedSource {
    script: Mutex<Script>,
    gate: Option<Arc<Semaphore>>,
    pub listing_requests: AtomicUsize,
    pub run_requests: AtomicUsize,
    pub image_requests: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(times: Vec<Timestamp>, run: &str) -> Self {
        let images = times
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), png_with_metric(i as f64 * 0.5)))
            .collect();
        Self {
            script: Mutex::new(Script {
                times: Some(times),
                run: Some(ForecastRunId(run.to_string())),
                images,
            }),
            gate: None,
            listing_requests: AtomicUsize::new(0),
            run_requests: AtomicUsize::new(0),
            image_requests: AtomicUsize::new(0),
        }
    }

    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release(&self, fetches: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(fetches);
        }
    }

    pub fn set_times(&self, times: Option<Vec<Timestamp>>) {
        self.script.lock().unwrap().times = times;
    }

    pub fn set_run(&self, run: Option<&str>) {
        self.script.lock().unwrap().run = run.map(|r| ForecastRunId(r.to_string()));
    }

    pub fn set_image(&self, timestamp: &Timestamp, bytes: Option<Vec<u8>>) {
        let mut script = self.script.lock().unwrap();
        match bytes {
            Some(bytes) => script.images.insert(timestamp.clone(), bytes),
            None => script.images.remove(timestamp),
        };
    }

    pub fn images(&self) -> usize {
        self.image_requests.load(Ordering::SeqCst)
    }

    pub fn listings(&self) -> usize {
        self.listing_requests.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.run_requests.load(Ordering::SeqCst)
    }
}

impl ForecastSource for ScriptedSource {
    fn forecast_times(&self, _station: &str) -> BoxFuture<'static, Result<Vec<Timestamp>, SourceError>> {
        self.listing_requests.fetch_add(1, Ordering::SeqCst);
        let times = self.script.lock().unwrap().times.clone();
        let gate = self.gate.clone();
        async move {
            if let Some(gate) = gate {
                gate.acquire().await.unwrap().forget();
            }
            times.ok_or(SourceError::Status(500))
        }
        .boxed()
    }

    fn latest_run(&self, _station: &str) -> BoxFuture<'static, Result<ForecastRunId, SourceError>> {
        self.run_requests.fetch_add(1, Ordering::SeqCst);
        let run = self.script.lock().unwrap().run.clone();
        async move { run.ok_or_else(|| SourceError::Transport("connection refused".into())) }.boxed()
    }

    fn forecast_image(
        &self,
        _station: &str,
        timestamp: &Timestamp,
    ) -> BoxFuture<'static, Result<Vec<u8>, SourceError>> {
        self.image_requests.fetch_add(1, Ordering::SeqCst);
        let image = self.script.lock().unwrap().images.get(timestamp).cloned();
        let gate = self.gate.clone();
        async move {
            if let Some(gate) = gate {
                gate.acquire().await.unwrap().forget();
            }
            image.ok_or(SourceError::Status(404))
        }
        .boxed()
    }
}

/// Yield to other tasks until `cond` holds.
pub async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

/// Sink that forwards every frame update into a channel.
pub fn channel_sink() -> (
    Arc<dyn forecast_player::FrameSink>,
    mpsc::UnboundedReceiver<FrameUpdate>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = move |update: FrameUpdate| {
        let _ = tx.send(update);
    };
    (Arc::new(sink), rx)
}

/// Drain whatever updates are already queued.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<FrameUpdate>) -> Vec<FrameUpdate> {
    let mut out = Vec::new();
    while let Ok(update) = rx.try_recv() {
        out.push(update);
    }
    out
}
