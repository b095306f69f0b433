//! Remote forecast source: the three endpoints the player consumes.
//!
//! `ForecastSource` is the seam between the cache/monitor and the network.
//! `HttpSource` talks to the forecast server over HTTP; tests substitute an
//! in-memory source.

use anyhow::Context;
use forecast_proto::config::SourceConfig;
use forecast_proto::protocol::{
    forecast_image_path, forecast_times_path, latest_run_path, ForecastTimesResponse,
    LatestRunResponse,
};
use forecast_proto::{ForecastRunId, Timestamp};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::Client;
use tracing::{debug, warn};

pub type SourceResult<T> = Result<T, SourceError>;

/// Why a remote request produced nothing usable.
///
/// Cloneable so one failed fetch can be handed to every joined waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server responded with status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("station {0} missing from response")]
    MissingStation(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

pub trait ForecastSource: Send + Sync + 'static {
    /// Ordered frame keys of the station's current forecast run.
    fn forecast_times(&self, station: &str) -> BoxFuture<'static, SourceResult<Vec<Timestamp>>>;

    /// Identifier of the newest forecast run for the station.
    fn latest_run(&self, station: &str) -> BoxFuture<'static, SourceResult<ForecastRunId>>;

    /// Raw image payload for one frame.
    fn forecast_image(
        &self,
        station: &str,
        timestamp: &Timestamp,
    ) -> BoxFuture<'static, SourceResult<Vec<u8>>>;
}

#[derive(Clone)]
pub struct HttpSource {
    client: Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(config: &SourceConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("forecast-player/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self::with_client(client, &config.base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET `path`, mapping any non-2xx status to `SourceError::Status`.
    async fn get(client: Client, url: String) -> SourceResult<reqwest::Response> {
        debug!("GET {}", url);
        let response = client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            debug!("GET {} -> {}", url, status);
            return Err(SourceError::Status(status.as_u16()));
        }
        Ok(response)
    }
}

impl ForecastSource for HttpSource {
    fn forecast_times(&self, station: &str) -> BoxFuture<'static, SourceResult<Vec<Timestamp>>> {
        let client = self.client.clone();
        let url = self.url(&forecast_times_path(station));
        let station = station.to_string();
        async move {
            let mut body: ForecastTimesResponse = Self::get(client, url).await?.json().await?;
            let raw = body
                .take_station(&station)
                .ok_or_else(|| SourceError::MissingStation(station.clone()))?;
            Ok(parse_listing(&station, raw))
        }
        .boxed()
    }

    fn latest_run(&self, station: &str) -> BoxFuture<'static, SourceResult<ForecastRunId>> {
        let client = self.client.clone();
        let url = self.url(&latest_run_path(station));
        let station = station.to_string();
        async move {
            let mut body: LatestRunResponse = Self::get(client, url).await?.json().await?;
            body.take_station(&station)
                .ok_or(SourceError::MissingStation(station))
        }
        .boxed()
    }

    fn forecast_image(
        &self,
        station: &str,
        timestamp: &Timestamp,
    ) -> BoxFuture<'static, SourceResult<Vec<u8>>> {
        let client = self.client.clone();
        let url = self.url(&forecast_image_path(station, timestamp));
        async move {
            let bytes = Self::get(client, url).await?.bytes().await?;
            Ok(bytes.to_vec())
        }
        .boxed()
    }
}

/// Parse a raw listing into a strictly increasing sequence.
///
/// Keys that do not form a valid calendar hour are dropped, since every
/// frame must be displayable as a date.
pub fn parse_listing(station: &str, raw: Vec<String>) -> Vec<Timestamp> {
    let mut times: Vec<Timestamp> = raw
        .into_iter()
        .filter_map(|key| match Timestamp::parse(&key) {
            Ok(ts) => Some(ts),
            Err(e) => {
                warn!("station {}: skipping forecast key: {}", station, e);
                None
            }
        })
        .collect();
    times.sort();
    times.dedup();
    times
}
