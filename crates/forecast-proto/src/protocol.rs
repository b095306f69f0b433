use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Lexical layout of a forecast timestamp: `YYYYMMDDHH`.
pub const TIMESTAMP_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampError {
    #[error("timestamp {0:?} is not ten ASCII digits")]
    Format(String),
    #[error("timestamp {0:?} is not a valid calendar hour")]
    Calendar(String),
}

/// One frame key within a forecast run, e.g. `2024010106`.
///
/// The raw key is what the remote source understands; the decomposed
/// calendar value is kept alongside so display code never has to re-parse.
/// Ordering, equality and hashing only look at the raw key, which sorts
/// chronologically because the format is fixed width.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp {
    key: String,
    at: NaiveDateTime,
}

impl Timestamp {
    pub fn parse(raw: &str) -> Result<Self, TimestampError> {
        if raw.len() != TIMESTAMP_LEN || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TimestampError::Format(raw.to_string()));
        }
        // All ASCII digits, so these slices are on char boundaries and parse.
        let field = |range: std::ops::Range<usize>| raw[range].parse::<u32>().unwrap_or(u32::MAX);
        let year = field(0..4) as i32;
        let (month, day, hour) = (field(4..6), field(6..8), field(8..10));

        let at = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .ok_or_else(|| TimestampError::Calendar(raw.to_string()))?;

        Ok(Self {
            key: raw.to_string(),
            at,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.at
    }

    pub fn year(&self) -> i32 {
        self.at.year()
    }

    pub fn month(&self) -> u32 {
        self.at.month()
    }

    pub fn day(&self) -> u32 {
        self.at.day()
    }

    pub fn hour(&self) -> u32 {
        self.at.hour()
    }

    /// Human readable form used by frame status lines: `Mon 01 Jan 2024 06:00`.
    pub fn calendar_label(&self) -> String {
        self.at.format("%a %d %b %Y %H:00").to_string()
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Timestamp {}

impl Hash for Timestamp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl TryFrom<String> for Timestamp {
    type Error = TimestampError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Timestamp> for String {
    fn from(ts: Timestamp) -> Self {
        ts.key
    }
}

impl std::str::FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Opaque token naming the forecast generation a station currently serves.
/// Only equality is meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForecastRunId(pub String);

impl fmt::Display for ForecastRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Wire shapes ───────────────────────────────────────────────────────────────

/// Body of `GET /forecast/times/{station}`: `{"<station>": ["2024010100", ...]}`.
///
/// Entries are kept as raw strings here so one malformed key does not reject
/// the whole listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForecastTimesResponse(pub HashMap<String, Vec<String>>);

impl ForecastTimesResponse {
    pub fn take_station(&mut self, station: &str) -> Option<Vec<String>> {
        self.0.remove(station)
    }
}

/// Body of `GET /latest/{station}`: `{"<station>": "<run id>"}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LatestRunResponse(pub HashMap<String, ForecastRunId>);

impl LatestRunResponse {
    pub fn take_station(&mut self, station: &str) -> Option<ForecastRunId> {
        self.0.remove(station)
    }
}

pub fn forecast_times_path(station: &str) -> String {
    format!("/forecast/times/{}", station)
}

pub fn latest_run_path(station: &str) -> String {
    format!("/latest/{}", station)
}

pub fn forecast_image_path(station: &str, timestamp: &Timestamp) -> String {
    format!("/forecast/{}/{}", station, timestamp)
}
