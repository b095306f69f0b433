pub mod config;
pub mod metadata;
pub mod platform;
pub mod protocol;

pub use metadata::MetadataError;
pub use protocol::{ForecastRunId, Timestamp, TimestampError};
