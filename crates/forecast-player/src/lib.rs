//! Forecast playback engine: fetch, cache and animate a station's forecast
//! frames, following newer forecast runs as they are published.

pub mod cache;
pub mod display;
pub mod freshness;
pub mod input;
pub mod playback;
pub mod session;
pub mod source;

pub use cache::{CacheError, ForecastCache, Frame};
pub use freshness::FreshnessMonitor;
pub use input::{InputRouter, Intent};
pub use playback::{FrameSink, FrameUpdate, FrameView, PlaybackController};
pub use session::{Session, SessionEvent, SessionSettings};
pub use source::{ForecastSource, HttpSource, SourceError};
