//! Terminal frame sink: one status line per committed frame.

use std::io::Write;

use crate::playback::{FrameSink, FrameUpdate, FrameView};

/// `Hs = 1.23m`, or `Hs = n/a` when the frame carried no metric.
pub fn metric_label(metric: Option<f64>) -> String {
    match metric {
        Some(hs) => format!("Hs = {:0.2}m", hs),
        None => "Hs = n/a".to_string(),
    }
}

pub fn format_update(update: &FrameUpdate) -> String {
    let width = update.len.to_string().len();
    let detail = match &update.view {
        FrameView::Ready { image, metric } => {
            format!("{}  ({:.1} KiB)", metric_label(*metric), image.len() as f64 / 1024.0)
        }
        FrameView::Unavailable => "frame unavailable".to_string(),
    };
    format!(
        "[{:>width$}/{}] {}  {}",
        update.index + 1,
        update.len,
        update.timestamp.calendar_label(),
        detail,
        width = width
    )
}

/// Writes status lines to stdout. Lines end in `\r\n` because the terminal
/// is in raw mode while the player runs.
pub struct TerminalSink;

impl FrameSink for TerminalSink {
    fn on_frame(&self, update: FrameUpdate) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "{}\r\n", format_update(&update));
        let _ = out.flush();
    }
}
