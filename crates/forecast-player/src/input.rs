//! InputRouter — maps raw input onto the closed set of playback operations.
//!
//! | input                      | intent               |
//! |----------------------------|----------------------|
//! | Space / Enter              | toggle play          |
//! | Left / Right               | step -1 / +1         |
//! | Shift + Left / Right       | step -/+ one day     |
//! | Up / `+`                   | faster (-50 ms)      |
//! | Down / `-`                 | slower (+50 ms)      |
//! | Home / End                 | first / last frame   |
//! | mouse wheel (scroll offset)| absolute seek        |
//! | focus gained / lost        | hover pause / resume |
//! | `q` / Esc / Ctrl-C         | quit                 |

use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEvent, MouseEventKind,
};
use forecast_proto::config::PlaybackConfig;

use crate::playback::PlaybackController;
use crate::source::ForecastSource;

/// Period change per faster/slower press.
pub const SPEED_STEP_MS: u64 = 50;

/// Scroll offset added per mouse wheel notch.
pub const WHEEL_NOTCH_PX: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    TogglePlay,
    Step(i64),
    SeekFirst,
    SeekLast,
    /// Scroll position of the scrub surface, in pixels from its origin.
    ScrollTo(i64),
    Faster,
    Slower,
    HoverEnter,
    HoverLeave,
    Quit,
}

#[derive(Debug, Clone)]
pub struct InputRouter {
    day_step: i64,
    pixels_per_unit: u32,
}

impl Default for InputRouter {
    fn default() -> Self {
        Self::from_config(&PlaybackConfig::default())
    }
}

impl InputRouter {
    pub fn new(day_step: i64, pixels_per_unit: u32) -> Self {
        Self {
            day_step,
            pixels_per_unit: pixels_per_unit.max(1),
        }
    }

    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self::new(config.day_step, config.scroll_pixels_per_unit)
    }

    pub fn map_key(&self, key: KeyEvent) -> Option<Intent> {
        if key.kind == KeyEventKind::Release {
            return None;
        }
        let shifted = key.modifiers.contains(KeyModifiers::SHIFT);
        let intent = match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Intent::Quit,
            KeyCode::Char(' ') | KeyCode::Enter => Intent::TogglePlay,
            KeyCode::Right if shifted => Intent::Step(self.day_step),
            KeyCode::Left if shifted => Intent::Step(-self.day_step),
            KeyCode::Right => Intent::Step(1),
            KeyCode::Left => Intent::Step(-1),
            KeyCode::Up | KeyCode::Char('+') => Intent::Faster,
            KeyCode::Down | KeyCode::Char('-') => Intent::Slower,
            KeyCode::Home => Intent::SeekFirst,
            KeyCode::End => Intent::SeekLast,
            KeyCode::Char('q') | KeyCode::Esc => Intent::Quit,
            _ => return None,
        };
        Some(intent)
    }

    /// Map any terminal event. `scroll_px` is the scrub surface offset,
    /// accumulated across wheel events and never negative.
    pub fn map_event(&self, event: Event, scroll_px: &mut i64) -> Option<Intent> {
        match event {
            Event::Key(key) => self.map_key(key),
            Event::Mouse(mouse) => Self::map_wheel(mouse, scroll_px),
            Event::FocusGained => Some(Intent::HoverEnter),
            Event::FocusLost => Some(Intent::HoverLeave),
            _ => None,
        }
    }

    fn map_wheel(mouse: MouseEvent, scroll_px: &mut i64) -> Option<Intent> {
        let delta = match mouse.kind {
            MouseEventKind::ScrollDown => WHEEL_NOTCH_PX,
            MouseEventKind::ScrollUp => -WHEEL_NOTCH_PX,
            _ => return None,
        };
        *scroll_px = (*scroll_px + delta).max(0);
        Some(Intent::ScrollTo(*scroll_px))
    }

    /// Linear scroll-offset to frame-index mapping.
    pub fn scroll_index(&self, offset_px: i64) -> i64 {
        offset_px.div_euclid(i64::from(self.pixels_per_unit))
    }

    /// Drive the controller. Returns `false` when the intent asks to quit.
    pub async fn apply<S: ForecastSource>(
        &self,
        intent: Intent,
        controller: &PlaybackController<S>,
    ) -> bool {
        match intent {
            Intent::TogglePlay => controller.toggle(),
            Intent::Step(delta) => controller.step_by(delta).await,
            Intent::SeekFirst => controller.seek_first().await,
            Intent::SeekLast => controller.seek_last().await,
            Intent::ScrollTo(offset_px) => controller.seek_to(self.scroll_index(offset_px)).await,
            Intent::Faster => {
                controller.set_speed(controller.period_ms().saturating_sub(SPEED_STEP_MS));
            }
            Intent::Slower => {
                controller.set_speed(controller.period_ms() + SPEED_STEP_MS);
            }
            Intent::HoverEnter => controller.hover_enter(),
            Intent::HoverLeave => controller.hover_leave(),
            Intent::Quit => return false,
        }
        true
    }
}
