//! Per-button gesture detector
//!
//! Debounces raw press/release levels and classifies them:
//!
//! ```text
//! Idle --press--> Down --release--> Count --click window--> Click
//!                  |                  |--press--> Down (second click)
//!                  |                  `--second release--> DoubleClick
//!                  `--held past threshold--> Press --release--> Idle
//! ```
//!
//! `Press` emits `LongPressStart` and `DuringLongPress` on entry, then
//! `DuringLongPress` every repeat interval. Durations are measured from the
//! moment a level change happened, not from when it was debounced.

use super::{ButtonTiming, GestureKind};
use std::time::{Duration, Instant};

/// Clicks needed for a double click
const MAX_CLICKS: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Down,
    Count,
    Press,
}

#[derive(Debug, Clone)]
pub struct GestureDetector {
    timing: ButtonTiming,
    state: State,
    /// Last observed level and when it started
    raw: bool,
    raw_since: Instant,
    /// Debounced level
    stable: bool,
    /// Start of the current Down / Count phase
    phase_start: Instant,
    clicks: u8,
    last_repeat: Instant,
    last_activity: Instant,
}

impl GestureDetector {
    pub fn new(timing: ButtonTiming, now: Instant) -> Self {
        Self {
            timing,
            state: State::Idle,
            raw: false,
            raw_since: now,
            stable: false,
            phase_start: now,
            clicks: 0,
            last_repeat: now,
            last_activity: now,
        }
    }

    pub fn timing(&self) -> ButtonTiming {
        self.timing
    }

    /// Replace the timing; takes effect from the next tick
    pub fn set_timing(&mut self, timing: ButtonTiming) {
        self.timing = timing;
    }

    /// Record a raw level sample
    pub fn observe(&mut self, pressed: bool, at: Instant) {
        if pressed != self.raw {
            self.raw = pressed;
            self.raw_since = at;
            self.last_activity = at;
        }
    }

    /// Released, settled and quiet for the idle window
    pub fn is_idle(&self, now: Instant) -> bool {
        self.state == State::Idle
            && !self.raw
            && !self.stable
            && elapsed(self.last_activity, now) >= self.timing.idle
    }

    /// Advance to `now` and return the gestures completed since the last tick
    pub fn tick(&mut self, now: Instant) -> Vec<GestureKind> {
        let mut gestures = Vec::new();

        // A level counts once it has been stable for the debounce window
        let edge = if self.raw != self.stable
            && elapsed(self.raw_since, now) >= self.timing.debounce
        {
            self.stable = self.raw;
            Some(self.raw_since)
        } else {
            None
        };

        match self.state {
            State::Idle => {
                if let Some(at) = edge.filter(|_| self.stable) {
                    self.enter_down(at);
                    self.clicks = 0;
                }
            }
            State::Down => {
                if let Some(at) = edge.filter(|_| !self.stable) {
                    self.clicks += 1;
                    self.state = State::Count;
                    self.phase_start = at;
                    if self.clicks >= MAX_CLICKS {
                        gestures.push(GestureKind::DoubleClick);
                        self.reset();
                    }
                } else if elapsed(self.phase_start, now) >= self.timing.long_press {
                    gestures.push(GestureKind::LongPressStart);
                    gestures.push(GestureKind::DuringLongPress);
                    self.state = State::Press;
                    self.last_repeat = now;
                }
            }
            State::Count => {
                if let Some(at) = edge.filter(|_| self.stable) {
                    self.enter_down(at);
                } else if elapsed(self.phase_start, now) >= self.timing.click {
                    gestures.push(GestureKind::Click);
                    self.reset();
                }
            }
            State::Press => {
                if edge.is_some() && !self.stable {
                    self.reset();
                } else if elapsed(self.last_repeat, now) >= self.timing.repeat_interval {
                    gestures.push(GestureKind::DuringLongPress);
                    self.last_repeat = now;
                }
            }
        }

        gestures
    }

    fn enter_down(&mut self, at: Instant) {
        self.state = State::Down;
        self.phase_start = at;
    }

    fn reset(&mut self) {
        self.state = State::Idle;
        self.clicks = 0;
    }
}

fn elapsed(since: Instant, now: Instant) -> Duration {
    now.saturating_duration_since(since)
}
