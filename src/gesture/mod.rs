//! Gesture routing
//!
//! Maps a detected gesture to the command list it fires. The mapping is the
//! same for all six buttons and lives in one table; only the
//! `repeat_on_hold` flag changes which of the two hold gestures is active.

mod detector;

pub use detector::GestureDetector;

use crate::button::{ButtonConfiguration, ButtonFlags, ListSlot};
use std::fmt;
use std::time::Duration;

/// Gestures reported by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GestureKind {
    Click,
    DoubleClick,
    /// Fired once when a press crosses the long-press threshold
    LongPressStart,
    /// Fired at the threshold and then every repeat interval while held
    DuringLongPress,
}

impl fmt::Display for GestureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GestureKind::Click => "click",
            GestureKind::DoubleClick => "double-click",
            GestureKind::LongPressStart => "long-press-start",
            GestureKind::DuringLongPress => "during-long-press",
        };
        f.write_str(name)
    }
}

/// How a gesture picks its command list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionSelector {
    Push,
    DoublePush,
    /// Hold list, only when `repeat_on_hold` is set
    HoldWhenRepeating,
    /// Hold list, only when `repeat_on_hold` is clear
    HoldOnce,
}

impl ActionSelector {
    pub fn select(self, flags: ButtonFlags) -> Option<ListSlot> {
        match self {
            ActionSelector::Push => Some(ListSlot::Push),
            ActionSelector::DoublePush => Some(ListSlot::DoublePush),
            ActionSelector::HoldWhenRepeating => flags.repeat_on_hold.then_some(ListSlot::Hold),
            ActionSelector::HoldOnce => (!flags.repeat_on_hold).then_some(ListSlot::Hold),
        }
    }
}

/// Gesture to selector table shared by every button
pub const GESTURE_TABLE: [(GestureKind, ActionSelector); 4] = [
    (GestureKind::Click, ActionSelector::Push),
    (GestureKind::DoubleClick, ActionSelector::DoublePush),
    (GestureKind::DuringLongPress, ActionSelector::HoldWhenRepeating),
    (GestureKind::LongPressStart, ActionSelector::HoldOnce),
];

pub fn selector_for(gesture: GestureKind) -> ActionSelector {
    GESTURE_TABLE
        .iter()
        .find(|(kind, _)| *kind == gesture)
        .map(|(_, selector)| *selector)
        .unwrap_or(ActionSelector::Push)
}

/// List fired by `gesture`, `None` when the gesture is inactive for `flags`
pub fn route(gesture: GestureKind, flags: ButtonFlags) -> Option<ListSlot> {
    selector_for(gesture).select(flags)
}

/// Click window for buttons with a double-push list
pub const WIDE_CLICK: Duration = Duration::from_millis(400);
pub const WIDE_IDLE: Duration = Duration::from_millis(1000);
pub const TIGHT_CLICK: Duration = Duration::from_millis(60);
pub const TIGHT_IDLE: Duration = Duration::from_millis(60);
pub const LONG_PRESS: Duration = Duration::from_millis(300);
pub const REPEAT_INTERVAL: Duration = Duration::from_millis(300);
pub const DEBOUNCE: Duration = Duration::from_millis(50);

/// Detector timing of one button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonTiming {
    pub idle: Duration,
    pub click: Duration,
    pub long_press: Duration,
    pub repeat_interval: Duration,
    pub debounce: Duration,
}

impl Default for ButtonTiming {
    fn default() -> Self {
        Self {
            idle: TIGHT_IDLE,
            click: TIGHT_CLICK,
            long_press: LONG_PRESS,
            repeat_interval: REPEAT_INTERVAL,
            debounce: DEBOUNCE,
        }
    }
}

impl ButtonTiming {
    /// Buttons with a double-push list wait longer for the second press;
    /// the others report clicks almost immediately.
    pub fn for_configuration(config: &ButtonConfiguration) -> Self {
        if config.double_push.is_empty() {
            Self::default()
        } else {
            Self {
                idle: WIDE_IDLE,
                click: WIDE_CLICK,
                ..Self::default()
            }
        }
    }
}
