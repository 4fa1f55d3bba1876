//! Button configuration store
//!
//! Each of the six foot buttons owns three command lists (push, hold,
//! double-push), a flag set and a [`ButtonVariable`]. Configurations are
//! loaded from storage at startup, falling back to factory defaults, and
//! saved back whenever the configuration page submits changes.

mod defaults;
pub mod variable;

pub use defaults::apply_factory_defaults;
pub use variable::{save_variable, ButtonVariable, VariableEngine};

use crate::command::{self, lenient_int, MidiCommandList, ParseError};
use crate::storage::{entry_key, first_line, EntryKind, Storage, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Number of physical buttons
pub const BUTTON_COUNT: usize = 6;

/// 1-based button number, always in `1..=BUTTON_COUNT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ButtonId(u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("button {0} out of range (1-{max})", max = BUTTON_COUNT)]
pub struct ButtonIdError(pub u8);

impl ButtonId {
    pub fn new(number: u8) -> Result<Self, ButtonIdError> {
        if (1..=BUTTON_COUNT as u8).contains(&number) {
            Ok(Self(number))
        } else {
            Err(ButtonIdError(number))
        }
    }

    /// Button for a 0-based array index
    pub fn from_index(index: usize) -> Option<Self> {
        (index < BUTTON_COUNT).then(|| Self(index as u8 + 1))
    }

    /// 1-based number
    pub fn number(self) -> u8 {
        self.0
    }

    /// 0-based array index
    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }

    /// All buttons in order
    pub fn all() -> impl Iterator<Item = ButtonId> {
        (1..=BUTTON_COUNT as u8).map(ButtonId)
    }
}

impl TryFrom<u8> for ButtonId {
    type Error = ButtonIdError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ButtonId::new(value)
    }
}

impl From<ButtonId> for u8 {
    fn from(id: ButtonId) -> u8 {
        id.0
    }
}

impl fmt::Display for ButtonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-button behavior flags, persisted as a bit field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonFlags {
    /// Re-fire the hold list while held instead of once at the threshold
    pub repeat_on_hold: bool,
}

impl ButtonFlags {
    const REPEAT_ON_HOLD: u8 = 1;

    pub fn to_bits(self) -> u8 {
        let mut bits = 0;
        if self.repeat_on_hold {
            bits |= Self::REPEAT_ON_HOLD;
        }
        bits
    }

    /// Unknown bits are ignored
    pub fn from_bits(bits: u8) -> Self {
        Self {
            repeat_on_hold: bits & Self::REPEAT_ON_HOLD != 0,
        }
    }

    pub fn to_text(self) -> String {
        self.to_bits().to_string()
    }

    pub fn from_text(text: &str) -> Self {
        Self::from_bits(lenient_int(first_line(text)) as u8)
    }
}

/// Which of the three command lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListSlot {
    Push,
    Hold,
    DoublePush,
}

impl ListSlot {
    pub const ALL: [ListSlot; 3] = [ListSlot::Push, ListSlot::Hold, ListSlot::DoublePush];

    pub fn entry_kind(self) -> EntryKind {
        match self {
            ListSlot::Push => EntryKind::Push,
            ListSlot::Hold => EntryKind::Hold,
            ListSlot::DoublePush => EntryKind::DoublePush,
        }
    }
}

impl fmt::Display for ListSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListSlot::Push => write!(f, "push"),
            ListSlot::Hold => write!(f, "hold"),
            ListSlot::DoublePush => write!(f, "double-push"),
        }
    }
}

/// Full configuration of one button
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ButtonConfiguration {
    pub push: MidiCommandList,
    pub hold: MidiCommandList,
    pub double_push: MidiCommandList,
    pub flags: ButtonFlags,
    pub variable: ButtonVariable,
}

impl ButtonConfiguration {
    pub fn list(&self, slot: ListSlot) -> &MidiCommandList {
        match slot {
            ListSlot::Push => &self.push,
            ListSlot::Hold => &self.hold,
            ListSlot::DoublePush => &self.double_push,
        }
    }

    pub fn list_mut(&mut self, slot: ListSlot) -> &mut MidiCommandList {
        match slot {
            ListSlot::Push => &mut self.push,
            ListSlot::Hold => &mut self.hold,
            ListSlot::DoublePush => &mut self.double_push,
        }
    }

    /// Borrow one list together with the variable it may mutate
    pub fn split_for_dispatch(
        &mut self,
        slot: ListSlot,
    ) -> (&MidiCommandList, &mut ButtonVariable) {
        let list = match slot {
            ListSlot::Push => &self.push,
            ListSlot::Hold => &self.hold,
            ListSlot::DoublePush => &self.double_push,
        };
        (list, &mut self.variable)
    }

    /// Load whatever is stored for `button`; missing entries stay default
    pub fn load(button: ButtonId, storage: &dyn Storage) -> Self {
        let mut config = Self::default();

        for slot in ListSlot::ALL {
            if let Some(text) = read_entry(button, slot.entry_kind(), storage) {
                *config.list_mut(slot) = command::parse(first_line(&text));
            }
        }

        if let Some(text) = read_entry(button, EntryKind::Flags, storage) {
            config.flags = ButtonFlags::from_text(&text);
            debug!("Button {} flags {}", button, config.flags.to_bits());
        }

        if let Some(text) = read_entry(button, EntryKind::Variable, storage) {
            config.variable = ButtonVariable::from_text(&text);
        }

        config
    }

    /// Write every entry of `button`.
    ///
    /// All entries are attempted; the first failure is returned.
    pub fn save(&self, button: ButtonId, storage: &dyn Storage) -> Result<(), StorageError> {
        let mut first_error = None;
        let mut record = |result: Result<(), StorageError>| {
            if let Err(e) = result {
                warn!("Failed to save button {}: {}", button, e);
                first_error.get_or_insert(e);
            }
        };

        for slot in ListSlot::ALL {
            let text = format!("{}\n", self.list(slot).to_text());
            record(storage.write(&entry_key(button, slot.entry_kind()), &text));
        }
        record(storage.write(
            &entry_key(button, EntryKind::Flags),
            &format!("{}\n", self.flags.to_text()),
        ));
        record(save_variable(button, &self.variable, storage));

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Apply a configuration-page update.
    ///
    /// The variable step is not part of the form and is kept.
    pub fn apply_update(&mut self, update: &ButtonUpdate) -> Vec<(ListSlot, ParseError)> {
        let mut diagnostics = Vec::new();
        for (slot, text) in [
            (ListSlot::Push, &update.push),
            (ListSlot::Hold, &update.hold),
            (ListSlot::DoublePush, &update.double_push),
        ] {
            let report = command::parse_with_report(text);
            diagnostics.extend(report.errors.into_iter().map(|e| (slot, e)));
            *self.list_mut(slot) = report.commands;
        }

        self.flags.repeat_on_hold = update.repeat_on_hold;
        self.variable.min = update.var_min;
        self.variable.max = update.var_max;
        self.variable.value = update.var_value;

        diagnostics
    }

    /// Read view for the configuration page
    pub fn view(&self, button: ButtonId) -> ButtonView {
        ButtonView {
            button,
            push: self.push.to_text(),
            hold: self.hold.to_text(),
            double_push: self.double_push.to_text(),
            repeat_on_hold: self.flags.repeat_on_hold,
            var_min: self.variable.min,
            var_max: self.variable.max,
            var_value: self.variable.value,
        }
    }
}

fn read_entry(button: ButtonId, kind: EntryKind, storage: &dyn Storage) -> Option<String> {
    let key = entry_key(button, kind);
    match storage.read(&key) {
        Ok(text) => Some(text),
        Err(e) if e.is_not_found() => {
            debug!("No stored entry {}", key);
            None
        }
        Err(e) => {
            warn!("Failed to read {}: {}", key, e);
            None
        }
    }
}

/// Values submitted by the configuration page for one button
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonUpdate {
    pub push: String,
    pub hold: String,
    pub double_push: String,
    pub repeat_on_hold: bool,
    pub var_min: i32,
    pub var_max: i32,
    pub var_value: i32,
}

/// Canonical text view of one button, used to pre-fill the configuration page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonView {
    pub button: ButtonId,
    pub push: String,
    pub hold: String,
    pub double_push: String,
    pub repeat_on_hold: bool,
    pub var_min: i32,
    pub var_max: i32,
    pub var_value: i32,
}

impl ButtonView {
    /// Indicator used by the HTML checkbox
    pub fn repeat_flag_checked(&self) -> &'static str {
        if self.repeat_on_hold {
            "checked"
        } else {
            ""
        }
    }
}
