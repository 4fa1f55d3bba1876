//! Button variable: a bounded wrapping counter usable as MIDI data
//!
//! `VAR_INC` / `VAR_DEC` commands step the counter and `VAR` data fields read
//! it. Every step is persisted to the owning button's `.var` entry.

use super::ButtonId;
use crate::command::{lenient_int, VAR_SENTINEL};
use crate::storage::{entry_key, EntryKind, Storage, StorageError};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// Per-button counter `{min, max, value, step}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonVariable {
    pub min: i32,
    pub max: i32,
    pub value: i32,
    pub step: i32,
}

impl Default for ButtonVariable {
    fn default() -> Self {
        Self {
            min: 0,
            max: 127,
            value: 0,
            step: 1,
        }
    }
}

impl ButtonVariable {
    /// `value += step`, wrapping to `min` past `max`
    pub fn increment(&mut self) {
        self.value = self.value.saturating_add(self.step);
        if self.value > self.max {
            self.value = self.min;
        }
    }

    /// `value -= step`, wrapping to `max` below `min`
    pub fn decrement(&mut self) {
        self.value = self.value.saturating_sub(self.step);
        if self.value < self.min {
            self.value = self.max;
        }
    }

    /// Substitute the current value for the `VAR` sentinel
    pub fn resolve(&self, data: i32) -> i32 {
        if data == VAR_SENTINEL {
            self.value
        } else {
            data
        }
    }

    /// Four lines: value, min, max, step
    pub fn to_text(&self) -> String {
        format!("{}\n{}\n{}\n{}\n", self.value, self.min, self.max, self.step)
    }

    /// Read the four-line form; missing lines read as 0
    pub fn from_text(text: &str) -> Self {
        let mut lines = text.lines();
        let mut next = || lines.next().map(lenient_int).unwrap_or(0);
        let value = next();
        let min = next();
        let max = next();
        let step = next();
        Self {
            min,
            max,
            value,
            step,
        }
    }
}

/// Couples a button variable with the storage it is persisted to
pub struct VariableEngine<'a> {
    button: ButtonId,
    variable: &'a mut ButtonVariable,
    storage: &'a dyn Storage,
}

impl<'a> VariableEngine<'a> {
    pub fn new(button: ButtonId, variable: &'a mut ButtonVariable, storage: &'a dyn Storage) -> Self {
        Self {
            button,
            variable,
            storage,
        }
    }

    pub fn increment(&mut self) {
        self.variable.increment();
        self.persist();
    }

    pub fn decrement(&mut self) {
        self.variable.decrement();
        self.persist();
    }

    pub fn resolve(&self, data: i32) -> i32 {
        self.variable.resolve(data)
    }

    pub fn value(&self) -> i32 {
        self.variable.value
    }

    pub fn variable(&self) -> &ButtonVariable {
        self.variable
    }

    fn persist(&self) {
        if let Err(e) = save_variable(self.button, self.variable, self.storage) {
            warn!("Failed to persist variable for button {}: {}", self.button, e);
        } else {
            trace!("Button {} variable = {}", self.button, self.variable.value);
        }
    }
}

/// Write the `.var` entry of a button
pub fn save_variable(
    button: ButtonId,
    variable: &ButtonVariable,
    storage: &dyn Storage,
) -> Result<(), StorageError> {
    storage.write(&entry_key(button, EntryKind::Variable), &variable.to_text())
}
