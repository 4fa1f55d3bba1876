//! Button input from a MIDI controller
//!
//! Foot switches are often wired to a small MIDI interface that reports them
//! as notes or CCs. [`InputMap`] turns those messages into press/release
//! levels for the six buttons and [`InputListener`] forwards them from the
//! midir callback thread into the controller loop.

use super::{format_hex, port_matches, MidiMessage};
use crate::button::{ButtonId, BUTTON_COUNT};
use anyhow::{Context, Result};
use midir::{MidiInput, MidiInputConnection};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// CC values at or above this count as pressed
pub const CC_PRESS_THRESHOLD: u8 = 64;

/// Which message drives one button
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputBinding {
    /// Note number (Note On = pressed, Note Off = released)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<u8>,

    /// CC number (value >= 64 = pressed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc: Option<u8>,

    /// MIDI channel 1-16, any channel when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
}

impl InputBinding {
    pub fn note(note: u8) -> Self {
        Self {
            note: Some(note),
            ..Self::default()
        }
    }

    pub fn cc(cc: u8) -> Self {
        Self {
            cc: Some(cc),
            ..Self::default()
        }
    }

    /// Press level carried by `message`, if it targets this binding
    fn level(&self, message: &MidiMessage) -> Option<bool> {
        if let Some(channel) = self.channel {
            if message.channel() + 1 != channel {
                return None;
            }
        }

        match *message {
            MidiMessage::NoteOn { note, .. } if Some(note) == self.note => Some(true),
            MidiMessage::NoteOff { note, .. } if Some(note) == self.note => Some(false),
            MidiMessage::ControlChange { cc, value, .. } if Some(cc) == self.cc => {
                Some(value >= CC_PRESS_THRESHOLD)
            }
            _ => None,
        }
    }
}

/// Default layout: notes 60-65 on any channel
pub fn default_bindings() -> Vec<InputBinding> {
    (0..BUTTON_COUNT as u8).map(|i| InputBinding::note(60 + i)).collect()
}

/// Raw press/release level of one button, before debouncing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: ButtonId,
    pub pressed: bool,
    pub at: Instant,
}

/// Message-to-button lookup; binding `i` drives button `i + 1`
#[derive(Debug, Clone, Default)]
pub struct InputMap {
    bindings: Vec<(ButtonId, InputBinding)>,
}

impl InputMap {
    pub fn new(bindings: &[InputBinding]) -> Self {
        let bindings = bindings
            .iter()
            .enumerate()
            .filter_map(|(i, b)| ButtonId::from_index(i).map(|id| (id, b.clone())))
            .collect();
        Self { bindings }
    }

    /// Button and press level for `message`, first matching binding wins
    pub fn resolve(&self, message: &MidiMessage) -> Option<(ButtonId, bool)> {
        self.bindings
            .iter()
            .find_map(|(id, binding)| binding.level(message).map(|pressed| (*id, pressed)))
    }
}

/// Live midir input connection feeding button events
pub struct InputListener {
    _conn: MidiInputConnection<()>,
    port_name: String,
}

impl InputListener {
    /// Connect to the first input port whose name contains `pattern`
    pub fn connect(pattern: &str, map: InputMap, tx: mpsc::Sender<ButtonEvent>) -> Result<Self> {
        let midi_in = MidiInput::new("MIDI-Pedal-Input").context("Failed to create MIDI input")?;
        debug!("Found {} MIDI input ports", midi_in.port_count());

        let (port, port_name) = midi_in
            .ports()
            .into_iter()
            .find_map(|port| {
                let name = midi_in.port_name(&port).ok()?;
                port_matches(&name, pattern).then_some((port, name))
            })
            .ok_or_else(|| anyhow::anyhow!("Input port '{}' not found", pattern))?;

        info!("Connecting to input port: {}", port_name);

        let conn = midi_in
            .connect(
                &port,
                "MIDI-Pedal",
                move |_timestamp, data, _| {
                    let Some(message) = MidiMessage::parse(data) else {
                        trace!("Ignored input: {}", format_hex(data));
                        return;
                    };
                    let Some((button, pressed)) = map.resolve(&message) else {
                        trace!("Unmapped input: {}", message);
                        return;
                    };
                    let event = ButtonEvent {
                        button,
                        pressed,
                        at: Instant::now(),
                    };
                    // Never block the MIDI thread
                    if tx.try_send(event).is_err() {
                        warn!("Button event queue full, dropped {}", message);
                    }
                },
                (),
            )
            .map_err(|e| anyhow::anyhow!("Failed to connect to input port: {}", e))?;

        Ok(Self {
            _conn: conn,
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn button(n: u8) -> ButtonId {
        ButtonId::new(n).unwrap()
    }

    #[test]
    fn test_note_bindings() {
        let map = InputMap::new(&default_bindings());

        let on = MidiMessage::parse(&[0x90, 62, 100]).unwrap();
        assert_eq!(map.resolve(&on), Some((button(3), true)));

        let off = MidiMessage::parse(&[0x90, 62, 0]).unwrap();
        assert_eq!(map.resolve(&off), Some((button(3), false)));

        let other = MidiMessage::parse(&[0x90, 70, 100]).unwrap();
        assert_eq!(map.resolve(&other), None);
    }

    #[test]
    fn test_cc_binding_threshold() {
        let map = InputMap::new(&[InputBinding::cc(80)]);

        let down = MidiMessage::parse(&[0xB0, 80, 127]).unwrap();
        let half = MidiMessage::parse(&[0xB0, 80, 63]).unwrap();
        assert_eq!(map.resolve(&down), Some((button(1), true)));
        assert_eq!(map.resolve(&half), Some((button(1), false)));
    }

    #[test]
    fn test_channel_filter() {
        let binding = InputBinding {
            channel: Some(2),
            ..InputBinding::note(60)
        };
        let map = InputMap::new(&[binding]);

        let ch1 = MidiMessage::parse(&[0x90, 60, 100]).unwrap();
        let ch2 = MidiMessage::parse(&[0x91, 60, 100]).unwrap();
        assert_eq!(map.resolve(&ch1), None);
        assert_eq!(map.resolve(&ch2), Some((button(1), true)));
    }

    #[test]
    fn test_extra_bindings_ignored() {
        let bindings: Vec<_> = (0..10).map(InputBinding::note).collect();
        let map = InputMap::new(&bindings);
        let msg = MidiMessage::parse(&[0x90, 8, 100]).unwrap();
        assert_eq!(map.resolve(&msg), None);
    }

    #[test]
    fn test_binding_yaml() {
        let bindings: Vec<InputBinding> =
            serde_yaml::from_str("- { note: 60 }\n- { cc: 81, channel: 10 }\n").unwrap();
        assert_eq!(bindings[0], InputBinding::note(60));
        assert_eq!(bindings[1].cc, Some(81));
        assert_eq!(bindings[1].channel, Some(10));
    }
}
