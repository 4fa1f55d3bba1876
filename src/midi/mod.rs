//! MIDI message types and port plumbing
//!
//! Channel-voice parsing for the button input path, hex formatting for logs,
//! and port discovery shared by the output sinks and the input listener.

pub mod input;
pub mod output;

pub use input::{ButtonEvent, InputBinding, InputListener, InputMap};
pub use output::{DeviceSink, MidiOutputError, MidiSink, NullSink, PortSink};

use anyhow::{Context, Result};
use midir::{MidiInput, MidiOutput};
use std::fmt;

/// Channel-voice MIDI messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (1-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Polyphonic Key Pressure: channel (0-15), note (0-127), pressure (0-127)
    PolyPressure { channel: u8, note: u8, pressure: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },

    /// Program Change: channel (0-15), program (0-127)
    ProgramChange { channel: u8, program: u8 },

    /// Channel Pressure: channel (0-15), pressure (0-127)
    ChannelPressure { channel: u8, pressure: u8 },

    /// Pitch Bend: channel (0-15), value (0-16383, 14-bit)
    PitchBend { channel: u8, value: u16 },
}

impl MidiMessage {
    /// Parse a channel-voice message from raw bytes.
    ///
    /// System messages and running status are not used by the pedal and
    /// return `None`.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;
        if !(0x80..0xF0).contains(&status) {
            return None;
        }

        let channel = status & 0x0F;
        let d1 = rest.first().map(|b| b & 0x7F);
        let d2 = rest.get(1).map(|b| b & 0x7F);

        match status & 0xF0 {
            0x80 => Some(MidiMessage::NoteOff {
                channel,
                note: d1?,
                velocity: d2?,
            }),
            0x90 => {
                let (note, velocity) = (d1?, d2?);
                // Velocity 0 is a Note Off
                if velocity == 0 {
                    Some(MidiMessage::NoteOff {
                        channel,
                        note,
                        velocity: 0,
                    })
                } else {
                    Some(MidiMessage::NoteOn {
                        channel,
                        note,
                        velocity,
                    })
                }
            }
            0xA0 => Some(MidiMessage::PolyPressure {
                channel,
                note: d1?,
                pressure: d2?,
            }),
            0xB0 => Some(MidiMessage::ControlChange {
                channel,
                cc: d1?,
                value: d2?,
            }),
            0xC0 => Some(MidiMessage::ProgramChange {
                channel,
                program: d1?,
            }),
            0xD0 => Some(MidiMessage::ChannelPressure {
                channel,
                pressure: d1?,
            }),
            0xE0 => {
                let (lsb, msb) = (u16::from(d1?), u16::from(d2?));
                Some(MidiMessage::PitchBend {
                    channel,
                    value: (msb << 7) | lsb,
                })
            }
            _ => None,
        }
    }

    /// Channel (0-15)
    pub fn channel(&self) -> u8 {
        match *self {
            MidiMessage::NoteOff { channel, .. }
            | MidiMessage::NoteOn { channel, .. }
            | MidiMessage::PolyPressure { channel, .. }
            | MidiMessage::ControlChange { channel, .. }
            | MidiMessage::ProgramChange { channel, .. }
            | MidiMessage::ChannelPressure { channel, .. }
            | MidiMessage::PitchBend { channel, .. } => channel,
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOff {
                channel,
                note,
                velocity,
            } => write!(f, "NoteOff ch:{} n:{} v:{}", channel + 1, note, velocity),
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity),
            MidiMessage::PolyPressure {
                channel,
                note,
                pressure,
            } => write!(f, "PolyPressure ch:{} n:{} p:{}", channel + 1, note, pressure),
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
            MidiMessage::ProgramChange { channel, program } => {
                write!(f, "ProgramChange ch:{} p:{}", channel + 1, program)
            }
            MidiMessage::ChannelPressure { channel, pressure } => {
                write!(f, "ChannelPressure ch:{} p:{}", channel + 1, pressure)
            }
            MidiMessage::PitchBend { channel, value } => {
                write!(f, "PitchBend ch:{} v:{}", channel + 1, value)
            }
        }
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Case-insensitive substring match used for port selection
pub(crate) fn port_matches(name: &str, pattern: &str) -> bool {
    name.to_lowercase().contains(&pattern.to_lowercase())
}

/// Names of the MIDI ports visible to the system
#[derive(Debug, Clone, Default)]
pub struct PortListing {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// Enumerate input and output ports
pub fn list_ports() -> Result<PortListing> {
    let midi_in = MidiInput::new("MIDI-Pedal-Probe").context("Failed to create MIDI input")?;
    let midi_out = MidiOutput::new("MIDI-Pedal-Probe").context("Failed to create MIDI output")?;

    let inputs = midi_in
        .ports()
        .iter()
        .filter_map(|p| midi_in.port_name(p).ok())
        .collect();
    let outputs = midi_out
        .ports()
        .iter()
        .filter_map(|p| midi_out.port_name(p).ok())
        .collect();

    Ok(PortListing { inputs, outputs })
}

/// Print the port listing for `--list-ports`
pub fn print_ports(listing: &PortListing) {
    use colored::*;

    println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());

    for (title, ports) in [("Input Ports:", &listing.inputs), ("Output Ports:", &listing.outputs)] {
        println!("\n{}", title.bold());
        if ports.is_empty() {
            println!("  {}", "No ports found".dimmed());
        }
        for (index, name) in ports.iter().enumerate() {
            println!("  {} {}", format!("[{}]", index).green(), name);
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on_parsing() {
        let msg = MidiMessage::parse(&[0x90, 60, 100]).unwrap();
        assert_eq!(
            msg,
            MidiMessage::NoteOn {
                channel: 0,
                note: 60,
                velocity: 100,
            }
        );
    }

    #[test]
    fn test_note_on_velocity_zero() {
        let msg = MidiMessage::parse(&[0x90, 60, 0]).unwrap();
        assert_eq!(
            msg,
            MidiMessage::NoteOff {
                channel: 0,
                note: 60,
                velocity: 0,
            }
        );
    }

    #[test]
    fn test_control_change() {
        let msg = MidiMessage::parse(&[0xB2, 7, 100]).unwrap();
        assert_eq!(
            msg,
            MidiMessage::ControlChange {
                channel: 2,
                cc: 7,
                value: 100,
            }
        );
        assert_eq!(msg.channel(), 2);
        assert_eq!(msg.to_string(), "CC ch:3 cc:7 v:100");
    }

    #[test]
    fn test_short_and_system_messages() {
        assert_eq!(MidiMessage::parse(&[]), None);
        assert_eq!(MidiMessage::parse(&[0xB0, 7]), None);
        assert_eq!(MidiMessage::parse(&[0xF8]), None);
        assert_eq!(MidiMessage::parse(&[0x40, 1, 2]), None);
        assert_eq!(
            MidiMessage::parse(&[0xC1, 5, 0]),
            Some(MidiMessage::ProgramChange {
                channel: 1,
                program: 5
            })
        );
    }

    #[test]
    fn test_pitch_bend() {
        let msg = MidiMessage::parse(&[0xE0, 0x00, 0x40]).unwrap();
        assert_eq!(
            msg,
            MidiMessage::PitchBend {
                channel: 0,
                value: 8192,
            }
        );
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0xB0, 0x50, 0x7F]), "B0 50 7F");
        assert_eq!(format_hex(&[]), "");
    }

    #[test]
    fn test_port_matches() {
        assert!(port_matches("USB MIDI Interface 1", "usb midi"));
        assert!(!port_matches("Foot Controller", "USB"));
    }
}
