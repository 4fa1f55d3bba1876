//! MIDI output sinks
//!
//! The dispatcher writes raw status/data bytes to a [`MidiSink`]. Send errors
//! are reported to the caller, which logs them and carries on; a pedal with a
//! broken output keeps running, it just stays silent.

use super::{format_hex, port_matches};
use anyhow::{Context, Result};
use midir::{MidiOutput, MidiOutputConnection};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, trace};

/// Errors raised while writing MIDI bytes
#[derive(Debug, Error)]
pub enum MidiOutputError {
    #[error("MIDI port send failed: {0}")]
    Port(#[from] midir::SendError),

    #[error("MIDI device write failed on {path}: {source}")]
    Device {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Destination for encoded MIDI messages
pub trait MidiSink: Send {
    /// Write one message
    fn send(&mut self, bytes: &[u8]) -> Result<(), MidiOutputError>;

    /// Human-readable destination, for logs
    fn describe(&self) -> String;
}

/// Output through a midir port (ALSA, CoreMIDI, WinMM)
pub struct PortSink {
    conn: MidiOutputConnection,
    port_name: String,
}

impl PortSink {
    /// Connect to the first output port whose name contains `pattern`
    pub fn connect(pattern: &str) -> Result<Self> {
        let midi_out = MidiOutput::new("MIDI-Pedal-Output").context("Failed to create MIDI output")?;
        debug!("Found {} MIDI output ports", midi_out.port_count());

        let (port, port_name) = midi_out
            .ports()
            .into_iter()
            .find_map(|port| {
                let name = midi_out.port_name(&port).ok()?;
                port_matches(&name, pattern).then_some((port, name))
            })
            .ok_or_else(|| anyhow::anyhow!("Output port '{}' not found", pattern))?;

        info!("Connecting to output port: {}", port_name);
        let conn = midi_out
            .connect(&port, "MIDI-Pedal")
            .map_err(|e| anyhow::anyhow!("Failed to connect to output port: {}", e))?;

        Ok(Self { conn, port_name })
    }
}

impl MidiSink for PortSink {
    fn send(&mut self, bytes: &[u8]) -> Result<(), MidiOutputError> {
        self.conn.send(bytes)?;
        trace!("Sent: {}", format_hex(bytes));
        Ok(())
    }

    fn describe(&self) -> String {
        format!("port '{}'", self.port_name)
    }
}

/// Output written straight to a device node, e.g. a UART at 31250 baud.
///
/// Line settings are left to the OS (`stty`, udev rules).
pub struct DeviceSink {
    file: File,
    path: PathBuf,
}

impl DeviceSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open MIDI device {}", path.display()))?;
        info!("MIDI device opened: {}", path.display());
        Ok(Self { file, path })
    }
}

impl MidiSink for DeviceSink {
    fn send(&mut self, bytes: &[u8]) -> Result<(), MidiOutputError> {
        self.file
            .write_all(bytes)
            .and_then(|_| self.file.flush())
            .map_err(|source| MidiOutputError::Device {
                path: self.path.clone(),
                source,
            })?;
        trace!("Sent: {}", format_hex(bytes));
        Ok(())
    }

    fn describe(&self) -> String {
        format!("device {}", self.path.display())
    }
}

/// Discards everything; used when no output is configured
#[derive(Debug, Default)]
pub struct NullSink;

impl MidiSink for NullSink {
    fn send(&mut self, bytes: &[u8]) -> Result<(), MidiOutputError> {
        trace!("Dropped (no output): {}", format_hex(bytes));
        Ok(())
    }

    fn describe(&self) -> String {
        "no output".to_string()
    }
}

/// Test sink that records every message
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    sent: std::sync::Arc<parking_lot::Mutex<Vec<Vec<u8>>>>,
    fail: bool,
}

#[cfg(test)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every send fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }
}

#[cfg(test)]
impl MidiSink for RecordingSink {
    fn send(&mut self, bytes: &[u8]) -> Result<(), MidiOutputError> {
        if self.fail {
            return Err(MidiOutputError::Device {
                path: PathBuf::from("/dev/null"),
                source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"),
            });
        }
        self.sent.lock().push(bytes.to_vec());
        Ok(())
    }

    fn describe(&self) -> String {
        "recording".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_device_sink_writes_bytes() {
        let file = NamedTempFile::new().unwrap();
        let mut sink = DeviceSink::open(file.path()).unwrap();

        sink.send(&[0xB0, 80, 127]).unwrap();
        sink.send(&[0xC0, 5, 0]).unwrap();

        let written = std::fs::read(file.path()).unwrap();
        assert_eq!(written, vec![0xB0, 80, 127, 0xC0, 5, 0]);
        assert!(sink.describe().starts_with("device "));
    }

    #[test]
    fn test_device_sink_missing_node() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DeviceSink::open(dir.path().join("ttyAMA9")).is_err());
    }

    #[test]
    fn test_null_sink_accepts_everything() {
        let mut sink = NullSink;
        assert!(sink.send(&[0x90, 60, 100]).is_ok());
    }
}
