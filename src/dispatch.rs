//! MIDI dispatcher
//!
//! Walks a command list in order. Variable operations step the owning
//! button's variable (and persist it); every other command is resolved
//! against that variable and written to the sink. Nothing here fails the
//! caller: send errors are logged and the walk continues.

use crate::button::{ButtonId, ButtonVariable, VariableEngine};
use crate::command::{CommandKind, MidiCommand, MidiCommandList};
use crate::midi::{format_hex, MidiSink};
use crate::storage::Storage;
use tracing::{debug, trace, warn};

/// Encodes commands and writes them to a sink
#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher {
    compact_two_byte: bool,
}

/// What a single dispatch did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Messages written to the sink
    pub sent: usize,
    /// VAR_INC / VAR_DEC steps applied
    pub variable_ops: usize,
    /// Messages the sink rejected
    pub failed: usize,
}

impl Dispatcher {
    /// With `compact_two_byte` set, Program Change and Channel Pressure are
    /// sent as two bytes. Otherwise every message is three bytes, which is
    /// what existing receivers of the pedal expect.
    pub fn new(compact_two_byte: bool) -> Self {
        Self { compact_two_byte }
    }

    /// Wire bytes for `command`, `None` for variable operations
    pub fn encode(&self, command: &MidiCommand, variable: &ButtonVariable) -> Option<Vec<u8>> {
        let nibble = command.kind.status_nibble()?;
        let status = nibble | (command.channel.wrapping_sub(1) & 0x0F);
        let data1 = variable.resolve(command.data1) as u8;
        let data2 = variable.resolve(command.data2) as u8;

        let mut bytes = vec![status, data1, data2];
        if self.compact_two_byte {
            bytes.truncate(command.kind.message_len());
        }
        Some(bytes)
    }

    /// Execute `list` for `button`
    pub fn dispatch(
        &self,
        button: ButtonId,
        list: &MidiCommandList,
        variable: &mut ButtonVariable,
        sink: &mut dyn MidiSink,
        storage: &dyn Storage,
    ) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        let mut engine = VariableEngine::new(button, variable, storage);

        for command in list {
            match command.kind {
                CommandKind::VarIncrement => {
                    engine.increment();
                    outcome.variable_ops += 1;
                }
                CommandKind::VarDecrement => {
                    engine.decrement();
                    outcome.variable_ops += 1;
                }
                CommandKind::Unknown => {}
                _ => {
                    let Some(bytes) = self.encode(command, engine.variable()) else {
                        continue;
                    };
                    match sink.send(&bytes) {
                        Ok(()) => {
                            outcome.sent += 1;
                            trace!("Button {} -> {}", button, format_hex(&bytes));
                        }
                        Err(e) => {
                            outcome.failed += 1;
                            warn!("Button {}: {}", button, e);
                        }
                    }
                }
            }
        }

        debug!(
            "Button {} dispatched {} messages ({} variable ops, {} failed)",
            button, outcome.sent, outcome.variable_ops, outcome.failed
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::parse;
    use crate::midi::output::RecordingSink;
    use crate::storage::MemoryStorage;

    fn button(n: u8) -> ButtonId {
        ButtonId::new(n).unwrap()
    }

    #[test]
    fn test_two_control_changes() {
        let storage = MemoryStorage::new();
        let mut sink = RecordingSink::new();
        let mut variable = ButtonVariable::default();

        let list = parse("CC 1 80 127, CC 1 80 0");
        let outcome =
            Dispatcher::default().dispatch(button(1), &list, &mut variable, &mut sink, &storage);

        assert_eq!(outcome.sent, 2);
        assert_eq!(sink.sent(), vec![vec![0xB0, 0x50, 0x7F], vec![0xB0, 0x50, 0x00]]);
        assert_eq!(storage.write_count(), 0);
    }

    #[test]
    fn test_var_inc_then_var_reads_post_increment_value() {
        let storage = MemoryStorage::new();
        let mut sink = RecordingSink::new();
        let mut variable = ButtonVariable {
            min: 0,
            max: 56,
            value: 23,
            step: 1,
        };

        let list = parse("VAR_INC 1 1, CC 1 85 VAR, CC 1 85 127");
        let outcome =
            Dispatcher::default().dispatch(button(5), &list, &mut variable, &mut sink, &storage);

        assert_eq!(outcome.variable_ops, 1);
        assert_eq!(variable.value, 24);
        assert_eq!(sink.sent(), vec![vec![0xB0, 85, 24], vec![0xB0, 85, 127]]);
        assert_eq!(storage.get("/button5.var").unwrap(), "24\n0\n56\n1\n");
    }

    #[test]
    fn test_var_dec_wraps_to_max() {
        let storage = MemoryStorage::new();
        let mut sink = RecordingSink::new();
        let mut variable = ButtonVariable {
            min: 0,
            max: 56,
            value: 0,
            step: 1,
        };

        let list = parse("VAR_DEC 1 1, CC 1 85 VAR");
        Dispatcher::default().dispatch(button(5), &list, &mut variable, &mut sink, &storage);

        assert_eq!(variable.value, 56);
        assert_eq!(sink.sent(), vec![vec![0xB0, 85, 56]]);
    }

    #[test]
    fn test_status_byte_channel_mapping() {
        let variable = ButtonVariable::default();
        let dispatcher = Dispatcher::default();

        let encode = |text: &str| dispatcher.encode(&parse(text).as_slice()[0], &variable);

        assert_eq!(encode("NOTE_ON 10 36 127"), Some(vec![0x99, 36, 127]));
        assert_eq!(encode("NOTE_OFF 16 36 0"), Some(vec![0x8F, 36, 0]));
        assert_eq!(encode("PITCH_BEND 1 0 64"), Some(vec![0xE0, 0, 64]));
        // Channel 0 wraps onto channel 16 instead of corrupting the status
        assert_eq!(encode("CC 0 1 2"), Some(vec![0xBF, 1, 2]));
        assert_eq!(encode("VAR_INC 1 1"), None);
    }

    #[test]
    fn test_program_change_length() {
        let variable = ButtonVariable::default();
        let pc = parse("PC 3 12").as_slice()[0];

        assert_eq!(
            Dispatcher::new(false).encode(&pc, &variable),
            Some(vec![0xC2, 12, 0])
        );
        assert_eq!(
            Dispatcher::new(true).encode(&pc, &variable),
            Some(vec![0xC2, 12])
        );
    }

    #[test]
    fn test_data_truncated_to_byte() {
        let variable = ButtonVariable::default();
        let cc = parse("CC 1 300 -1").as_slice()[0];
        assert_eq!(
            Dispatcher::default().encode(&cc, &variable),
            Some(vec![0xB0, 44, 0xFF])
        );
    }

    #[test]
    fn test_sink_failure_does_not_stop_walk() {
        let storage = MemoryStorage::new();
        let mut sink = RecordingSink::failing();
        let mut variable = ButtonVariable::default();

        let list = parse("CC 1 80 127, VAR_INC 1 1, CC 1 80 0");
        let outcome =
            Dispatcher::default().dispatch(button(2), &list, &mut variable, &mut sink, &storage);

        assert_eq!(outcome.failed, 2);
        assert_eq!(outcome.sent, 0);
        assert_eq!(variable.value, 1);
        assert_eq!(storage.write_count(), 1);
    }
}
