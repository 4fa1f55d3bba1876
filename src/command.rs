//! Command codec for button command lists
//!
//! Parses the textual command-list grammar used by the configuration page and
//! the on-disk button files into structured MIDI commands, and serializes
//! command lists back to the same grammar.
//!
//! ```text
//! CC 1 80 127, CC 1 80 0
//! VAR_INC 1 1, CC 1 85 VAR, CC 1 85 127
//! ```
//!
//! Each comma-separated entry is `TYPE CHANNEL DATA1 DATA2`. The literal `VAR`
//! in a data position is replaced by the button variable at send time.

use std::fmt;
use thiserror::Error;

/// Maximum number of commands stored per gesture
pub const MAX_COMMANDS: usize = 32;

/// Data value meaning "substitute the current button variable".
///
/// Outside the legal MIDI data range (0-127).
pub const VAR_SENTINEL: i32 = -255;

/// Token used for [`VAR_SENTINEL`] in the text grammar
pub const VAR_TOKEN: &str = "VAR";

/// Kind of a command entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    NoteOff,
    NoteOn,
    KeyPressure,
    ControlChange,
    ProgramChange,
    ChannelPressure,
    PitchBend,
    /// Pseudo-command: increment the button variable
    VarIncrement,
    /// Pseudo-command: decrement the button variable
    VarDecrement,
    /// Unrecognized keyword, never stored in a list
    Unknown,
}

impl CommandKind {
    /// All kinds that can appear in a finalized list
    pub const ALL: [CommandKind; 9] = [
        CommandKind::NoteOff,
        CommandKind::NoteOn,
        CommandKind::KeyPressure,
        CommandKind::ControlChange,
        CommandKind::ProgramChange,
        CommandKind::ChannelPressure,
        CommandKind::PitchBend,
        CommandKind::VarIncrement,
        CommandKind::VarDecrement,
    ];

    /// Match a TYPE token (exact, case-sensitive)
    pub fn from_keyword(token: &str) -> Self {
        match token {
            "NOTE_OFF" => CommandKind::NoteOff,
            "NOTE_ON" => CommandKind::NoteOn,
            "KEY_PRESSURE" => CommandKind::KeyPressure,
            "CC" => CommandKind::ControlChange,
            "PC" => CommandKind::ProgramChange,
            "CHANNEL_PRESSURE" => CommandKind::ChannelPressure,
            "PITCH_BEND" => CommandKind::PitchBend,
            "VAR_INC" => CommandKind::VarIncrement,
            "VAR_DEC" => CommandKind::VarDecrement,
            _ => CommandKind::Unknown,
        }
    }

    /// Keyword written back by the serializer
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            CommandKind::NoteOff => Some("NOTE_OFF"),
            CommandKind::NoteOn => Some("NOTE_ON"),
            CommandKind::KeyPressure => Some("KEY_PRESSURE"),
            CommandKind::ControlChange => Some("CC"),
            CommandKind::ProgramChange => Some("PC"),
            CommandKind::ChannelPressure => Some("CHANNEL_PRESSURE"),
            CommandKind::PitchBend => Some("PITCH_BEND"),
            CommandKind::VarIncrement => Some("VAR_INC"),
            CommandKind::VarDecrement => Some("VAR_DEC"),
            CommandKind::Unknown => None,
        }
    }

    /// High nibble of the MIDI status byte, `None` for pseudo-commands
    pub fn status_nibble(self) -> Option<u8> {
        match self {
            CommandKind::NoteOff => Some(0x80),
            CommandKind::NoteOn => Some(0x90),
            CommandKind::KeyPressure => Some(0xA0),
            CommandKind::ControlChange => Some(0xB0),
            CommandKind::ProgramChange => Some(0xC0),
            CommandKind::ChannelPressure => Some(0xD0),
            CommandKind::PitchBend => Some(0xE0),
            _ => None,
        }
    }

    /// Canonical MIDI message length in bytes (status included)
    pub fn message_len(self) -> usize {
        match self {
            CommandKind::ProgramChange | CommandKind::ChannelPressure => 2,
            _ => 3,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword().unwrap_or("UNKNOWN"))
    }
}

/// One entry of a command list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiCommand {
    pub kind: CommandKind,
    /// Channel as written by the user (1-16)
    pub channel: u8,
    pub data1: i32,
    pub data2: i32,
}

impl MidiCommand {
    pub fn new(kind: CommandKind, channel: u8, data1: i32, data2: i32) -> Self {
        Self {
            kind,
            channel,
            data1,
            data2,
        }
    }

    /// Canonical text form, `None` for unknown kinds
    pub fn to_text(&self) -> Option<String> {
        let keyword = self.kind.keyword()?;
        Some(format!(
            "{} {} {} {}",
            keyword,
            self.channel,
            data_token(self.data1),
            data_token(self.data2)
        ))
    }
}

fn data_token(value: i32) -> String {
    if value == VAR_SENTINEL {
        VAR_TOKEN.to_string()
    } else {
        value.to_string()
    }
}

/// Ordered list of up to [`MAX_COMMANDS`] commands
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MidiCommandList {
    commands: Vec<MidiCommand>,
}

impl MidiCommandList {
    /// Append a command. Returns `false` (and drops it) when the list is full
    /// or the command kind is unknown.
    pub fn push(&mut self, command: MidiCommand) -> bool {
        if command.kind == CommandKind::Unknown || self.is_full() {
            return false;
        }
        self.commands.push(command);
        true
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.commands.len() >= MAX_COMMANDS
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MidiCommand> {
        self.commands.iter()
    }

    pub fn as_slice(&self) -> &[MidiCommand] {
        &self.commands
    }

    /// Serialize back to the text grammar
    pub fn to_text(&self) -> String {
        serialize(self)
    }
}

impl<'a> IntoIterator for &'a MidiCommandList {
    type Item = &'a MidiCommand;
    type IntoIter = std::slice::Iter<'a, MidiCommand>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}

/// Non-fatal problem found while parsing a command list
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown command type '{token}' in '{offending}'")]
    UnknownType { token: String, offending: String },

    #[error("command list full ({max} commands), dropped '{offending}'", max = MAX_COMMANDS)]
    Truncated { offending: String },
}

/// Parsed list plus the sub-commands that were skipped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseReport {
    pub commands: MidiCommandList,
    pub errors: Vec<ParseError>,
}

/// Parse a comma-separated command list, dropping anything malformed
pub fn parse(text: &str) -> MidiCommandList {
    parse_with_report(text).commands
}

/// Parse a comma-separated command list and collect diagnostics
pub fn parse_with_report(text: &str) -> ParseReport {
    let mut report = ParseReport::default();

    for segment in text.split(',') {
        if segment.trim().is_empty() {
            continue;
        }

        let tokens = split_tokens(segment);
        let kind = CommandKind::from_keyword(tokens[0]);

        if kind == CommandKind::Unknown {
            tracing::debug!("Unknown command type '{}' in '{}'", tokens[0], segment);
            report.errors.push(ParseError::UnknownType {
                token: tokens[0].to_string(),
                offending: segment.to_string(),
            });
            continue;
        }

        let command = MidiCommand {
            kind,
            channel: lenient_int(tokens[1]) as u8,
            data1: parse_data(tokens[2]),
            data2: parse_data(tokens[3]),
        };

        if !report.commands.push(command) {
            report.errors.push(ParseError::Truncated {
                offending: segment.to_string(),
            });
        }
    }

    report
}

/// Serialize a list as `TYPE CH D1 D2` entries joined by commas
pub fn serialize(list: &MidiCommandList) -> String {
    list.iter()
        .filter_map(MidiCommand::to_text)
        .collect::<Vec<_>>()
        .join(",")
}

/// Skip leading spaces, then split on single spaces into exactly four slots.
///
/// Consecutive spaces yield empty tokens and extra tokens are ignored, which
/// is how existing button files have always been read.
fn split_tokens(segment: &str) -> [&str; 4] {
    let mut tokens = [""; 4];
    let trimmed = segment.trim_start_matches(' ');
    for (slot, token) in tokens.iter_mut().zip(trimmed.split(' ')) {
        *slot = token;
    }
    tokens
}

fn parse_data(token: &str) -> i32 {
    if token == VAR_TOKEN {
        VAR_SENTINEL
    } else {
        lenient_int(token)
    }
}

/// Leading whitespace, optional sign, then digits; anything else reads as 0.
pub(crate) fn lenient_int(token: &str) -> i32 {
    let s = token.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut value: i64 = 0;
    for b in digits.bytes() {
        if !b.is_ascii_digit() {
            break;
        }
        value = (value * 10 + i64::from(b - b'0')).min(i64::from(i32::MAX) + 1);
    }

    let value = if negative { -value } else { value };
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_input() {
        let list = parse("");
        assert_eq!(list.len(), 0);
        assert!(list.is_empty());
        assert_eq!(serialize(&list), "");
    }

    #[test]
    fn test_two_control_changes() {
        let list = parse("CC 1 80 127, CC 1 80 0");
        assert_eq!(list.len(), 2);
        assert_eq!(
            list.as_slice(),
            &[
                MidiCommand::new(CommandKind::ControlChange, 1, 80, 127),
                MidiCommand::new(CommandKind::ControlChange, 1, 80, 0),
            ]
        );
    }

    #[test]
    fn test_variable_placeholder() {
        let list = parse("VAR_INC 1 1, CC 1 85 VAR, CC 1 85 127");
        assert_eq!(list.len(), 3);
        assert_eq!(list.as_slice()[0].kind, CommandKind::VarIncrement);
        assert_eq!(list.as_slice()[0].data1, 1);
        assert_eq!(list.as_slice()[0].data2, 0);
        assert_eq!(list.as_slice()[1].data1, 85);
        assert_eq!(list.as_slice()[1].data2, VAR_SENTINEL);
        assert_eq!(list.as_slice()[2].data2, 127);
    }

    #[test]
    fn test_unknown_type_skipped() {
        let report = parse_with_report("CC 1 80 127, SYSEX 1 2 3, NOTE_ON 2 60 100");
        assert_eq!(report.commands.len(), 2);
        assert_eq!(report.commands.as_slice()[1].kind, CommandKind::NoteOn);
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(
            &report.errors[0],
            ParseError::UnknownType { token, .. } if token == "SYSEX"
        ));
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        assert!(parse("cc 1 80 127").is_empty());
    }

    #[test]
    fn test_truncates_at_capacity() {
        let text = (0..40)
            .map(|i| format!("NOTE_ON 1 {} 100", i))
            .collect::<Vec<_>>()
            .join(",");
        let report = parse_with_report(&text);
        assert_eq!(report.commands.len(), MAX_COMMANDS);
        assert_eq!(report.commands.as_slice()[31].data1, 31);
        assert_eq!(report.errors.len(), 8);
        assert!(matches!(report.errors[0], ParseError::Truncated { .. }));
    }

    #[test]
    fn test_leading_spaces_and_missing_fields() {
        let list = parse("   PC 3 12");
        assert_eq!(
            list.as_slice(),
            &[MidiCommand::new(CommandKind::ProgramChange, 3, 12, 0)]
        );
    }

    #[test]
    fn test_double_space_yields_empty_token() {
        // "CC 1  80 127" splits into ["CC", "1", "", "80"]
        let list = parse("CC 1  80 127");
        assert_eq!(
            list.as_slice(),
            &[MidiCommand::new(CommandKind::ControlChange, 1, 0, 80)]
        );
    }

    #[test]
    fn test_trailing_comma_and_carriage_return() {
        let list = parse("CC 1 87 127,CC 1 87 0,");
        assert_eq!(list.len(), 2);

        let list = parse("NOTE_ON 10 36 127\r");
        assert_eq!(list.as_slice()[0].data2, 127);
    }

    #[test]
    fn test_serialize_canonical_form() {
        let list = parse("VAR_DEC 1 1,  CC 1 85 VAR, CC 1 85 127");
        assert_eq!(serialize(&list), "VAR_DEC 1 1 0,CC 1 85 VAR,CC 1 85 127");
    }

    #[test]
    fn test_lenient_int() {
        assert_eq!(lenient_int("42"), 42);
        assert_eq!(lenient_int(" -7"), -7);
        assert_eq!(lenient_int("+3"), 3);
        assert_eq!(lenient_int("12abc"), 12);
        assert_eq!(lenient_int("abc"), 0);
        assert_eq!(lenient_int(""), 0);
        assert_eq!(lenient_int("99999999999"), i32::MAX);
    }

    #[test]
    fn test_kind_wire_properties() {
        assert_eq!(CommandKind::ControlChange.status_nibble(), Some(0xB0));
        assert_eq!(CommandKind::VarIncrement.status_nibble(), None);
        assert_eq!(CommandKind::ProgramChange.message_len(), 2);
        assert_eq!(CommandKind::PitchBend.message_len(), 3);
        for kind in CommandKind::ALL {
            let keyword = kind.keyword().unwrap();
            assert_eq!(CommandKind::from_keyword(keyword), kind);
        }
    }

    fn command_strategy() -> impl Strategy<Value = String> {
        let data = prop_oneof![
            (0i32..128).prop_map(|v| v.to_string()),
            Just(VAR_TOKEN.to_string()),
        ];
        (
            prop::sample::select(CommandKind::ALL.to_vec()),
            1u8..=16,
            data.clone(),
            data,
        )
            .prop_map(|(kind, channel, d1, d2)| {
                format!("{} {} {} {}", kind.keyword().unwrap(), channel, d1, d2)
            })
    }

    proptest! {
        #[test]
        fn prop_serialize_is_idempotent(
            commands in prop::collection::vec(command_strategy(), 0..40),
            separator in prop::sample::select(vec![",", ", ", ",  "]),
        ) {
            let text = commands.join(separator);
            let first = parse(&text);
            let serialized = serialize(&first);
            let second = parse(&serialized);
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(serialize(&second), serialized);
            prop_assert_eq!(first.len(), commands.len().min(MAX_COMMANDS));
        }
    }
}
