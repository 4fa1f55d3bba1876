//! Factory defaults filled into empty command lists at boot

use super::{ButtonConfiguration, ButtonId};
use crate::command::{self, MidiCommandList};
use tracing::debug;

const B5_PUSH: &str = "VAR_INC 1 1, CC 1 85 VAR, CC 1 85 127";
const B5_DOUBLE_PUSH: &str = "VAR_DEC 1 1, CC 1 85 VAR, CC 1 85 127";

/// Fill empty lists of `button` with the factory layout.
///
/// Only empty lists are touched, so a list cleared through the configuration
/// page comes back on the next boot. Returns true if anything changed.
pub fn apply_factory_defaults(button: ButtonId, config: &mut ButtonConfiguration) -> bool {
    let mut changed = false;

    match button.number() {
        1 => {
            changed |= fill(&mut config.push, "CC 1 80 127, CC 1 80 0");
            changed |= fill(&mut config.hold, "CC 1 81 127, CC 1 81 0");
        }
        2 => {
            changed |= fill(&mut config.push, "CC 1 82 127, CC 1 82 0");
            changed |= fill(&mut config.hold, "CC 1 82 127, CC 1 82 0");
        }
        3 => changed |= fill(&mut config.push, "CC 1 83 127, CC 1 83 0"),
        4 => changed |= fill(&mut config.push, "CC 1 84 127, CC 1 84 0"),
        5 => {
            // The whole variable layout is keyed on an empty push list
            if config.push.is_empty() {
                config.push = command::parse(B5_PUSH);
                config.hold = command::parse(B5_PUSH);
                config.double_push = command::parse(B5_DOUBLE_PUSH);
                config.flags.repeat_on_hold = true;
                config.variable.min = 0;
                config.variable.max = 56;
                config.variable.value = 23;
                changed = true;
            }
        }
        6 => {
            changed |= fill(&mut config.push, "CC 1 86 127, CC 1 86 0");
            if config.hold.is_empty() {
                config.hold = command::parse("CC 1 87 127,CC 1 87 0");
                config.flags.repeat_on_hold = true;
                changed = true;
            }
        }
        _ => {}
    }

    if changed {
        debug!("Applied factory defaults to button {}", button);
    }
    changed
}

fn fill(list: &mut MidiCommandList, text: &str) -> bool {
    if list.is_empty() {
        *list = command::parse(text);
        true
    } else {
        false
    }
}
