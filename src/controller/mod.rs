//! Pedal controller
//!
//! Single owner of the six button configurations, their gesture detectors,
//! the MIDI sink and the storage collaborator. Everything that touches a
//! configuration runs here, one call at a time, so nothing is locked.
//!
//! The controller is synchronous; [`handle::ControllerHandle`] runs it inside
//! a tokio task and gives other tasks message-passing access.

pub mod handle;

pub use handle::{ControllerCommand, ControllerHandle};

use crate::button::{
    apply_factory_defaults, ButtonConfiguration, ButtonId, ButtonUpdate, ButtonView, BUTTON_COUNT,
};
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::gesture::{self, ButtonTiming, GestureDetector, GestureKind};
use crate::midi::MidiSink;
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

struct ButtonSlot {
    id: ButtonId,
    config: ButtonConfiguration,
    detector: GestureDetector,
}

/// One malformed entry found while applying an update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// `push`, `hold` or `double-push`
    pub list: String,
    pub message: String,
}

/// Result of applying a configuration update to one button
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub view: ButtonView,
    pub diagnostics: Vec<Diagnostic>,
    /// False when storage rejected at least one entry
    pub persisted: bool,
}

pub struct PedalController {
    buttons: Vec<ButtonSlot>,
    dispatcher: Dispatcher,
    sink: Box<dyn MidiSink>,
    storage: Arc<dyn Storage>,
}

impl PedalController {
    /// Load every button from storage, fill empty lists with factory defaults
    /// and derive detector timing.
    pub fn init(
        storage: Arc<dyn Storage>,
        sink: Box<dyn MidiSink>,
        dispatcher: Dispatcher,
        now: Instant,
    ) -> Self {
        let buttons = ButtonId::all()
            .map(|id| {
                let mut config = ButtonConfiguration::load(id, storage.as_ref());
                apply_factory_defaults(id, &mut config);
                let timing = ButtonTiming::for_configuration(&config);
                debug!(
                    "Button {}: {} push, {} hold, {} double-push, click window {:?}",
                    id,
                    config.push.len(),
                    config.hold.len(),
                    config.double_push.len(),
                    timing.click
                );
                ButtonSlot {
                    id,
                    config,
                    detector: GestureDetector::new(timing, now),
                }
            })
            .collect();

        info!("Pedal controller ready ({} buttons, output: {})", BUTTON_COUNT, sink.describe());

        Self {
            buttons,
            dispatcher,
            sink,
            storage,
        }
    }

    fn slot(&self, button: ButtonId) -> &ButtonSlot {
        &self.buttons[button.index()]
    }

    fn slot_mut(&mut self, button: ButtonId) -> &mut ButtonSlot {
        &mut self.buttons[button.index()]
    }

    pub fn configuration(&self, button: ButtonId) -> &ButtonConfiguration {
        &self.slot(button).config
    }

    pub fn timing(&self, button: ButtonId) -> ButtonTiming {
        self.slot(button).detector.timing()
    }

    /// Feed a raw level sample for `button`
    pub fn observe(&mut self, button: ButtonId, pressed: bool, at: Instant) {
        self.slot_mut(button).detector.observe(pressed, at);
    }

    /// Poll every detector and execute the gestures they complete.
    ///
    /// Returns the number of gestures handled.
    pub fn tick(&mut self, now: Instant) -> usize {
        let mut fired = Vec::new();
        for slot in &mut self.buttons {
            if slot.detector.is_idle(now) {
                continue;
            }
            fired.extend(slot.detector.tick(now).into_iter().map(|g| (slot.id, g)));
        }

        for &(button, gesture) in &fired {
            self.handle_gesture(button, gesture);
        }
        fired.len()
    }

    /// Run the command list `gesture` selects on `button`, if any
    pub fn handle_gesture(
        &mut self,
        button: ButtonId,
        gesture: GestureKind,
    ) -> Option<DispatchOutcome> {
        let slot = &mut self.buttons[button.index()];
        let Some(list_slot) = gesture::route(gesture, slot.config.flags) else {
            debug!("Button {} {}: inactive for this button", button, gesture);
            return None;
        };

        debug!("Button {} {} -> {} list", button, gesture, list_slot);
        let (list, variable) = slot.config.split_for_dispatch(list_slot);
        let outcome = self.dispatcher.dispatch(
            button,
            list,
            variable,
            self.sink.as_mut(),
            self.storage.as_ref(),
        );
        Some(outcome)
    }

    /// Apply a configuration update, persist the button and re-derive timing
    pub fn apply_update(&mut self, button: ButtonId, update: &ButtonUpdate) -> UpdateReport {
        let storage = Arc::clone(&self.storage);
        let slot = self.slot_mut(button);

        let diagnostics = slot
            .config
            .apply_update(update)
            .into_iter()
            .map(|(list, e)| {
                warn!("Button {} {} list: {}", button, list, e);
                Diagnostic {
                    list: list.to_string(),
                    message: e.to_string(),
                }
            })
            .collect();

        let persisted = slot.config.save(button, storage.as_ref()).is_ok();
        slot.detector
            .set_timing(ButtonTiming::for_configuration(&slot.config));

        info!("Button {} updated", button);
        UpdateReport {
            view: slot.config.view(button),
            diagnostics,
            persisted,
        }
    }

    pub fn view(&self, button: ButtonId) -> ButtonView {
        self.slot(button).config.view(button)
    }

    pub fn views(&self) -> Vec<ButtonView> {
        self.buttons.iter().map(|s| s.config.view(s.id)).collect()
    }

    /// Make pending storage writes durable
    pub fn shutdown(&mut self) {
        match self.storage.flush() {
            Ok(()) => info!("Pedal controller stopped"),
            Err(e) => warn!("Failed to flush storage on shutdown: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::output::RecordingSink;
    use crate::storage::{MemoryStorage, Storage};
    use std::time::Duration;

    fn button(n: u8) -> ButtonId {
        ButtonId::new(n).unwrap()
    }

    fn make_controller() -> (PedalController, Arc<MemoryStorage>, RecordingSink) {
        let storage = Arc::new(MemoryStorage::new());
        let sink = RecordingSink::new();
        let controller = PedalController::init(
            storage.clone(),
            Box::new(sink.clone()),
            Dispatcher::default(),
            Instant::now(),
        );
        (controller, storage, sink)
    }

    #[test]
    fn test_init_applies_factory_defaults() {
        let (controller, storage, _) = make_controller();
        let view = controller.view(button(1));
        assert_eq!(view.push, "CC 1 80 127,CC 1 80 0");
        assert!(controller.configuration(button(5)).flags.repeat_on_hold);
        // Defaults live in memory only until the page saves them
        assert_eq!(storage.write_count(), 0);
    }

    #[test]
    fn test_init_prefers_stored_lists() {
        let storage = Arc::new(MemoryStorage::new());
        storage.write("/button3.push", "NOTE_ON 2 60 100\n").unwrap();
        storage.write("/button3.doublepush", "PC 1 4\n").unwrap();

        let controller = PedalController::init(
            storage,
            Box::new(RecordingSink::new()),
            Dispatcher::default(),
            Instant::now(),
        );
        assert_eq!(controller.view(button(3)).push, "NOTE_ON 2 60 100");
        assert_eq!(controller.timing(button(3)).click, Duration::from_millis(400));
        assert_eq!(controller.timing(button(4)).click, Duration::from_millis(60));
    }

    #[test]
    fn test_click_sends_push_list() {
        let (mut controller, _, sink) = make_controller();
        let outcome = controller.handle_gesture(button(1), GestureKind::Click).unwrap();
        assert_eq!(outcome.sent, 2);
        assert_eq!(sink.sent(), vec![vec![0xB0, 80, 127], vec![0xB0, 80, 0]]);
    }

    #[test]
    fn test_hold_fires_once_without_repeat_flag() {
        let (mut controller, _, sink) = make_controller();

        assert!(controller
            .handle_gesture(button(1), GestureKind::DuringLongPress)
            .is_none());
        assert!(controller
            .handle_gesture(button(1), GestureKind::LongPressStart)
            .is_some());
        assert_eq!(sink.sent(), vec![vec![0xB0, 81, 127], vec![0xB0, 81, 0]]);
    }

    #[test]
    fn test_repeat_on_hold_uses_during_long_press() {
        let (mut controller, storage, sink) = make_controller();

        assert!(controller
            .handle_gesture(button(5), GestureKind::LongPressStart)
            .is_none());
        for _ in 0..3 {
            controller.handle_gesture(button(5), GestureKind::DuringLongPress);
        }

        assert_eq!(controller.view(button(5)).var_value, 26);
        let values: Vec<u8> = sink.sent().iter().step_by(2).map(|m| m[2]).collect();
        assert_eq!(values, vec![24, 25, 26]);
        assert_eq!(storage.write_count(), 3);
        assert_eq!(storage.get("/button5.var").unwrap(), "26\n0\n56\n1\n");
    }

    #[test]
    fn test_double_click_on_button_five_decrements() {
        let (mut controller, _, sink) = make_controller();
        controller.handle_gesture(button(5), GestureKind::DoubleClick);
        assert_eq!(controller.view(button(5)).var_value, 22);
        assert_eq!(sink.sent()[0], vec![0xB0, 85, 22]);
    }

    #[test]
    fn test_apply_update_persists_and_rederives_timing() {
        let (mut controller, storage, _) = make_controller();
        let id = button(2);
        assert_eq!(controller.timing(id).click, Duration::from_millis(60));

        let update = ButtonUpdate {
            push: "CC 2 10 127".to_string(),
            hold: "CC 2 11 127".to_string(),
            double_push: "CC 2 12 127, WHAT 1 2 3".to_string(),
            repeat_on_hold: false,
            var_min: 0,
            var_max: 10,
            var_value: 5,
        };
        let report = controller.apply_update(id, &update);

        assert!(report.persisted);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].list, "double-push");
        assert_eq!(report.view.double_push, "CC 2 12 127");
        assert_eq!(controller.timing(id).click, Duration::from_millis(400));
        assert_eq!(storage.get("/button2.push").unwrap(), "CC 2 10 127\n");
        assert_eq!(storage.get("/button2.var").unwrap(), "5\n0\n10\n1\n");

        // A fresh controller on the same storage sees the update
        let reloaded = PedalController::init(
            storage,
            Box::new(RecordingSink::new()),
            Dispatcher::default(),
            Instant::now(),
        );
        assert_eq!(reloaded.view(id), report.view);
    }

    #[test]
    fn test_tick_drives_detector_to_dispatch() {
        let (mut controller, _, sink) = make_controller();
        let t0 = Instant::now();
        let ms = Duration::from_millis;

        controller.observe(button(3), true, t0);
        let mut fired = 0;
        for t in (0..100).step_by(5) {
            fired += controller.tick(t0 + ms(t));
        }
        controller.observe(button(3), false, t0 + ms(100));
        for t in (100..300).step_by(5) {
            fired += controller.tick(t0 + ms(t));
        }

        assert_eq!(fired, 1);
        assert_eq!(sink.sent(), vec![vec![0xB0, 83, 127], vec![0xB0, 83, 0]]);
    }

    /// Hold `id` for `held_ms`, release, then let the detector settle
    fn hold_session(controller: &mut PedalController, id: ButtonId, held_ms: u64) -> usize {
        let t0 = Instant::now();
        let ms = Duration::from_millis;

        controller.observe(id, true, t0);
        let mut fired = 0;
        for t in (0..held_ms).step_by(5) {
            fired += controller.tick(t0 + ms(t));
        }
        controller.observe(id, false, t0 + ms(held_ms));
        for t in (held_ms..held_ms + 1500).step_by(5) {
            fired += controller.tick(t0 + ms(t));
        }
        fired
    }

    #[test]
    fn test_repeating_hold_session_fires_only_repeats() {
        let (mut controller, storage, sink) = make_controller();

        // Start and first repeat at 300 ms, then repeats at 600 and 900
        assert_eq!(hold_session(&mut controller, button(5), 1000), 4);
        assert_eq!(
            sink.sent(),
            vec![
                vec![0xB0, 85, 24],
                vec![0xB0, 85, 127],
                vec![0xB0, 85, 25],
                vec![0xB0, 85, 127],
                vec![0xB0, 85, 26],
                vec![0xB0, 85, 127],
            ]
        );
        assert_eq!(controller.view(button(5)).var_value, 26);
        assert_eq!(storage.write_count(), 3);
    }

    #[test]
    fn test_single_hold_session_fires_once() {
        let (mut controller, _, sink) = make_controller();

        // Same gestures as a repeating button, only the start is routed
        assert_eq!(hold_session(&mut controller, button(1), 1000), 4);
        assert_eq!(sink.sent(), vec![vec![0xB0, 81, 127], vec![0xB0, 81, 0]]);
    }

    #[test]
    fn test_views_cover_all_buttons() {
        let (controller, _, _) = make_controller();
        let views = controller.views();
        assert_eq!(views.len(), BUTTON_COUNT);
        assert_eq!(views[5].button, button(6));
        assert_eq!(views[5].repeat_flag_checked(), "checked");
    }
}
