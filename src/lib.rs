//! MIDI Pedal
//!
//! Six foot buttons, each mapping click, double-click and hold gestures to
//! configurable MIDI command sequences, with a per-button variable that
//! commands can step and send.

pub mod api;
pub mod button;
pub mod command;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod gesture;
pub mod midi;
pub mod paths;
pub mod storage;
