//! Patch model: the in-memory entities built once from configuration.
//!
//! Only `active` flags change after startup, and only the state controller
//! is allowed to change them.

mod patch;

pub use patch::{Bank, FootSwitch, Loop, MidiPreset, Patch, Pedal};
