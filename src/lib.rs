//! BrainBox - pedalboard patch controller
//!
//! Banks of patches drive relay footswitches and MIDI Program Changes.
//! Three remote surfaces (HTTP+SSE, binary UDP, BLE GATT) feed one
//! serialized state machine; the active selection is persisted to disk and
//! restored on startup.

pub mod config;
pub mod controller;
pub mod hw;
pub mod midi;
pub mod model;
pub mod server;
