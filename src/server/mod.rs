//! Remote control surfaces
//!
//! Three independent front doors (HTTP+SSE, binary UDP, BLE GATT) that all
//! normalize input to [`crate::controller::Command`] and submit it through
//! the controller handle. None of them touch state directly.

pub mod ble;
pub mod broadcast;
pub mod http;
pub mod page;
pub mod udp;

pub use broadcast::{event_channel, run_broadcaster};
pub use http::{run_http, HttpState};
pub use udp::run_udp;

#[cfg(feature = "ble")]
pub use ble::run_ble;
