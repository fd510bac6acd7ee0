//! Periodic state broadcaster
//!
//! A single ticker snapshots the controller and fans the JSON out through a
//! `tokio::sync::broadcast` channel. Every SSE subscriber holds a receiver;
//! when nobody is subscribed the tick skips the snapshot entirely, so an idle
//! box does no serialization work.

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::controller::ControllerHandle;

/// Capacity of the broadcast channel. A slow subscriber that lags simply
/// misses intermediate frames; the next one carries the full state anyway.
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

pub fn event_channel() -> broadcast::Sender<String> {
    broadcast::channel(EVENT_CHANNEL_CAPACITY).0
}

/// Run the broadcast loop until the controller actor goes away.
pub async fn run_broadcaster(
    controller: ControllerHandle,
    events: broadcast::Sender<String>,
    interval_ms: u64,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    debug!("state broadcaster started ({interval_ms}ms interval)");

    loop {
        ticker.tick().await;

        if events.receiver_count() == 0 {
            trace!("no SSE subscribers, skipping broadcast");
            continue;
        }

        let Some(snapshot) = controller.snapshot().await else {
            debug!("controller gone, broadcaster stopping");
            return;
        };

        match serde_json::to_string(&snapshot) {
            Ok(json) => {
                let _ = events.send(json);
            }
            Err(e) => warn!("failed to serialize state snapshot: {e}"),
        }
    }
}
