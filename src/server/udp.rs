//! Binary UDP remote
//!
//! One task owns the socket: it receives command frames on the rx port and,
//! when the checksummed variant is configured, pushes a small telemetry
//! packet back to every known sender on the tx port. Senders become peers as
//! soon as a datagram arrives, before the frame is validated, so even a
//! remote with a broken checksum implementation gets state feedback.

use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

use crate::config::UdpConfig;
use crate::controller::command::{strip_checksum, xor_checksum};
use crate::controller::{Command, ControllerHandle, StateSnapshot};

/// Command frames are tiny; anything longer is garbage we still want to read
/// off the socket in one go.
const RECV_BUFFER_LEN: usize = 32;

/// Marker for "no active patch" in the telemetry patch byte.
const NO_PATCH: u8 = 0xFF;

/// Build the 3-byte telemetry packet: bank index, patch index (or the
/// no-patch marker after a bank change), trailing XOR checksum.
fn telemetry_packet(snapshot: &StateSnapshot) -> [u8; 3] {
    let bank = snapshot.bank_index.min(u8::MAX as usize) as u8;
    let patch = match &snapshot.patch {
        Some(_) => snapshot.patch_index.min(u8::MAX as usize - 1) as u8,
        None => NO_PATCH,
    };
    [bank, patch, xor_checksum(&[bank, patch])]
}

/// Run the UDP remote until the controller actor goes away.
pub async fn run_udp(controller: ControllerHandle, config: UdpConfig) -> Result<()> {
    let socket = UdpSocket::bind(("0.0.0.0", config.rx_port))
        .await
        .with_context(|| format!("Failed to bind UDP remote on port {}", config.rx_port))?;
    info!(
        "UDP remote listening on port {} (checksum: {})",
        config.rx_port, config.checksum
    );

    let mut peers: HashSet<IpAddr> = HashSet::new();
    let mut buf = [0u8; RECV_BUFFER_LEN];
    let mut telemetry = tokio::time::interval(Duration::from_millis(config.telemetry_interval_ms));
    telemetry.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, from) = match received {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("UDP receive failed: {e}");
                        continue;
                    }
                };
                if peers.insert(from.ip()) {
                    debug!("new UDP peer {}", from.ip());
                }

                let frame = &buf[..len];
                let payload = if config.checksum {
                    match strip_checksum(frame) {
                        Some(payload) => payload,
                        None => {
                            warn!("dropping UDP frame from {} with bad checksum", from.ip());
                            continue;
                        }
                    }
                } else {
                    frame
                };

                match Command::decode_frame(payload) {
                    Some(command) => {
                        debug!("udp command from {}: {command:?}", from.ip());
                        controller.apply_nowait(command).await;
                    }
                    None => trace!("dropping unrecognized UDP frame from {}", from.ip()),
                }
            }

            _ = telemetry.tick(), if config.checksum && !peers.is_empty() => {
                let Some(snapshot) = controller.snapshot().await else {
                    debug!("controller gone, UDP remote stopping");
                    return Ok(());
                };
                let packet = telemetry_packet(&snapshot);

                let mut gone = Vec::new();
                for peer in &peers {
                    if let Err(e) = socket.send_to(&packet, (*peer, config.tx_port)).await {
                        debug!("dropping unreachable UDP peer {peer}: {e}");
                        gone.push(*peer);
                    }
                }
                for peer in gone {
                    peers.remove(&peer);
                }
            }
        }
    }
}
