//! BLE GATT remote
//!
//! Exposes one writable characteristic carrying the same binary opcodes as
//! the UDP remote. Reads return the last accepted frame so a remote can
//! resync its button state after reconnecting. The BlueZ-backed runner is
//! behind the `ble` feature; the frame handling itself is always compiled
//! and tested.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::controller::{Command, ControllerHandle};

/// Automation IO service / Digital characteristic, the assigned-number pair
/// the remotes pair against.
pub const SERVICE_UUID: u128 = 0x0000_1815_0000_1000_8000_00805f9b34fb;
pub const CHARACTERISTIC_UUID: u128 = 0x0000_2a56_0000_1000_8000_00805f9b34fb;

/// Shared state between the GATT read and write callbacks.
pub struct BleState {
    controller: ControllerHandle,
    last_frame: Mutex<Vec<u8>>,
}

impl BleState {
    pub fn new(controller: ControllerHandle) -> Arc<Self> {
        Arc::new(Self {
            controller,
            last_frame: Mutex::new(Vec::new()),
        })
    }

    /// Handle a characteristic write. Valid frames are queued to the
    /// controller and remembered for subsequent reads; malformed frames are
    /// dropped without erroring the write, matching the other fire-and-forget
    /// surfaces. Returns whether the frame was accepted.
    pub async fn handle_write(&self, data: &[u8]) -> bool {
        match Command::decode_frame(data) {
            Some(command) => {
                debug!("ble command: {command:?}");
                self.controller.apply_nowait(command).await;
                *self.last_frame.lock().await = data.to_vec();
                true
            }
            None => {
                warn!("dropping unrecognized BLE frame ({} bytes)", data.len());
                false
            }
        }
    }

    /// The last accepted frame, empty before any write.
    pub async fn last_frame(&self) -> Vec<u8> {
        self.last_frame.lock().await.clone()
    }
}

#[cfg(feature = "ble")]
pub use bluez::run_ble;

#[cfg(feature = "ble")]
mod bluez {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{Context, Result};
    use bluer::{
        adv::Advertisement,
        gatt::local::{
            Application, Characteristic, CharacteristicRead, CharacteristicWrite,
            CharacteristicWriteMethod, Service,
        },
        Uuid,
    };
    use tracing::{debug, info};

    use crate::config::BleConfig;
    use crate::controller::ControllerHandle;

    use super::{BleState, CHARACTERISTIC_UUID, SERVICE_UUID};

    /// Serve the GATT application until the controller actor goes away. The
    /// advertisement handle is held for the whole lifetime so the box keeps
    /// re-advertising after a central disconnects.
    pub async fn run_ble(controller: ControllerHandle, config: BleConfig) -> Result<()> {
        let session = bluer::Session::new()
            .await
            .context("Failed to open BlueZ session")?;
        let adapter = session
            .default_adapter()
            .await
            .context("No Bluetooth adapter available")?;
        adapter.set_powered(true).await?;

        let service_uuid = Uuid::from_u128(SERVICE_UUID);
        let characteristic_uuid = Uuid::from_u128(CHARACTERISTIC_UUID);

        let advertisement = Advertisement {
            service_uuids: [service_uuid].into_iter().collect(),
            discoverable: Some(true),
            local_name: Some(config.name.clone()),
            ..Default::default()
        };
        let adv_handle = adapter
            .advertise(advertisement)
            .await
            .context("Failed to start BLE advertising")?;
        info!(
            "BLE remote advertising as '{}' on adapter {}",
            config.name,
            adapter.name()
        );

        let state = BleState::new(controller.clone());

        let read_state = Arc::clone(&state);
        let write_state = Arc::clone(&state);
        let app = Application {
            services: vec![Service {
                uuid: service_uuid,
                primary: true,
                characteristics: vec![Characteristic {
                    uuid: characteristic_uuid,
                    read: Some(CharacteristicRead {
                        read: true,
                        fun: Box::new(move |_req| {
                            let state = Arc::clone(&read_state);
                            Box::pin(async move { Ok(state.last_frame().await) })
                        }),
                        ..Default::default()
                    }),
                    write: Some(CharacteristicWrite {
                        write: true,
                        write_without_response: true,
                        method: CharacteristicWriteMethod::Fun(Box::new(move |new_value, _req| {
                            let state = Arc::clone(&write_state);
                            Box::pin(async move {
                                state.handle_write(&new_value).await;
                                Ok(())
                            })
                        })),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        let app_handle = adapter
            .serve_gatt_application(app)
            .await
            .context("Failed to register GATT application")?;

        // Keep serving as long as the controller is around.
        while controller.is_alive() {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        debug!("controller gone, BLE remote stopping");

        drop(app_handle);
        drop(adv_handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ControllerActor, SelectionState, SelectionStore, StateController};
    use crate::hw::mock::RecordingMidiOut;
    use crate::model::{Bank, Patch};
    use tempfile::tempdir;

    fn spawn_controller(dir: &std::path::Path) -> ControllerHandle {
        let store = SelectionStore::spawn(dir.join("status.json"), SelectionState::default());
        let banks = vec![Bank {
            name: "Only".to_string(),
            patches: vec![
                Patch {
                    name: "One".to_string(),
                    loops: vec![],
                    midi_presets: vec![],
                    switch_targets: vec![],
                    active: true,
                },
                Patch {
                    name: "Two".to_string(),
                    loops: vec![],
                    midi_presets: vec![],
                    switch_targets: vec![],
                    active: false,
                },
            ],
            active: true,
        }];
        let controller = StateController::from_model(
            banks,
            vec![],
            Box::new(RecordingMidiOut::new()),
            store,
            SelectionState::default(),
        );
        ControllerActor::spawn(controller)
    }

    #[tokio::test]
    async fn test_accepted_write_is_queued_and_remembered() {
        let dir = tempdir().unwrap();
        let handle = spawn_controller(dir.path());
        let state = BleState::new(handle.clone());

        assert!(state.handle_write(&[0x03, 0x01]).await);
        assert_eq!(state.last_frame().await, vec![0x03, 0x01]);

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.patch.as_deref(), Some("Two"));
    }

    #[tokio::test]
    async fn test_malformed_write_is_dropped() {
        let dir = tempdir().unwrap();
        let handle = spawn_controller(dir.path());
        let state = BleState::new(handle.clone());

        assert!(state.handle_write(&[0x03, 0x00]).await);
        assert!(!state.handle_write(&[0xAA]).await);
        assert!(!state.handle_write(&[]).await);

        // The rejected frames neither reach the controller nor the read value
        assert_eq!(state.last_frame().await, vec![0x03, 0x00]);
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.patch.as_deref(), Some("One"));
    }
}
