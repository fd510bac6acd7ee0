//! Persisted bank/patch selection
//!
//! A small file-backed store for the two integers that survive restarts:
//! `active_bank_index` and `active_patch_index`. Each is written
//! independently at the moment its selection changes, so the file, not the
//! in-memory flags, is the ground truth after a crash.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// The persisted selection pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionState {
    #[serde(default)]
    pub active_bank_index: usize,
    #[serde(default)]
    pub active_patch_index: usize,
}

impl SelectionState {
    /// Read the selection file synchronously at startup. A missing or
    /// unreadable file yields the `(0, 0)` default.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(state) => {
                    debug!("loaded selection from {}: {:?}", path.display(), state);
                    state
                }
                Err(e) => {
                    warn!(
                        "selection file {} is corrupt ({}), starting from defaults",
                        path.display(),
                        e
                    );
                    SelectionState::default()
                }
            },
            Err(_) => {
                debug!(
                    "no selection file at {}, starting from defaults",
                    path.display()
                );
                SelectionState::default()
            }
        }
    }
}

/// Commands for the selection store actor.
#[derive(Debug)]
pub enum SelectionCommand {
    SaveBankIndex(usize),
    SavePatchIndex(usize),
    /// Wait until all previously queued saves hit the disk.
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Actor owning the selection file. Saves are fire-and-forget from the
/// controller's point of view; the channel preserves write order.
pub struct SelectionStore {
    path: PathBuf,
    state: SelectionState,
    command_rx: mpsc::UnboundedReceiver<SelectionCommand>,
    /// Set after a write failed twice; cleared by the next success.
    degraded: bool,
}

/// Handle to the selection store actor. Cheap to clone.
#[derive(Clone)]
pub struct SelectionStoreHandle {
    cmd_tx: mpsc::UnboundedSender<SelectionCommand>,
}

impl SelectionStore {
    /// Spawn the store actor seeded with the state loaded at startup.
    pub fn spawn(path: impl Into<PathBuf>, initial: SelectionState) -> SelectionStoreHandle {
        let (cmd_tx, command_rx) = mpsc::unbounded_channel();
        let store = SelectionStore {
            path: path.into(),
            state: initial,
            command_rx,
            degraded: false,
        };
        tokio::spawn(store.run());
        SelectionStoreHandle { cmd_tx }
    }

    async fn run(mut self) {
        debug!("selection store started for {}", self.path.display());

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                SelectionCommand::SaveBankIndex(index) => {
                    self.state.active_bank_index = index;
                    self.write().await;
                }
                SelectionCommand::SavePatchIndex(index) => {
                    self.state.active_patch_index = index;
                    self.write().await;
                }
                SelectionCommand::Flush(reply) => {
                    // All earlier saves have already been processed in order.
                    let _ = reply.send(());
                }
                SelectionCommand::Shutdown => {
                    info!("selection store shutting down");
                    return;
                }
            }
        }
    }

    /// Write the current state. One retry on failure, then the store logs the
    /// failure as a degraded-mode indicator and keeps running: losing the
    /// write means a wrong selection on restart, which the operator needs to
    /// know about.
    async fn write(&mut self) {
        match self.try_write().await {
            Ok(()) => {
                if self.degraded {
                    info!("selection file write recovered");
                    self.degraded = false;
                }
            }
            Err(first) => {
                warn!("selection file write failed, retrying: {first:#}");
                if let Err(second) = self.try_write().await {
                    if !self.degraded {
                        error!(
                            "selection file {} is not writable; the active patch will be \
                             wrong after a restart: {second:#}",
                            self.path.display()
                        );
                        self.degraded = true;
                    }
                }
            }
        }
    }

    async fn try_write(&self) -> Result<()> {
        let json =
            serde_json::to_string_pretty(&self.state).context("Failed to serialize selection")?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

impl SelectionStoreHandle {
    /// Record a bank selection. Fire-and-forget; ordered with other saves.
    pub fn save_bank_index(&self, index: usize) {
        let _ = self.cmd_tx.send(SelectionCommand::SaveBankIndex(index));
    }

    /// Record a patch selection. Fire-and-forget; ordered with other saves.
    pub fn save_patch_index(&self, index: usize) {
        let _ = self.cmd_tx.send(SelectionCommand::SavePatchIndex(index));
    }

    /// Wait for all queued saves to complete.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(SelectionCommand::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(SelectionCommand::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_missing_file_defaults() {
        let temp = tempdir().unwrap();
        let state = SelectionState::load(temp.path().join("missing.json"));
        assert_eq!(state, SelectionState::default());
    }

    #[test]
    fn test_load_corrupt_file_defaults() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("status.json");
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(SelectionState::load(&path), SelectionState::default());
    }

    #[tokio::test]
    async fn test_saves_are_persisted_independently() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("status.json");

        let handle = SelectionStore::spawn(&path, SelectionState::default());
        handle.save_bank_index(2);
        handle.flush().await;

        let state = SelectionState::load(&path);
        assert_eq!(state.active_bank_index, 2);
        assert_eq!(state.active_patch_index, 0);

        handle.save_patch_index(1);
        handle.flush().await;

        let state = SelectionState::load(&path);
        assert_eq!(state.active_bank_index, 2);
        assert_eq!(state.active_patch_index, 1);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_seeded_state_preserved_across_partial_updates() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("status.json");

        let initial = SelectionState {
            active_bank_index: 3,
            active_patch_index: 7,
        };
        let handle = SelectionStore::spawn(&path, initial);

        // Only the patch index changes; the seeded bank index must survive
        handle.save_patch_index(0);
        handle.flush().await;

        let state = SelectionState::load(&path);
        assert_eq!(state.active_bank_index, 3);
        assert_eq!(state.active_patch_index, 0);

        handle.shutdown();
    }
}
