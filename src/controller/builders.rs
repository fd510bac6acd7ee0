//! Model construction from configuration
//!
//! Builds the Pedal/Loop/FootSwitch/Patch/Bank graph once at startup. Only
//! the patch matching the persisted `(bank, patch)` pair starts active.

use std::sync::Arc;

use tracing::warn;

use crate::config::{AppConfig, FootSwitchConfig};
use crate::hw::{MidiOut, SwitchPin};
use crate::model::{Bank, FootSwitch, Loop, Patch, Pedal};

use super::persistence::{SelectionState, SelectionStoreHandle};
use super::StateController;

/// Build the full controller from configuration and the persisted selection.
///
/// `pin_factory` supplies the output pin for each configured footswitch, so
/// the caller decides which hardware backend is wired in. Malformed MIDI
/// preset entries are skipped with a warning; loading continues.
pub fn build_controller(
    config: &AppConfig,
    persisted: SelectionState,
    selection: SelectionStoreHandle,
    midi_out: Box<dyn MidiOut>,
    mut pin_factory: impl FnMut(&FootSwitchConfig) -> Box<dyn SwitchPin>,
) -> StateController {
    let pedals: Vec<Arc<Pedal>> = config
        .pedals
        .iter()
        .map(|p| {
            Arc::new(Pedal {
                id: p.id,
                name: p.name.clone(),
            })
        })
        .collect();

    let mut footswitches: Vec<FootSwitch> = config
        .footswitches
        .iter()
        .map(|sw| FootSwitch::new(sw.name.clone(), sw.pin, pin_factory(sw)))
        .collect();
    // Positional alignment with patch target sequences is by pin number
    footswitches.sort_by_key(|sw| sw.order());

    let banks: Vec<Bank> = config
        .banks
        .iter()
        .enumerate()
        .map(|(bank_index, bank_cfg)| {
            let patches = bank_cfg
                .patches
                .iter()
                .enumerate()
                .map(|(patch_index, patch_cfg)| {
                    let mut loops: Vec<Loop> = pedals
                        .iter()
                        .map(|pedal| {
                            Loop::new(Arc::clone(pedal), patch_cfg.loops.contains(&pedal.id))
                        })
                        .collect();
                    // Loop positions follow pedal ids, not catalog listing order
                    loops.sort_by_key(|l| l.order);

                    let midi_presets = patch_cfg
                        .midi
                        .iter()
                        .filter_map(|entry| match entry.resolve() {
                            Some((channel, program)) => {
                                Some(crate::model::MidiPreset { channel, program })
                            }
                            None => {
                                warn!(
                                    "skipping malformed midi preset {:?} in patch '{}'",
                                    entry, patch_cfg.name
                                );
                                None
                            }
                        })
                        .collect();

                    Patch {
                        name: patch_cfg.name.clone(),
                        loops,
                        midi_presets,
                        switch_targets: patch_cfg
                            .switch_targets
                            .iter()
                            .map(|t| t.engaged())
                            .collect(),
                        active: bank_index == persisted.active_bank_index
                            && patch_index == persisted.active_patch_index,
                    }
                })
                .collect();

            Bank {
                name: bank_cfg.name.clone(),
                patches,
                active: bank_index == persisted.active_bank_index,
            }
        })
        .collect();

    StateController::from_model(banks, footswitches, midi_out, selection, persisted)
}
