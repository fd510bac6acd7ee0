//! State controller - the authoritative bank/patch state machine
//!
//! [`StateController`] is the only place where `active` flags change, hardware
//! side effects fire, and the selection is persisted. It runs inside a single
//! actor task ([`actor::ControllerActor`]) so that commands from HTTP, UDP,
//! and BLE never interleave mid-transition.

pub mod actor;
pub mod builders;
pub mod command;
pub mod persistence;
pub mod snapshot;

#[cfg(test)]
mod tests;

pub use actor::{ControllerActor, ControllerHandle};
pub use builders::build_controller;
pub use command::Command;
pub use persistence::{SelectionState, SelectionStore, SelectionStoreHandle};
pub use snapshot::StateSnapshot;

use tracing::{debug, info, warn};

use crate::hw::MidiOut;
use crate::model::{Bank, FootSwitch, Patch};

/// Position of a patch within the bank list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchRef {
    pub bank_index: usize,
    pub patch_index: usize,
}

/// The authoritative state machine.
///
/// Owns the banks, the global footswitch set (ordered by pin), and the MIDI
/// output. The two `*_index` fields mirror what the selection store last
/// persisted; after a crash the file wins, so they are never read back from
/// the in-memory flags.
pub struct StateController {
    banks: Vec<Bank>,
    footswitches: Vec<FootSwitch>,
    midi_out: Box<dyn MidiOut>,
    selection: SelectionStoreHandle,
    active_bank_index: usize,
    active_patch_index: usize,
    active_bank_name: String,
    active_patch_name: String,
}

impl StateController {
    /// Assemble a controller from prebuilt model parts and replay the
    /// persisted selection against the hardware.
    ///
    /// Exactly the patch at the persisted `(bank, patch)` position starts
    /// active; out-of-range persisted indices leave no bank or patch active
    /// until a remote selects one.
    pub(crate) fn from_model(
        banks: Vec<Bank>,
        footswitches: Vec<FootSwitch>,
        midi_out: Box<dyn MidiOut>,
        selection: SelectionStoreHandle,
        persisted: SelectionState,
    ) -> Self {
        let active_bank_name = banks
            .iter()
            .find(|b| b.active)
            .map(|b| b.name.clone())
            .unwrap_or_default();
        let active_patch_name = banks
            .iter()
            .find(|b| b.active)
            .and_then(|b| b.active_patch())
            .map(|p| p.name.clone())
            .unwrap_or_default();

        if !banks.is_empty() && !banks.iter().any(|b| b.active) {
            warn!(
                "persisted bank index {} is out of range ({} banks); no bank active",
                persisted.active_bank_index,
                banks.len()
            );
        }

        let mut controller = Self {
            banks,
            footswitches,
            midi_out,
            selection,
            active_bank_index: persisted.active_bank_index,
            active_patch_index: persisted.active_patch_index,
            active_bank_name,
            active_patch_name,
        };

        // Bring the hardware in line with the persisted selection.
        if let Some(pos) = controller.active_position() {
            let patch = &controller.banks[pos.bank_index].patches[pos.patch_index];
            info!(
                "restoring persisted selection: bank '{}' patch '{}'",
                controller.active_bank_name, patch.name
            );
            patch.select(
                &mut controller.footswitches,
                controller.midi_out.as_mut(),
            );
        }

        controller
    }

    /// Apply one decoded command. The sole mutation entry point.
    pub fn apply(&mut self, command: Command) -> Option<PatchRef> {
        match command {
            Command::BankUp => self.move_bank(1),
            Command::BankDown => self.move_bank(-1),
            Command::SelectPatch(index) => self.select_patch(index),
        }
    }

    /// Move the active bank circularly. The patch selection inside the new
    /// bank is untouched: if nothing was ever selected there, no patch is
    /// active until a `SelectPatch` lands.
    fn move_bank(&mut self, step: isize) -> Option<PatchRef> {
        let current = match self.banks.iter().position(|b| b.active) {
            Some(i) => i,
            None => {
                debug!("bank move ignored: no active bank");
                return None;
            }
        };

        let len = self.banks.len();
        let next = if step > 0 {
            (current + 1) % len
        } else {
            (current + len - 1) % len
        };

        self.banks[current].active = false;
        self.banks[next].active = true;
        self.selection.save_bank_index(next);
        self.active_bank_index = next;
        self.active_bank_name = self.banks[next].name.clone();

        info!("active bank -> {} ('{}')", next, self.active_bank_name);

        self.banks[next]
            .active_patch_index()
            .map(|patch_index| PatchRef {
                bank_index: next,
                patch_index,
            })
    }

    /// Select a patch in the active bank. Out-of-range indices and a missing
    /// active bank are no-ops. Ordering per the persistence contract:
    /// hardware writes, then the persisted index, then in-memory flags.
    fn select_patch(&mut self, index: usize) -> Option<PatchRef> {
        let bank_index = match self.banks.iter().position(|b| b.active) {
            Some(i) => i,
            None => {
                debug!("patch select ignored: no active bank");
                return None;
            }
        };

        if index >= self.banks[bank_index].patches.len() {
            debug!(
                "patch select ignored: index {} out of range ({} patches)",
                index,
                self.banks[bank_index].patches.len()
            );
            return None;
        }

        let previous = self.banks[bank_index].active_patch_index();

        // 1. Hardware
        {
            let patch = &self.banks[bank_index].patches[index];
            patch.select(&mut self.footswitches, self.midi_out.as_mut());
        }

        // 2. Persisted index
        self.selection.save_patch_index(index);

        // 3. Flags and caches
        if let Some(prev) = previous {
            if prev != index {
                self.banks[bank_index].patches[prev].active = false;
            }
        }
        let bank = &mut self.banks[bank_index];
        bank.patches[index].active = true;
        self.active_patch_index = index;
        self.active_patch_name = bank.patches[index].name.clone();

        info!(
            "active patch -> {} ('{}') in bank '{}'",
            index, self.active_patch_name, self.active_bank_name
        );

        Some(PatchRef {
            bank_index,
            patch_index: index,
        })
    }

    pub fn active_bank(&self) -> Option<&Bank> {
        self.banks.iter().find(|b| b.active)
    }

    /// The active patch of the active bank, if any patch there was ever
    /// selected.
    pub fn active_patch(&self) -> Option<&Patch> {
        self.active_bank().and_then(|b| b.active_patch())
    }

    fn active_position(&self) -> Option<PatchRef> {
        let bank_index = self.banks.iter().position(|b| b.active)?;
        let patch_index = self.banks[bank_index].active_patch_index()?;
        Some(PatchRef {
            bank_index,
            patch_index,
        })
    }

    /// Build the broadcast snapshot. Read-only.
    pub fn snapshot(&self) -> StateSnapshot {
        let patch = self.active_patch();

        let active_loops = patch
            .map(|p| {
                p.loops
                    .iter()
                    .enumerate()
                    .filter(|(_, l)| l.active)
                    .map(|(i, _)| i + 1)
                    .collect()
            })
            .unwrap_or_default();

        let active_switches = if patch.is_some() {
            self.footswitches
                .iter()
                .enumerate()
                .filter(|(_, sw)| sw.active())
                .map(|(i, _)| i + 1)
                .collect()
        } else {
            Vec::new()
        };

        StateSnapshot {
            bank: self.active_bank_name.clone(),
            patch: patch.map(|p| p.name.clone()),
            bank_index: self.active_bank_index,
            patch_index: self.active_patch_index,
            midi_presets: patch.map(|p| p.midi_presets.clone()).unwrap_or_default(),
            active_loops,
            active_switches,
            patch_names: self
                .active_bank()
                .map(|b| b.patches.iter().map(|p| p.name.clone()).collect())
                .unwrap_or_default(),
        }
    }

    /// Build the template context for the web page. Empty when no patch is
    /// active, which leaves the raw placeholders on the page.
    pub fn html_context(&self) -> Vec<(String, String)> {
        let Some(patch) = self.active_patch() else {
            return Vec::new();
        };

        let mut context = vec![
            ("bank".to_string(), self.active_bank_name.clone()),
            ("patch".to_string(), self.active_patch_name.clone()),
            ("midi_data".to_string(), patch.midi_list_html()),
        ];

        for (i, lp) in patch.loops.iter().enumerate() {
            context.push((format!("loop{}_name", i + 1), lp.pedal.name.clone()));
            context.push((format!("loop{}_status", i + 1), lp.css_class().to_string()));
        }

        for (i, sw) in self.footswitches.iter().enumerate() {
            context.push((format!("switch{}_name", i + 1), sw.name().to_string()));
            context.push((format!("switch{}_status", i + 1), sw.css_class().to_string()));
        }

        context
    }

    /// Invariant check used by tests: at most one active bank, and at most
    /// one active patch inside it.
    #[cfg(test)]
    pub(crate) fn assert_exclusive_active(&self) {
        let active_banks = self.banks.iter().filter(|b| b.active).count();
        assert!(active_banks <= 1, "{} banks active", active_banks);
        if let Some(bank) = self.active_bank() {
            let active_patches = bank.patches.iter().filter(|p| p.active).count();
            assert!(
                active_patches <= 1,
                "{} patches active in bank '{}'",
                active_patches,
                bank.name
            );
        }
    }
}
