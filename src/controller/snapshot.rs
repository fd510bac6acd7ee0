//! Read-only state views
//!
//! The broadcaster pushes [`StateSnapshot`] as JSON to SSE subscribers; the
//! web page render uses the flat key/value context. Neither view mutates
//! anything.

use serde::{Deserialize, Serialize};

use crate::model::MidiPreset;

/// Immutable snapshot of the current selection, serialized for SSE frames.
///
/// `bank_index` and `patch_index` mirror the persisted values: after a bank
/// change the patch index still names the last selected patch even when the
/// new bank has no active one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub bank: String,
    /// Name of the active patch; `None` right after a bank change until a
    /// patch is selected in the new bank.
    pub patch: Option<String>,
    pub bank_index: usize,
    pub patch_index: usize,
    pub midi_presets: Vec<MidiPreset>,
    /// 1-based positions of the active patch's engaged loops.
    pub active_loops: Vec<usize>,
    /// 1-based positions of currently engaged footswitches.
    pub active_switches: Vec<usize>,
    /// All patch names in the active bank, in order.
    pub patch_names: Vec<String>,
}
