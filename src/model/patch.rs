//! Banks, patches, loops, and footswitches

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::hw::{MidiOut, SwitchPin};
use crate::midi;

/// Immutable catalog entry, loaded once and shared by every patch's loops.
#[derive(Debug)]
pub struct Pedal {
    pub id: u32,
    pub name: String,
}

/// One effect insert point within a patch, bound to a catalog pedal.
///
/// Whether the loop is engaged is fixed per patch at construction; activating
/// the patch decides which patch's loop states are live.
pub struct Loop {
    pub pedal: Arc<Pedal>,
    pub order: u32,
    pub active: bool,
}

impl Loop {
    pub fn new(pedal: Arc<Pedal>, active: bool) -> Self {
        let order = pedal.id;
        Self {
            pedal,
            order,
            active,
        }
    }

    pub fn css_class(&self) -> &'static str {
        if self.active {
            "enabled"
        } else {
            "disabled"
        }
    }
}

/// A physical footswitch relay. Exclusively owns its output pin.
pub struct FootSwitch {
    name: String,
    pin: Box<dyn SwitchPin>,
    order: u8,
    active: bool,
}

impl FootSwitch {
    pub fn new(name: impl Into<String>, order: u8, pin: Box<dyn SwitchPin>) -> Self {
        Self {
            name: name.into(),
            pin,
            order,
            active: false,
        }
    }

    /// Drive the pin, then record the new state. The pin write comes first so
    /// a failure leaves the flag describing the hardware, not the intent.
    pub fn set_active(&mut self, engaged: bool) -> Result<()> {
        self.pin.set(engaged)?;
        self.active = engaged;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order(&self) -> u8 {
        self.order
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn css_class(&self) -> &'static str {
        if self.active {
            "enabled"
        } else {
            "disabled"
        }
    }
}

/// A (channel, program) pair sent as a Program Change on patch activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiPreset {
    /// 1-16
    pub channel: u8,
    /// 0-127
    pub program: u8,
}

impl MidiPreset {
    pub fn encode(&self) -> [u8; 2] {
        midi::program_change(self.channel, self.program)
    }
}

/// A named loop/switch/MIDI configuration belonging to one bank.
pub struct Patch {
    pub name: String,
    pub loops: Vec<Loop>,
    pub midi_presets: Vec<MidiPreset>,
    /// Positionally aligned to the footswitch set ordered by pin.
    pub switch_targets: Vec<bool>,
    pub active: bool,
}

impl Patch {
    /// Apply this patch to the hardware: footswitches first, then MIDI
    /// presets in listed order, synchronously.
    ///
    /// The shorter of the target sequence and the switch set bounds the zip;
    /// switches beyond it keep their previous state. Hardware failures are
    /// logged and activation continues, since every command surface is
    /// fire-and-forget.
    pub fn select(&self, switches: &mut [FootSwitch], midi_out: &mut dyn MidiOut) {
        for (&target, sw) in self.switch_targets.iter().zip(switches.iter_mut()) {
            if let Err(e) = sw.set_active(target) {
                warn!("footswitch '{}' write failed: {e:#}", sw.name());
            }
        }

        for preset in &self.midi_presets {
            match midi_out.send(&preset.encode()) {
                Ok(()) => debug!(
                    "sent Program Change channel {} program {}",
                    preset.channel, preset.program
                ),
                Err(e) => warn!(
                    "MIDI send failed (channel {} program {}): {e:#}",
                    preset.channel, preset.program
                ),
            }
        }
    }

    /// HTML fragment listing the patch's MIDI presets.
    pub fn midi_list_html(&self) -> String {
        let mut html = String::from("<ul>");
        for preset in &self.midi_presets {
            html.push_str(&format!(
                "<li>Channel: {}, Program: {}</li>",
                preset.channel, preset.program
            ));
        }
        html.push_str("</ul>");
        html
    }
}

/// An ordered collection of patches, at most one active at a time.
pub struct Bank {
    pub name: String,
    pub patches: Vec<Patch>,
    pub active: bool,
}

impl Bank {
    pub fn active_patch_index(&self) -> Option<usize> {
        self.patches.iter().position(|p| p.active)
    }

    pub fn active_patch(&self) -> Option<&Patch> {
        self.patches.iter().find(|p| p.active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::mock::{RecordingMidiOut, RecordingPin};

    fn make_switches(pins: &[RecordingPin]) -> Vec<FootSwitch> {
        pins.iter()
            .enumerate()
            .map(|(i, pin)| FootSwitch::new(format!("SW{}", i + 1), i as u8, Box::new(pin.clone())))
            .collect()
    }

    #[test]
    fn test_select_applies_targets_positionally() {
        let pins = vec![RecordingPin::new(), RecordingPin::new(), RecordingPin::new()];
        let mut switches = make_switches(&pins);
        let midi = RecordingMidiOut::new();

        let patch = Patch {
            name: "Lead".to_string(),
            loops: vec![],
            midi_presets: vec![],
            switch_targets: vec![true, false, true],
            active: false,
        };

        let mut midi_out = midi.clone();
        patch.select(&mut switches, &mut midi_out);

        assert!(pins[0].level());
        assert!(!pins[1].level());
        assert!(pins[2].level());
        assert!(switches[0].active());
        assert!(!switches[1].active());
    }

    #[test]
    fn test_select_shorter_mask_leaves_tail_untouched() {
        let pins = vec![RecordingPin::new(), RecordingPin::new(), RecordingPin::new()];
        let mut switches = make_switches(&pins);

        // Third switch engaged beforehand
        switches[2].set_active(true).unwrap();

        let patch = Patch {
            name: "Partial".to_string(),
            loops: vec![],
            midi_presets: vec![],
            switch_targets: vec![false, true],
            active: false,
        };

        let mut midi_out = RecordingMidiOut::new();
        patch.select(&mut switches, &mut midi_out);

        assert!(!switches[0].active());
        assert!(switches[1].active());
        // Beyond the mask: previous state preserved, no extra pin write
        assert!(switches[2].active());
        assert_eq!(pins[2].transitions(), vec![true]);
    }

    #[test]
    fn test_select_sends_presets_in_order() {
        let mut switches: Vec<FootSwitch> = vec![];
        let midi = RecordingMidiOut::new();

        let patch = Patch {
            name: "Synth".to_string(),
            loops: vec![],
            midi_presets: vec![
                MidiPreset {
                    channel: 1,
                    program: 5,
                },
                MidiPreset {
                    channel: 16,
                    program: 127,
                },
            ],
            switch_targets: vec![],
            active: false,
        };

        let mut midi_out = midi.clone();
        patch.select(&mut switches, &mut midi_out);

        assert_eq!(midi.sent(), vec![vec![0xC0, 5], vec![0xCF, 127]]);
    }

    #[test]
    fn test_midi_list_html() {
        let patch = Patch {
            name: "P".to_string(),
            loops: vec![],
            midi_presets: vec![MidiPreset {
                channel: 2,
                program: 9,
            }],
            switch_targets: vec![],
            active: false,
        };
        assert_eq!(
            patch.midi_list_html(),
            "<ul><li>Channel: 2, Program: 9</li></ul>"
        );
    }
}
