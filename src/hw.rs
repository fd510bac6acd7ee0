//! Hardware abstraction seams
//!
//! The controller core only ever talks to these traits. Relay/footswitch pins
//! and the MIDI output are exclusively owned by the model objects wrapping
//! them; register-level drivers live behind the seam and are out of scope.

use anyhow::Result;
use tracing::debug;

/// A digital output driving a relay or footswitch LED.
pub trait SwitchPin: Send {
    /// Drive the pin high (engaged) or low (bypassed).
    fn set(&mut self, engaged: bool) -> Result<()>;
}

/// A MIDI output channel (UART or OS MIDI port).
pub trait MidiOut: Send {
    /// Write one complete MIDI message.
    fn send(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Pin backend that only logs transitions. Used when no GPIO driver is wired
/// in, and as the default backend on development machines.
pub struct LogPin {
    label: String,
}

impl LogPin {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl SwitchPin for LogPin {
    fn set(&mut self, engaged: bool) -> Result<()> {
        debug!("pin {}: {}", self.label, if engaged { "high" } else { "low" });
        Ok(())
    }
}

/// MIDI backend that only logs outgoing messages.
pub struct LogMidiOut;

impl MidiOut for LogMidiOut {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        debug!("midi out: {}", crate::midi::format_hex(bytes));
        Ok(())
    }
}

/// Real MIDI output through an OS MIDI port.
#[cfg(feature = "midir-backend")]
pub struct MidirOut {
    conn: midir::MidiOutputConnection,
}

#[cfg(feature = "midir-backend")]
impl MidirOut {
    /// Open the first output port whose name contains `port_name`.
    pub fn open(port_name: &str) -> Result<Self> {
        use anyhow::{anyhow, Context};

        let output = midir::MidiOutput::new("brainbox").context("Failed to create MIDI output")?;
        let port = output
            .ports()
            .into_iter()
            .find(|p| {
                output
                    .port_name(p)
                    .map(|n| n.contains(port_name))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("No MIDI output port matching '{}'", port_name))?;

        let conn = output
            .connect(&port, "brainbox-out")
            .map_err(|e| anyhow!("Failed to connect MIDI output: {}", e))?;

        Ok(Self { conn })
    }
}

#[cfg(feature = "midir-backend")]
impl MidiOut for MidirOut {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.conn
            .send(bytes)
            .map_err(|e| anyhow::anyhow!("MIDI send failed: {}", e))
    }
}

/// Recording backends for tests: shared handles observing what the model
/// wrote to the hardware.
pub mod mock {
    use super::{MidiOut, SwitchPin};
    use anyhow::Result;
    use std::sync::{Arc, Mutex};

    /// Pin double recording its last level and the full transition history.
    #[derive(Clone, Default)]
    pub struct RecordingPin {
        state: Arc<Mutex<PinState>>,
    }

    #[derive(Default)]
    struct PinState {
        level: bool,
        transitions: Vec<bool>,
    }

    impl RecordingPin {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn level(&self) -> bool {
            self.state.lock().unwrap().level
        }

        pub fn transitions(&self) -> Vec<bool> {
            self.state.lock().unwrap().transitions.clone()
        }
    }

    impl SwitchPin for RecordingPin {
        fn set(&mut self, engaged: bool) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.level = engaged;
            state.transitions.push(engaged);
            Ok(())
        }
    }

    /// MIDI double recording every outgoing message.
    #[derive(Clone, Default)]
    pub struct RecordingMidiOut {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl RecordingMidiOut {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn sent(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl MidiOut for RecordingMidiOut {
        fn send(&mut self, bytes: &[u8]) -> Result<()> {
            self.sent.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }
    }
}
