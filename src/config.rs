//! Configuration management
//!
//! Loads and validates the JSON rig configuration: the pedal catalog, the
//! footswitch pin map, banks of patches, and the remote-control surfaces.
//! Wi-Fi/network bring-up is not handled here; only ports and names are
//! configured.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;
use tracing::warn;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub pedals: Vec<PedalConfig>,
    pub footswitches: Vec<FootSwitchConfig>,
    pub banks: Vec<BankConfig>,
    #[serde(default)]
    pub midi: MidiOutConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    /// File holding the persisted bank/patch selection.
    #[serde(default = "default_selection_file")]
    pub selection_file: String,
}

/// Catalog entry for one pedal in the effects loop.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PedalConfig {
    pub id: u32,
    pub name: String,
}

/// One physical footswitch relay: name plus output pin number.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FootSwitchConfig {
    pub name: String,
    pub pin: u8,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BankConfig {
    pub name: String,
    pub patches: Vec<PatchConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PatchConfig {
    pub name: String,
    /// Pedal ids whose loops are engaged in this patch.
    #[serde(default)]
    pub loops: Vec<u32>,
    /// Positional footswitch targets, aligned to the switch set ordered by pin.
    #[serde(default, rename = "footswitch")]
    pub switch_targets: Vec<SwitchTarget>,
    #[serde(default)]
    pub midi: Vec<MidiPresetEntry>,
}

/// Footswitch target accepted as a bool or a 0/1 level.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SwitchTarget {
    Flag(bool),
    Level(u8),
}

impl SwitchTarget {
    pub fn engaged(&self) -> bool {
        match *self {
            SwitchTarget::Flag(b) => b,
            SwitchTarget::Level(n) => n != 0,
        }
    }
}

/// MIDI preset entry, accepted in mapping form (`{"channel": 1, "program": 2}`)
/// or positional-pair form (`[1, 2]`). Missing mapping fields default to
/// channel 1 / program 0.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MidiPresetEntry {
    Mapping {
        channel: Option<u16>,
        program: Option<u16>,
    },
    Pair(Vec<u16>),
}

impl MidiPresetEntry {
    /// Resolve to a validated (channel, program) pair.
    ///
    /// Returns `None` for malformed entries: a pair with fewer than two
    /// elements, a channel outside 1-16, or a program above 127. Callers skip
    /// such entries with a warning; loading continues.
    pub fn resolve(&self) -> Option<(u8, u8)> {
        let (channel, program) = match self {
            MidiPresetEntry::Mapping { channel, program } => {
                (channel.unwrap_or(1), program.unwrap_or(0))
            }
            MidiPresetEntry::Pair(values) => {
                if values.len() < 2 {
                    return None;
                }
                (values[0], values[1])
            }
        };

        if !(1..=16).contains(&channel) || program > 127 {
            return None;
        }
        Some((channel as u8, program as u8))
    }
}

/// MIDI output port selection (used by the midir backend).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MidiOutConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
}

/// Remote-control surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default)]
    pub udp: UdpConfig,
    #[serde(default)]
    pub ble: BleConfig,
    /// SSE/telemetry snapshot push interval.
    #[serde(default = "default_broadcast_interval_ms")]
    pub broadcast_interval_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            udp: UdpConfig::default(),
            ble: BleConfig::default(),
            broadcast_interval_ms: default_broadcast_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UdpConfig {
    #[serde(default = "default_udp_rx_port")]
    pub rx_port: u16,
    #[serde(default = "default_udp_tx_port")]
    pub tx_port: u16,
    /// Enable the checksummed protocol variant: inbound frames carry a
    /// trailing XOR checksum, and observed senders receive periodic telemetry.
    #[serde(default)]
    pub checksum: bool,
    #[serde(default = "default_telemetry_interval_ms")]
    pub telemetry_interval_ms: u64,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            rx_port: default_udp_rx_port(),
            tx_port: default_udp_tx_port(),
            checksum: false,
            telemetry_interval_ms: default_telemetry_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ble_name")]
    pub name: String,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: default_ble_name(),
        }
    }
}

fn default_selection_file() -> String {
    "active_status.json".to_string()
}

fn default_http_port() -> u16 {
    80
}

fn default_udp_rx_port() -> u16 {
    5005
}

fn default_udp_tx_port() -> u16 {
    5006
}

fn default_telemetry_interval_ms() -> u64 {
    100
}

fn default_broadcast_interval_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

fn default_ble_name() -> String {
    "BrainBox8".to_string()
}

/// Hard configuration errors that abort startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("duplicate pedal id {0}")]
    DuplicatePedalId(u32),
    #[error("duplicate footswitch pin {0}")]
    DuplicateSwitchPin(u8),
}

impl AppConfig {
    /// Load and validate a configuration file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the catalog. Duplicate pedal ids and switch pins are hard
    /// errors; suspicious but workable shapes only warn.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut pedal_ids = HashSet::new();
        for pedal in &self.pedals {
            if !pedal_ids.insert(pedal.id) {
                return Err(ConfigError::DuplicatePedalId(pedal.id));
            }
        }

        let mut pins = HashSet::new();
        for sw in &self.footswitches {
            if !pins.insert(sw.pin) {
                return Err(ConfigError::DuplicateSwitchPin(sw.pin));
            }
        }

        if self.banks.is_empty() {
            warn!("configuration defines no banks; bank/patch commands will be no-ops");
        }

        // Length mismatches keep the truncation semantics at activation time
        // (switches beyond the shorter sequence hold their previous state),
        // but they are flagged here instead of failing silently.
        for bank in &self.banks {
            for patch in &bank.patches {
                if patch.switch_targets.len() != self.footswitches.len() {
                    warn!(
                        "patch '{}' in bank '{}' has {} footswitch targets for {} switches; \
                         extra positions are ignored, missing ones leave switches unchanged",
                        patch.name,
                        bank.name,
                        patch.switch_targets.len(),
                        self.footswitches.len()
                    );
                }
            }
        }

        Ok(())
    }
}
