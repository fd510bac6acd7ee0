//! Tests for the state controller

use super::*;
use crate::config::AppConfig;
use crate::hw::mock::{RecordingMidiOut, RecordingPin};
use std::path::Path;
use tempfile::tempdir;

fn test_config() -> AppConfig {
    serde_json::from_str(
        r#"{
            "pedals": [
                {"id": 1, "name": "Drive"},
                {"id": 2, "name": "Chorus"}
            ],
            "footswitches": [
                {"name": "A", "pin": 2},
                {"name": "B", "pin": 3},
                {"name": "C", "pin": 4}
            ],
            "banks": [
                {"name": "Rhythm", "patches": [
                    {"name": "Clean", "loops": [2], "footswitch": [0, 1, 0],
                     "midi": [[1, 10]]},
                    {"name": "Crunch", "loops": [1], "footswitch": [1, 0, 0]},
                    {"name": "Solo", "loops": [1, 2], "footswitch": [1, 1, 1],
                     "midi": [{"channel": 2, "program": 20}]}
                ]},
                {"name": "Ambient", "patches": [
                    {"name": "Pad", "footswitch": [0, 0, 1]},
                    {"name": "Swell", "loops": [2], "footswitch": [1, 1, 0]}
                ]}
            ]
        }"#,
    )
    .unwrap()
}

struct TestRig {
    controller: StateController,
    pins: Vec<RecordingPin>,
    midi: RecordingMidiOut,
    store: SelectionStoreHandle,
}

/// Build a controller over recording hardware doubles. `pins` is aligned to
/// the footswitch set in pin order (the config lists pins ascending).
fn build_rig(persisted: SelectionState, dir: &Path) -> TestRig {
    let config = test_config();
    let store = SelectionStore::spawn(dir.join("status.json"), persisted);

    let pins: Vec<RecordingPin> = (0..config.footswitches.len())
        .map(|_| RecordingPin::new())
        .collect();
    let midi = RecordingMidiOut::new();

    let mut next_pin = pins.clone().into_iter();
    let controller = build_controller(
        &config,
        persisted,
        store.clone(),
        Box::new(midi.clone()),
        |_| Box::new(next_pin.next().unwrap()),
    );

    TestRig {
        controller,
        pins,
        midi,
        store,
    }
}

fn selection(bank: usize, patch: usize) -> SelectionState {
    SelectionState {
        active_bank_index: bank,
        active_patch_index: patch,
    }
}

#[tokio::test]
async fn test_startup_activates_only_persisted_patch() {
    let dir = tempdir().unwrap();
    let rig = build_rig(selection(0, 0), dir.path());

    let bank = rig.controller.active_bank().unwrap();
    assert_eq!(bank.name, "Rhythm");
    assert_eq!(rig.controller.active_patch().unwrap().name, "Clean");
    rig.controller.assert_exclusive_active();

    // Hardware replayed at build time: Clean is [0, 1, 0] plus one preset
    assert!(!rig.pins[0].level());
    assert!(rig.pins[1].level());
    assert!(!rig.pins[2].level());
    assert_eq!(rig.midi.sent(), vec![vec![0xC0, 10]]);
}

#[tokio::test]
async fn test_bank_up_down_round_trip_with_wraparound() {
    let dir = tempdir().unwrap();
    let mut rig = build_rig(selection(0, 0), dir.path());

    // Down from index 0 wraps to the last bank
    rig.controller.apply(Command::BankDown);
    assert_eq!(rig.controller.active_bank().unwrap().name, "Ambient");
    rig.controller.assert_exclusive_active();

    // Up from the last bank wraps back to 0
    rig.controller.apply(Command::BankUp);
    assert_eq!(rig.controller.active_bank().unwrap().name, "Rhythm");

    // Up then down is an identity too
    rig.controller.apply(Command::BankUp);
    rig.controller.apply(Command::BankDown);
    assert_eq!(rig.controller.active_bank().unwrap().name, "Rhythm");
    rig.controller.assert_exclusive_active();
}

#[tokio::test]
async fn test_select_patch_is_exclusive() {
    let dir = tempdir().unwrap();
    let mut rig = build_rig(selection(0, 0), dir.path());

    let selected = rig.controller.apply(Command::SelectPatch(2)).unwrap();
    assert_eq!(selected.bank_index, 0);
    assert_eq!(selected.patch_index, 2);
    assert_eq!(rig.controller.active_patch().unwrap().name, "Solo");
    rig.controller.assert_exclusive_active();

    // Solo is [1, 1, 1]
    assert!(rig.pins[0].level());
    assert!(rig.pins[1].level());
    assert!(rig.pins[2].level());

    rig.controller.apply(Command::SelectPatch(1));
    assert_eq!(rig.controller.active_patch().unwrap().name, "Crunch");
    rig.controller.assert_exclusive_active();

    // Crunch is [1, 0, 0]
    assert!(rig.pins[0].level());
    assert!(!rig.pins[1].level());
    assert!(!rig.pins[2].level());
}

#[tokio::test]
async fn test_select_patch_out_of_range_is_noop() {
    let dir = tempdir().unwrap();
    let mut rig = build_rig(selection(0, 0), dir.path());

    assert_eq!(rig.controller.apply(Command::SelectPatch(5)), None);
    assert_eq!(rig.controller.active_patch().unwrap().name, "Clean");
    rig.controller.assert_exclusive_active();
}

#[tokio::test]
async fn test_udp_and_http_sources_normalize_to_same_index() {
    let dir = tempdir().unwrap();

    // UDP: opcode 0x03 with a 0-based index byte
    let mut rig = build_rig(selection(0, 0), dir.path());
    let command = Command::decode_frame(&[0x03, 0x02]).unwrap();
    let by_udp = rig.controller.apply(command).unwrap();
    assert_eq!(by_udp.patch_index, 2);

    // HTTP: 1-based form value
    let dir2 = tempdir().unwrap();
    let mut rig2 = build_rig(selection(0, 0), dir2.path());
    let command = Command::parse_form_token("patch=3").unwrap();
    let by_http = rig2.controller.apply(command).unwrap();
    assert_eq!(by_http.patch_index, 2);

    assert_eq!(by_udp, by_http);
}

#[tokio::test]
async fn test_bank_change_leaves_new_bank_without_active_patch() {
    let dir = tempdir().unwrap();
    let mut rig = build_rig(selection(0, 0), dir.path());

    // End-to-end scenario: UDP BankUp frame
    let command = Command::decode_frame(&[0x01]).unwrap();
    assert_eq!(rig.controller.apply(command), None);

    assert_eq!(rig.controller.active_bank().unwrap().name, "Ambient");
    assert!(rig.controller.active_patch().is_none());
    rig.controller.assert_exclusive_active();

    // The snapshot still mirrors the persisted patch index
    let snapshot = rig.controller.snapshot();
    assert_eq!(snapshot.bank_index, 1);
    assert_eq!(snapshot.patch, None);
    assert_eq!(snapshot.patch_index, 0);
    assert!(snapshot.midi_presets.is_empty());
    assert!(snapshot.active_loops.is_empty());
    assert_eq!(snapshot.patch_names, vec!["Pad", "Swell"]);

    // A later SelectPatch lands in the new bank
    let selected = rig.controller.apply(Command::SelectPatch(1)).unwrap();
    assert_eq!(selected.bank_index, 1);
    assert_eq!(rig.controller.active_patch().unwrap().name, "Swell");
}

#[tokio::test]
async fn test_no_active_bank_makes_moves_noops() {
    let dir = tempdir().unwrap();
    // Persisted bank index beyond the config: nothing starts active
    let mut rig = build_rig(selection(9, 0), dir.path());

    assert!(rig.controller.active_bank().is_none());
    assert_eq!(rig.controller.apply(Command::BankUp), None);
    assert_eq!(rig.controller.apply(Command::SelectPatch(0)), None);
    assert!(rig.controller.active_bank().is_none());
}

#[tokio::test]
async fn test_persisted_file_is_ground_truth_across_restart() {
    let dir = tempdir().unwrap();

    {
        let mut rig = build_rig(selection(0, 0), dir.path());
        rig.controller.apply(Command::BankUp);
        rig.controller.apply(Command::SelectPatch(1));
        rig.store.flush().await;
    }

    // "Restart": rebuild everything from the file alone
    let persisted = SelectionState::load(dir.path().join("status.json"));
    assert_eq!(persisted, selection(1, 1));

    let rig = build_rig(persisted, dir.path());
    assert_eq!(rig.controller.active_bank().unwrap().name, "Ambient");
    assert_eq!(rig.controller.active_patch().unwrap().name, "Swell");

    // Swell is [1, 1, 0], replayed against fresh hardware
    assert!(rig.pins[0].level());
    assert!(rig.pins[1].level());
    assert!(!rig.pins[2].level());
}

#[tokio::test]
async fn test_snapshot_reflects_active_patch() {
    let dir = tempdir().unwrap();
    let mut rig = build_rig(selection(0, 0), dir.path());
    rig.controller.apply(Command::SelectPatch(2));

    let snapshot = rig.controller.snapshot();
    assert_eq!(snapshot.bank, "Rhythm");
    assert_eq!(snapshot.patch.as_deref(), Some("Solo"));
    assert_eq!(snapshot.bank_index, 0);
    assert_eq!(snapshot.patch_index, 2);
    // Solo engages both loops and all three switches
    assert_eq!(snapshot.active_loops, vec![1, 2]);
    assert_eq!(snapshot.active_switches, vec![1, 2, 3]);
    assert_eq!(snapshot.patch_names, vec!["Clean", "Crunch", "Solo"]);
    assert_eq!(snapshot.midi_presets.len(), 1);
    assert_eq!(snapshot.midi_presets[0].channel, 2);
}

#[tokio::test]
async fn test_html_context_keys() {
    let dir = tempdir().unwrap();
    let rig = build_rig(selection(0, 0), dir.path());

    let context = rig.controller.html_context();
    let get = |key: &str| {
        context
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    };

    assert_eq!(get("bank").unwrap(), "Rhythm");
    assert_eq!(get("patch").unwrap(), "Clean");
    assert_eq!(get("midi_data").unwrap(), "<ul><li>Channel: 1, Program: 10</li></ul>");
    assert_eq!(get("loop1_name").unwrap(), "Drive");
    assert_eq!(get("loop1_status").unwrap(), "disabled");
    assert_eq!(get("loop2_name").unwrap(), "Chorus");
    assert_eq!(get("loop2_status").unwrap(), "enabled");
    assert_eq!(get("switch1_name").unwrap(), "A");
    assert_eq!(get("switch2_status").unwrap(), "enabled");
}

#[tokio::test]
async fn test_html_context_empty_without_active_patch() {
    let dir = tempdir().unwrap();
    let mut rig = build_rig(selection(0, 0), dir.path());
    rig.controller.apply(Command::BankUp);
    assert!(rig.controller.html_context().is_empty());
}

#[tokio::test]
async fn test_loop_positions_follow_pedal_ids() {
    let dir = tempdir().unwrap();
    // Catalog listed out of id order on purpose
    let config: AppConfig = serde_json::from_str(
        r#"{
            "pedals": [
                {"id": 2, "name": "Chorus"},
                {"id": 1, "name": "Drive"}
            ],
            "footswitches": [],
            "banks": [
                {"name": "Solo", "patches": [
                    {"name": "Lead", "loops": [1]}
                ]}
            ]
        }"#,
    )
    .unwrap();

    let store = SelectionStore::spawn(dir.path().join("status.json"), SelectionState::default());
    let controller = build_controller(
        &config,
        SelectionState::default(),
        store,
        Box::new(RecordingMidiOut::new()),
        |_| Box::new(RecordingPin::new()),
    );

    let context = controller.html_context();
    let get = |key: &str| {
        context
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    };
    assert_eq!(get("loop1_name").unwrap(), "Drive");
    assert_eq!(get("loop2_name").unwrap(), "Chorus");

    // Position 1 is pedal id 1 regardless of how the catalog was listed
    assert_eq!(controller.snapshot().active_loops, vec![1]);
}

#[tokio::test]
async fn test_actor_serializes_sources() {
    let dir = tempdir().unwrap();
    let rig = build_rig(selection(0, 0), dir.path());
    let handle = ControllerActor::spawn(rig.controller);

    // Interleave waited and fire-and-forget submissions from clones of the
    // handle, as the three surfaces do
    let udp_handle = handle.clone();
    udp_handle.apply_nowait(Command::BankUp).await;
    let selected = handle.apply(Command::SelectPatch(0)).await.unwrap();
    assert_eq!(selected.bank_index, 1);

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.bank, "Ambient");
    assert_eq!(snapshot.patch_names, vec!["Pad", "Swell"]);

    handle.shutdown();
}
