use glasstokey::config::{EngineConfig, GestureActions};
use glasstokey::keymap::Action;

#[test]
fn default_gesture_slots_resolve_through_the_catalog() {
    let actions = GestureActions::default();
    assert!(matches!(
        Action::from_label(&actions.two_finger_tap),
        Action::MouseButton(glasstokey::keymap::MouseButton::Left)
    ));
    assert!(matches!(
        Action::from_label(&actions.three_finger_tap),
        Action::MouseButton(glasstokey::keymap::MouseButton::Right)
    ));
    assert_eq!(Action::from_label(&actions.five_finger_swipe), Action::TypingToggle);
}

#[test]
fn ron_round_trip_preserves_every_knob() {
    let mut config = EngineConfig::default();
    config.hold_duration_ms = 300;
    config.drag_cancel_mm = 6.5;
    config.keyboard_mode_enabled = true;
    config.gesture_actions.five_finger_swipe = "cmd+.".to_string();

    let pretty = ron::ser::PrettyConfig::default();
    let serialized = ron::ser::to_string_pretty(&config, pretty).unwrap();
    let parsed: EngineConfig = ron::from_str(&serialized).unwrap();
    assert_eq!(config, parsed);
}

#[test]
fn partial_ron_files_fill_in_defaults() {
    let parsed: EngineConfig = ron::from_str("(hold_duration_ms: 180)").unwrap();
    assert_eq!(parsed.hold_duration_ms, 180);
    assert_eq!(parsed.drag_cancel_mm, EngineConfig::default().drag_cancel_mm);
    assert_eq!(parsed.typing_grace_ms, EngineConfig::default().typing_grace_ms);
}

#[test]
fn save_and_load_from_disk() {
    let mut config = EngineConfig::default();
    config.snap_radius_percent = 50.0;

    let path = std::env::temp_dir().join("g2k_config_test.ron");
    let _ = std::fs::remove_file(&path);

    config.save(&path).unwrap();
    let loaded = EngineConfig::load(&path).unwrap();
    assert_eq!(config, loaded);

    std::fs::remove_file(&path).ok();
}

#[test]
fn load_clamps_out_of_range_values() {
    let path = std::env::temp_dir().join("g2k_config_clamp_test.ron");
    std::fs::write(
        &path,
        "(intent_move_mm: 0.0, snap_ambiguity_ratio: 0.5, key_buffer_ms: 99999)",
    )
    .unwrap();

    let loaded = EngineConfig::load(&path).unwrap();
    assert!(loaded.intent_move_mm >= 0.1);
    assert!(loaded.snap_ambiguity_ratio > 1.0);
    assert!(loaded.key_buffer_ms <= loaded.typing_grace_ms);

    std::fs::remove_file(&path).ok();
}

#[test]
fn load_or_default_survives_a_missing_file() {
    let path = std::env::temp_dir().join("g2k_definitely_missing.ron");
    let _ = std::fs::remove_file(&path);
    let config = EngineConfig::load_or_default(&path);
    assert_eq!(config, EngineConfig::default());
}
