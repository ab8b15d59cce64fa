//! Engine configuration.
//!
//! The engine is pure with respect to this struct: given identical config
//! and an identical frame stream it produces identical output. Loading and
//! saving are conveniences for the CLI; hosts may construct the struct
//! directly.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::geometry::PadDimensions;

/// Action slot labels for the gesture layer, resolved through the action
/// catalog (`Action::from_label`) when the engine starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GestureActions {
    pub two_finger_tap: String,
    pub three_finger_tap: String,
    pub five_finger_swipe: String,
}

impl Default for GestureActions {
    fn default() -> Self {
        Self {
            two_finger_tap: "left click".to_string(),
            three_finger_tap: "right click".to_string(),
            five_finger_swipe: "typing toggle".to_string(),
        }
    }
}

/// Every tunable the engine recognizes. Field docs give the valid range;
/// [`EngineConfig::validate`] clamps out-of-range values and logs what it
/// changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Physical size of each trackpad surface.
    pub pad: PadDimensions,

    /// Milliseconds a stationary contact must stay down before the hold
    /// alternate fires. `>= 0`.
    pub hold_duration_ms: u64,
    /// Millimeters of travel after which a contact stops being a key press.
    /// `>= 0`.
    pub drag_cancel_mm: f32,
    /// Grace window after a keystroke during which the engine refuses to
    /// reclassify as mouse. `>= 0`.
    pub typing_grace_ms: u64,
    /// Pre-commit buffer before a key candidate promotes to typing.
    /// Clamped to `typing_grace_ms`.
    pub key_buffer_ms: u64,

    /// Movement that signals pointer intent, millimeters. `>= 0.1`.
    pub intent_move_mm: f32,
    /// Velocity that signals pointer intent, mm/s. `>= 1`.
    pub intent_velocity_mm_per_sec: f32,

    /// Snap radius as a percentage of key pitch. `0..=200`.
    pub snap_radius_percent: f32,
    /// Best/runner-up distance ratio below which a snap is ambiguous. `> 1`.
    pub snap_ambiguity_ratio: f32,

    /// Force-click pressure floor and ceiling, device units. `0..=255`.
    pub force_click_min: u8,
    pub force_click_cap: u8,
    /// Haptic actuator strength. `0..=1`; zero disables the haptic flag.
    pub haptic_strength: f32,

    pub tap_click_enabled: bool,
    /// Longest a tap-click candidate may stay down, milliseconds.
    pub tap_cadence_ms: u64,
    /// Window within which the tap fingers must land together, milliseconds.
    pub tap_stagger_ms: u64,
    /// Movement that invalidates a tap-click candidate, millimeters.
    pub tap_move_threshold_mm: f32,

    pub chord_shift_enabled: bool,
    /// Collapse all intent decisions to typing until all fingers lift.
    pub keyboard_mode_enabled: bool,
    /// Allow committed typing to hand over to the pointer on a mouse signal.
    pub allow_mouse_takeover: bool,

    pub gesture_actions: GestureActions,

    // Host-facing knobs the engine carries but does not interpret.
    pub run_at_startup: bool,
    pub auto_resync_missing_trackpads: bool,
    pub autocorrect_enabled: bool,
    pub autocorrect_min_word_length: u32,

    /// Status snapshot cadence, milliseconds.
    pub status_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pad: PadDimensions::default(),
            hold_duration_ms: 220,
            drag_cancel_mm: 8.0,
            typing_grace_ms: 1000,
            key_buffer_ms: 180,
            intent_move_mm: 3.0,
            intent_velocity_mm_per_sec: 50.0,
            snap_radius_percent: 35.0,
            snap_ambiguity_ratio: 1.25,
            force_click_min: 24,
            force_click_cap: 200,
            haptic_strength: 0.6,
            tap_click_enabled: true,
            tap_cadence_ms: 220,
            tap_stagger_ms: 40,
            tap_move_threshold_mm: 1.5,
            chord_shift_enabled: true,
            keyboard_mode_enabled: false,
            allow_mouse_takeover: true,
            gesture_actions: GestureActions::default(),
            run_at_startup: false,
            auto_resync_missing_trackpads: true,
            autocorrect_enabled: false,
            autocorrect_min_word_length: 3,
            status_interval_ms: 50,
        }
    }
}

impl EngineConfig {
    /// Clamp every knob to its documented range. Returns the number of
    /// fields that had to change.
    pub fn validate(&mut self) -> usize {
        let mut fixed = 0;

        let mut clamp_f32 = |name: &str, value: &mut f32, min: f32, max: f32| {
            if !value.is_finite() || *value < min || *value > max {
                let clamped = if value.is_finite() {
                    value.clamp(min, max)
                } else {
                    min
                };
                warn!("config: {} = {} out of range, clamping to {}", name, value, clamped);
                *value = clamped;
                fixed += 1;
            }
        };

        clamp_f32("pad.width_mm", &mut self.pad.width_mm, 10.0, 1000.0);
        clamp_f32("pad.height_mm", &mut self.pad.height_mm, 10.0, 1000.0);
        clamp_f32("drag_cancel_mm", &mut self.drag_cancel_mm, 0.0, 100.0);
        clamp_f32("intent_move_mm", &mut self.intent_move_mm, 0.1, 100.0);
        clamp_f32(
            "intent_velocity_mm_per_sec",
            &mut self.intent_velocity_mm_per_sec,
            1.0,
            10_000.0,
        );
        clamp_f32("snap_radius_percent", &mut self.snap_radius_percent, 0.0, 200.0);
        clamp_f32("snap_ambiguity_ratio", &mut self.snap_ambiguity_ratio, 1.0 + f32::EPSILON, 10.0);
        clamp_f32("haptic_strength", &mut self.haptic_strength, 0.0, 1.0);
        clamp_f32("tap_move_threshold_mm", &mut self.tap_move_threshold_mm, 0.0, 50.0);

        if self.key_buffer_ms > self.typing_grace_ms {
            warn!(
                "config: key_buffer_ms {} exceeds typing_grace_ms {}, clamping",
                self.key_buffer_ms, self.typing_grace_ms
            );
            self.key_buffer_ms = self.typing_grace_ms;
            fixed += 1;
        }
        if self.force_click_min > self.force_click_cap {
            warn!(
                "config: force_click_min {} exceeds force_click_cap {}, swapping",
                self.force_click_min, self.force_click_cap
            );
            std::mem::swap(&mut self.force_click_min, &mut self.force_click_cap);
            fixed += 1;
        }
        if self.status_interval_ms == 0 {
            warn!("config: status_interval_ms may not be 0, using 50");
            self.status_interval_ms = 50;
            fixed += 1;
        }

        fixed
    }

    /// Load config from a RON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = ron::from_str(&content)?;
        config.validate();
        Ok(config)
    }

    /// Save config to a RON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let pretty = ron::ser::PrettyConfig::default();
        let content = ron::ser::to_string_pretty(self, pretty)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from `path`, falling back to defaults when the file is missing
    /// or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("failed to load config from {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("glasstokey").join("config.ron"))
    }
}

/// CLI `validate` subcommand entry point.
pub fn validate_config(path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => EngineConfig::default_path()
            .ok_or_else(|| anyhow::anyhow!("no config directory on this platform"))?,
    };
    let mut config = EngineConfig::load(&path)?;
    let fixed = config.validate();
    if fixed == 0 {
        println!("{} is valid", path.display());
    } else {
        println!("{}: {} field(s) out of range (clamped values shown above)", path.display(), fixed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.hold_duration_ms, 220);
        assert_eq!(config.drag_cancel_mm, 8.0);
        assert_eq!(config.typing_grace_ms, 1000);
        assert!(config.key_buffer_ms <= config.typing_grace_ms);
        assert_eq!(config.intent_move_mm, 3.0);
        assert_eq!(config.intent_velocity_mm_per_sec, 50.0);
        assert_eq!(config.snap_radius_percent, 35.0);
        assert!(config.snap_ambiguity_ratio > 1.0);
        assert_eq!(config.status_interval_ms, 50);
    }

    #[test]
    fn validate_clamps_out_of_range_knobs() {
        let mut config = EngineConfig {
            intent_move_mm: 0.0,
            snap_radius_percent: 500.0,
            haptic_strength: 2.0,
            key_buffer_ms: 5000,
            ..EngineConfig::default()
        };
        let fixed = config.validate();
        assert!(fixed >= 4);
        assert!(config.intent_move_mm >= 0.1);
        assert_eq!(config.snap_radius_percent, 200.0);
        assert_eq!(config.haptic_strength, 1.0);
        assert_eq!(config.key_buffer_ms, config.typing_grace_ms);
    }

    #[test]
    fn validate_passes_defaults_untouched() {
        let mut config = EngineConfig::default();
        assert_eq!(config.validate(), 0);
    }
}
