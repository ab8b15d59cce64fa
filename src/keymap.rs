//! Actions, key mappings, and the layered keymap the binding index reads.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::keycode::VirtualKey;
use crate::layout::{Layout, SideLayout};
use crate::touch::Side;

/// Number of binding layers. Layer 0 is the base layer.
pub const LAYER_COUNT: u8 = 8;

pub type LayerId = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// What a binding does when activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Dead key; occupies a rect but dispatches nothing.
    None,
    /// One-shot key tap on release.
    Key(VirtualKey),
    /// Modifier held down while the contact is down; backend ref-counts.
    Modifier(VirtualKey),
    /// Key held down while the contact is down, with platform auto-repeat.
    Continuous(VirtualKey),
    MouseButton(MouseButton),
    /// Modifier-wrapped tap, e.g. Ctrl+C or Shift+1.
    KeyChord(VirtualKey, VirtualKey),
    /// Layer active only while this contact is down.
    MomentaryLayer(LayerId),
    /// Persistent layer switch.
    LayerSet(LayerId),
    /// Persistent layer toggle (back to base when already active).
    LayerToggle(LayerId),
    /// Flip the engine's typing-enabled flag.
    TypingToggle,
}

impl Action {
    /// Actions eligible for release-time snap recovery. Layer mutations,
    /// typing toggles, and mouse buttons must never fire from a near-miss.
    pub const fn is_snappable(self) -> bool {
        matches!(
            self,
            Action::Key(_) | Action::Modifier(_) | Action::Continuous(_) | Action::KeyChord(_, _)
        )
    }

    /// Whether a live contact bound to this action anchors the intent
    /// classifier to the keyboard.
    pub const fn is_keyboard_anchor(self) -> bool {
        matches!(
            self,
            Action::Modifier(_) | Action::Continuous(_) | Action::MomentaryLayer(_) | Action::KeyChord(_, _)
        )
    }

    /// Resolve an action slot label from settings or a layout preset.
    ///
    /// Recognizes mouse buttons, engine toggles, layer switches, `mod+key`
    /// chords, and plain key names (modifier names resolve to `Modifier`,
    /// repeatable edit keys to `Continuous`). Unknown labels resolve to
    /// `None` with a warning so a bad settings string cannot take the
    /// engine down.
    pub fn from_label(label: &str) -> Self {
        let l = label.trim().to_ascii_lowercase();
        match l.as_str() {
            "" | "none" => return Action::None,
            "left click" => return Action::MouseButton(MouseButton::Left),
            "right click" => return Action::MouseButton(MouseButton::Right),
            "middle click" => return Action::MouseButton(MouseButton::Middle),
            "typing toggle" => return Action::TypingToggle,
            _ => {}
        }
        if let Some(rest) = l.strip_prefix("layer ") {
            if let Ok(layer) = rest.parse::<u8>() {
                if layer < LAYER_COUNT {
                    return Action::LayerSet(layer);
                }
            }
        }
        if let Some(rest) = l.strip_prefix("hold layer ") {
            if let Ok(layer) = rest.parse::<u8>() {
                if layer < LAYER_COUNT {
                    return Action::MomentaryLayer(layer);
                }
            }
        }
        // "cmd+." style chords. A trailing '+' means the literal plus key.
        if let Some((mod_part, key_part)) = l.split_once('+') {
            if !key_part.is_empty() {
                if let (Some(mod_vk), Some(key_vk)) =
                    (VirtualKey::from_label(mod_part), VirtualKey::from_label(key_part))
                {
                    if mod_vk.is_modifier() {
                        return Action::KeyChord(mod_vk, key_vk);
                    }
                }
            }
        }
        if let Some(vk) = VirtualKey::from_label(&l) {
            if vk.is_modifier() {
                return Action::Modifier(vk);
            }
            if matches!(
                vk,
                VirtualKey::Backspace
                    | VirtualKey::ForwardDelete
                    | VirtualKey::LeftArrow
                    | VirtualKey::RightArrow
                    | VirtualKey::UpArrow
                    | VirtualKey::DownArrow
            ) {
                return Action::Continuous(vk);
            }
            return Action::Key(vk);
        }
        warn!("unrecognized action label {:?}, binding to None", label);
        Action::None
    }
}

/// Primary action plus optional hold alternate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMapping {
    pub primary: Action,
    pub hold: Option<Action>,
}

impl KeyMapping {
    pub const fn tap(primary: Action) -> Self {
        Self { primary, hold: None }
    }

    pub const fn tap_hold(primary: Action, hold: Action) -> Self {
        Self {
            primary,
            hold: Some(hold),
        }
    }
}

/// Stable storage key for a grid position. Survives layout edits that keep
/// the grid shape, which is what the persisted keymap is keyed on.
pub fn grid_storage_key(side: Side, row: usize, col: usize) -> String {
    let tag = match side {
        Side::Left => 'L',
        Side::Right => 'R',
        Side::Unknown => '?',
    };
    format!("{tag}:r{row}c{col}")
}

/// Storage key for a custom button, scoped to its layer.
pub fn button_storage_key(side: Side, layer: LayerId, name: &str) -> String {
    let tag = match side {
        Side::Left => 'L',
        Side::Right => 'R',
        Side::Unknown => '?',
    };
    format!("{tag}:layer{layer}:{name}")
}

/// The layered action map: `(storage_key, layer) -> mapping`.
///
/// Lookups fall back to the base layer when a key has no entry on the
/// active layer, so sparse upper layers behave as transparent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Keymap {
    entries: HashMap<(String, LayerId), KeyMapping>,
}

impl Keymap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, storage_key: impl Into<String>, layer: LayerId, mapping: KeyMapping) {
        self.entries.insert((storage_key.into(), layer), mapping);
    }

    pub fn get(&self, storage_key: &str, layer: LayerId) -> Option<KeyMapping> {
        if let Some(m) = self.entries.get(&(storage_key.to_string(), layer)) {
            return Some(*m);
        }
        if layer != 0 {
            return self.entries.get(&(storage_key.to_string(), 0)).copied();
        }
        None
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the base-layer keymap for a layout by resolving its labels
    /// through the action catalog. Hold alternates are attached only when
    /// the layout permits them.
    pub fn from_layout(layout: &Layout) -> Self {
        let mut keymap = Self::new();
        keymap.populate_side(Side::Left, &layout.left);
        keymap.populate_side(Side::Right, &layout.right);
        keymap
    }

    fn populate_side(&mut self, side: Side, side_layout: &SideLayout) {
        for (row, labels) in side_layout.labels.iter().enumerate() {
            for (col, label) in labels.iter().enumerate() {
                let primary = Action::from_label(label);
                let mapping = match (side_layout.allow_hold_bindings, label.as_str()) {
                    // The bundled preset gives the thumb keys hold-Shift.
                    (true, "space") => KeyMapping::tap_hold(primary, Action::Modifier(VirtualKey::LeftShift)),
                    _ => KeyMapping::tap(primary),
                };
                self.set(grid_storage_key(side, row, col), 0, mapping);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_resolves_mouse_and_toggle_labels() {
        assert_eq!(Action::from_label("left click"), Action::MouseButton(MouseButton::Left));
        assert_eq!(Action::from_label("right click"), Action::MouseButton(MouseButton::Right));
        assert_eq!(Action::from_label("typing toggle"), Action::TypingToggle);
    }

    #[test]
    fn catalog_resolves_plain_keys_and_modifiers() {
        assert_eq!(Action::from_label("a"), Action::Key(VirtualKey::A));
        assert_eq!(Action::from_label("shift"), Action::Modifier(VirtualKey::LeftShift));
        assert_eq!(Action::from_label("bksp"), Action::Continuous(VirtualKey::Backspace));
    }

    #[test]
    fn catalog_resolves_chords() {
        assert_eq!(
            Action::from_label("ctrl+c"),
            Action::KeyChord(VirtualKey::LeftControl, VirtualKey::C)
        );
        assert_eq!(
            Action::from_label("cmd+."),
            Action::KeyChord(VirtualKey::LeftCommand, VirtualKey::Period)
        );
    }

    #[test]
    fn catalog_rejects_garbage_to_none() {
        assert_eq!(Action::from_label("definitely not a key"), Action::None);
        assert_eq!(Action::from_label("layer 12"), Action::None);
    }

    #[test]
    fn snappable_excludes_layer_and_mouse_actions() {
        assert!(Action::Key(VirtualKey::A).is_snappable());
        assert!(Action::KeyChord(VirtualKey::LeftShift, VirtualKey::Num1).is_snappable());
        assert!(!Action::MouseButton(MouseButton::Left).is_snappable());
        assert!(!Action::LayerSet(2).is_snappable());
        assert!(!Action::TypingToggle.is_snappable());
    }

    #[test]
    fn layer_lookup_falls_back_to_base() {
        let mut keymap = Keymap::new();
        keymap.set("L:r0c0", 0, KeyMapping::tap(Action::Key(VirtualKey::Q)));
        keymap.set("L:r0c0", 3, KeyMapping::tap(Action::Key(VirtualKey::Num1)));

        assert_eq!(keymap.get("L:r0c0", 3).unwrap().primary, Action::Key(VirtualKey::Num1));
        assert_eq!(keymap.get("L:r0c0", 5).unwrap().primary, Action::Key(VirtualKey::Q));
        assert_eq!(keymap.get("L:r9c9", 0), None);
    }
}
