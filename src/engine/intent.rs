//! Global intent classification: what is the user doing right now?
//!
//! Runs once per frame after all contact slots are updated. All decisions
//! are pure functions of the aggregate, the clock, and the config, so
//! replay reproduces them exactly.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::engine::contact::ContactTable;
use crate::geometry::{PadDimensions, Point};
use crate::touch::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentMode {
    Idle,
    KeyCandidate,
    TypingCommitted,
    MouseCandidate,
    MouseActive,
    GestureCandidate,
}

/// Per-frame summary of all live contacts.
#[derive(Debug, Clone, Default)]
pub struct IntentAggregate {
    pub contact_count: usize,
    pub left_count: usize,
    pub right_count: usize,
    pub on_key_count: usize,
    pub off_key_count: usize,
    /// Any live contact's initial binding is a modifier, continuous key,
    /// momentary layer, or chord.
    pub keyboard_anchor: bool,
    pub max_distance_mm: f32,
    pub max_velocity_mm_s: f32,
    pub centroid: Option<Point>,
    pub first_on_key_touch_key: Option<Arc<str>>,
    pub earliest_start_tick: u64,
    pub latest_start_tick: u64,
    /// A contact appeared this frame, off-key, while others were down.
    pub second_finger_off_key: bool,
}

impl IntentAggregate {
    pub fn compute(contacts: &ContactTable, _dims: PadDimensions) -> Self {
        let mut agg = Self {
            earliest_start_tick: u64::MAX,
            ..Self::default()
        };
        let mut sum_x = 0.0f32;
        let mut sum_y = 0.0f32;
        let mut first_on_key_tick = u64::MAX;

        for slot in contacts.iter() {
            agg.contact_count += 1;
            match slot.side {
                Side::Left => agg.left_count += 1,
                Side::Right => agg.right_count += 1,
                Side::Unknown => {}
            }
            match &slot.binding {
                Some(binding) => {
                    agg.on_key_count += 1;
                    if binding.mapping.primary.is_keyboard_anchor() {
                        agg.keyboard_anchor = true;
                    }
                    if slot.start_tick < first_on_key_tick {
                        first_on_key_tick = slot.start_tick;
                        agg.first_on_key_touch_key = Some(binding.storage_key.clone());
                    }
                }
                None => agg.off_key_count += 1,
            }
            if slot.max_distance_mm > agg.max_distance_mm {
                agg.max_distance_mm = slot.max_distance_mm;
            }
            if slot.max_velocity_mm_s > agg.max_velocity_mm_s {
                agg.max_velocity_mm_s = slot.max_velocity_mm_s;
            }
            agg.earliest_start_tick = agg.earliest_start_tick.min(slot.start_tick);
            agg.latest_start_tick = agg.latest_start_tick.max(slot.start_tick);
            sum_x += slot.last_pos.x;
            sum_y += slot.last_pos.y;
        }

        if agg.contact_count > 0 {
            let n = agg.contact_count as f32;
            agg.centroid = Some(Point::new(sum_x / n, sum_y / n));
        } else {
            agg.earliest_start_tick = 0;
        }

        agg.second_finger_off_key = agg.contact_count >= 2
            && contacts
                .iter()
                .any(|s| s.just_started && s.started_off_key);

        agg
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: IntentMode,
    pub to: IntentMode,
    pub reason: &'static str,
}

#[derive(Debug)]
pub struct IntentClassifier {
    mode: IntentMode,
    entered_tick: u64,
    centroid_at_entry: Option<Point>,
    grace_until: Option<u64>,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentClassifier {
    pub fn new() -> Self {
        Self {
            mode: IntentMode::Idle,
            entered_tick: 0,
            centroid_at_entry: None,
            grace_until: None,
        }
    }

    pub const fn mode(&self) -> IntentMode {
        self.mode
    }

    pub fn grace_active(&self, now: u64) -> bool {
        self.grace_until.is_some_and(|until| now < until)
    }

    /// Extend (never enter) the typing-grace window. Called on every
    /// emitted key, modifier, continuous, mouse-button, or chord action.
    pub fn extend_grace(&mut self, now: u64, config: &EngineConfig) {
        self.grace_until = Some(now + config.typing_grace_ms * 1_000_000);
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn switch(&mut self, to: IntentMode, reason: &'static str, now: u64, centroid: Option<Point>) -> Option<Transition> {
        if self.mode == to {
            return None;
        }
        let from = self.mode;
        self.mode = to;
        self.entered_tick = now;
        self.centroid_at_entry = centroid;
        Some(Transition { from, to, reason })
    }

    fn mouse_signal(&self, agg: &IntentAggregate, config: &EngineConfig) -> bool {
        if agg.max_distance_mm > config.intent_move_mm {
            return true;
        }
        if agg.max_velocity_mm_s > config.intent_velocity_mm_per_sec {
            return true;
        }
        if agg.second_finger_off_key {
            return true;
        }
        if let (Some(entry), Some(current)) = (self.centroid_at_entry, agg.centroid) {
            if entry.distance_mm(current, config.pad) > config.intent_move_mm {
                return true;
            }
        }
        false
    }

    /// Run the transition table for one frame.
    pub fn update(&mut self, agg: &IntentAggregate, now: u64, config: &EngineConfig) -> Option<Transition> {
        // Keyboard mode collapses every decision to typing-until-all-up.
        if config.keyboard_mode_enabled {
            if agg.contact_count > 0 {
                return self.switch(IntentMode::TypingCommitted, "keyboard_mode", now, agg.centroid);
            }
            if self.grace_active(now) {
                return self.switch(IntentMode::TypingCommitted, "grace", now, None);
            }
            self.grace_until = None;
            return self.switch(IntentMode::Idle, "all_up", now, None);
        }

        if agg.contact_count == 0 {
            if self.grace_active(now) {
                return self.switch(IntentMode::TypingCommitted, "grace", now, None);
            }
            self.grace_until = None;
            return self.switch(IntentMode::Idle, "all_up", now, None);
        }

        let buffer_ns = config.key_buffer_ms * 1_000_000;
        match self.mode {
            IntentMode::Idle => {
                let started_together = agg.contact_count >= 2
                    && agg.latest_start_tick.saturating_sub(agg.earliest_start_tick) <= buffer_ns;
                if started_together && !agg.keyboard_anchor {
                    self.switch(IntentMode::GestureCandidate, "gesture_buffer", now, agg.centroid)
                } else if agg.on_key_count >= 1 && !self.mouse_signal(agg, config) {
                    self.switch(IntentMode::KeyCandidate, "on_key", now, agg.centroid)
                } else {
                    self.switch(IntentMode::MouseCandidate, "off_key", now, agg.centroid)
                }
            }
            IntentMode::KeyCandidate => {
                if self.mouse_signal(agg, config) {
                    self.switch(IntentMode::MouseCandidate, "mouse_signal", now, agg.centroid)
                } else if now.saturating_sub(self.entered_tick) >= buffer_ns {
                    self.switch(IntentMode::TypingCommitted, "candidate_elapsed", now, agg.centroid)
                } else {
                    None
                }
            }
            IntentMode::TypingCommitted => {
                if config.allow_mouse_takeover && self.mouse_signal(agg, config) {
                    self.switch(IntentMode::MouseActive, "mouse_takeover", now, agg.centroid)
                } else {
                    None
                }
            }
            IntentMode::MouseCandidate => {
                if self.mouse_signal(agg, config)
                    || now.saturating_sub(self.entered_tick) >= buffer_ns
                {
                    self.switch(IntentMode::MouseActive, "mouse_confirmed", now, agg.centroid)
                } else {
                    None
                }
            }
            IntentMode::MouseActive => None,
            IntentMode::GestureCandidate => {
                if agg.contact_count < 2 {
                    self.switch(IntentMode::Idle, "gesture_exit", now, None)
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agg(count: usize, on_key: usize) -> IntentAggregate {
        IntentAggregate {
            contact_count: count,
            on_key_count: on_key,
            off_key_count: count - on_key,
            ..IntentAggregate::default()
        }
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    const MS: u64 = 1_000_000;

    #[test]
    fn on_key_contact_becomes_key_candidate_then_commits() {
        let config = config();
        let mut intent = IntentClassifier::new();

        let t = intent.update(&agg(1, 1), 0, &config).unwrap();
        assert_eq!(t.to, IntentMode::KeyCandidate);
        assert_eq!(t.reason, "on_key");

        assert!(intent.update(&agg(1, 1), 10 * MS, &config).is_none());

        let t = intent
            .update(&agg(1, 1), config.key_buffer_ms * MS, &config)
            .unwrap();
        assert_eq!(t.to, IntentMode::TypingCommitted);
        assert_eq!(t.reason, "candidate_elapsed");
    }

    #[test]
    fn movement_turns_key_candidate_into_mouse() {
        let config = config();
        let mut intent = IntentClassifier::new();
        intent.update(&agg(1, 1), 0, &config);

        let mut moved = agg(1, 1);
        moved.max_distance_mm = config.intent_move_mm + 1.0;
        let t = intent.update(&moved, 5 * MS, &config).unwrap();
        assert_eq!(t.to, IntentMode::MouseCandidate);
        assert_eq!(t.reason, "mouse_signal");

        let t = intent.update(&moved, 6 * MS, &config).unwrap();
        assert_eq!(t.to, IntentMode::MouseActive);
        assert_eq!(t.reason, "mouse_confirmed");
    }

    #[test]
    fn grace_keeps_typing_committed_after_all_up() {
        let config = config();
        let mut intent = IntentClassifier::new();
        intent.update(&agg(1, 1), 0, &config);
        intent.update(&agg(1, 1), config.key_buffer_ms * MS, &config);
        assert_eq!(intent.mode(), IntentMode::TypingCommitted);

        let release_at = (config.key_buffer_ms + 50) * MS;
        intent.extend_grace(release_at, &config);
        assert!(intent.update(&agg(0, 0), release_at + MS, &config).is_none());
        assert_eq!(intent.mode(), IntentMode::TypingCommitted);

        let after_grace = release_at + (config.typing_grace_ms + 1) * MS;
        let t = intent.update(&agg(0, 0), after_grace, &config).unwrap();
        assert_eq!(t.to, IntentMode::Idle);
        assert_eq!(t.reason, "all_up");
        // A second all-up frame does not transition again.
        assert!(intent.update(&agg(0, 0), after_grace + MS, &config).is_none());
    }

    #[test]
    fn typing_committed_ignores_movement_without_takeover() {
        let mut config = config();
        config.allow_mouse_takeover = false;
        let mut intent = IntentClassifier::new();
        intent.update(&agg(1, 1), 0, &config);
        intent.update(&agg(1, 1), config.key_buffer_ms * MS, &config);

        let mut moved = agg(1, 1);
        moved.max_distance_mm = 50.0;
        assert!(intent.update(&moved, 500 * MS, &config).is_none());
        assert_eq!(intent.mode(), IntentMode::TypingCommitted);
    }

    #[test]
    fn typing_committed_hands_over_when_takeover_allowed() {
        let config = config();
        let mut intent = IntentClassifier::new();
        intent.update(&agg(1, 1), 0, &config);
        intent.update(&agg(1, 1), config.key_buffer_ms * MS, &config);

        let mut moved = agg(1, 1);
        moved.max_distance_mm = 50.0;
        let t = intent.update(&moved, 500 * MS, &config).unwrap();
        assert_eq!(t.to, IntentMode::MouseActive);
        assert_eq!(t.reason, "mouse_takeover");
    }

    #[test]
    fn simultaneous_off_key_pair_is_gesture_candidate() {
        let config = config();
        let mut intent = IntentClassifier::new();
        let mut pair = agg(2, 0);
        pair.earliest_start_tick = 0;
        pair.latest_start_tick = 5 * MS;
        let t = intent.update(&pair, 5 * MS, &config).unwrap();
        assert_eq!(t.to, IntentMode::GestureCandidate);
        assert_eq!(t.reason, "gesture_buffer");

        let t = intent.update(&agg(1, 0), 40 * MS, &config).unwrap();
        assert_eq!(t.to, IntentMode::Idle);
        assert_eq!(t.reason, "gesture_exit");
    }

    #[test]
    fn keyboard_mode_collapses_to_typing() {
        let mut config = config();
        config.keyboard_mode_enabled = true;
        let mut intent = IntentClassifier::new();

        let mut moved = agg(2, 0);
        moved.max_distance_mm = 100.0;
        let t = intent.update(&moved, 0, &config).unwrap();
        assert_eq!(t.to, IntentMode::TypingCommitted);
        assert_eq!(t.reason, "keyboard_mode");
    }
}
