//! Gesture layer: N-finger tap-click, five-finger swipe, chord shift.
//!
//! The layer never touches engine state directly; each frame it inspects
//! the contact table and returns a list of operations for the engine to
//! apply, which keeps the emission order deterministic.

use smallvec::SmallVec;

use crate::config::EngineConfig;
use crate::engine::contact::ContactTable;
use crate::engine::intent::IntentMode;
use crate::keymap::{Action, MouseButton};
use crate::touch::Side;

/// Centroid travel that fires the five-finger swipe, millimeters.
const SWIPE_TRAVEL_MM: f32 = 8.0;
/// A side whose frames stop arriving loses its chord weight after this.
const SIDE_STALE_MS: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    Left,
    Right,
    Up,
    Down,
}

/// Operations the engine applies after the gesture pass.
#[derive(Debug, Clone, PartialEq)]
pub enum GestureOp {
    /// Cancel all live contacts on a side: end any outstanding press, emit
    /// nothing on their release.
    CancelSideContacts(Side),
    /// Latch the sticky chord Shift.
    ShiftDown,
    ShiftUp,
    /// Completed N-finger tap.
    EmitClick { button: MouseButton, side: Side },
    /// Five-finger swipe fired; flip typing-enabled.
    ToggleTyping { side: Side, direction: SwipeDirection },
    /// Mark the current tap-candidate contacts as gesture-owned.
    ClaimTapContacts,
    /// Candidate died; give the releases back to the key path.
    ReleaseTapClaim,
}

pub type GestureOps = SmallVec<[GestureOp; 4]>;

#[derive(Debug, Clone, Copy, Default)]
struct SwipeState {
    armed: bool,
    triggered: bool,
    arm_centroid_mm: (f32, f32),
}

#[derive(Debug, Clone)]
struct TapCandidate {
    /// Earliest start tick among the candidate contacts.
    opened_tick: u64,
    /// Peak contact count; decides left vs right click.
    count: usize,
    ids: SmallVec<[(Side, i32); 4]>,
    /// Once a finger lifts, no new fingers may join.
    releasing: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct ChordState {
    active: bool,
    chord_side: Side,
}

#[derive(Debug, Default)]
pub struct GestureLayer {
    swipe: [SwipeState; 2],
    tap: Option<TapCandidate>,
    chord: ChordState,
    /// Tick of the last frame seen per side, for staleness.
    last_frame_tick: [u64; 2],
    prev_contact_count: usize,
}

fn side_slot(side: Side) -> usize {
    match side {
        Side::Left => 0,
        _ => 1,
    }
}

impl GestureLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// The side whose contacts are being swallowed by an active chord.
    pub fn chord_side(&self) -> Option<Side> {
        self.chord.active.then_some(self.chord.chord_side)
    }

    /// Clear the chord latch, reporting whether Shift was down. Used by
    /// teardown paths that must balance the latched modifier themselves.
    pub fn take_chord_latch(&mut self) -> bool {
        let was_down = self.chord.active;
        self.chord = ChordState::default();
        was_down
    }

    /// A side under an armed swipe swallows its contacts.
    pub fn swipe_armed(&self, side: Side) -> bool {
        self.swipe[side_slot(side)].armed
    }

    fn side_centroid_mm(contacts: &ContactTable, side: Side, config: &EngineConfig) -> Option<(f32, f32)> {
        let mut n = 0usize;
        let mut sx = 0.0f32;
        let mut sy = 0.0f32;
        for slot in contacts.iter().filter(|s| s.side == side) {
            n += 1;
            sx += slot.last_pos.x * config.pad.width_mm;
            sy += slot.last_pos.y * config.pad.height_mm;
        }
        (n > 0).then(|| (sx / n as f32, sy / n as f32))
    }

    /// Effective contact count for chord decisions; stale sides count zero.
    fn effective_count(&self, contacts: &ContactTable, side: Side, now: u64) -> usize {
        let age_ms = now.saturating_sub(self.last_frame_tick[side_slot(side)]) / 1_000_000;
        if age_ms > SIDE_STALE_MS {
            return 0;
        }
        contacts.count_side(side)
    }

    pub fn note_frame(&mut self, side: Side, now: u64) {
        if side != Side::Unknown {
            self.last_frame_tick[side_slot(side)] = now;
        }
    }

    pub fn update(
        &mut self,
        contacts: &ContactTable,
        intent_mode: IntentMode,
        now: u64,
        config: &EngineConfig,
    ) -> GestureOps {
        let mut ops = GestureOps::new();
        self.update_swipe(contacts, now, config, &mut ops);
        self.update_chord_shift(contacts, now, config, &mut ops);
        self.update_tap_click(contacts, intent_mode, now, config, &mut ops);
        self.prev_contact_count = contacts.len();
        ops
    }

    fn update_swipe(&mut self, contacts: &ContactTable, _now: u64, config: &EngineConfig, ops: &mut GestureOps) {
        for side in [Side::Left, Side::Right] {
            let tips = contacts.count_side(side);
            let state = &mut self.swipe[side_slot(side)];

            if !state.armed && tips >= 5 {
                if let Some(centroid) = Self::side_centroid_mm(contacts, side, config) {
                    state.armed = true;
                    state.triggered = false;
                    state.arm_centroid_mm = centroid;
                }
            }

            if state.armed {
                // Contacts under an armed swipe never resolve to taps.
                ops.push(GestureOp::CancelSideContacts(side));

                if tips >= 4 && !state.triggered {
                    if let Some((cx, cy)) = Self::side_centroid_mm(contacts, side, config) {
                        let dx = cx - state.arm_centroid_mm.0;
                        let dy = cy - state.arm_centroid_mm.1;
                        if dx.abs() >= SWIPE_TRAVEL_MM || dy.abs() >= SWIPE_TRAVEL_MM {
                            state.triggered = true;
                            let direction = if dx.abs() >= dy.abs() {
                                if dx >= 0.0 { SwipeDirection::Right } else { SwipeDirection::Left }
                            } else if dy >= 0.0 {
                                SwipeDirection::Down
                            } else {
                                SwipeDirection::Up
                            };
                            ops.push(GestureOp::ToggleTyping { side, direction });
                        }
                    }
                }

                if tips <= 2 {
                    state.armed = false;
                    state.triggered = false;
                }
            }
        }
    }

    fn update_chord_shift(&mut self, contacts: &ContactTable, now: u64, config: &EngineConfig, ops: &mut GestureOps) {
        if self.chord.active {
            let side = self.chord.chord_side;
            if self.effective_count(contacts, side, now) == 0 {
                self.chord = ChordState::default();
                ops.push(GestureOp::ShiftUp);
            } else {
                // Late-landing fingers on the chord side stay silent too.
                ops.push(GestureOp::CancelSideContacts(side));
            }
            return;
        }

        if !config.chord_shift_enabled || config.keyboard_mode_enabled {
            return;
        }

        for side in [Side::Left, Side::Right] {
            // An armed or arming five-finger swipe outranks the chord role.
            if self.swipe_armed(side) || contacts.count_side(side) >= 5 {
                continue;
            }
            if self.effective_count(contacts, side, now) < 4 {
                continue;
            }
            let other = side.opposite();
            let other_has_key = contacts.iter().any(|s| {
                s.side == other
                    && s.binding
                        .as_ref()
                        .is_some_and(|b| matches!(b.mapping.primary, Action::Key(_)))
            });
            if other_has_key {
                self.chord = ChordState {
                    active: true,
                    chord_side: side,
                };
                ops.push(GestureOp::CancelSideContacts(side));
                ops.push(GestureOp::ShiftDown);
                return;
            }
        }
    }

    fn update_tap_click(
        &mut self,
        contacts: &ContactTable,
        intent_mode: IntentMode,
        now: u64,
        config: &EngineConfig,
        ops: &mut GestureOps,
    ) {
        let suppressed = !config.tap_click_enabled
            || config.keyboard_mode_enabled
            || intent_mode == IntentMode::TypingCommitted;

        if let Some(candidate) = &mut self.tap {
            let count = contacts.len();

            if count == 0 {
                if suppressed {
                    self.tap = None;
                    return;
                }
                // Clean release of a still-valid candidate.
                let (mut left, mut right) = (0usize, 0usize);
                for (side, _) in &candidate.ids {
                    match side {
                        Side::Left => left += 1,
                        _ => right += 1,
                    }
                }
                let button = if candidate.count == 2 {
                    MouseButton::Left
                } else {
                    MouseButton::Right
                };
                // Majority side wins; ties go left.
                let side = if right > left { Side::Right } else { Side::Left };
                ops.push(GestureOp::EmitClick { button, side });
                self.tap = None;
                return;
            }

            let stagger_open = now.saturating_sub(candidate.opened_tick) <= config.tap_stagger_ms * 1_000_000;
            let mut invalid = suppressed;

            if now.saturating_sub(candidate.opened_tick) > config.tap_cadence_ms * 1_000_000 {
                invalid = true;
            }

            if count < candidate.ids.len() {
                candidate.releasing = true;
            }

            if count > candidate.count {
                if stagger_open && !candidate.releasing && count <= 3 {
                    // A staggered third finger joins the candidate.
                    candidate.count = count;
                    candidate.ids = contacts.iter().map(|s| (s.side, s.id)).collect();
                    ops.push(GestureOp::ClaimTapContacts);
                } else {
                    invalid = true;
                }
            }

            for (side, id) in &candidate.ids {
                if let Some(slot) = contacts.get(*side, *id) {
                    if slot.max_distance_mm > config.tap_move_threshold_mm {
                        invalid = true;
                    }
                    if slot.binding.is_some() {
                        invalid = true;
                    }
                }
            }

            if invalid {
                self.tap = None;
                ops.push(GestureOp::ReleaseTapClaim);
            }
            return;
        }

        if suppressed {
            return;
        }

        let count = contacts.len();
        if self.prev_contact_count <= 1 && (2..=3).contains(&count) {
            let all_off_key = contacts.iter().all(|s| s.started_off_key);
            let anchored = contacts.iter().any(|s| {
                s.binding
                    .as_ref()
                    .is_some_and(|b| b.mapping.primary.is_keyboard_anchor())
            });
            let earliest = contacts.iter().map(|s| s.start_tick).min().unwrap_or(now);
            let latest = contacts.iter().map(|s| s.start_tick).max().unwrap_or(now);
            let together = latest.saturating_sub(earliest) <= config.tap_stagger_ms * 1_000_000;

            if all_off_key && !anchored && together {
                self.tap = Some(TapCandidate {
                    opened_tick: earliest,
                    count,
                    ids: contacts.iter().map(|s| (s.side, s.id)).collect(),
                    releasing: false,
                });
                ops.push(GestureOp::ClaimTapContacts);
            }
        }
    }
}
