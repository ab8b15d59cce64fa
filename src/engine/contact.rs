//! Per-contact tracking slots.
//!
//! A slot is born when a tip-down contact id first appears on a side and
//! dies when that id is absent from the next frame for that side. The
//! table is a plain vector: live contact counts stay in single digits and
//! iteration order must be deterministic for replay.

use crate::engine::binding_index::BindingRef;
use crate::geometry::{PadDimensions, Point};
use crate::keycode::VirtualKey;
use crate::keymap::{LayerId, MouseButton};
use crate::touch::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Waiting for hold-or-release resolution.
    Pending,
    /// Press resolved (hold fired or primary pressed immediately).
    Active,
}

/// What kind of down event this slot has outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownKind {
    Modifier(VirtualKey),
    Continuous(VirtualKey),
    MouseButton(MouseButton),
}

#[derive(Debug, Clone)]
pub struct ContactSlot {
    pub side: Side,
    pub id: i32,
    /// Binding resolved at birth; `None` for off-key contacts.
    pub binding: Option<BindingRef>,
    pub lifecycle: Lifecycle,
    pub start_tick: u64,
    pub start_pos: Point,
    pub last_pos: Point,
    pub last_tick: u64,
    pub max_distance_mm: f32,
    pub max_velocity_mm_s: f32,
    pub has_hold_action: bool,
    pub hold_triggered: bool,
    /// Layer this contact holds active, if its press was a momentary layer.
    pub momentary_layer: Option<LayerId>,
    /// Outstanding down that must be balanced by an up.
    pub down_sent: Option<DownKind>,
    pub repeat_token: u64,
    /// The press was ended early because the contact travelled past the
    /// drag threshold.
    pub drag_cancelled: bool,
    /// Cancelled by a gesture (chord source, swipe arm) or engine teardown;
    /// emits nothing on release.
    pub cancelled: bool,
    /// Claimed by an open tap-click candidate; the gesture layer owns the
    /// release.
    pub gesture_owned: bool,
    /// Whether the contact began outside every binding rect.
    pub started_off_key: bool,
    /// Set on the frame the contact first appears, cleared on next update.
    pub just_started: bool,
    /// Latest digitizer readings, carried for the render snapshot.
    pub pressure: f32,
    pub major_axis: f32,
}

impl ContactSlot {
    pub fn new(side: Side, id: i32, pos: Point, tick: u64, binding: Option<BindingRef>) -> Self {
        let has_hold_action = binding
            .as_ref()
            .is_some_and(|b| b.mapping.hold.is_some());
        let started_off_key = binding.is_none();
        Self {
            side,
            id,
            binding,
            lifecycle: Lifecycle::Pending,
            start_tick: tick,
            start_pos: pos,
            last_pos: pos,
            last_tick: tick,
            max_distance_mm: 0.0,
            max_velocity_mm_s: 0.0,
            has_hold_action,
            hold_triggered: false,
            momentary_layer: None,
            down_sent: None,
            repeat_token: repeat_token(side, id),
            drag_cancelled: false,
            cancelled: false,
            gesture_owned: false,
            started_off_key,
            just_started: true,
            pressure: 0.0,
            major_axis: 0.0,
        }
    }

    /// Fold one frame's position into the displacement and velocity stats.
    pub fn update_position(&mut self, pos: Point, tick: u64, dims: PadDimensions) {
        let dist = self.start_pos.distance_mm(pos, dims);
        if dist > self.max_distance_mm {
            self.max_distance_mm = dist;
        }
        let dt_ns = tick.saturating_sub(self.last_tick);
        // Duplicate timestamps would blow the velocity up; floor at 1 ms.
        let dt_s = (dt_ns.max(1_000_000) as f64) / 1e9;
        let step = self.last_pos.distance_mm(pos, dims);
        let velocity = (step as f64 / dt_s) as f32;
        if velocity > self.max_velocity_mm_s {
            self.max_velocity_mm_s = velocity;
        }
        self.last_pos = pos;
        self.last_tick = tick;
        self.just_started = false;
    }

    pub fn elapsed_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.start_tick) / 1_000_000
    }
}

/// Opaque handle tying a repeatable down to its up.
pub fn repeat_token(side: Side, id: i32) -> u64 {
    let side_bits = match side {
        Side::Left => 1u64,
        Side::Right => 2,
        Side::Unknown => 3,
    };
    (side_bits << 32) | u64::from(id as u32)
}

/// All live contact slots, insertion-ordered.
#[derive(Debug, Default)]
pub struct ContactTable {
    slots: Vec<ContactSlot>,
}

impl ContactTable {
    pub fn new() -> Self {
        Self {
            slots: Vec::with_capacity(32),
        }
    }

    pub fn get(&self, side: Side, id: i32) -> Option<&ContactSlot> {
        self.slots.iter().find(|s| s.side == side && s.id == id)
    }

    pub fn get_mut(&mut self, side: Side, id: i32) -> Option<&mut ContactSlot> {
        self.slots.iter_mut().find(|s| s.side == side && s.id == id)
    }

    pub fn insert(&mut self, slot: ContactSlot) {
        debug_assert!(self.get(slot.side, slot.id).is_none());
        self.slots.push(slot);
    }

    pub fn remove(&mut self, side: Side, id: i32) -> Option<ContactSlot> {
        let idx = self.slots.iter().position(|s| s.side == side && s.id == id)?;
        Some(self.slots.remove(idx))
    }

    /// Slot ids on a side that are missing from the given frame contact ids.
    pub fn missing_ids(&self, side: Side, present: &[i32]) -> smallvec::SmallVec<[i32; 16]> {
        self.slots
            .iter()
            .filter(|s| s.side == side && !present.contains(&s.id))
            .map(|s| s.id)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContactSlot> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ContactSlot> {
        self.slots.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn count_side(&self, side: Side) -> usize {
        self.slots.iter().filter(|s| s.side == side).count()
    }

    pub fn drain(&mut self) -> Vec<ContactSlot> {
        std::mem::take(&mut self.slots)
    }
}
