//! The touch processing engine: contact lifecycle, intent classification,
//! gestures, and dispatch production.
//!
//! All state here is owned by a single worker; `process_frame` is the only
//! entry point on the hot path and never blocks, allocates per frame (past
//! index rebuilds), or performs I/O.

use std::sync::Arc;

use smallvec::SmallVec;
use tracing::debug;

use crate::config::EngineConfig;
use crate::diagnostics::{Counters, TraceEvent, TraceKind, TraceRing};
use crate::geometry::Point;
use crate::keycode::VirtualKey;
use crate::keymap::{Action, Keymap, LayerId};
use crate::layout::Layout;
use crate::snapshot::{RenderSnapshot, SnapshotSurface, StatusSnapshot, TouchDot};
use crate::touch::{RawFrame, Side};

pub mod binding_index;
pub mod contact;
pub mod dispatch;
pub mod gesture;
pub mod intent;

use binding_index::BindingIndex;
use contact::{ContactSlot, ContactTable, DownKind};
use dispatch::{DispatchEvent, DispatchKind, DispatchQueue, FLAG_HAPTIC, FLAG_REPEATABLE};
use gesture::{GestureLayer, GestureOp};
use intent::{IntentAggregate, IntentClassifier, IntentMode};

fn side_slot(side: Side) -> usize {
    match side {
        Side::Left => 0,
        _ => 1,
    }
}

const fn kind_tag(kind: DispatchKind) -> &'static str {
    match kind {
        DispatchKind::KeyTap => "key_tap",
        DispatchKind::KeyDown => "key_down",
        DispatchKind::KeyUp => "key_up",
        DispatchKind::ModifierDown => "modifier_down",
        DispatchKind::ModifierUp => "modifier_up",
        DispatchKind::MouseButtonClick => "mouse_click",
        DispatchKind::MouseButtonDown => "mouse_down",
        DispatchKind::MouseButtonUp => "mouse_up",
    }
}

pub struct TouchEngine {
    config: EngineConfig,
    layout: Layout,
    keymap: Keymap,
    persistent_layer: LayerId,
    /// Contacts currently holding a momentary layer; the most recent wins.
    momentary: Vec<(Side, i32, LayerId)>,
    typing_enabled: bool,
    indexes: [Option<BindingIndex>; 2],
    contacts: ContactTable,
    intent: IntentClassifier,
    gestures: GestureLayer,
    dispatch: DispatchQueue,
    counters: Counters,
    trace: TraceRing,
    surface: Arc<SnapshotSurface>,
    clock: u64,
    last_status_tick: Option<u64>,
}

impl TouchEngine {
    pub fn new(
        mut config: EngineConfig,
        layout: Layout,
        keymap: Keymap,
        dispatch: DispatchQueue,
        surface: Arc<SnapshotSurface>,
        trace_capacity: usize,
    ) -> Self {
        config.validate();
        Self {
            config,
            layout,
            keymap,
            persistent_layer: 0,
            momentary: Vec::with_capacity(4),
            typing_enabled: true,
            indexes: [None, None],
            contacts: ContactTable::new(),
            intent: IntentClassifier::new(),
            gestures: GestureLayer::new(),
            dispatch,
            counters: Counters::default(),
            trace: if trace_capacity > 0 {
                TraceRing::new(trace_capacity)
            } else {
                TraceRing::disabled()
            },
            surface,
            clock: 0,
            last_status_tick: None,
        }
    }

    pub const fn typing_enabled(&self) -> bool {
        self.typing_enabled
    }

    pub fn intent_mode(&self) -> IntentMode {
        self.intent.mode()
    }

    pub fn active_layer(&self) -> LayerId {
        self.momentary.last().map_or(self.persistent_layer, |(_, _, layer)| *layer)
    }

    pub const fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn trace_events(&self) -> Vec<TraceEvent> {
        self.trace.events()
    }

    pub fn contact_count(&self, side: Side) -> usize {
        self.contacts.count_side(side)
    }

    /// Swap in a new config. Indexes are rebuilt lazily because the snap
    /// tunables and pad dimensions are baked into them.
    pub fn set_config(&mut self, mut config: EngineConfig) {
        config.validate();
        self.config = config;
        self.indexes = [None, None];
    }

    pub fn set_keymap(&mut self, keymap: Keymap) {
        self.keymap = keymap;
        self.indexes = [None, None];
    }

    pub fn set_layout(&mut self, layout: Layout) {
        self.layout = layout;
        self.indexes = [None, None];
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn index(&mut self, side: Side) -> &BindingIndex {
        let slot = side_slot(side);
        let layer = self.active_layer();
        let stale = match &self.indexes[slot] {
            None => true,
            Some(index) => index.layer() != layer,
        };
        if stale {
            self.indexes[slot] = Some(BindingIndex::build(
                side,
                layer,
                &self.layout,
                &self.keymap,
                &self.config,
            ));
        }
        self.indexes[slot].as_ref().expect("index just built")
    }

    /// Process one side-tagged frame. Frames must arrive in arrival order;
    /// sequence and timestamps come from frame ingest or replay.
    pub fn process_frame(&mut self, frame: &RawFrame) {
        let side = frame.side();
        if side == Side::Unknown {
            self.counters.frames_unknown_side += 1;
            return;
        }
        self.clock = (frame.timestamp * 1e9) as u64;
        let now = self.clock;
        self.gestures.note_frame(side, now);

        let mut present: SmallVec<[i32; 16]> = SmallVec::new();
        for contact in frame.contacts.iter().filter(|c| c.is_tip_down()) {
            present.push(contact.id);
        }

        // Releases: ids absent from this side's frame.
        for id in self.contacts.missing_ids(side, &present) {
            if let Some(slot) = self.contacts.remove(side, id) {
                self.resolve_release(slot);
            }
        }

        // Births and updates.
        let mut pending_holds: SmallVec<[i32; 8]> = SmallVec::new();
        let mut pending_drag_cancels: SmallVec<[i32; 8]> = SmallVec::new();
        for contact in frame.contacts.iter().filter(|c| c.is_tip_down()) {
            let pos = contact.position();
            if self.contacts.get(side, contact.id).is_none() {
                self.birth_contact(side, contact.id, pos, now, contact.pressure, contact.major_axis);
                continue;
            }
            let pad = self.config.pad;
            let drag_cancel_mm = self.config.drag_cancel_mm;
            let hold_duration_ms = self.config.hold_duration_ms;
            let slot = self.contacts.get_mut(side, contact.id).expect("slot present");
            slot.update_position(pos, now, pad);
            slot.pressure = contact.pressure;
            slot.major_axis = contact.major_axis;
            if slot.cancelled {
                continue;
            }
            if slot.down_sent.is_some() && slot.max_distance_mm > drag_cancel_mm {
                slot.drag_cancelled = true;
                pending_drag_cancels.push(contact.id);
            } else if slot.lifecycle == contact::Lifecycle::Pending
                && slot.has_hold_action
                && !slot.hold_triggered
                && slot.max_distance_mm <= drag_cancel_mm
                && slot.elapsed_ms(now) >= hold_duration_ms
            {
                slot.hold_triggered = true;
                slot.lifecycle = contact::Lifecycle::Active;
                pending_holds.push(contact.id);
            }
        }
        for id in pending_drag_cancels {
            self.counters.drag_cancels += 1;
            self.end_press(side, id);
        }
        for id in pending_holds {
            self.counters.holds_fired += 1;
            self.fire_hold(side, id);
        }

        // Gesture pass.
        let mode = self.intent.mode();
        let ops = self.gestures.update(&self.contacts, mode, now, &self.config);
        self.apply_gesture_ops(ops);

        // Intent classification.
        let agg = IntentAggregate::compute(&self.contacts, self.config.pad);
        if let Some(transition) = self.intent.update(&agg, now, &self.config) {
            self.counters.intent_transitions += 1;
            self.trace.push(TraceEvent {
                ticks: now,
                kind: TraceKind::IntentTransition,
                side,
                detail: transition.reason,
                value: transition.to as i64,
            });
            debug!(from = ?transition.from, to = ?transition.to, reason = transition.reason, "intent");
        }
        for slot in self.contacts.iter_mut() {
            slot.just_started = false;
        }

        self.publish_render();
        self.maybe_publish_status(now);
        self.counters.frames_processed += 1;
    }

    fn birth_contact(&mut self, side: Side, id: i32, pos: Point, now: u64, pressure: f32, major_axis: f32) {
        let hit = self.index(side).hit_test(pos);
        let binding =
            hit.map(|i| self.indexes[side_slot(side)].as_ref().expect("built").binding_ref(i).clone());

        let mut slot = ContactSlot::new(side, id, pos, now, binding);
        slot.pressure = pressure;
        slot.major_axis = major_axis;

        // Contacts landing under an armed swipe or an active chord side
        // never become key presses.
        let swallowed = self.gestures.swipe_armed(side) || self.gestures.chord_side() == Some(side);
        if swallowed {
            slot.cancelled = true;
            self.counters.contacts_cancelled += 1;
            self.contacts.insert(slot);
            return;
        }

        let press_now = match &slot.binding {
            Some(binding) if !slot.has_hold_action => Some(binding.mapping.primary),
            _ => None,
        };
        self.contacts.insert(slot);
        if let Some(action) = press_now {
            self.begin_press(side, id, action);
        }
    }

    /// Start the press-time effect of an action for a live contact.
    /// Tap-like actions defer to release; modifiers, continuous keys, and
    /// momentary layers take effect immediately.
    fn begin_press(&mut self, side: Side, id: i32, action: Action) {
        let Some(slot) = self.contacts.get(side, id) else {
            return;
        };
        let token = slot.repeat_token;
        let label = slot.binding.as_ref().map(|b| b.label.clone());
        let now = self.clock;
        match action {
            Action::Modifier(vk) => {
                if let Some(slot) = self.contacts.get_mut(side, id) {
                    slot.down_sent = Some(DownKind::Modifier(vk));
                    slot.lifecycle = contact::Lifecycle::Active;
                }
                let flags = self.haptic_flag();
                self.push_dispatch(
                    DispatchEvent::key(now, DispatchKind::ModifierDown, vk, side)
                        .with_token(token)
                        .with_flags(flags)
                        .with_label(label),
                );
                self.intent.extend_grace(now, &self.config);
            }
            Action::Continuous(vk) => {
                if let Some(slot) = self.contacts.get_mut(side, id) {
                    slot.down_sent = Some(DownKind::Continuous(vk));
                    slot.lifecycle = contact::Lifecycle::Active;
                }
                let flags = self.haptic_flag() | FLAG_REPEATABLE;
                self.push_dispatch(
                    DispatchEvent::key(now, DispatchKind::KeyDown, vk, side)
                        .with_token(token)
                        .with_flags(flags)
                        .with_label(label),
                );
                self.intent.extend_grace(now, &self.config);
            }
            Action::MomentaryLayer(layer) => {
                if let Some(slot) = self.contacts.get_mut(side, id) {
                    slot.momentary_layer = Some(layer);
                    slot.lifecycle = contact::Lifecycle::Active;
                }
                self.momentary.push((side, id, layer));
            }
            _ => {}
        }
    }

    /// The hold alternate fired for a stationary contact. Press-capable
    /// actions begin their press; tap-like actions emit right at the
    /// threshold and the release is already consumed.
    fn fire_hold(&mut self, side: Side, id: i32) {
        let Some(hold) = self
            .contacts
            .get(side, id)
            .and_then(|s| s.binding.as_ref())
            .and_then(|b| b.mapping.hold)
        else {
            return;
        };
        match hold {
            Action::Modifier(_) | Action::Continuous(_) | Action::MomentaryLayer(_) => {
                self.begin_press(side, id, hold);
            }
            other => {
                let label = self
                    .contacts
                    .get(side, id)
                    .and_then(|s| s.binding.as_ref())
                    .map(|b| b.label.clone());
                self.emit_tap(side, other, label);
            }
        }
    }

    /// Emit the balancing up for a contact's outstanding down.
    fn end_press(&mut self, side: Side, id: i32) {
        let Some((down, token, label)) = self.contacts.get_mut(side, id).and_then(|slot| {
            slot.down_sent
                .take()
                .map(|down| (down, slot.repeat_token, slot.binding.as_ref().map(|b| b.label.clone())))
        }) else {
            return;
        };
        self.emit_up(down, token, side, label);
    }

    fn emit_up(&mut self, down: DownKind, token: u64, side: Side, label: Option<Arc<str>>) {
        let now = self.clock;
        let event = match down {
            DownKind::Modifier(vk) => DispatchEvent::key(now, DispatchKind::ModifierUp, vk, side),
            DownKind::Continuous(vk) => DispatchEvent::key(now, DispatchKind::KeyUp, vk, side),
            DownKind::MouseButton(button) => {
                DispatchEvent::mouse(now, DispatchKind::MouseButtonUp, button, side)
            }
        };
        self.push_dispatch(event.with_token(token).with_label(label));
    }

    /// Release resolution ladder, in order. The slot is already out of the
    /// table.
    fn resolve_release(&mut self, mut slot: ContactSlot) {
        if slot.momentary_layer.is_some() {
            self.momentary
                .retain(|(side, id, _)| !(*side == slot.side && *id == slot.id));
        }

        // 1. An outstanding press balances with its up, nothing else.
        if let Some(down) = slot.down_sent.take() {
            let label = slot.binding.as_ref().map(|b| b.label.clone());
            self.emit_up(down, slot.repeat_token, slot.side, label);
            return;
        }

        // Cancelled contacts (chord source, swipe, teardown) emit nothing.
        if slot.cancelled {
            return;
        }

        // 2. Drag cancel.
        if slot.max_distance_mm > self.config.drag_cancel_mm {
            if !slot.drag_cancelled {
                self.counters.drag_cancels += 1;
            }
            return;
        }

        // 3. An open tap-click candidate owns this release.
        if slot.gesture_owned {
            return;
        }

        // 4. The hold alternate already consumed this contact.
        if slot.hold_triggered {
            return;
        }

        // 5. Release inside the original binding's rect: tap.
        if let Some(binding) = slot.binding.clone() {
            if binding.rect.contains(slot.last_pos) {
                self.emit_tap(slot.side, binding.mapping.primary, Some(binding.label));
                return;
            }
            // 6. Release over a different binding: explicit drag-across-keys.
            if self.index(slot.side).hit_test(slot.last_pos).is_some() {
                return;
            }
        } else if self.index(slot.side).hit_test(slot.last_pos).is_some() {
            // Off-key start ending on some key is a drag, not a tap.
            return;
        }

        // 7. Snap recovery, only while the engine believes this is typing.
        if self.config.snap_radius_percent > 0.0
            && matches!(self.intent.mode(), IntentMode::KeyCandidate | IntentMode::TypingCommitted)
        {
            let ratio = self.config.snap_ambiguity_ratio;
            let hit = self.index(slot.side).snap(slot.last_pos, ratio);
            let snapped =
                hit.map(|i| self.indexes[side_slot(slot.side)].as_ref().expect("built").binding_ref(i).clone());
            if let Some(binding) = snapped {
                self.counters.snap_hits += 1;
                self.emit_tap(slot.side, binding.mapping.primary, Some(binding.label));
                return;
            }
            self.counters.snap_misses += 1;
        }

        // 8. Off-key miss: nothing.
    }

    /// One-shot emission for a resolved tap (or a tap-like hold alternate).
    fn emit_tap(&mut self, side: Side, action: Action, label: Option<Arc<str>>) {
        let now = self.clock;
        let haptic = self.haptic_flag();
        match action {
            Action::None | Action::MomentaryLayer(_) => {}
            Action::Key(vk) | Action::Continuous(vk) => {
                self.push_dispatch(
                    DispatchEvent::key(now, DispatchKind::KeyTap, vk, side)
                        .with_flags(haptic)
                        .with_label(label),
                );
                self.counters.taps_emitted += 1;
                self.intent.extend_grace(now, &self.config);
            }
            Action::Modifier(vk) => {
                self.push_dispatch(
                    DispatchEvent::key(now, DispatchKind::ModifierDown, vk, side)
                        .with_flags(haptic)
                        .with_label(label.clone()),
                );
                self.push_dispatch(
                    DispatchEvent::key(now, DispatchKind::ModifierUp, vk, side).with_label(label),
                );
                self.counters.taps_emitted += 1;
                self.intent.extend_grace(now, &self.config);
            }
            Action::MouseButton(button) => {
                self.push_dispatch(
                    DispatchEvent::mouse(now, DispatchKind::MouseButtonClick, button, side)
                        .with_flags(haptic)
                        .with_label(label),
                );
                self.counters.taps_emitted += 1;
                self.intent.extend_grace(now, &self.config);
            }
            Action::KeyChord(modifier, key) => {
                // Linearized atomically: down, tap, up in consecutive slots.
                self.push_dispatch(
                    DispatchEvent::key(now, DispatchKind::ModifierDown, modifier, side)
                        .with_label(label.clone()),
                );
                self.push_dispatch(
                    DispatchEvent::key(now, DispatchKind::KeyTap, key, side)
                        .with_flags(haptic)
                        .with_label(label.clone()),
                );
                self.push_dispatch(
                    DispatchEvent::key(now, DispatchKind::ModifierUp, modifier, side).with_label(label),
                );
                self.counters.taps_emitted += 1;
                self.intent.extend_grace(now, &self.config);
            }
            Action::LayerSet(layer) => {
                self.persistent_layer = layer;
            }
            Action::LayerToggle(layer) => {
                self.persistent_layer = if self.persistent_layer == layer { 0 } else { layer };
            }
            Action::TypingToggle => {
                self.set_typing_enabled(!self.typing_enabled);
                self.intent.extend_grace(now, &self.config);
            }
        }
    }

    fn apply_gesture_ops(&mut self, ops: gesture::GestureOps) {
        let now = self.clock;
        for op in ops {
            match op {
                GestureOp::CancelSideContacts(side) => self.cancel_side_contacts(side),
                GestureOp::ShiftDown => {
                    self.counters.chord_shifts += 1;
                    self.trace.push(TraceEvent {
                        ticks: now,
                        kind: TraceKind::GestureTrigger,
                        side: Side::Unknown,
                        detail: "chord_shift_down",
                        value: 0,
                    });
                    let flags = self.haptic_flag();
                    self.push_dispatch(
                        DispatchEvent::key(now, DispatchKind::ModifierDown, VirtualKey::LeftShift, Side::Unknown)
                            .with_flags(flags),
                    );
                    self.intent.extend_grace(now, &self.config);
                }
                GestureOp::ShiftUp => {
                    self.trace.push(TraceEvent {
                        ticks: now,
                        kind: TraceKind::GestureTrigger,
                        side: Side::Unknown,
                        detail: "chord_shift_up",
                        value: 0,
                    });
                    self.push_dispatch(DispatchEvent::key(
                        now,
                        DispatchKind::ModifierUp,
                        VirtualKey::LeftShift,
                        Side::Unknown,
                    ));
                }
                GestureOp::EmitClick { button, side } => {
                    self.counters.tap_clicks += 1;
                    self.trace.push(TraceEvent {
                        ticks: now,
                        kind: TraceKind::GestureTrigger,
                        side,
                        detail: "tap_click",
                        value: button as i64,
                    });
                    let flags = self.haptic_flag();
                    self.push_dispatch(
                        DispatchEvent::mouse(now, DispatchKind::MouseButtonClick, button, side).with_flags(flags),
                    );
                    self.intent.extend_grace(now, &self.config);
                }
                GestureOp::ToggleTyping { side, direction } => {
                    self.counters.swipe_toggles += 1;
                    self.trace.push(TraceEvent {
                        ticks: now,
                        kind: TraceKind::GestureTrigger,
                        side,
                        detail: "five_finger_swipe",
                        value: direction as i64,
                    });
                    self.set_typing_enabled(!self.typing_enabled);
                }
                GestureOp::ClaimTapContacts => {
                    for slot in self.contacts.iter_mut() {
                        slot.gesture_owned = true;
                    }
                }
                GestureOp::ReleaseTapClaim => {
                    for slot in self.contacts.iter_mut() {
                        slot.gesture_owned = false;
                    }
                }
            }
        }
    }

    fn cancel_side_contacts(&mut self, side: Side) {
        let mut to_end: SmallVec<[(i32, DownKind, u64, Option<Arc<str>>); 8]> = SmallVec::new();
        for slot in self.contacts.iter_mut() {
            if slot.side != side || slot.cancelled {
                continue;
            }
            slot.cancelled = true;
            self.counters.contacts_cancelled += 1;
            if let Some(down) = slot.down_sent.take() {
                to_end.push((
                    slot.id,
                    down,
                    slot.repeat_token,
                    slot.binding.as_ref().map(|b| b.label.clone()),
                ));
            }
        }
        for (_, down, token, label) in to_end {
            self.emit_up(down, token, side, label);
        }
    }

    /// Flip typing. Disabling tears down every outstanding press so the
    /// backend never holds a key across the toggle.
    pub fn set_typing_enabled(&mut self, enabled: bool) {
        if self.typing_enabled == enabled {
            return;
        }
        if !enabled {
            self.teardown_presses();
        }
        self.typing_enabled = enabled;
        debug!(enabled, "typing toggled");
    }

    fn teardown_presses(&mut self) {
        let mut to_end: SmallVec<[(Side, i32, DownKind, u64, Option<Arc<str>>); 8]> = SmallVec::new();
        for slot in self.contacts.iter_mut() {
            if let Some(down) = slot.down_sent.take() {
                to_end.push((
                    slot.side,
                    slot.id,
                    down,
                    slot.repeat_token,
                    slot.binding.as_ref().map(|b| b.label.clone()),
                ));
            }
        }
        for (side, _, down, token, label) in to_end {
            self.emit_up(down, token, side, label);
        }
        if self.gestures.take_chord_latch() {
            let now = self.clock;
            self.push_dispatch(DispatchEvent::key(
                now,
                DispatchKind::ModifierUp,
                VirtualKey::LeftShift,
                Side::Unknown,
            ));
        }
    }

    /// Idempotent full reset: balancing ups for everything held, all slots
    /// cleared, classifier and gesture state back to idle.
    pub fn reset(&mut self) {
        self.teardown_presses();
        self.contacts.drain();
        self.momentary.clear();
        self.gestures.reset();
        self.intent.reset();
        self.indexes = [None, None];
        self.persistent_layer = 0;
        self.typing_enabled = true;
        self.clock = 0;
        self.last_status_tick = None;
        self.counters = Counters::default();
        self.trace.clear();
        self.trace.push(TraceEvent {
            ticks: 0,
            kind: TraceKind::EngineReset,
            side: Side::Unknown,
            detail: "reset",
            value: 0,
        });
    }

    fn haptic_flag(&self) -> u8 {
        if self.config.haptic_strength > 0.0 {
            FLAG_HAPTIC
        } else {
            0
        }
    }

    fn push_dispatch(&mut self, event: DispatchEvent) {
        if self.trace.is_enabled() {
            self.trace.push(TraceEvent {
                ticks: event.ticks,
                kind: TraceKind::Dispatch,
                side: event.side,
                detail: kind_tag(event.kind),
                value: event.vk.map_or_else(
                    || event.button.map_or(-1, |b| b as i64),
                    |vk| i64::from(vk.code()),
                ),
            });
        }
        self.dispatch.push(event, self.typing_enabled);
    }

    fn publish_render(&mut self) {
        if !self.surface.render_enabled() {
            return;
        }
        let detailed = self.surface.render_detailed();
        let mut snapshot = RenderSnapshot {
            active_layer: self.active_layer(),
            has_transition_state: matches!(
                self.intent.mode(),
                IntentMode::KeyCandidate | IntentMode::MouseCandidate | IntentMode::GestureCandidate
            ),
            ..RenderSnapshot::default()
        };
        let mut latest: Option<(u64, &ContactSlot)> = None;
        for slot in self.contacts.iter() {
            let dot = TouchDot {
                x: slot.last_pos.x,
                y: slot.last_pos.y,
                pressure: if detailed { slot.pressure } else { 0.0 },
                major_axis: if detailed { slot.major_axis } else { 0.0 },
            };
            match slot.side {
                Side::Left => snapshot.left_touches.push(dot),
                Side::Right => snapshot.right_touches.push(dot),
                Side::Unknown => {}
            }
            if slot.binding.is_some() && latest.map_or(true, |(tick, _)| slot.start_tick >= tick) {
                latest = Some((slot.start_tick, slot));
            }
        }
        if let Some((_, slot)) = latest {
            let binding = slot.binding.as_ref().expect("filtered above");
            if binding.is_button {
                snapshot.highlighted_button = Some(binding.storage_key.clone());
            } else {
                snapshot.highlighted_key = Some(binding.storage_key.clone());
            }
        }
        self.surface.publish_render(snapshot);
    }

    fn maybe_publish_status(&mut self, now: u64) {
        let interval_ns = self.config.status_interval_ms * 1_000_000;
        let due = match self.last_status_tick {
            None => true,
            Some(last) => now.saturating_sub(last) >= interval_ns,
        };
        if !due {
            return;
        }
        self.last_status_tick = Some(now);
        let dispatch = self.dispatch.counters();
        let status = StatusSnapshot {
            intent_by_side: [self.intent.mode(); 2],
            contacts_by_side: [
                self.contacts.count_side(Side::Left),
                self.contacts.count_side(Side::Right),
            ],
            typing_enabled: self.typing_enabled,
            keyboard_mode_enabled: self.config.keyboard_mode_enabled,
            counters: self.counters,
            dispatch_enqueued: dispatch.enqueued.load(std::sync::atomic::Ordering::Relaxed),
            dispatch_dropped: dispatch.dropped_full.load(std::sync::atomic::Ordering::Relaxed),
            dispatch_suppressed: dispatch
                .suppressed_typing_disabled
                .load(std::sync::atomic::Ordering::Relaxed),
            revision: 0,
        };
        self.surface.publish_status(status);
    }
}

// SwipeDirection is re-exported for hosts that split the gesture action by
// direction.
pub use gesture::SwipeDirection as FiveFingerSwipeDirection;
