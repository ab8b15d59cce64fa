//! Snapshot surface: immutable render and status views for UIs.
//!
//! Single writer (the engine worker), any number of readers. Readers poll
//! with their last seen revision and get `None` when nothing changed, so
//! the hot path never blocks on a consumer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::diagnostics::Counters;
use crate::engine::intent::IntentMode;
use crate::keymap::LayerId;

/// One rendered touch dot. Pressure and axes are populated only in
/// detailed render mode.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TouchDot {
    pub x: f32,
    pub y: f32,
    pub pressure: f32,
    pub major_axis: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderSnapshot {
    pub left_touches: Vec<TouchDot>,
    pub right_touches: Vec<TouchDot>,
    /// The classifier is between settled states (a candidate mode).
    pub has_transition_state: bool,
    /// Storage key of the grid key under the most recent contact.
    pub highlighted_key: Option<Arc<str>>,
    /// Storage key of the custom button under the most recent contact.
    pub highlighted_button: Option<Arc<str>>,
    pub active_layer: LayerId,
    pub revision: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusSnapshot {
    /// Index 0 = left, 1 = right. The classifier is global; both entries
    /// carry the same mode, kept per-side for the UI surface.
    pub intent_by_side: [IntentMode; 2],
    pub contacts_by_side: [usize; 2],
    pub typing_enabled: bool,
    pub keyboard_mode_enabled: bool,
    pub counters: Counters,
    pub dispatch_enqueued: u64,
    pub dispatch_dropped: u64,
    pub dispatch_suppressed: u64,
    pub revision: u64,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            intent_by_side: [IntentMode::Idle; 2],
            contacts_by_side: [0; 2],
            typing_enabled: true,
            keyboard_mode_enabled: false,
            counters: Counters::default(),
            dispatch_enqueued: 0,
            dispatch_dropped: 0,
            dispatch_suppressed: 0,
            revision: 0,
        }
    }
}

impl StatusSnapshot {
    fn same_payload(&self, other: &Self) -> bool {
        let mut a = *self;
        let mut b = *other;
        a.revision = 0;
        b.revision = 0;
        a == b
    }
}

/// Atomically swapped snapshot pair with strictly monotonic revisions.
#[derive(Debug)]
pub struct SnapshotSurface {
    render: RwLock<Arc<RenderSnapshot>>,
    status: RwLock<Arc<StatusSnapshot>>,
    next_revision: AtomicU64,
    render_enabled: AtomicBool,
    render_detailed: AtomicBool,
}

impl Default for SnapshotSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotSurface {
    pub fn new() -> Self {
        Self {
            render: RwLock::new(Arc::new(RenderSnapshot::default())),
            status: RwLock::new(Arc::new(StatusSnapshot::default())),
            next_revision: AtomicU64::new(1),
            render_enabled: AtomicBool::new(false),
            render_detailed: AtomicBool::new(false),
        }
    }

    /// Render publication is usually enabled only while a UI is visible.
    pub fn set_render_enabled(&self, enabled: bool) {
        self.render_enabled.store(enabled, Ordering::Release);
    }

    pub fn render_enabled(&self) -> bool {
        self.render_enabled.load(Ordering::Acquire)
    }

    pub fn set_render_detailed(&self, detailed: bool) {
        self.render_detailed.store(detailed, Ordering::Release);
    }

    pub fn render_detailed(&self) -> bool {
        self.render_detailed.load(Ordering::Acquire)
    }

    pub fn publish_render(&self, mut snapshot: RenderSnapshot) {
        snapshot.revision = self.next_revision.fetch_add(1, Ordering::AcqRel);
        let arc = Arc::new(snapshot);
        *self.render.write().expect("render lock poisoned") = arc;
    }

    /// Publish a status snapshot unless the payload is unchanged, keeping
    /// the revision a change counter.
    pub fn publish_status(&self, mut snapshot: StatusSnapshot) -> bool {
        {
            let current = self.status.read().expect("status lock poisoned");
            if current.same_payload(&snapshot) {
                return false;
            }
        }
        snapshot.revision = self.next_revision.fetch_add(1, Ordering::AcqRel);
        let arc = Arc::new(snapshot);
        *self.status.write().expect("status lock poisoned") = arc;
        true
    }

    pub fn latest_render(&self) -> Arc<RenderSnapshot> {
        self.render.read().expect("render lock poisoned").clone()
    }

    pub fn latest_status(&self) -> Arc<StatusSnapshot> {
        self.status.read().expect("status lock poisoned").clone()
    }

    pub fn render_if_updated_since(&self, revision: u64) -> Option<Arc<RenderSnapshot>> {
        let current = self.latest_render();
        (current.revision > revision).then_some(current)
    }

    pub fn status_if_updated_since(&self, revision: u64) -> Option<Arc<StatusSnapshot>> {
        let current = self.latest_status();
        (current.revision > revision).then_some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revisions_are_strictly_monotonic() {
        let surface = SnapshotSurface::new();
        surface.publish_render(RenderSnapshot::default());
        let first = surface.latest_render().revision;
        surface.publish_render(RenderSnapshot::default());
        let second = surface.latest_render().revision;
        assert!(second > first);
    }

    #[test]
    fn unchanged_status_does_not_bump_revision() {
        let surface = SnapshotSurface::new();
        let mut status = StatusSnapshot::default();
        status.contacts_by_side = [1, 0];
        assert!(surface.publish_status(status));
        let rev = surface.latest_status().revision;

        assert!(!surface.publish_status(status));
        assert_eq!(surface.latest_status().revision, rev);

        status.contacts_by_side = [2, 0];
        assert!(surface.publish_status(status));
        assert!(surface.latest_status().revision > rev);
    }

    #[test]
    fn delta_polling_returns_none_when_stale() {
        let surface = SnapshotSurface::new();
        surface.publish_render(RenderSnapshot::default());
        let snap = surface.render_if_updated_since(0).unwrap();
        assert!(surface.render_if_updated_since(snap.revision).is_none());
    }
}
