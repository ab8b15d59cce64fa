//! Diagnostics: engine-owned counters, an optional structured trace ring,
//! and the transcript fingerprint used by the headless replay check.

use crate::engine::dispatch::DispatchEvent;
use crate::touch::Side;

/// Recoverable-condition counters. Owned by the engine worker; copies are
/// published through the status snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub frames_processed: u64,
    pub frames_unknown_side: u64,
    pub taps_emitted: u64,
    pub holds_fired: u64,
    pub drag_cancels: u64,
    pub snap_hits: u64,
    pub snap_misses: u64,
    pub tap_clicks: u64,
    pub chord_shifts: u64,
    pub swipe_toggles: u64,
    pub intent_transitions: u64,
    pub contacts_cancelled: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    IntentTransition,
    GestureTrigger,
    Dispatch,
    EngineReset,
}

/// One structured trace record. `detail` is a static tag so tracing never
/// allocates on the hot path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEvent {
    pub ticks: u64,
    pub kind: TraceKind,
    pub side: Side,
    pub detail: &'static str,
    pub value: i64,
}

/// Fixed-size ring of trace events; pushes overwrite the oldest entry.
#[derive(Debug)]
pub struct TraceRing {
    buf: Vec<TraceEvent>,
    capacity: usize,
    next: usize,
    total: u64,
    enabled: bool,
}

impl TraceRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            next: 0,
            total: 0,
            enabled: capacity > 0,
        }
    }

    pub fn disabled() -> Self {
        let mut ring = Self::new(1);
        ring.enabled = false;
        ring
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn push(&mut self, event: TraceEvent) {
        if !self.enabled {
            return;
        }
        if self.buf.len() < self.capacity {
            self.buf.push(event);
        } else {
            self.buf[self.next] = event;
        }
        self.next = (self.next + 1) % self.capacity;
        self.total += 1;
    }

    /// Total events ever pushed, including overwritten ones.
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Events oldest-first.
    pub fn events(&self) -> Vec<TraceEvent> {
        if self.buf.len() < self.capacity {
            return self.buf.clone();
        }
        let mut out = Vec::with_capacity(self.capacity);
        out.extend_from_slice(&self.buf[self.next..]);
        out.extend_from_slice(&self.buf[..self.next]);
        out
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.next = 0;
        self.total = 0;
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Running FNV-1a fold over a dispatch transcript. Two replays of the same
/// capture must produce the same final value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscriptFingerprint(u64);

impl Default for TranscriptFingerprint {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptFingerprint {
    pub const fn new() -> Self {
        Self(FNV_OFFSET)
    }

    fn fold(&mut self, byte: u8) {
        self.0 ^= u64::from(byte);
        self.0 = self.0.wrapping_mul(FNV_PRIME);
    }

    fn fold_u64(&mut self, value: u64) {
        for byte in value.to_le_bytes() {
            self.fold(byte);
        }
    }

    pub fn absorb(&mut self, event: &DispatchEvent) {
        self.fold_u64(event.ticks);
        self.fold(event.kind as u8);
        self.fold(event.vk.map_or(0xff, |vk| vk.code() as u8));
        self.fold(event.button.map_or(0xff, |b| b as u8));
        self.fold_u64(event.repeat_token);
        self.fold(event.flags);
        self.fold(event.side.device_index() as u8);
    }

    pub const fn value(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::dispatch::DispatchKind;
    use crate::keycode::VirtualKey;

    fn trace(ticks: u64) -> TraceEvent {
        TraceEvent {
            ticks,
            kind: TraceKind::Dispatch,
            side: Side::Left,
            detail: "test",
            value: 0,
        }
    }

    #[test]
    fn ring_overwrites_oldest() {
        let mut ring = TraceRing::new(3);
        for i in 0..5 {
            ring.push(trace(i));
        }
        let ticks: Vec<u64> = ring.events().iter().map(|e| e.ticks).collect();
        assert_eq!(ticks, vec![2, 3, 4]);
        assert_eq!(ring.total(), 5);
    }

    #[test]
    fn disabled_ring_records_nothing() {
        let mut ring = TraceRing::disabled();
        ring.push(trace(1));
        assert_eq!(ring.total(), 0);
        assert!(ring.events().is_empty());
    }

    #[test]
    fn fingerprint_is_order_sensitive() {
        let a = DispatchEvent::key(1, DispatchKind::KeyTap, VirtualKey::A, Side::Left);
        let b = DispatchEvent::key(2, DispatchKind::KeyTap, VirtualKey::B, Side::Left);

        let mut forward = TranscriptFingerprint::new();
        forward.absorb(&a);
        forward.absorb(&b);

        let mut reverse = TranscriptFingerprint::new();
        reverse.absorb(&b);
        reverse.absorb(&a);

        assert_ne!(forward.value(), reverse.value());

        let mut again = TranscriptFingerprint::new();
        again.absorb(&a);
        again.absorb(&b);
        assert_eq!(forward.value(), again.value());
    }
}
