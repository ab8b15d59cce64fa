//! The dispatch queue: bounded, FIFO, at-most-once hand-off from the engine
//! worker to the OS backend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::keycode::VirtualKey;
use crate::keymap::MouseButton;
use crate::touch::Side;

/// Auto-repeat is allowed for this key-down.
pub const FLAG_REPEATABLE: u8 = 1 << 0;
/// The actuator should fire alongside this event.
pub const FLAG_HAPTIC: u8 = 1 << 1;

pub const DEFAULT_DISPATCH_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    KeyTap,
    KeyDown,
    KeyUp,
    ModifierDown,
    ModifierUp,
    MouseButtonClick,
    MouseButtonDown,
    MouseButtonUp,
}

impl DispatchKind {
    /// Events suppressed while typing is disabled. Balancing ups always
    /// pass so held keys can be torn down.
    pub const fn is_typing_output(self) -> bool {
        matches!(
            self,
            DispatchKind::KeyTap | DispatchKind::KeyDown | DispatchKind::ModifierDown
        )
    }
}

/// One OS-directed action. KeyChord atoms arrive already linearized
/// (modifier-down, key-tap, modifier-up) in consecutive queue slots.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchEvent {
    pub ticks: u64,
    pub kind: DispatchKind,
    pub vk: Option<VirtualKey>,
    pub button: Option<MouseButton>,
    /// Opaque handle tying a repeatable down to its up so the backend can
    /// cancel auto-repeat. Zero means no token.
    pub repeat_token: u64,
    pub flags: u8,
    pub side: Side,
    pub label: Option<Arc<str>>,
}

impl DispatchEvent {
    pub fn key(ticks: u64, kind: DispatchKind, vk: VirtualKey, side: Side) -> Self {
        Self {
            ticks,
            kind,
            vk: Some(vk),
            button: None,
            repeat_token: 0,
            flags: 0,
            side,
            label: None,
        }
    }

    pub fn mouse(ticks: u64, kind: DispatchKind, button: MouseButton, side: Side) -> Self {
        Self {
            ticks,
            kind,
            vk: None,
            button: Some(button),
            repeat_token: 0,
            flags: 0,
            side,
            label: None,
        }
    }

    pub fn with_token(mut self, token: u64) -> Self {
        self.repeat_token = token;
        self
    }

    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_label(mut self, label: Option<Arc<str>>) -> Self {
        self.label = label;
        self
    }
}

/// Shared enqueue counters; readable from any thread.
#[derive(Debug, Default)]
pub struct DispatchCounters {
    pub enqueued: AtomicU64,
    pub dropped_full: AtomicU64,
    pub suppressed_typing_disabled: AtomicU64,
}

/// Producer half of the dispatch ring. The engine worker is the only
/// producer; the OS backend drains the paired receiver.
#[derive(Clone)]
pub struct DispatchQueue {
    tx: Sender<DispatchEvent>,
    counters: Arc<DispatchCounters>,
}

/// Create the ring with the given capacity. Ring-full enqueues are dropped
/// and counted, never blocked on.
pub fn dispatch_channel(capacity: usize) -> (DispatchQueue, Receiver<DispatchEvent>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (
        DispatchQueue {
            tx,
            counters: Arc::new(DispatchCounters::default()),
        },
        rx,
    )
}

impl DispatchQueue {
    /// Enqueue one event. Returns whether the event entered the queue.
    pub fn push(&self, event: DispatchEvent, typing_enabled: bool) -> bool {
        if !typing_enabled && event.kind.is_typing_output() {
            self.counters
                .suppressed_typing_disabled
                .fetch_add(1, Ordering::Relaxed);
            return false;
        }
        match self.tx.try_send(event) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.counters.dropped_full.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn counters(&self) -> &Arc<DispatchCounters> {
        &self.counters
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}
