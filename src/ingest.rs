//! Frame ingest: sequence assignment and bounded fan-out.
//!
//! The capture source calls [`FrameIngest::push`] from whatever thread the
//! OS delivers on. Each subscriber gets its own bounded queue with a
//! newest-wins drop policy: a stalled consumer loses the oldest buffered
//! frame, never the newest. Nothing in this path performs I/O or blocks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender};
use tracing::info;

use crate::touch::RawFrame;

/// Queue depth per subscriber. Two is enough for a consumer that drains
/// every frame.
pub const SUBSCRIBER_QUEUE_DEPTH: usize = 2;

#[derive(Debug, Default)]
pub struct IngestCounters {
    pub frames_ingested: AtomicU64,
    pub frames_emitted: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub frames_released_unconsumed: AtomicU64,
}

struct SubscriberQueue {
    buf: Mutex<VecDeque<Arc<RawFrame>>>,
    depth: usize,
}

struct Subscriber {
    name: &'static str,
    queue: Arc<SubscriberQueue>,
    signal: Sender<()>,
}

/// Consumer handle returned by [`FrameIngest::subscribe`]. Frames arrive in
/// strictly increasing sequence order; gaps mean newest-wins drops.
pub struct FrameReceiver {
    queue: Arc<SubscriberQueue>,
    signal: Receiver<()>,
}

impl FrameReceiver {
    fn pop(&self) -> Option<Arc<RawFrame>> {
        self.queue.buf.lock().expect("subscriber queue poisoned").pop_front()
    }

    /// Block until the next frame or end-of-stream.
    pub fn recv(&self) -> Option<Arc<RawFrame>> {
        loop {
            if let Some(frame) = self.pop() {
                return Some(frame);
            }
            // The signal channel carries one token per push; spurious
            // tokens from evicted frames just loop once more.
            if self.signal.recv().is_err() {
                return self.pop();
            }
        }
    }

    pub fn try_recv(&self) -> Option<Arc<RawFrame>> {
        self.pop()
    }

    /// The wake-up channel, for use in `select!` loops. After a wake-up,
    /// call [`FrameReceiver::try_recv`] until empty.
    pub const fn signal(&self) -> &Receiver<()> {
        &self.signal
    }
}

/// Fan-out hub between the raw frame source and its consumers.
pub struct FrameIngest {
    next_sequence: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
    counters: IngestCounters,
}

impl Default for FrameIngest {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameIngest {
    pub fn new() -> Self {
        Self {
            next_sequence: AtomicU64::new(1),
            subscribers: Mutex::new(Vec::new()),
            counters: IngestCounters::default(),
        }
    }

    pub const fn counters(&self) -> &IngestCounters {
        &self.counters
    }

    pub fn subscribe(&self, name: &'static str) -> FrameReceiver {
        self.subscribe_with_depth(name, SUBSCRIBER_QUEUE_DEPTH)
    }

    pub fn subscribe_with_depth(&self, name: &'static str, depth: usize) -> FrameReceiver {
        let queue = Arc::new(SubscriberQueue {
            buf: Mutex::new(VecDeque::with_capacity(depth)),
            depth: depth.max(1),
        });
        let (signal_tx, signal_rx) = crossbeam_channel::unbounded();
        let mut subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
        subscribers.push(Subscriber {
            name,
            queue: queue.clone(),
            signal: signal_tx,
        });
        FrameReceiver {
            queue,
            signal: signal_rx,
        }
    }

    pub fn unsubscribe(&self, name: &'static str) {
        let mut subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
        subscribers.retain(|s| s.name != name);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("subscriber lock poisoned").len()
    }

    /// Assign the next sequence number and fan the frame out. The frame is
    /// consumed here; the device-owned buffer it came from is free once
    /// this returns. Never re-sequences: a dropped frame's number is gone.
    pub fn push(&self, mut frame: RawFrame) {
        frame.sequence = self.next_sequence.fetch_add(1, Ordering::AcqRel);
        self.counters.frames_ingested.fetch_add(1, Ordering::Relaxed);

        let frame = Arc::new(frame);

        // Copy the fan-out list under the lock, deliver outside it.
        let targets: smallvec::SmallVec<[(Arc<SubscriberQueue>, Sender<()>); 4]> = {
            let subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
            subscribers
                .iter()
                .map(|s| (s.queue.clone(), s.signal.clone()))
                .collect()
        };

        if targets.is_empty() {
            self.counters
                .frames_released_unconsumed
                .fetch_add(1, Ordering::Relaxed);
            return;
        }

        for (queue, signal) in targets {
            {
                let mut buf = queue.buf.lock().expect("subscriber queue poisoned");
                if buf.len() >= queue.depth {
                    buf.pop_front();
                    self.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
                }
                buf.push_back(frame.clone());
            }
            self.counters.frames_emitted.fetch_add(1, Ordering::Relaxed);
            let _ = signal.send(());
        }
    }

    /// Detach every subscriber. Consumers observe end-of-stream once their
    /// queue drains.
    pub fn shutdown(&self) {
        let mut subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
        let count = subscribers.len();
        subscribers.clear();
        info!(subscribers = count, "frame ingest shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::touch::ContactList;

    fn frame(device_index: i32, timestamp: f64) -> RawFrame {
        RawFrame {
            sequence: 0,
            timestamp,
            device_id: 42,
            device_index,
            contacts: ContactList::new(),
        }
    }

    #[test]
    fn sequences_are_assigned_monotonically() {
        let ingest = FrameIngest::new();
        let rx = ingest.subscribe("test");
        ingest.push(frame(0, 0.0));
        ingest.push(frame(1, 0.01));

        assert_eq!(rx.recv().unwrap().sequence, 1);
        assert_eq!(rx.recv().unwrap().sequence, 2);
    }

    #[test]
    fn newest_wins_drops_oldest() {
        let ingest = FrameIngest::new();
        let rx = ingest.subscribe("slow");
        for i in 0..5 {
            ingest.push(frame(0, i as f64 * 0.01));
        }
        // Depth 2: only the newest two frames survive.
        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.sequence, 4);
        assert_eq!(second.sequence, 5);
        assert!(rx.try_recv().is_none());
        assert_eq!(ingest.counters().frames_dropped.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn frames_without_subscribers_are_counted() {
        let ingest = FrameIngest::new();
        ingest.push(frame(0, 0.0));
        assert_eq!(
            ingest
                .counters()
                .frames_released_unconsumed
                .load(Ordering::Relaxed),
            1
        );
    }

    #[test]
    fn shutdown_signals_end_of_stream() {
        let ingest = FrameIngest::new();
        let rx = ingest.subscribe("test");
        ingest.push(frame(0, 0.0));
        ingest.shutdown();
        assert!(rx.recv().is_some());
        assert!(rx.recv().is_none());
    }
}
