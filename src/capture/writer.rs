//! Capture writer: records the live ingest stream and writes the
//! `.atpcap` on stop.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::capture::{encode_capture, CaptureMeta};
use crate::ingest::FrameIngest;
use crate::touch::RawFrame;

/// Upper bound on buffered frames (~10 minutes at two 120 Hz surfaces).
pub const CAPTURE_FRAME_LIMIT: usize = 150_000;

const SUBSCRIBER_NAME: &str = "capture-writer";
/// The writer drains on its own thread; a deeper queue rides out stalls
/// without perturbing the engine's newest-wins queue.
const WRITER_QUEUE_DEPTH: usize = 256;

#[derive(Debug, Clone)]
pub struct CaptureSummary {
    pub path: PathBuf,
    pub frames_captured: u64,
    pub frames_over_limit: u64,
}

/// Observes the frame ingest stream, stamps arrival ticks, and serializes
/// everything on `stop()`. Mutually exclusive with replay (enforced by the
/// runtime).
pub struct CaptureWriter {
    path: PathBuf,
    dropped: Arc<AtomicU64>,
    worker: Option<JoinHandle<Vec<(i64, RawFrame)>>>,
}

impl CaptureWriter {
    /// Subscribe to the ingest stream and start buffering.
    pub fn start(ingest: &FrameIngest, path: PathBuf) -> Self {
        let rx = ingest.subscribe_with_depth(SUBSCRIBER_NAME, WRITER_QUEUE_DEPTH);
        let dropped = Arc::new(AtomicU64::new(0));
        let dropped_worker = dropped.clone();
        let started = Instant::now();

        let worker = std::thread::spawn(move || {
            let mut frames: Vec<(i64, RawFrame)> = Vec::new();
            while let Some(frame) = rx.recv() {
                if frames.len() >= CAPTURE_FRAME_LIMIT {
                    dropped_worker.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                let arrival_ticks = started.elapsed().as_nanos() as i64;
                frames.push((arrival_ticks, (*frame).clone()));
            }
            frames
        });

        info!(path = %path.display(), "capture started");
        Self {
            path,
            dropped,
            worker: Some(worker),
        }
    }

    /// Detach from the ingest stream, drain the buffer, and write the file.
    pub fn stop(mut self, ingest: &FrameIngest) -> Result<CaptureSummary> {
        ingest.unsubscribe(SUBSCRIBER_NAME);
        let frames = self
            .worker
            .take()
            .expect("capture worker present")
            .join()
            .map_err(|_| anyhow::anyhow!("capture worker panicked"))?;

        let over_limit = self.dropped.load(Ordering::Relaxed);
        if over_limit > 0 {
            warn!(over_limit, "capture hit the frame limit; tail discarded");
        }

        let captured_at = now_rfc3339();
        let meta = CaptureMeta::new(captured_at, "live-ingest".to_string(), frames.len() as u64);
        let bytes = encode_capture(&meta, &frames);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        std::fs::write(&self.path, &bytes)
            .with_context(|| format!("writing capture to {}", self.path.display()))?;

        info!(
            path = %self.path.display(),
            frames = frames.len(),
            bytes = bytes.len(),
            "capture written"
        );
        Ok(CaptureSummary {
            path: self.path,
            frames_captured: frames.len() as u64,
            frames_over_limit: over_limit,
        })
    }
}

/// Wall-clock stamp for the meta record, second precision.
fn now_rfc3339() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    // Days-from-civil conversion; good for the lifetime of this format.
    let days = now / 86_400;
    let secs = now % 86_400;
    let (year, month, day) = civil_from_days(days as i64);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}Z",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::read_capture;
    use crate::touch::ContactList;

    fn frame(device_index: i32, timestamp: f64) -> RawFrame {
        RawFrame {
            sequence: 0,
            timestamp,
            device_id: 7,
            device_index,
            contacts: ContactList::new(),
        }
    }

    #[test]
    fn writes_a_parsable_capture() {
        let ingest = FrameIngest::new();
        let writer = CaptureWriter::start(&ingest, std::env::temp_dir().join("g2k_writer_test.atpcap"));

        ingest.push(frame(0, 0.0));
        ingest.push(frame(1, 0.008));
        ingest.push(frame(0, 0.016));

        // Give the writer thread a moment to drain.
        std::thread::sleep(std::time::Duration::from_millis(50));

        let summary = writer.stop(&ingest).unwrap();
        assert_eq!(summary.frames_captured, 3);

        let parsed = read_capture(&summary.path).unwrap();
        assert_eq!(parsed.frames.len(), 3);
        assert_eq!(parsed.meta.frames_captured, 3);
        assert_eq!(parsed.frames[0].frame.sequence, 1);
        assert_eq!(parsed.frames[0].at_seconds, 0.0);

        std::fs::remove_file(&summary.path).ok();
    }

    #[test]
    fn civil_date_conversion_is_sane() {
        // 2026-08-01 is 20666 days after the epoch.
        assert_eq!(civil_from_days(20_666), (2026, 8, 1));
        assert_eq!(civil_from_days(0), (1970, 1, 1));
    }
}
