//! Replay session: a parsed capture plus a cursor, seekable and playable
//! against the same engine path live frames take.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::capture::{read_capture, ParsedCapture, TimedFrame};
use crate::error::{EngineError, EngineResult};

/// Playback progress reported to `play` observers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayProgress {
    pub frame_index: usize,
    pub frame_count: usize,
    pub position_seconds: f64,
    pub duration_seconds: f64,
}

pub struct ReplaySession {
    capture: ParsedCapture,
    /// Index of the next frame to feed.
    cursor: usize,
    playing: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
}

impl ReplaySession {
    pub fn open(path: &Path) -> EngineResult<Self> {
        let capture = read_capture(path)?;
        info!(
            path = %path.display(),
            frames = capture.frames.len(),
            duration = capture.duration_seconds(),
            "replay session opened"
        );
        Ok(Self {
            capture,
            cursor: 0,
            playing: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn from_parsed(capture: ParsedCapture) -> Self {
        Self {
            capture,
            cursor: 0,
            playing: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn frame_count(&self) -> usize {
        self.capture.frames.len()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.capture.duration_seconds()
    }

    pub fn position_seconds(&self) -> f64 {
        if self.cursor == 0 {
            return 0.0;
        }
        self.capture.frames[self.cursor - 1].at_seconds
    }

    pub fn frames(&self) -> &[TimedFrame] {
        &self.capture.frames
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Request cancellation of an in-flight `play`. Takes effect at the
    /// next sleep boundary or frame edge.
    pub fn pause(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// Shared cancellation flag, for controllers that hand the session to a
    /// playback task and still need to pause it.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Seek to `t` seconds (clamped to the capture duration). Returns the
    /// prefix of frames `[0..=idx]` the caller must feed into a freshly
    /// reset engine. Paused sessions only.
    pub fn seek(&mut self, t: f64) -> EngineResult<&[TimedFrame]> {
        if self.is_playing() {
            return Err(EngineError::ReplayPlaybackInProgress);
        }
        let t = t.clamp(0.0, self.duration_seconds());
        // Largest index whose timestamp <= t.
        let idx = self.capture.frames.partition_point(|f| f.at_seconds <= t);
        self.cursor = idx;
        debug!(t, frames = idx, "replay seek");
        Ok(&self.capture.frames[..idx])
    }

    /// Advance exactly one frame. Paused sessions only.
    pub fn step(&mut self) -> EngineResult<Option<&TimedFrame>> {
        if self.is_playing() {
            return Err(EngineError::ReplayPlaybackInProgress);
        }
        if self.cursor >= self.capture.frames.len() {
            return Ok(None);
        }
        let frame = &self.capture.frames[self.cursor];
        self.cursor += 1;
        Ok(Some(frame))
    }

    /// Play from the current cursor to the end, pacing frames by their
    /// captured inter-arrival times. `feed` pushes each frame down the
    /// engine path; `on_progress` reports after each frame. Cancellation
    /// (via [`ReplaySession::pause`]) is observed at every sleep boundary.
    /// A second concurrent play is refused.
    pub async fn play<F, P>(&mut self, mut feed: F, mut on_progress: P) -> EngineResult<()>
    where
        F: FnMut(&TimedFrame),
        P: FnMut(ReplayProgress),
    {
        if self
            .playing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::ReplayPlaybackInProgress);
        }
        self.cancel.store(false, Ordering::Release);

        let frame_count = self.frame_count();
        let duration = self.duration_seconds();
        let start_position = self.position_seconds();

        while self.cursor < frame_count {
            if self.cancel.load(Ordering::Acquire) {
                break;
            }
            let at = self.capture.frames[self.cursor].at_seconds;
            let wait = at - if self.cursor == 0 { start_position } else { self.capture.frames[self.cursor - 1].at_seconds };
            if wait > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(wait)).await;
            }
            if self.cancel.load(Ordering::Acquire) {
                break;
            }
            let frame = &self.capture.frames[self.cursor];
            feed(frame);
            self.cursor += 1;
            on_progress(ReplayProgress {
                frame_index: self.cursor,
                frame_count,
                position_seconds: at,
                duration_seconds: duration,
            });
        }

        self.playing.store(false, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureMeta, ParsedCapture, TimedFrame, DEFAULT_TICK_FREQUENCY};
    use crate::touch::{ContactList, RawFrame};

    fn timed(sequence: u64, at_seconds: f64) -> TimedFrame {
        TimedFrame {
            at_seconds,
            frame: RawFrame {
                sequence,
                timestamp: at_seconds,
                device_id: 1,
                device_index: 0,
                contacts: ContactList::new(),
            },
        }
    }

    fn session(frames: Vec<TimedFrame>) -> ReplaySession {
        ReplaySession::from_parsed(ParsedCapture {
            tick_frequency: DEFAULT_TICK_FREQUENCY,
            meta: CaptureMeta::new("t".to_string(), "test".to_string(), 0),
            frames,
        })
    }

    #[test]
    fn seek_selects_frames_at_or_before_t() {
        let mut s = session(vec![timed(1, 0.0), timed(2, 0.1), timed(3, 0.2), timed(4, 0.3)]);
        let prefix = s.seek(0.15).unwrap();
        assert_eq!(prefix.len(), 2);
        assert_eq!(s.position_seconds(), 0.1);

        // Clamped above the end.
        let prefix = s.seek(99.0).unwrap();
        assert_eq!(prefix.len(), 4);
    }

    #[test]
    fn step_advances_one_frame() {
        let mut s = session(vec![timed(1, 0.0), timed(2, 0.1)]);
        assert_eq!(s.step().unwrap().unwrap().frame.sequence, 1);
        assert_eq!(s.step().unwrap().unwrap().frame.sequence, 2);
        assert!(s.step().unwrap().is_none());
    }

    #[tokio::test]
    async fn play_feeds_remaining_frames_in_order() {
        let mut s = session(vec![timed(1, 0.0), timed(2, 0.001), timed(3, 0.002)]);
        s.seek(0.0).unwrap();
        let mut fed = Vec::new();
        s.play(|f| fed.push(f.frame.sequence), |_| {}).await.unwrap();
        assert_eq!(fed, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn play_after_seek_feeds_the_suffix() {
        let mut s = session(vec![timed(1, 0.0), timed(2, 0.001), timed(3, 0.002)]);
        s.seek(0.001).unwrap();
        let mut fed = Vec::new();
        s.play(|f| fed.push(f.frame.sequence), |_| {}).await.unwrap();
        assert_eq!(fed, vec![3]);
    }
}
