//! Engine runtime: the worker thread that owns all engine state, plus the
//! control plane for capture and replay.
//!
//! Mirrors the split the daemon uses everywhere: a synchronous worker on
//! the hot path, channels for control, and async only in the management
//! layer.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::capture::replay::{ReplayProgress, ReplaySession};
use crate::capture::writer::{CaptureSummary, CaptureWriter};
use crate::capture::read_capture;
use crate::config::EngineConfig;
use crate::diagnostics::{TraceEvent, TranscriptFingerprint};
use crate::engine::dispatch::{dispatch_channel, DispatchEvent, DEFAULT_DISPATCH_CAPACITY};
use crate::engine::TouchEngine;
use crate::error::EngineError;
use crate::ingest::{FrameIngest, FrameReceiver};
use crate::keymap::Keymap;
use crate::layout::Layout;
use crate::snapshot::SnapshotSurface;
use crate::touch::RawFrame;

/// Anything that yields canonical frames: an OS multitouch shim, a test
/// script, a replay file. The source must not allocate per frame once in
/// steady state.
pub trait FrameSource: Send {
    /// The next frame, or `None` at end-of-stream.
    fn next_frame(&mut self) -> Option<RawFrame>;
}

/// The OS input-posting backend contract. Drains dispatch events in FIFO
/// order; modifier downs/ups must be reference-counted by the
/// implementation so overlapping holds nest correctly.
pub trait DispatchBackend: Send {
    fn execute(&mut self, event: &DispatchEvent);
    /// Independent host toggle; the engine never synthesizes backspaces.
    fn set_autocorrect_enabled(&mut self, _enabled: bool) {}
}

/// Backend that logs every event; the default for headless daemon runs.
#[derive(Debug, Default)]
pub struct LoggingBackend;

impl DispatchBackend for LoggingBackend {
    fn execute(&mut self, event: &DispatchEvent) {
        debug!(
            kind = ?event.kind,
            vk = event.vk.map(|k| k.code()),
            button = ?event.button,
            token = event.repeat_token,
            "dispatch"
        );
    }
}

/// Pump a frame source into the ingest hub until end-of-stream or
/// shutdown.
pub fn spawn_frame_source(
    mut source: impl FrameSource + 'static,
    ingest: Arc<FrameIngest>,
    shutdown: Receiver<()>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("g2k-source".to_string())
        .spawn(move || {
            loop {
                match shutdown.try_recv() {
                    Ok(()) | Err(crossbeam_channel::TryRecvError::Disconnected) => break,
                    Err(crossbeam_channel::TryRecvError::Empty) => {}
                }
                match source.next_frame() {
                    Some(frame) => ingest.push(frame),
                    None => break,
                }
            }
            info!("frame source finished");
        })
        .expect("spawn frame source thread")
}

/// Drain the dispatch ring into a backend on its own thread. The backend
/// may block in OS calls; it never re-enters the engine.
pub fn spawn_dispatch_backend(
    rx: Receiver<DispatchEvent>,
    mut backend: impl DispatchBackend + 'static,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("g2k-backend".to_string())
        .spawn(move || {
            while let Ok(event) = rx.recv() {
                backend.execute(&event);
            }
        })
        .expect("spawn dispatch backend thread")
}

/// Commands posted to the engine worker. Configuration changes go through
/// here so only the worker ever touches engine state.
pub enum EngineCommand {
    Frame(Arc<RawFrame>),
    Reset,
    SetConfig(Box<EngineConfig>),
    SetKeymap(Box<Keymap>),
    SetLayout(Box<Layout>),
    SetTypingEnabled(bool),
    Shutdown,
}

/// Cheap cloneable handle for posting commands and reading snapshots.
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: Sender<EngineCommand>,
    surface: Arc<SnapshotSurface>,
}

impl EngineHandle {
    fn send(&self, command: EngineCommand) -> bool {
        if self.cmd_tx.send(command).is_err() {
            warn!("engine worker is gone; command dropped");
            return false;
        }
        true
    }

    pub fn feed_frame(&self, frame: RawFrame) -> bool {
        self.send(EngineCommand::Frame(Arc::new(frame)))
    }

    pub fn feed_shared(&self, frame: Arc<RawFrame>) -> bool {
        self.send(EngineCommand::Frame(frame))
    }

    pub fn reset(&self) -> bool {
        self.send(EngineCommand::Reset)
    }

    pub fn set_config(&self, config: EngineConfig) -> bool {
        self.send(EngineCommand::SetConfig(Box::new(config)))
    }

    pub fn set_keymap(&self, keymap: Keymap) -> bool {
        self.send(EngineCommand::SetKeymap(Box::new(keymap)))
    }

    pub fn set_layout(&self, layout: Layout) -> bool {
        self.send(EngineCommand::SetLayout(Box::new(layout)))
    }

    pub fn set_typing_enabled(&self, enabled: bool) -> bool {
        self.send(EngineCommand::SetTypingEnabled(enabled))
    }

    pub fn surface(&self) -> &Arc<SnapshotSurface> {
        &self.surface
    }
}

/// The assembled runtime: ingest hub, engine worker, capture/replay
/// arbitration.
pub struct EngineRuntime {
    ingest: Arc<FrameIngest>,
    handle: EngineHandle,
    worker: Option<JoinHandle<()>>,
    live_enabled: Arc<AtomicBool>,
    capture: Option<CaptureWriter>,
    replay: Option<ReplaySession>,
    replay_cancel: Option<Arc<AtomicBool>>,
    live_before_replay: bool,
}

impl EngineRuntime {
    /// Spin up the worker. Returns the runtime and the dispatch receiver
    /// for the backend of the host's choosing.
    pub fn start(
        config: EngineConfig,
        layout: Layout,
        keymap: Keymap,
        trace_capacity: usize,
    ) -> (Self, Receiver<DispatchEvent>) {
        let ingest = Arc::new(FrameIngest::new());
        let surface = Arc::new(SnapshotSurface::new());
        match std::env::var("ENGINE_RENDER_MODE").as_deref() {
            Ok("detailed") => surface.set_render_detailed(true),
            Ok("fast") | Err(_) => {}
            Ok(other) => warn!(mode = other, "unknown ENGINE_RENDER_MODE, using fast"),
        }

        let (queue, dispatch_rx) = dispatch_channel(DEFAULT_DISPATCH_CAPACITY);
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let frame_rx = ingest.subscribe("engine");
        let live_enabled = Arc::new(AtomicBool::new(true));

        let worker = {
            let surface = surface.clone();
            let live_enabled = live_enabled.clone();
            std::thread::Builder::new()
                .name("g2k-engine".to_string())
                .spawn(move || {
                    let mut engine =
                        TouchEngine::new(config, layout, keymap, queue, surface, trace_capacity);
                    run_engine_worker(&mut engine, &cmd_rx, &frame_rx, &live_enabled);
                    info!("engine worker exiting");
                })
                .expect("spawn engine worker")
        };

        let handle = EngineHandle {
            cmd_tx,
            surface,
        };
        (
            Self {
                ingest,
                handle,
                worker: Some(worker),
                live_enabled,
                capture: None,
                replay: None,
                replay_cancel: None,
                live_before_replay: true,
            },
            dispatch_rx,
        )
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn ingest(&self) -> Arc<FrameIngest> {
        self.ingest.clone()
    }

    pub fn capture_active(&self) -> bool {
        self.capture.is_some()
    }

    pub fn replay_active(&self) -> bool {
        self.replay.is_some()
    }

    pub fn start_capture(&mut self, path: &Path) -> Result<()> {
        if self.replay.is_some() {
            return Err(EngineError::CaptureOrReplayConflict.into());
        }
        if self.capture.is_some() {
            return Err(EngineError::CaptureAlreadyRunning.into());
        }
        self.capture = Some(CaptureWriter::start(&self.ingest, path.to_path_buf()));
        Ok(())
    }

    pub fn stop_capture(&mut self) -> Result<CaptureSummary> {
        let writer = self.capture.take().ok_or(EngineError::CaptureNotRunning)?;
        writer.stop(&self.ingest)
    }

    /// Open a replay session: parse eagerly, stop live ingest, reset the
    /// engine, feed frame zero.
    pub fn begin_replay(&mut self, path: &Path) -> Result<()> {
        if self.capture.is_some() {
            return Err(EngineError::CaptureOrReplayConflict.into());
        }
        if self.replay.is_some() {
            return Err(EngineError::ReplayAlreadyActive.into());
        }
        let mut session = ReplaySession::open(path)?;
        self.live_before_replay = self.live_enabled.swap(false, Ordering::AcqRel);
        self.handle.reset();
        let prefix = session.seek(0.0)?;
        for timed in prefix {
            self.handle.feed_frame(timed.frame.clone());
        }
        self.replay_cancel = Some(session.cancel_flag());
        self.replay = Some(session);
        Ok(())
    }

    /// Seek the paused session: engine reset, frames `[0..=t]` refed.
    pub fn replay_seek(&mut self, t: f64) -> Result<()> {
        let session = self.replay.as_mut().ok_or(EngineError::ReplayNotActive)?;
        let prefix = session.seek(t)?;
        self.handle.reset();
        for timed in prefix {
            self.handle.feed_frame(timed.frame.clone());
        }
        Ok(())
    }

    /// Advance the paused session one frame.
    pub fn replay_step(&mut self) -> Result<bool> {
        let session = self.replay.as_mut().ok_or(EngineError::ReplayNotActive)?;
        match session.step()? {
            Some(timed) => {
                let frame = timed.frame.clone();
                self.handle.feed_frame(frame);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Play from the current position to the end, paced by capture time.
    pub async fn replay_play(&mut self, on_progress: impl FnMut(ReplayProgress)) -> Result<()> {
        let mut session = self.replay.take().ok_or(EngineError::ReplayNotActive)?;
        let handle = self.handle.clone();
        let result = session
            .play(|timed| {
                handle.feed_frame(timed.frame.clone());
            }, on_progress)
            .await;
        self.replay = Some(session);
        result?;
        Ok(())
    }

    /// Ask an in-flight play to stop at the next frame or sleep boundary.
    pub fn replay_pause(&self) {
        if let Some(cancel) = &self.replay_cancel {
            cancel.store(true, Ordering::Release);
        }
    }

    /// Close the session and restore the prior live-ingest state.
    pub fn end_replay(&mut self) -> Result<()> {
        let session = self.replay.take().ok_or(EngineError::ReplayNotActive)?;
        if session.is_playing() {
            self.replay = Some(session);
            return Err(EngineError::ReplayPlaybackInProgress.into());
        }
        self.replay_cancel = None;
        self.live_enabled.store(self.live_before_replay, Ordering::Release);
        if !self.handle.reset() {
            return Err(EngineError::UnableToRestartAfterReplay.into());
        }
        Ok(())
    }

    /// Stop everything: ingest, worker, outstanding capture.
    pub fn shutdown(mut self) {
        if let Some(writer) = self.capture.take() {
            if let Err(e) = writer.stop(&self.ingest) {
                error!("failed to finalize capture on shutdown: {e}");
            }
        }
        self.ingest.shutdown();
        self.handle.send(EngineCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_engine_worker(
    engine: &mut TouchEngine,
    cmd_rx: &Receiver<EngineCommand>,
    frame_rx: &FrameReceiver,
    live_enabled: &AtomicBool,
) {
    // Phase one: live frames plus commands.
    let mut live_open = true;
    while live_open {
        crossbeam_channel::select! {
            recv(cmd_rx) -> cmd => match cmd {
                Ok(command) => {
                    if !apply_command(engine, command) {
                        return;
                    }
                }
                Err(_) => return,
            },
            recv(frame_rx.signal()) -> msg => {
                while let Some(frame) = frame_rx.try_recv() {
                    if live_enabled.load(Ordering::Acquire) {
                        engine.process_frame(&frame);
                    }
                }
                if msg.is_err() {
                    // Live ingest shut down; replay commands keep working.
                    live_open = false;
                }
            }
        }
    }

    // Phase two: command-only (after ingest shutdown).
    while let Ok(command) = cmd_rx.recv() {
        if !apply_command(engine, command) {
            return;
        }
    }
}

fn apply_command(engine: &mut TouchEngine, command: EngineCommand) -> bool {
    match command {
        EngineCommand::Frame(frame) => engine.process_frame(&frame),
        EngineCommand::Reset => engine.reset(),
        EngineCommand::SetConfig(config) => engine.set_config(*config),
        EngineCommand::SetKeymap(keymap) => engine.set_keymap(*keymap),
        EngineCommand::SetLayout(layout) => engine.set_layout(*layout),
        EngineCommand::SetTypingEnabled(enabled) => engine.set_typing_enabled(enabled),
        EngineCommand::Shutdown => {
            engine.reset();
            return false;
        }
    }
    true
}

/// Result of the headless double-replay determinism check.
#[derive(Debug, Clone)]
pub struct ReplayCheck {
    pub frames: usize,
    pub events: usize,
    pub fingerprint_first: u64,
    pub fingerprint_second: u64,
    pub traces_match: bool,
}

impl ReplayCheck {
    pub fn deterministic(&self) -> bool {
        self.fingerprint_first == self.fingerprint_second && self.traces_match
    }
}

/// Feed a capture through a fresh engine twice and compare transcripts.
/// Exit criterion for `glasstokey replay`.
pub fn run_headless_replay(path: &Path, config: &EngineConfig) -> Result<ReplayCheck> {
    let capture = read_capture(path).context("parsing capture")?;
    let (first_fp, first_events, first_trace) = run_transcript(&capture, config);
    let (second_fp, second_events, second_trace) = run_transcript(&capture, config);
    Ok(ReplayCheck {
        frames: capture.frames.len(),
        events: first_events,
        fingerprint_first: first_fp,
        fingerprint_second: second_fp,
        traces_match: first_trace == second_trace && first_events == second_events,
    })
}

fn run_transcript(
    capture: &crate::capture::ParsedCapture,
    config: &EngineConfig,
) -> (u64, usize, Vec<TraceEvent>) {
    let layout = Layout::standard_split();
    let keymap = Keymap::from_layout(&layout);
    let (queue, rx) = dispatch_channel(DEFAULT_DISPATCH_CAPACITY);
    let surface = Arc::new(SnapshotSurface::new());
    let mut engine = TouchEngine::new(config.clone(), layout, keymap, queue, surface, 4096);

    let mut fingerprint = TranscriptFingerprint::new();
    let mut events = 0usize;
    for timed in &capture.frames {
        engine.process_frame(&timed.frame);
        for event in rx.try_iter() {
            fingerprint.absorb(&event);
            events += 1;
        }
    }
    (fingerprint.value(), events, engine.trace_events())
}
