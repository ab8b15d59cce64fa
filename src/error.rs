use thiserror::Error;

/// Typed errors surfaced at the engine's API boundaries.
///
/// The per-frame hot path never constructs these; recoverable conditions
/// there are tracked through [`crate::diagnostics::Counters`] instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Capture file is structurally unusable (bad magic, truncated header,
    /// payload length mismatch, broken sequence, unknown contact phase).
    #[error("invalid capture: {reason}")]
    InvalidCapture { reason: &'static str },

    /// Capture file declares a version other than the supported one.
    #[error("unsupported capture version {actual} (expected {})", crate::capture::CAPTURE_VERSION)]
    UnsupportedCaptureVersion { actual: i32 },

    #[error("capture already running")]
    CaptureAlreadyRunning,

    #[error("capture not running")]
    CaptureNotRunning,

    #[error("replay session already active")]
    ReplayAlreadyActive,

    #[error("no replay session active")]
    ReplayNotActive,

    /// A playback task is running; seek/step require the session paused.
    #[error("replay playback in progress")]
    ReplayPlaybackInProgress,

    /// Capture and replay are mutually exclusive on one runtime.
    #[error("capture and replay cannot run at the same time")]
    CaptureOrReplayConflict,

    #[error("unable to start frame source")]
    UnableToStartFrameSource,

    #[error("unable to restart live ingest after replay")]
    UnableToRestartAfterReplay,
}

pub type EngineResult<T> = Result<T, EngineError>;
