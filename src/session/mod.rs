//! Recording and playback session engine.
//!
//! This module provides:
//! - Recorder and player state machines, one device handle each
//! - Input level sampling with a bounded history
//! - A session manager enforcing one live recording and one live playback
//! - A typed error taxonomy with stable codes

mod amplitude;
mod error;
mod manager;
mod playback;
mod recording;

pub use amplitude::{AmplitudeSampler, DEFAULT_SAMPLE_INTERVAL_MS, HISTORY_CAPACITY};
pub use error::{ErrorKind, SessionError};
pub use manager::SessionManager;
pub use playback::{PlaybackCompletion, PlaybackOutcome, PlaybackSession, PlayerState};
pub use recording::{RecorderState, RecordingSession};
