//! Typed failures returned by every session command.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::device::DeviceError;

/// Stable machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    FileNotFound,
    PlayerNotInitialized,
    RecorderNotInitialized,
    NotPlaying,
    ErrorPause,
    ErrorResume,
    ErrorStartingRecording,
    ErrorStoppingRecording,
    ErrorPlayingFile,
    ErrorPausingFile,
    ErrorResumingFile,
    ErrorStoppingPlayback,
    ErrorSeeking,
    ErrorGettingDuration,
    ErrorGettingCurrentPosition,
    ErrorGettingAmplitude,
    NoFile,
    AlreadyRecording,
    AlreadyPlaying,
    InvalidState,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::FileNotFound => "FILE_NOT_FOUND",
            ErrorKind::PlayerNotInitialized => "PLAYER_NOT_INITIALIZED",
            ErrorKind::RecorderNotInitialized => "RECORDER_NOT_INITIALIZED",
            ErrorKind::NotPlaying => "NOT_PLAYING",
            ErrorKind::ErrorPause => "ERROR_PAUSE",
            ErrorKind::ErrorResume => "ERROR_RESUME",
            ErrorKind::ErrorStartingRecording => "ERROR_STARTING_RECORDING",
            ErrorKind::ErrorStoppingRecording => "ERROR_STOPPING_RECORDING",
            ErrorKind::ErrorPlayingFile => "ERROR_PLAYING_FILE",
            ErrorKind::ErrorPausingFile => "ERROR_PAUSING_FILE",
            ErrorKind::ErrorResumingFile => "ERROR_RESUMING_FILE",
            ErrorKind::ErrorStoppingPlayback => "ERROR_STOPPING_PLAYBACK",
            ErrorKind::ErrorSeeking => "ERROR_SEEKING",
            ErrorKind::ErrorGettingDuration => "ERROR_GETTING_DURATION",
            ErrorKind::ErrorGettingCurrentPosition => "ERROR_GETTING_CURRENT_POSITION",
            ErrorKind::ErrorGettingAmplitude => "ERROR_GETTING_AMPLITUDE",
            ErrorKind::NoFile => "NO_FILE",
            ErrorKind::AlreadyRecording => "ALREADY_RECORDING",
            ErrorKind::AlreadyPlaying => "ALREADY_PLAYING",
            ErrorKind::InvalidState => "INVALID_STATE",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error returned by recorder and player commands.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("The file does not exist at the specified path: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Player has not been initialized.")]
    PlayerNotInitialized,

    #[error("Recorder has not been initialized.")]
    RecorderNotInitialized,

    #[error("No audio is currently playing to pause.")]
    NotPlaying,

    #[error("Pause not supported on this device")]
    PauseUnsupported,

    #[error("Resume not supported on this device")]
    ResumeUnsupported,

    #[error("Failed to pause recording")]
    Pause(#[source] DeviceError),

    #[error("Failed to resume recording")]
    Resume(#[source] DeviceError),

    #[error("Invalid recording name: {0:?}")]
    InvalidName(String),

    #[error("Failed to start recording")]
    StartingRecording(#[source] DeviceError),

    #[error("Failed to stop recording")]
    StoppingRecording(#[source] DeviceError),

    #[error("Failed to play the audio file.")]
    PlayingFile(#[source] DeviceError),

    #[error("Failed to pause the audio file.")]
    PausingFile(#[source] DeviceError),

    #[error("Failed to resume the audio file.")]
    ResumingFile(#[source] DeviceError),

    #[error("Failed to stop playback.")]
    StoppingPlayback(#[source] DeviceError),

    #[error("Failed to seek audio.")]
    Seeking(#[source] DeviceError),

    #[error("Failed to get audio duration.")]
    GettingDuration(#[source] DeviceError),

    #[error("Failed to get current position.")]
    GettingCurrentPosition(#[source] DeviceError),

    #[error("Failed to read input level.")]
    GettingAmplitude(#[source] DeviceError),

    #[error("No recording file available")]
    NoFile,

    #[error("A recording is already in progress")]
    AlreadyRecording,

    #[error("A playback is already in progress")]
    AlreadyPlaying,

    #[error("Cannot {operation} while the {session} is {state}")]
    InvalidState { session: &'static str, operation: &'static str, state: &'static str },
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::FileNotFound(_) => ErrorKind::FileNotFound,
            SessionError::PlayerNotInitialized => ErrorKind::PlayerNotInitialized,
            SessionError::RecorderNotInitialized => ErrorKind::RecorderNotInitialized,
            SessionError::NotPlaying => ErrorKind::NotPlaying,
            SessionError::PauseUnsupported | SessionError::Pause(_) => ErrorKind::ErrorPause,
            SessionError::ResumeUnsupported | SessionError::Resume(_) => ErrorKind::ErrorResume,
            SessionError::InvalidName(_) | SessionError::StartingRecording(_) => ErrorKind::ErrorStartingRecording,
            SessionError::StoppingRecording(_) => ErrorKind::ErrorStoppingRecording,
            SessionError::PlayingFile(_) => ErrorKind::ErrorPlayingFile,
            SessionError::PausingFile(_) => ErrorKind::ErrorPausingFile,
            SessionError::ResumingFile(_) => ErrorKind::ErrorResumingFile,
            SessionError::StoppingPlayback(_) => ErrorKind::ErrorStoppingPlayback,
            SessionError::Seeking(_) => ErrorKind::ErrorSeeking,
            SessionError::GettingDuration(_) => ErrorKind::ErrorGettingDuration,
            SessionError::GettingCurrentPosition(_) => ErrorKind::ErrorGettingCurrentPosition,
            SessionError::GettingAmplitude(_) => ErrorKind::ErrorGettingAmplitude,
            SessionError::NoFile => ErrorKind::NoFile,
            SessionError::AlreadyRecording => ErrorKind::AlreadyRecording,
            SessionError::AlreadyPlaying => ErrorKind::AlreadyPlaying,
            SessionError::InvalidState { .. } => ErrorKind::InvalidState,
        }
    }

    /// The underlying device fault, if this error wraps one.
    pub fn device_error(&self) -> Option<&DeviceError> {
        match self {
            SessionError::Pause(e)
            | SessionError::Resume(e)
            | SessionError::StartingRecording(e)
            | SessionError::StoppingRecording(e)
            | SessionError::PlayingFile(e)
            | SessionError::PausingFile(e)
            | SessionError::ResumingFile(e)
            | SessionError::StoppingPlayback(e)
            | SessionError::Seeking(e)
            | SessionError::GettingDuration(e)
            | SessionError::GettingCurrentPosition(e)
            | SessionError::GettingAmplitude(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_device_faults_keep_their_source() {
        let err = SessionError::StoppingRecording(DeviceError::Encode("disk full".to_string()));
        assert_eq!(err.kind().code(), "ERROR_STOPPING_RECORDING");
        assert!(err.source().is_some_and(|s| s.to_string().contains("disk full")));
        assert!(err.device_error().is_some());
    }

    #[test]
    fn test_unsupported_pause_maps_to_error_pause() {
        assert_eq!(SessionError::PauseUnsupported.kind(), ErrorKind::ErrorPause);
        assert_eq!(SessionError::PauseUnsupported.to_string(), "Pause not supported on this device");
        assert!(SessionError::PauseUnsupported.device_error().is_none());
    }
}
