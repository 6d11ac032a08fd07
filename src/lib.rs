//! voice-notes - recording and playback session engine
//!
//! This library provides:
//! - `session`: recorder and player state machines and the session manager
//! - `device`: the host audio seam (backend traits, per-handle worker threads)
//! - `audio`: the cpal backend (WAV capture, file playback, resampling)

pub mod audio;
pub mod device;
pub mod session;
