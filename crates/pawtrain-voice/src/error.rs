//! Error types for guided voice sessions

use crate::session::Phase;
use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur while configuring or driving a guided session.
///
/// Provider failures never surface here during a session: speech backends resolve
/// with a [`SpeakOutcome`](crate::provider::SpeakOutcome) instead. These errors are
/// for setup (config, devices) and for control calls the shell should not have issued.
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Synthesizer error: {0}")]
    Synthesizer(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Exercise content error: {0}")]
    Content(String),

    #[error("Cannot {action} while the session is {phase}")]
    InvalidTransition { action: &'static str, phase: Phase },

    #[error("Session has been closed")]
    SessionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<config::ConfigError> for VoiceError {
    fn from(err: config::ConfigError) -> Self {
        VoiceError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for VoiceError {
    fn from(err: serde_json::Error) -> Self {
        VoiceError::Content(err.to_string())
    }
}

impl VoiceError {
    /// True for errors caused by a control call that is not valid right now.
    /// The shell can ignore these; the session itself is unaffected.
    pub fn is_rejected_command(&self) -> bool {
        matches!(
            self,
            VoiceError::InvalidTransition { .. } | VoiceError::SessionClosed
        )
    }
}
