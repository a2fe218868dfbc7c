//! Speech providers: the remote studio voice and the on-device fallback.
//!
//! Both implement [`SpeechProvider`]. `speak` never fails: an unavailable backend
//! resolves with [`SpeakOutcome::FallbackRequested`] so the orchestrator's flow stays
//! a linear await/check.

pub mod device;
pub mod espeak;
pub mod remote;

use async_trait::async_trait;
use std::fmt;

pub use device::{select_voice, split_sentences, DeviceVoice, OnDeviceSpeech, Synthesizer, Utterance};
pub use espeak::EspeakSynthesizer;
pub use remote::RemoteSpeech;

/// Result of one `speak()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// Finished speaking (or was stopped).
    Completed,
    /// Backend is unavailable; switch to the fallback for the rest of the session.
    FallbackRequested,
}

/// Which tier a provider belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Remote, high-quality synthesis.
    Primary,
    /// On-device synthesis.
    Fallback,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Primary => f.write_str("primary"),
            ProviderKind::Fallback => f.write_str("fallback"),
        }
    }
}

/// A backend that can speak text aloud.
///
/// `stop`, `pause`, `resume` and `set_volume` must be safe to call at any time,
/// including when nothing is playing.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Speak `text` and resolve once it has finished playing.
    async fn speak(&self, text: &str, locale: &str) -> SpeakOutcome;

    /// Halt playback immediately. A pending `speak` resolves soon after.
    fn stop(&self);

    fn pause(&self);

    fn resume(&self);

    /// Volume in `0.0..=1.0`.
    fn set_volume(&self, volume: f32);
}

/// Store an `f32` volume in an atomic.
pub(crate) fn volume_bits(volume: f32) -> u32 {
    volume.clamp(0.0, 1.0).to_bits()
}
