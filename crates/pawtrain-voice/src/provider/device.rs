//! On-device fallback voice.
//!
//! Text is split into sentences and spoken one utterance at a time with a short
//! silence between them, which keeps robotic voices intelligible. The platform
//! synthesizer sits behind [`Synthesizer`].

use super::{volume_bits, ProviderKind, SpeakOutcome, SpeechProvider};
use crate::config::DeviceVoiceConfig;
use crate::error::VoiceResult;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, OnceCell};
use tracing::{debug, info, warn};

static SENTENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^.!?]+[.!?]*").expect("valid sentence pattern"));

/// A voice installed on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceVoice {
    pub name: String,
    /// BCP-47-ish tag as reported by the synthesizer (`en-US`, `de`, ...).
    pub locale: String,
    /// Enhanced/neural quality voice.
    pub high_quality: bool,
}

/// One sentence to synthesize.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub voice: Option<String>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

/// Platform speech synthesizer.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Installed voices.
    async fn voices(&self) -> VoiceResult<Vec<DeviceVoice>>;

    /// Speak one utterance; resolve when it has finished or was cancelled.
    async fn speak_utterance(&self, utterance: &Utterance) -> VoiceResult<()>;

    fn cancel(&self);

    fn pause(&self);

    fn resume(&self);
}

/// Split text at sentence terminators. Blank fragments are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    SENTENCE
        .find_iter(text)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Pick the best installed voice for `locale`.
///
/// Candidates match the locale exactly, else by language. Among them: the first
/// preferred name that matches, then any high-quality voice, then any voice not
/// marked "compact", then the first candidate. `None` when nothing matches the
/// language at all.
pub fn select_voice(voices: &[DeviceVoice], locale: &str, preferred: &[String]) -> Option<DeviceVoice> {
    let wanted = normalize_locale(locale);
    let language = wanted.split('-').next().unwrap_or_default().to_string();

    let exact: Vec<&DeviceVoice> = voices
        .iter()
        .filter(|v| normalize_locale(&v.locale) == wanted)
        .collect();
    let candidates = if exact.is_empty() {
        voices
            .iter()
            .filter(|v| normalize_locale(&v.locale).split('-').next() == Some(language.as_str()))
            .collect()
    } else {
        exact
    };

    for name in preferred {
        let name = name.to_lowercase();
        if let Some(v) = candidates.iter().find(|v| v.name.to_lowercase().contains(&name)) {
            return Some((*v).clone());
        }
    }

    candidates
        .iter()
        .find(|v| v.high_quality)
        .or_else(|| {
            candidates
                .iter()
                .find(|v| !v.name.to_lowercase().contains("compact"))
        })
        .or_else(|| candidates.first())
        .map(|v| (*v).clone())
}

fn normalize_locale(locale: &str) -> String {
    locale.trim().replace('_', "-").to_lowercase()
}

/// Fallback [`SpeechProvider`] over a device [`Synthesizer`].
pub struct OnDeviceSpeech {
    synth: Arc<dyn Synthesizer>,
    config: DeviceVoiceConfig,
    volume: AtomicU32,
    generation: AtomicU64,
    paused: watch::Sender<bool>,
    voices: OnceCell<Vec<DeviceVoice>>,
}

impl OnDeviceSpeech {
    pub fn new(synth: Arc<dyn Synthesizer>, config: DeviceVoiceConfig) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            synth,
            config,
            volume: AtomicU32::new(volume_bits(1.0)),
            generation: AtomicU64::new(0),
            paused,
            voices: OnceCell::new(),
        }
    }

    async fn voice_for(&self, locale: &str) -> Option<String> {
        let voices = self
            .voices
            .get_or_init(|| async {
                match self.synth.voices().await {
                    Ok(voices) => {
                        info!(count = voices.len(), "Loaded device voices");
                        voices
                    }
                    Err(e) => {
                        warn!(error = %e, "Could not list device voices; using synthesizer default");
                        Vec::new()
                    }
                }
            })
            .await;
        select_voice(voices, locale, &self.config.preferred_voices).map(|v| v.name)
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    async fn wait_while_paused(&self) {
        let mut rx = self.paused.subscribe();
        let _ = rx.wait_for(|paused| !*paused).await;
    }
}

#[async_trait]
impl SpeechProvider for OnDeviceSpeech {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Fallback
    }

    async fn speak(&self, text: &str, locale: &str) -> SpeakOutcome {
        let generation = self.generation.load(Ordering::SeqCst);
        let sentences = split_sentences(text);
        if sentences.is_empty() {
            return SpeakOutcome::Completed;
        }
        let voice = self.voice_for(locale).await;

        for (i, sentence) in sentences.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.sentence_pause()).await;
            }
            self.wait_while_paused().await;
            if self.is_stale(generation) {
                debug!("Device speech stopped");
                return SpeakOutcome::Completed;
            }

            let utterance = Utterance {
                text: sentence,
                voice: voice.clone(),
                rate: self.config.rate,
                pitch: self.config.pitch,
                volume: f32::from_bits(self.volume.load(Ordering::SeqCst)),
            };
            if let Err(e) = self.synth.speak_utterance(&utterance).await {
                warn!(error = %e, "Device synthesizer failed on an utterance");
            }
            if self.is_stale(generation) {
                return SpeakOutcome::Completed;
            }
        }
        SpeakOutcome::Completed
    }

    fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.paused.send_replace(false);
        self.synth.cancel();
    }

    fn pause(&self) {
        self.paused.send_replace(true);
        self.synth.pause();
    }

    fn resume(&self) {
        self.paused.send_replace(false);
        self.synth.resume();
    }

    fn set_volume(&self, volume: f32) {
        self.volume.store(volume_bits(volume), Ordering::SeqCst);
    }
}
