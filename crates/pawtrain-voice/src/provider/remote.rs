//! Remote high-quality speech: POST text to a synthesis endpoint, play the audio.
//!
//! Request body: `{"text": ..., "locale": ..., "voice": ...}` with optional bearer
//! auth. The response body is encoded audio handed to a [`PlaybackDevice`].

use super::{volume_bits, ProviderKind, SpeakOutcome, SpeechProvider};
use crate::config::RemoteVoiceConfig;
use crate::error::{VoiceError, VoiceResult};
use crate::playback::PlaybackDevice;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
    locale: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<&'a str>,
}

pub struct RemoteSpeech {
    client: reqwest::Client,
    endpoint: Option<String>,
    api_key: Option<String>,
    voice: Option<String>,
    playback: Arc<dyn PlaybackDevice>,
    volume: AtomicU32,
    /// Bumped by `stop()`; a fetch that finishes under an older generation is discarded.
    generation: AtomicU64,
}

impl RemoteSpeech {
    pub fn new(config: &RemoteVoiceConfig, playback: Arc<dyn PlaybackDevice>) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        let endpoint = config
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        if endpoint.is_none() {
            info!("No remote voice endpoint configured; sessions will use the device voice");
        }
        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            voice: config.voice.clone(),
            playback,
            volume: AtomicU32::new(volume_bits(1.0)),
            generation: AtomicU64::new(0),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    async fn fetch(&self, url: &str, text: &str, locale: &str) -> VoiceResult<Vec<u8>> {
        let body = SpeakRequest {
            text,
            locale,
            voice: self.voice.as_deref(),
        };
        let mut request = self.client.post(url).json(&body);
        if let Some(key) = self.api_key.as_deref() {
            request = request.bearer_auth(key);
        }
        let res = request.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Tts(format!("TTS API error {}: {}", status, body)));
        }
        let bytes = res.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SpeechProvider for RemoteSpeech {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Primary
    }

    async fn speak(&self, text: &str, locale: &str) -> SpeakOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SpeakOutcome::Completed;
        }
        let Some(url) = self.endpoint.as_deref() else {
            return SpeakOutcome::FallbackRequested;
        };

        let generation = self.generation.load(Ordering::SeqCst);
        let audio = match self.fetch(url, text, locale).await {
            Ok(audio) if !audio.is_empty() => audio,
            Ok(_) => {
                warn!("Remote voice returned no audio");
                return SpeakOutcome::FallbackRequested;
            }
            Err(e) => {
                warn!(error = %e, "Remote voice unavailable");
                return SpeakOutcome::FallbackRequested;
            }
        };

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Remote audio arrived after stop; discarding");
            return SpeakOutcome::Completed;
        }

        self.playback
            .set_volume(f32::from_bits(self.volume.load(Ordering::SeqCst)));
        match self.playback.play(audio).await {
            Ok(()) => SpeakOutcome::Completed,
            Err(e) => {
                warn!(error = %e, "Remote audio playback failed");
                SpeakOutcome::FallbackRequested
            }
        }
    }

    fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.playback.stop();
    }

    fn pause(&self) {
        self.playback.pause();
    }

    fn resume(&self) {
        self.playback.resume();
    }

    fn set_volume(&self, volume: f32) {
        self.volume.store(volume_bits(volume), Ordering::SeqCst);
        self.playback.set_volume(volume);
    }
}
