//! `pawtrain-voice <exercise.json>`: run a guided session in the terminal.

use anyhow::{bail, Context, Result};
use pawtrain_voice::{
    run_shell, EspeakSynthesizer, ExerciseContent, OnDeviceSpeech, PlaybackDevice, RemoteSpeech,
    RodioPlayback, SessionOrchestrator, SpeechProvider, Synthesizer, VoiceConfig,
};
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// No-op output used when the audio device cannot be opened; the remote voice then
/// fails over to the device voice on first use.
struct NoPlayback;

#[async_trait::async_trait]
impl PlaybackDevice for NoPlayback {
    async fn play(&self, _audio: Vec<u8>) -> pawtrain_voice::VoiceResult<()> {
        Err(pawtrain_voice::VoiceError::Playback("no audio output device".to_string()))
    }
    fn stop(&self) {}
    fn pause(&self) {}
    fn resume(&self) {}
    fn set_volume(&self, _volume: f32) {}
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pawtrain_voice=info")),
        )
        .init();

    let Some(path) = std::env::args().nth(1) else {
        bail!("usage: pawtrain-voice <exercise.json>");
    };

    let config = VoiceConfig::load().context("loading voice config")?;
    let content = ExerciseContent::from_json_file(&path)
        .with_context(|| format!("reading exercise {}", path))?;

    let playback: Arc<dyn PlaybackDevice> = match RodioPlayback::new() {
        Ok(playback) => Arc::new(playback),
        Err(e) => {
            warn!("Audio output unavailable ({}); remote voice disabled", e);
            Arc::new(NoPlayback)
        }
    };
    let primary: Arc<dyn SpeechProvider> = Arc::new(RemoteSpeech::new(&config.remote, playback)?);

    let synth: Arc<dyn Synthesizer> = Arc::new(EspeakSynthesizer::new(config.device.program.clone()));
    let fallback: Arc<dyn SpeechProvider> = Arc::new(OnDeviceSpeech::new(synth, config.device.clone()));

    let orchestrator = SessionOrchestrator::builder(content)
        .providers(primary, fallback)
        .config(&config)
        .build()?;

    info!(locale = %config.locale, "Starting voice shell");
    run_shell(orchestrator, BufReader::new(tokio::io::stdin())).await?;
    Ok(())
}
