//! Audio playback for synthesized speech using Rodio.
//!
//! The Rodio output stream is not `Send`, so it lives on its own thread for the
//! lifetime of [`RodioPlayback`]; only the stream handle and per-utterance sinks
//! cross threads.

use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread;
use tracing::{debug, info};

/// Plays encoded audio (WAV/MP3/OGG/FLAC) to the speakers.
#[async_trait]
pub trait PlaybackDevice: Send + Sync {
    /// Play `audio` and resolve when it has finished or was stopped.
    async fn play(&self, audio: Vec<u8>) -> VoiceResult<()>;

    /// Stop playback immediately and drop what is queued.
    fn stop(&self);

    fn pause(&self);

    fn resume(&self);

    fn set_volume(&self, volume: f32);
}

/// Default output device playback. One sink per utterance.
pub struct RodioPlayback {
    handle: OutputStreamHandle,
    current: Mutex<Option<Arc<Sink>>>,
    paused: AtomicBool,
    volume: AtomicU32,
    // Dropping the sender ends the thread that owns the output stream.
    _stream_guard: mpsc::Sender<()>,
}

impl RodioPlayback {
    /// Open the default output device.
    pub fn new() -> VoiceResult<Self> {
        info!("🔊 Initializing audio playback");

        let (ready_tx, ready_rx) = mpsc::channel::<VoiceResult<OutputStreamHandle>>();
        let (guard_tx, guard_rx) = mpsc::channel::<()>();

        thread::Builder::new()
            .name("pawtrain-audio-out".to_string())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    let _ = ready_tx.send(Ok(handle));
                    // Park until the owning RodioPlayback is dropped.
                    let _ = guard_rx.recv();
                    drop(stream);
                    debug!("Audio output stream closed");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(VoiceError::Playback(e.to_string())));
                }
            })?;

        let handle = ready_rx
            .recv()
            .map_err(|e| VoiceError::Playback(format!("Output thread exited: {}", e)))??;

        info!("✅ Audio playback initialized");

        Ok(Self {
            handle,
            current: Mutex::new(None),
            paused: AtomicBool::new(false),
            volume: AtomicU32::new(1.0f32.to_bits()),
            _stream_guard: guard_tx,
        })
    }

    fn current(&self) -> std::sync::MutexGuard<'_, Option<Arc<Sink>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::SeqCst))
    }

    /// Whether an utterance is currently queued or playing.
    pub fn is_playing(&self) -> bool {
        self.current().as_ref().is_some_and(|sink| !sink.empty())
    }
}

#[async_trait]
impl PlaybackDevice for RodioPlayback {
    async fn play(&self, audio: Vec<u8>) -> VoiceResult<()> {
        if audio.is_empty() {
            return Ok(());
        }
        let source = rodio::Decoder::new(Cursor::new(audio))
            .map_err(|e| VoiceError::Playback(format!("Decode failed: {}", e)))?;
        let sink = Sink::try_new(&self.handle).map_err(|e| VoiceError::Playback(e.to_string()))?;
        sink.set_volume(self.volume());
        if self.paused.load(Ordering::SeqCst) {
            sink.pause();
        }
        sink.append(source.convert_samples::<f32>());

        let sink = Arc::new(sink);
        if let Some(previous) = self.current().replace(Arc::clone(&sink)) {
            previous.stop();
        }

        let waiter = Arc::clone(&sink);
        tokio::task::spawn_blocking(move || waiter.sleep_until_end())
            .await
            .map_err(|e| VoiceError::Playback(e.to_string()))?;

        let mut current = self.current();
        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, &sink)) {
            *current = None;
        }
        Ok(())
    }

    fn stop(&self) {
        self.paused.store(false, Ordering::SeqCst);
        if let Some(sink) = self.current().take() {
            sink.stop();
            info!("⏹️ Audio playback stopped");
        }
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        if let Some(sink) = self.current().as_ref() {
            sink.pause();
        }
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        if let Some(sink) = self.current().as_ref() {
            sink.play();
        }
    }

    fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.volume.store(volume.to_bits(), Ordering::SeqCst);
        if let Some(sink) = self.current().as_ref() {
            sink.set_volume(volume);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rodio_playback_controls_are_safe_when_idle() {
        // Fails in CI without an output device; nothing to check then.
        if let Ok(playback) = RodioPlayback::new() {
            assert!(!playback.is_playing());
            playback.pause();
            playback.resume();
            playback.set_volume(2.0);
            assert_eq!(playback.volume(), 1.0);
            playback.stop();
            playback.stop();
            assert!(playback.play(Vec::new()).await.is_ok());
        }
    }

    #[tokio::test]
    async fn undecodable_audio_is_an_error() {
        if let Ok(playback) = RodioPlayback::new() {
            let result = playback.play(b"definitely not audio".to_vec()).await;
            assert!(matches!(result, Err(VoiceError::Playback(_))));
        }
    }
}
