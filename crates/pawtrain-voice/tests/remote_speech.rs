//! Remote voice against a local HTTP endpoint.

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use pawtrain_voice::{
    PlaybackDevice, RemoteSpeech, RemoteVoiceConfig, SpeakOutcome, SpeechProvider, VoiceError,
    VoiceResult,
};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingPlayback {
    played: Mutex<Vec<Vec<u8>>>,
    stops: AtomicUsize,
    fail: bool,
}

impl RecordingPlayback {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl PlaybackDevice for RecordingPlayback {
    async fn play(&self, audio: Vec<u8>) -> VoiceResult<()> {
        if self.fail {
            return Err(VoiceError::Playback("Decode failed: unrecognized format".to_string()));
        }
        self.played.lock().unwrap().push(audio);
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn pause(&self) {}

    fn resume(&self) {}

    fn set_volume(&self, _volume: f32) {}
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}/speak", addr)
}

fn config(url: Option<String>) -> RemoteVoiceConfig {
    RemoteVoiceConfig {
        url,
        api_key: Some("test-key".to_string()),
        voice: Some("warm".to_string()),
        timeout_secs: 5,
    }
}

#[tokio::test]
async fn plays_audio_from_the_endpoint() {
    let seen: Arc<Mutex<Vec<(Option<String>, Value)>>> = Arc::default();
    let router = {
        let seen = seen.clone();
        Router::new().route(
            "/speak",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let seen = seen.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    seen.lock().unwrap().push((auth, body));
                    vec![1u8, 2, 3, 4]
                }
            }),
        )
    };
    let url = serve(router).await;

    let playback = Arc::new(RecordingPlayback::default());
    let speech = RemoteSpeech::new(&config(Some(url)), playback.clone()).unwrap();
    assert!(speech.is_configured());

    let outcome = speech.speak("  Sit. Hold for 3 seconds.  ", "en-US").await;
    assert_eq!(outcome, SpeakOutcome::Completed);
    assert_eq!(*playback.played.lock().unwrap(), vec![vec![1u8, 2, 3, 4]]);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (auth, body) = &seen[0];
    assert_eq!(auth.as_deref(), Some("Bearer test-key"));
    assert_eq!(body["text"], "Sit. Hold for 3 seconds.");
    assert_eq!(body["locale"], "en-US");
    assert_eq!(body["voice"], "warm");
}

#[tokio::test]
async fn error_status_requests_fallback() {
    let router = Router::new().route("/speak", post(|| async { StatusCode::SERVICE_UNAVAILABLE }));
    let url = serve(router).await;

    let playback = Arc::new(RecordingPlayback::default());
    let speech = RemoteSpeech::new(&config(Some(url)), playback.clone()).unwrap();
    assert_eq!(speech.speak("Sit.", "en-US").await, SpeakOutcome::FallbackRequested);
    assert!(playback.played.lock().unwrap().is_empty());
}

#[tokio::test]
async fn empty_audio_requests_fallback() {
    let router = Router::new().route("/speak", post(|| async { Vec::<u8>::new() }));
    let url = serve(router).await;

    let speech = RemoteSpeech::new(&config(Some(url)), Arc::new(RecordingPlayback::default())).unwrap();
    assert_eq!(speech.speak("Down.", "en-US").await, SpeakOutcome::FallbackRequested);
}

#[tokio::test]
async fn unreachable_endpoint_requests_fallback() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = format!("http://{}/speak", addr);
    let speech = RemoteSpeech::new(&config(Some(url)), Arc::new(RecordingPlayback::default())).unwrap();
    assert_eq!(speech.speak("Stay.", "en-US").await, SpeakOutcome::FallbackRequested);
}

#[tokio::test]
async fn playback_failure_requests_fallback() {
    let router = Router::new().route("/speak", post(|| async { vec![0u8; 16] }));
    let url = serve(router).await;

    let speech = RemoteSpeech::new(&config(Some(url)), Arc::new(RecordingPlayback::failing())).unwrap();
    assert_eq!(speech.speak("Heel.", "en-US").await, SpeakOutcome::FallbackRequested);
}

#[tokio::test]
async fn missing_endpoint_and_blank_text() {
    let speech = RemoteSpeech::new(&config(None), Arc::new(RecordingPlayback::default())).unwrap();
    assert!(!speech.is_configured());
    assert_eq!(speech.speak("Sit.", "en-US").await, SpeakOutcome::FallbackRequested);
    assert_eq!(speech.speak("   ", "en-US").await, SpeakOutcome::Completed);
}

#[tokio::test]
async fn stop_during_fetch_discards_the_audio() {
    let router = Router::new().route(
        "/speak",
        post(|| async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            vec![9u8; 8]
        }),
    );
    let url = serve(router).await;

    let playback = Arc::new(RecordingPlayback::default());
    let speech = Arc::new(RemoteSpeech::new(&config(Some(url)), playback.clone()).unwrap());

    let task = {
        let speech = speech.clone();
        tokio::spawn(async move { speech.speak("Wait.", "en-US").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    speech.stop();

    assert_eq!(task.await.unwrap(), SpeakOutcome::Completed);
    assert!(playback.played.lock().unwrap().is_empty());
    assert_eq!(playback.stops.load(Ordering::SeqCst), 1);
}
