//! # PawTrain Voice - Guided Training Sessions
//!
//! Speaks a dog-training exercise step by step: an intro, each instruction, hold
//! timers embedded in the step text, a release cue and a completion line. A remote
//! studio voice is used while it works; the first failure switches the session to
//! the on-device voice for good.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Session Orchestrator                        │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐     │
//! │  │   Session    │  │    Timer     │  │    Script    │     │
//! │  │ (flow token) │  │  Extractor   │  │   Library    │     │
//! │  └──────────────┘  └──────────────┘  └──────────────┘     │
//! │         ↓                                                   │
//! │  ┌──────────────┐   FallbackRequested  ┌──────────────┐   │
//! │  │ Remote voice │ ───────────────────→ │ Device voice │   │
//! │  │(reqwest+rodio)│                     │  (espeak-ng) │   │
//! │  └──────────────┘                      └──────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!          ↑ commands                      snapshots / events ↓
//!                          Terminal shell
//! ```

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod playback;
pub mod provider;
pub mod script;
pub mod session;
pub mod shell;
pub mod timer;
pub mod wake_lock;

pub use config::{DeviceVoiceConfig, RemoteVoiceConfig, SessionTiming, VoiceConfig};
pub use error::{VoiceError, VoiceResult};
pub use orchestrator::{SessionOrchestrator, SessionOrchestratorBuilder};
pub use playback::{PlaybackDevice, RodioPlayback};
pub use provider::{
    EspeakSynthesizer, OnDeviceSpeech, ProviderKind, RemoteSpeech, SpeakOutcome, SpeechProvider,
    Synthesizer,
};
pub use script::ScriptBundle;
pub use session::{ExerciseContent, FlowToken, Phase, SessionEvent, SessionSnapshot};
pub use shell::{render_status, run_shell, ShellCommand};
pub use timer::extract_hold_seconds;
pub use wake_lock::{NoopWakeLock, WakeLock};
