//! Session state for a guided run: phase machine, flow tokens, snapshots and events.
//!
//! `Session` is plain data. The orchestrator owns it behind a lock and is the only
//! writer; everything else sees [`SessionSnapshot`] values.

use crate::error::{VoiceError, VoiceResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Primary state of a guided session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Created, nothing spoken yet.
    Ready,
    /// Speaking the opening line.
    Intro,
    /// Announcing and reading the current step.
    Speaking,
    /// A hold timer is ticking.
    Countdown,
    /// Step has no timer; waiting for the user to go on.
    Waiting,
    /// Terminal. Completion phrase spoken.
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Ready => "ready",
            Phase::Intro => "intro",
            Phase::Speaking => "speaking",
            Phase::Countdown => "countdown",
            Phase::Waiting => "waiting",
            Phase::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one logical flow (intro, step advance, repeat, navigation).
///
/// Continuations compare their captured token with the session's current one and
/// become inert once a newer token has been minted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowToken(u64);

impl FlowToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Exercise content handed over by the content source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseContent {
    /// Display name, used in the intro line.
    pub name: String,
    /// Ordered step instructions.
    pub steps: Vec<String>,
}

impl ExerciseContent {
    pub fn new(name: impl Into<String>, steps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            steps: steps.into_iter().map(Into::into).collect(),
        }
    }

    /// Read an exercise from a JSON file (`{"name": "...", "steps": ["..."]}`).
    pub fn from_json_file(path: impl AsRef<Path>) -> VoiceResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let content: Self = serde_json::from_str(&raw)?;
        content.validate()?;
        Ok(content)
    }

    /// Rejects content the shell should never start a session with.
    pub fn validate(&self) -> VoiceResult<()> {
        if self.steps.is_empty() {
            return Err(VoiceError::Content(format!(
                "exercise '{}' has no steps",
                self.name
            )));
        }
        if let Some(i) = self.steps.iter().position(|s| s.trim().is_empty()) {
            return Err(VoiceError::Content(format!("step {} is empty", i + 1)));
        }
        Ok(())
    }
}

/// Read-only view of the session for the presentation shell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub step_index: usize,
    pub step_count: usize,
    pub countdown: Option<u32>,
    pub countdown_total: Option<u32>,
    pub using_primary_provider: bool,
    pub paused: bool,
    pub volume: f32,
    pub closed: bool,
    pub started_at: Option<DateTime<Utc>>,
}

/// Events emitted by the orchestrator, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Phase changed (or a new step began in the same phase).
    PhaseChanged { phase: Phase, step_index: usize },

    /// Countdown decremented.
    CountdownTick { remaining: u32, total: u32 },

    /// Pause flag toggled.
    PauseChanged { paused: bool },

    /// Remote voice gave up; device voice for the rest of the session.
    FallbackEngaged,

    /// Session reached `done`.
    Completed { at: DateTime<Utc> },

    /// Session torn down; the hosting view should go away.
    Closed { at: DateTime<Utc> },
}

/// Mutable session state, owned by the orchestrator.
#[derive(Debug)]
pub struct Session {
    exercise_name: String,
    steps: Vec<String>,
    step_index: usize,
    phase: Phase,
    countdown: Option<u32>,
    countdown_total: Option<u32>,
    fallback_engaged: bool,
    paused: bool,
    volume: f32,
    closed: bool,
    started_at: Option<DateTime<Utc>>,
    token: FlowToken,
    pending_events: Vec<SessionEvent>,
}

impl Session {
    pub fn new(content: ExerciseContent, volume: f32) -> Self {
        Self {
            exercise_name: content.name,
            steps: content.steps,
            step_index: 0,
            phase: Phase::Ready,
            countdown: None,
            countdown_total: None,
            fallback_engaged: false,
            paused: false,
            volume: volume.clamp(0.0, 1.0),
            closed: false,
            started_at: None,
            token: FlowToken(0),
            pending_events: Vec::new(),
        }
    }

    pub fn exercise_name(&self) -> &str {
        &self.exercise_name
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn step_text(&self, index: usize) -> Option<&str> {
        self.steps.get(index).map(String::as_str)
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn fallback_engaged(&self) -> bool {
        self.fallback_engaged
    }

    pub fn token(&self) -> FlowToken {
        self.token
    }

    /// Start a new flow. Every continuation holding an older token is now inert.
    pub fn mint_token(&mut self) -> FlowToken {
        self.token = FlowToken(self.token.0 + 1);
        self.token
    }

    pub fn is_current(&self, token: FlowToken) -> bool {
        !self.closed && self.token == token
    }

    /// Errors for control calls that only make sense mid-session.
    pub fn ensure_running(&self, action: &'static str) -> VoiceResult<()> {
        if self.closed {
            return Err(VoiceError::SessionClosed);
        }
        match self.phase {
            Phase::Ready | Phase::Done => Err(VoiceError::InvalidTransition {
                action,
                phase: self.phase,
            }),
            _ => Ok(()),
        }
    }

    pub fn mark_started(&mut self) {
        self.started_at = Some(Utc::now());
    }

    pub fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            self.phase = phase;
            self.pending_events.push(SessionEvent::PhaseChanged {
                phase,
                step_index: self.step_index,
            });
        }
    }

    /// Move to step `index` and start speaking it.
    pub fn enter_step(&mut self, index: usize) {
        self.step_index = index;
        self.clear_countdown();
        self.phase = Phase::Speaking;
        self.pending_events.push(SessionEvent::PhaseChanged {
            phase: Phase::Speaking,
            step_index: index,
        });
    }

    pub fn begin_countdown(&mut self, seconds: u32) {
        self.countdown = Some(seconds);
        self.countdown_total = Some(seconds);
        self.set_phase(Phase::Countdown);
    }

    /// Decrement the countdown by one tick and return what remains.
    pub fn tick_countdown(&mut self) -> u32 {
        let remaining = self.countdown.unwrap_or(0).saturating_sub(1);
        self.countdown = Some(remaining);
        self.pending_events.push(SessionEvent::CountdownTick {
            remaining,
            total: self.countdown_total.unwrap_or(0),
        });
        remaining
    }

    pub fn clear_countdown(&mut self) {
        self.countdown = None;
        self.countdown_total = None;
    }

    /// Enter `done`. Returns false if the session was already done.
    pub fn finish(&mut self) -> bool {
        if self.phase == Phase::Done {
            return false;
        }
        self.clear_countdown();
        self.paused = false;
        self.set_phase(Phase::Done);
        self.pending_events
            .push(SessionEvent::Completed { at: Utc::now() });
        true
    }

    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            self.paused = paused;
            self.pending_events.push(SessionEvent::PauseChanged { paused });
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    /// One-way switch to the device voice. Returns true the first time only.
    pub fn engage_fallback(&mut self) -> bool {
        if self.fallback_engaged {
            return false;
        }
        self.fallback_engaged = true;
        self.pending_events.push(SessionEvent::FallbackEngaged);
        true
    }

    /// Tear down. Returns false if already closed.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.mint_token();
        self.closed = true;
        self.paused = false;
        self.clear_countdown();
        self.pending_events.push(SessionEvent::Closed { at: Utc::now() });
        true
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.pending_events)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            step_index: self.step_index,
            step_count: self.steps.len(),
            countdown: self.countdown,
            countdown_total: self.countdown_total,
            using_primary_provider: !self.fallback_engaged,
            paused: self.paused,
            volume: self.volume,
            closed: self.closed,
            started_at: self.started_at,
        }
    }
}
