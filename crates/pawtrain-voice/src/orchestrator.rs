//! Session Orchestrator - drives a guided exercise from intro to done
//!
//! Every user action that starts a new line of speech mints a [`FlowToken`].
//! Flows run as spawned tasks and re-check their token after each suspension
//! point; a superseded flow stops at its next check without touching the session.
//!
//! ```text
//! start ──▶ intro ──▶ speaking(i) ──┬─▶ countdown ──▶ release ──▶ speaking(i+1) ...
//!                                   └─▶ waiting ──(next)──▶ speaking(i+1) ... ──▶ done
//! ```

use crate::config::{SessionTiming, VoiceConfig};
use crate::error::{VoiceError, VoiceResult};
use crate::provider::{SpeakOutcome, SpeechProvider};
use crate::script::ScriptBundle;
use crate::session::{ExerciseContent, FlowToken, Phase, Session, SessionEvent, SessionSnapshot};
use crate::timer::extract_hold_seconds;
use crate::wake_lock::{NoopWakeLock, WakeLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// A continuation found a newer token and must not touch the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Superseded;

type Flow<T = ()> = Result<T, Superseded>;

/// Where a freshly minted flow begins.
#[derive(Debug, Clone, Copy)]
enum FlowStart {
    Intro,
    Step(usize),
    Repeat(usize),
}

/// How a step's flow ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepEnd {
    Hold(u32),
    Waiting,
    Done,
}

struct Inner {
    session: Mutex<Session>,
    script: &'static ScriptBundle,
    locale: String,
    primary: Arc<dyn SpeechProvider>,
    fallback: Arc<dyn SpeechProvider>,
    timing: SessionTiming,
    rng: Mutex<StdRng>,
    wake_lock: Arc<dyn WakeLock>,
    /// Woken on pause, resume, navigation and close.
    pause_changed: Notify,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    /// Set once the event receiver is taken; events are dropped until then.
    events_tx: Mutex<Option<mpsc::UnboundedSender<SessionEvent>>>,
    runtime: Handle,
}

/// Builder for [`SessionOrchestrator`].
pub struct SessionOrchestratorBuilder {
    content: ExerciseContent,
    primary: Option<Arc<dyn SpeechProvider>>,
    fallback: Option<Arc<dyn SpeechProvider>>,
    locale: String,
    volume: f32,
    timing: SessionTiming,
    rng: Option<StdRng>,
    wake_lock: Option<Arc<dyn WakeLock>>,
}

impl SessionOrchestratorBuilder {
    /// Remote voice first, device voice after fallback.
    pub fn providers(mut self, primary: Arc<dyn SpeechProvider>, fallback: Arc<dyn SpeechProvider>) -> Self {
        self.primary = Some(primary);
        self.fallback = Some(fallback);
        self
    }

    /// Locale, volume and timing from loaded config.
    pub fn config(self, config: &VoiceConfig) -> Self {
        self.locale(config.locale.clone())
            .volume(config.volume)
            .timing(config.timing.clone())
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn timing(mut self, timing: SessionTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Seeded RNG for reproducible phrasing.
    pub fn rng(mut self, rng: StdRng) -> Self {
        self.rng = Some(rng);
        self
    }

    pub fn wake_lock(mut self, wake_lock: Arc<dyn WakeLock>) -> Self {
        self.wake_lock = Some(wake_lock);
        self
    }

    /// Must be called inside a Tokio runtime; flows are spawned on it.
    pub fn build(self) -> VoiceResult<SessionOrchestrator> {
        let runtime = Handle::try_current()
            .map_err(|e| VoiceError::Config(format!("Session needs a Tokio runtime: {}", e)))?;
        let (Some(primary), Some(fallback)) = (self.primary, self.fallback) else {
            return Err(VoiceError::Config("Speech providers not set".to_string()));
        };
        if !self.volume.is_finite() {
            return Err(VoiceError::Config(format!("Invalid volume {}", self.volume)));
        }
        if self.timing.tick_ms == 0 || !(0.0..=1.0).contains(&self.timing.encouragement_chance) {
            return Err(VoiceError::Config(format!("Invalid session timing {:?}", self.timing)));
        }

        let session = Session::new(self.content, self.volume);
        let volume = session.snapshot().volume;
        primary.set_volume(volume);
        fallback.set_volume(volume);

        let script = ScriptBundle::for_locale(&self.locale);
        info!(
            exercise = session.exercise_name(),
            steps = session.step_count(),
            language = script.language,
            "🐕 Session ready"
        );

        let (snapshot_tx, _) = watch::channel(session.snapshot());

        let inner = Inner {
            session: Mutex::new(session),
            script,
            locale: self.locale,
            primary,
            fallback,
            timing: self.timing,
            rng: Mutex::new(self.rng.unwrap_or_else(StdRng::from_entropy)),
            wake_lock: self
                .wake_lock
                .unwrap_or_else(|| Arc::new(NoopWakeLock::default())),
            pause_changed: Notify::new(),
            snapshot_tx,
            events_tx: Mutex::new(None),
            runtime,
        };

        Ok(SessionOrchestrator {
            inner: Arc::new(inner),
            events_taken: false,
        })
    }
}

/// Owns one guided session. Dropping it closes the session.
pub struct SessionOrchestrator {
    inner: Arc<Inner>,
    events_taken: bool,
}

impl SessionOrchestrator {
    pub fn builder(content: ExerciseContent) -> SessionOrchestratorBuilder {
        SessionOrchestratorBuilder {
            content,
            primary: None,
            fallback: None,
            locale: "en-US".to_string(),
            volume: 1.0,
            timing: SessionTiming::default(),
            rng: None,
            wake_lock: None,
        }
    }

    /// Begin the session: intro, then step 1. Only valid once, from `ready`.
    pub fn start(&self) -> VoiceResult<()> {
        let inner = &self.inner;
        let token = {
            let mut session = inner.lock();
            if session.is_closed() {
                return Err(VoiceError::SessionClosed);
            }
            if session.phase() != Phase::Ready {
                return Err(VoiceError::InvalidTransition {
                    action: "start",
                    phase: session.phase(),
                });
            }
            let token = session.mint_token();
            session.mark_started();
            if session.step_count() == 0 {
                session.finish();
                inner.publish(&mut session);
                return Ok(());
            }
            session.set_phase(Phase::Intro);
            inner.publish(&mut session);
            token
        };

        info!("▶️ Session started");
        inner.wake_lock.acquire();
        inner.spawn_flow(token, FlowStart::Intro);
        Ok(())
    }

    /// Jump to step `index` (clamped to the last step), dropping whatever was playing.
    pub fn go_to_step(&self, index: usize) -> VoiceResult<()> {
        self.inner.restart_flow("go to a step", |session| {
            FlowStart::Step(index.min(session.step_count().saturating_sub(1)))
        })
    }

    /// Next step, or `done` from the last one.
    pub fn next(&self) -> VoiceResult<()> {
        self.inner.restart_flow("go to the next step", |session| {
            FlowStart::Step(session.step_index() + 1)
        })
    }

    /// Previous step; stays on the first.
    pub fn previous(&self) -> VoiceResult<()> {
        self.inner.restart_flow("go to the previous step", |session| {
            FlowStart::Step(session.step_index().saturating_sub(1))
        })
    }

    /// Say "let's repeat" and run the current step again.
    pub fn repeat(&self) -> VoiceResult<()> {
        self.inner
            .restart_flow("repeat", |session| FlowStart::Repeat(session.step_index()))
    }

    /// Flip the pause flag. Returns the new value.
    pub fn toggle_pause(&self) -> VoiceResult<bool> {
        let inner = &self.inner;
        let paused = {
            let mut session = inner.lock();
            session.ensure_running("pause")?;
            let paused = !session.is_paused();
            session.set_paused(paused);
            inner.publish(&mut session);
            paused
        };

        if paused {
            info!("⏸️ Session paused");
            inner.primary.pause();
            inner.fallback.pause();
        } else {
            info!("▶️ Session resumed");
            inner.primary.resume();
            inner.fallback.resume();
        }
        inner.pause_changed.notify_waiters();
        Ok(paused)
    }

    /// Set the volume for both voices. Returns the clamped value.
    pub fn set_volume(&self, volume: f32) -> VoiceResult<f32> {
        if !volume.is_finite() {
            return Err(VoiceError::Config(format!("Invalid volume {}", volume)));
        }
        let inner = &self.inner;
        let volume = {
            let mut session = inner.lock();
            if session.is_closed() {
                return Err(VoiceError::SessionClosed);
            }
            session.set_volume(volume);
            inner.publish(&mut session);
            session.snapshot().volume
        };
        inner.primary.set_volume(volume);
        inner.fallback.set_volume(volume);
        Ok(volume)
    }

    /// Stop all speech and tear the session down. Safe to call repeatedly.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Hosting view became visible or hidden.
    pub fn visibility_changed(&self, visible: bool) {
        if !visible {
            return;
        }
        let live = {
            let session = self.inner.lock();
            !session.is_closed() && session.phase() != Phase::Ready
        };
        if live {
            self.inner.wake_lock.acquire();
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.snapshot_tx.borrow().clone()
    }

    /// Snapshot updates after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Take the event receiver (can only be called once). Events published
    /// before this call are not buffered.
    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        if self.events_taken {
            return None;
        }
        self.events_taken = true;
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.events() = Some(tx);
        Some(rx)
    }

    pub fn exercise_name(&self) -> String {
        self.inner.lock().exercise_name().to_string()
    }

    /// Text of the current step.
    pub fn current_step_text(&self) -> Option<String> {
        let session = self.inner.lock();
        session.step_text(session.step_index()).map(str::to_string)
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn events(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<SessionEvent>>> {
        self.events_tx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forward queued events and the new snapshot to observers.
    fn publish(&self, session: &mut Session) {
        let events = session.drain_events();
        let mut tx = self.events();
        if let Some(sender) = tx.as_ref() {
            if events.into_iter().any(|event| sender.send(event).is_err()) {
                // Receiver dropped; stop queueing.
                *tx = None;
            }
        }
        drop(tx);
        self.snapshot_tx.send_replace(session.snapshot());
    }

    fn check(&self, token: FlowToken) -> Flow {
        if self.lock().is_current(token) {
            Ok(())
        } else {
            Err(Superseded)
        }
    }

    /// Mutate the session on behalf of flow `token`, if it is still current.
    fn update<T>(&self, token: FlowToken, f: impl FnOnce(&mut Session) -> T) -> Flow<T> {
        let mut session = self.lock();
        if !session.is_current(token) {
            return Err(Superseded);
        }
        let out = f(&mut session);
        self.publish(&mut session);
        Ok(out)
    }

    fn stop_all(&self) {
        self.primary.stop();
        self.fallback.stop();
    }

    fn restart_flow(
        self: &Arc<Self>,
        action: &'static str,
        start: impl FnOnce(&Session) -> FlowStart,
    ) -> VoiceResult<()> {
        let (token, start, was_paused) = {
            let mut session = self.lock();
            session.ensure_running(action)?;
            let start = start(&session);
            // Mint before stopping so anything woken by stop() sees the new token.
            let token = session.mint_token();
            let was_paused = session.is_paused();
            session.set_paused(false);
            self.publish(&mut session);
            (token, start, was_paused)
        };
        debug!(token = token.value(), ?start, "New flow");
        self.stop_all();
        if was_paused {
            self.primary.resume();
            self.fallback.resume();
        }
        self.pause_changed.notify_waiters();
        self.spawn_flow(token, start);
        Ok(())
    }

    fn close(&self) {
        let closed = {
            let mut session = self.lock();
            let closed = session.close();
            if closed {
                self.publish(&mut session);
            }
            closed
        };
        if !closed {
            return;
        }
        self.stop_all();
        self.pause_changed.notify_waiters();
        self.wake_lock.release();
        info!("🛑 Session closed");
    }

    fn spawn_flow(self: &Arc<Self>, token: FlowToken, start: FlowStart) {
        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            let result = match start {
                FlowStart::Intro => inner.intro(token).await,
                FlowStart::Step(index) => inner.advance_from(token, index).await,
                FlowStart::Repeat(index) => inner.repeat_from(token, index).await,
            };
            if result.is_err() {
                debug!(token = token.value(), "Flow superseded");
            }
        });
    }

    /// Speak one line on the active voice, switching to the device voice for good
    /// if the remote one gives up.
    async fn speak(&self, token: FlowToken, text: &str) -> Flow {
        self.check(token)?;
        let fallback_engaged = self.lock().fallback_engaged();

        if !fallback_engaged {
            match self.primary.speak(text, &self.locale).await {
                SpeakOutcome::Completed => return self.check(token),
                SpeakOutcome::FallbackRequested => {
                    if self.update(token, |s| s.engage_fallback())? {
                        info!(
                            from = %self.primary.kind(),
                            to = %self.fallback.kind(),
                            "🔁 Remote voice unavailable, continuing with device voice"
                        );
                    }
                }
            }
        }

        self.fallback.speak(text, &self.locale).await;
        self.check(token)
    }

    async fn wait_while_paused(&self, token: FlowToken) -> Flow {
        loop {
            let changed = self.pause_changed.notified();
            {
                let session = self.lock();
                if !session.is_current(token) {
                    return Err(Superseded);
                }
                if !session.is_paused() {
                    return Ok(());
                }
            }
            changed.await;
        }
    }

    async fn intro(self: &Arc<Self>, token: FlowToken) -> Flow {
        let line = {
            let session = self.lock();
            let mut rng = self.rng();
            self.script
                .intro(&mut *rng, session.exercise_name(), session.step_count())
        };
        self.speak(token, &line).await?;
        self.advance_from(token, 0).await
    }

    async fn repeat_from(self: &Arc<Self>, token: FlowToken, index: usize) -> Flow {
        self.speak(token, self.script.repeat_step).await?;
        self.advance_from(token, index).await
    }

    /// Run steps from `index` until one waits for the user or the session is done.
    async fn advance_from(self: &Arc<Self>, token: FlowToken, mut index: usize) -> Flow {
        loop {
            match self.advance_to_step(token, index).await? {
                StepEnd::Hold(seconds) => {
                    self.run_countdown(token, seconds).await?;
                    index += 1;
                }
                StepEnd::Waiting | StepEnd::Done => return Ok(()),
            }
        }
    }

    async fn advance_to_step(self: &Arc<Self>, token: FlowToken, index: usize) -> Flow<StepEnd> {
        let (total, text) = {
            let session = self.lock();
            (session.step_count(), session.step_text(index).map(str::to_string))
        };
        let Some(text) = text else {
            self.complete(token).await?;
            return Ok(StepEnd::Done);
        };

        self.update(token, |s| s.enter_step(index))?;
        debug!(step = index + 1, total, "Speaking step");
        self.speak(token, &self.script.next_step(index + 1, total)).await?;
        self.speak(token, &text).await?;

        match extract_hold_seconds(&text) {
            Some(seconds) => {
                self.speak(token, &self.script.hold_for(seconds)).await?;
                self.update(token, |s| s.begin_countdown(seconds))?;
                Ok(StepEnd::Hold(seconds))
            }
            None => {
                self.update(token, |s| s.set_phase(Phase::Waiting))?;
                let encourage = index > 0 && self.rng().gen_bool(self.timing.encouragement_chance);
                if encourage {
                    self.spawn_encouragement(token);
                }
                Ok(StepEnd::Waiting)
            }
        }
    }

    /// Tick the countdown down to zero on a fixed schedule, then release.
    ///
    /// A pause freezes the schedule; the part of the tick left when it paused is
    /// what remains after resume.
    async fn run_countdown(&self, token: FlowToken, seconds: u32) -> Flow {
        debug!(seconds, "Countdown started");
        let tick = self.timing.tick();
        let mut next_at = Instant::now() + tick;
        let mut ticker = time::interval_at(next_at, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let changed = self.pause_changed.notified();
            tokio::pin!(changed);
            let paused = {
                let session = self.lock();
                if !session.is_current(token) {
                    return Err(Superseded);
                }
                session.is_paused()
            };

            if paused {
                let left = next_at.saturating_duration_since(Instant::now());
                self.wait_while_paused(token).await?;
                next_at = Instant::now() + left;
                ticker.reset_at(next_at);
                continue;
            }

            tokio::select! {
                biased;
                _ = &mut changed => {}
                at = ticker.tick() => {
                    next_at = at + tick;
                    let remaining = self.update(token, |s| {
                        if s.is_paused() {
                            None
                        } else {
                            Some(s.tick_countdown())
                        }
                    })?;
                    if remaining == Some(0) {
                        break;
                    }
                }
            }
        }

        self.speak(token, self.script.release).await?;
        time::sleep(self.timing.release_pause()).await;
        self.check(token)?;
        self.wait_while_paused(token).await
    }

    async fn complete(&self, token: FlowToken) -> Flow {
        if self.update(token, |s| s.finish())? {
            info!("🏁 Exercise complete");
            self.speak(token, self.script.exercise_complete).await?;
        }
        Ok(())
    }

    /// Fire-and-forget; never gates a transition. Any navigation stops it.
    fn spawn_encouragement(self: &Arc<Self>, token: FlowToken) {
        let line = {
            let mut rng = self.rng();
            self.script.encouragement(&mut *rng)
        };
        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            let _ = inner.speak(token, line).await;
        });
    }
}
