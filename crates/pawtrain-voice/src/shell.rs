//! Terminal shell: typed commands in, status line out.

use crate::error::VoiceResult;
use crate::orchestrator::SessionOrchestrator;
use crate::session::{Phase, SessionEvent, SessionSnapshot};
use std::str::FromStr;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

pub const HELP: &str = "\
commands: start (s) | next (n) | prev (b) | goto N | repeat (r) | pause (p) | volume 0.0-1.0 | status | close (q)";

/// One line typed at the prompt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShellCommand {
    Start,
    Next,
    Previous,
    /// 0-based; typed 1-based.
    GoTo(usize),
    Repeat,
    TogglePause,
    Volume(f32),
    Status,
    Help,
    Close,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseCommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}' (type 'help')")]
    Unknown(String),

    #[error("'{command}' needs {expected}")]
    BadArgument {
        command: &'static str,
        expected: &'static str,
    },
}

impl FromStr for ShellCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Err(ParseCommandError::Empty);
        };
        let arg = words.next();

        let command = match word.to_ascii_lowercase().as_str() {
            "start" | "s" => ShellCommand::Start,
            "next" | "n" => ShellCommand::Next,
            "prev" | "previous" | "b" => ShellCommand::Previous,
            "repeat" | "r" => ShellCommand::Repeat,
            "pause" | "resume" | "p" => ShellCommand::TogglePause,
            "status" => ShellCommand::Status,
            "help" | "h" | "?" => ShellCommand::Help,
            "close" | "quit" | "q" => ShellCommand::Close,
            "goto" | "g" => {
                let step = arg
                    .and_then(|a| a.parse::<usize>().ok())
                    .filter(|&n| n > 0)
                    .ok_or(ParseCommandError::BadArgument {
                        command: "goto",
                        expected: "a step number starting at 1",
                    })?;
                ShellCommand::GoTo(step - 1)
            }
            "volume" | "vol" | "v" => {
                let volume = arg
                    .and_then(|a| a.parse::<f32>().ok())
                    .filter(|v| v.is_finite())
                    .ok_or(ParseCommandError::BadArgument {
                        command: "volume",
                        expected: "a number between 0.0 and 1.0",
                    })?;
                ShellCommand::Volume(volume)
            }
            other => return Err(ParseCommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

impl ShellCommand {
    /// Forward to the orchestrator. `Status` and `Help` are shell-only.
    pub fn apply(self, orchestrator: &SessionOrchestrator) -> VoiceResult<()> {
        match self {
            ShellCommand::Start => orchestrator.start(),
            ShellCommand::Next => orchestrator.next(),
            ShellCommand::Previous => orchestrator.previous(),
            ShellCommand::GoTo(index) => orchestrator.go_to_step(index),
            ShellCommand::Repeat => orchestrator.repeat(),
            ShellCommand::TogglePause => orchestrator.toggle_pause().map(|_| ()),
            ShellCommand::Volume(volume) => orchestrator.set_volume(volume).map(|_| ()),
            ShellCommand::Close => {
                orchestrator.close();
                Ok(())
            }
            ShellCommand::Status | ShellCommand::Help => Ok(()),
        }
    }
}

/// One-line status for the prompt.
pub fn render_status(snapshot: &SessionSnapshot) -> String {
    let mut line = format!("[{}]", snapshot.phase);

    if snapshot.step_count > 0 && !matches!(snapshot.phase, Phase::Ready) {
        line.push_str(&format!(
            " step {}/{}",
            snapshot.step_index + 1,
            snapshot.step_count
        ));
    }
    if let (Some(remaining), Some(total)) = (snapshot.countdown, snapshot.countdown_total) {
        line.push_str(&format!(" | hold {}/{}s", remaining, total));
    }
    if snapshot.paused {
        line.push_str(" | paused");
    }

    let tier = if snapshot.using_primary_provider {
        "studio voice"
    } else {
        "device voice"
    };
    line.push_str(&format!(
        " | {} | vol {}%",
        tier,
        (snapshot.volume * 100.0).round() as u32
    ));
    if snapshot.closed {
        line.push_str(" | closed");
    }
    line
}

/// Drive a session from line-based input until it closes or input ends.
pub async fn run_shell<R>(mut orchestrator: SessionOrchestrator, input: R) -> VoiceResult<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut snapshots = orchestrator.subscribe();
    let mut events = orchestrator.take_event_receiver();

    println!("🐕 {}", orchestrator.exercise_name());
    println!("{}", HELP);
    println!("{}", render_status(&orchestrator.snapshot()));

    loop {
        enum Event {
            Line(String),
            InputClosed,
            Snapshot,
            Session(SessionEvent),
        }

        let event = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => Event::Line(line),
                None => Event::InputClosed,
            },
            changed = snapshots.changed() => match changed {
                Ok(()) => Event::Snapshot,
                Err(_) => Event::InputClosed,
            },
            Some(event) = async {
                match events.as_mut() {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending::<Option<SessionEvent>>().await,
                }
            } => Event::Session(event),
        };

        match event {
            Event::Line(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<ShellCommand>() {
                    Ok(ShellCommand::Help) => println!("{}", HELP),
                    Ok(ShellCommand::Status) => {
                        println!("{}", render_status(&orchestrator.snapshot()));
                        if let Some(text) = orchestrator.current_step_text() {
                            println!("  {}", text);
                        }
                    }
                    Ok(command) => {
                        if let Err(e) = command.apply(&orchestrator) {
                            if e.is_rejected_command() {
                                println!("  {}", e);
                            } else {
                                warn!("Command failed: {}", e);
                            }
                        }
                    }
                    Err(e) => println!("  {}", e),
                }
            }
            Event::Snapshot => {
                let snapshot = snapshots.borrow_and_update().clone();
                println!("{}", render_status(&snapshot));
            }
            Event::Session(SessionEvent::PhaseChanged { phase: Phase::Speaking, .. }) => {
                if let Some(text) = orchestrator.current_step_text() {
                    println!("  📋 {}", text);
                }
            }
            Event::Session(SessionEvent::FallbackEngaged) => {
                println!("  (studio voice unavailable, using device voice)");
            }
            Event::Session(SessionEvent::Completed { .. }) => {
                println!("  🏁 Exercise complete. Type 'close' to finish.");
            }
            Event::Session(SessionEvent::Closed { .. }) => break,
            Event::Session(_) => {}
            Event::InputClosed => {
                info!("Input closed, ending session");
                break;
            }
        }
    }

    orchestrator.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            phase: Phase::Countdown,
            step_index: 0,
            step_count: 2,
            countdown: Some(3),
            countdown_total: Some(5),
            using_primary_provider: true,
            paused: false,
            volume: 0.8,
            closed: false,
            started_at: None,
        }
    }

    #[test]
    fn parses_commands_and_aliases() {
        assert_eq!("start".parse(), Ok(ShellCommand::Start));
        assert_eq!("n".parse(), Ok(ShellCommand::Next));
        assert_eq!("b".parse(), Ok(ShellCommand::Previous));
        assert_eq!(" Repeat ".parse(), Ok(ShellCommand::Repeat));
        assert_eq!("p".parse(), Ok(ShellCommand::TogglePause));
        assert_eq!("q".parse(), Ok(ShellCommand::Close));
        assert_eq!("goto 3".parse(), Ok(ShellCommand::GoTo(2)));
        assert_eq!("volume 0.7".parse(), Ok(ShellCommand::Volume(0.7)));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!("".parse::<ShellCommand>(), Err(ParseCommandError::Empty));
        assert!(matches!(
            "jump".parse::<ShellCommand>(),
            Err(ParseCommandError::Unknown(w)) if w == "jump"
        ));
        assert!(matches!(
            "goto 0".parse::<ShellCommand>(),
            Err(ParseCommandError::BadArgument { command: "goto", .. })
        ));
        assert!(matches!(
            "volume loud".parse::<ShellCommand>(),
            Err(ParseCommandError::BadArgument { command: "volume", .. })
        ));
        assert!("volume NaN".parse::<ShellCommand>().is_err());
    }

    #[test]
    fn status_line_shows_countdown_and_tier() {
        assert_eq!(
            render_status(&snapshot()),
            "[countdown] step 1/2 | hold 3/5s | studio voice | vol 80%"
        );

        let mut s = snapshot();
        s.phase = Phase::Waiting;
        s.step_index = 1;
        s.countdown = None;
        s.countdown_total = None;
        s.using_primary_provider = false;
        s.paused = true;
        assert_eq!(
            render_status(&s),
            "[waiting] step 2/2 | paused | device voice | vol 80%"
        );
    }

    #[test]
    fn status_line_before_start() {
        let mut s = snapshot();
        s.phase = Phase::Ready;
        s.countdown = None;
        s.countdown_total = None;
        s.volume = 1.0;
        assert_eq!(render_status(&s), "[ready] | studio voice | vol 100%");
    }
}
