//! `espeak-ng` as the device synthesizer.

use super::device::{DeviceVoice, Synthesizer, Utterance};
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Notify;
use tracing::debug;

/// Words per minute at rate 1.0.
const BASE_WPM: f32 = 175.0;

pub struct EspeakSynthesizer {
    program: String,
    /// Pid of the utterance being spoken.
    current: Mutex<Option<u32>>,
    cancelled: Notify,
}

impl EspeakSynthesizer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            current: Mutex::new(None),
            cancelled: Notify::new(),
        }
    }

    fn current(&self) -> std::sync::MutexGuard<'_, Option<u32>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(unix)]
    fn signal(&self, signal: libc::c_int) {
        if let Some(pid) = *self.current() {
            // SAFETY: plain kill(2) on a child we spawned and have not reaped yet.
            unsafe {
                libc::kill(pid as libc::pid_t, signal);
            }
        }
    }
}

/// Parse `espeak-ng --voices` output.
///
/// Columns: `Pty Language Age/Gender VoiceName File [Other Languages]`.
/// MBROLA voices (`mb/...`) count as high quality.
pub fn parse_voice_list(output: &str) -> Vec<DeviceVoice> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 5 {
                return None;
            }
            Some(DeviceVoice {
                name: fields[3].replace('_', " "),
                locale: fields[1].to_string(),
                high_quality: fields[4].starts_with("mb/"),
            })
        })
        .collect()
}

/// Command-line arguments for one utterance (text goes to stdin).
pub fn utterance_args(utterance: &Utterance) -> Vec<String> {
    let wpm = (BASE_WPM * utterance.rate).round().clamp(80.0, 450.0) as u32;
    let pitch = (50.0 * utterance.pitch).round().clamp(0.0, 99.0) as u32;
    let amplitude = (100.0 * utterance.volume).round().clamp(0.0, 200.0) as u32;

    let mut args = Vec::new();
    if let Some(voice) = utterance.voice.as_deref() {
        args.push("-v".to_string());
        args.push(voice.replace(' ', "_"));
    }
    args.extend([
        "-s".to_string(),
        wpm.to_string(),
        "-p".to_string(),
        pitch.to_string(),
        "-a".to_string(),
        amplitude.to_string(),
        "--stdin".to_string(),
    ]);
    args
}

#[async_trait]
impl Synthesizer for EspeakSynthesizer {
    async fn voices(&self) -> VoiceResult<Vec<DeviceVoice>> {
        let output = Command::new(&self.program)
            .arg("--voices")
            .output()
            .await
            .map_err(|e| VoiceError::Synthesizer(format!("{}: {}", self.program, e)))?;
        if !output.status.success() {
            return Err(VoiceError::Synthesizer(format!(
                "{} --voices exited with {}",
                self.program, output.status
            )));
        }
        Ok(parse_voice_list(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn speak_utterance(&self, utterance: &Utterance) -> VoiceResult<()> {
        let mut child = Command::new(&self.program)
            .args(utterance_args(utterance))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VoiceError::Synthesizer(format!("{}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(utterance.text.as_bytes()).await?;
        }
        *self.current() = child.id();

        let result = tokio::select! {
            status = child.wait() => status.map(|s| {
                if !s.success() {
                    debug!(status = %s, "espeak-ng exited unsuccessfully");
                }
            }),
            _ = self.cancelled.notified() => child.kill().await,
        };
        *self.current() = None;
        result.map_err(VoiceError::from)
    }

    fn cancel(&self) {
        self.cancelled.notify_waiters();
        #[cfg(unix)]
        self.signal(libc::SIGKILL);
    }

    fn pause(&self) {
        #[cfg(unix)]
        self.signal(libc::SIGSTOP);
    }

    fn resume(&self) {
        #[cfg(unix)]
        self.signal(libc::SIGCONT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOICES: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 2  en-gb           --/M      English_(Great_Britain) gmw/en           (en 2)
 5  en-us           --/M      English_(America)  gmw/en-US            (en 3)
 5  de              --/M      German             gmw/de
 5  en-us           70/M      en-us-mbrola-1     mb/mb-us1
";

    #[test]
    fn parses_voice_list() {
        let voices = parse_voice_list(VOICES);
        assert_eq!(voices.len(), 5);
        assert_eq!(voices[2].name, "English (America)");
        assert_eq!(voices[2].locale, "en-us");
        assert!(!voices[2].high_quality);
        assert!(voices[4].high_quality);
    }

    #[test]
    fn parse_ignores_short_lines() {
        assert!(parse_voice_list("header\n\n  junk line\n").is_empty());
    }

    #[test]
    fn maps_utterance_settings_to_flags() {
        let utterance = Utterance {
            text: "Sit.".to_string(),
            voice: Some("English (America)".to_string()),
            rate: 0.95,
            pitch: 1.0,
            volume: 0.5,
        };
        assert_eq!(
            utterance_args(&utterance),
            vec!["-v", "English_(America)", "-s", "166", "-p", "50", "-a", "50", "--stdin"]
        );
    }

    #[test]
    fn clamps_extreme_settings() {
        let utterance = Utterance {
            text: "Down.".to_string(),
            voice: None,
            rate: 10.0,
            pitch: 5.0,
            volume: 1.0,
        };
        assert_eq!(
            utterance_args(&utterance),
            vec!["-s", "450", "-p", "99", "-a", "100", "--stdin"]
        );
    }

    #[tokio::test]
    async fn missing_program_is_a_synthesizer_error() {
        let synth = EspeakSynthesizer::new("pawtrain-no-such-synth");
        assert!(matches!(synth.voices().await, Err(VoiceError::Synthesizer(_))));
        let utterance = Utterance {
            text: "Sit.".to_string(),
            voice: None,
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        };
        assert!(synth.speak_utterance(&utterance).await.is_err());
        synth.cancel();
    }
}
