//! Wake-word gated voice commands.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};
use tvtime_common::ExerciseKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "command", content = "exercise", rename_all = "snake_case")]
pub enum VoiceCommand {
    Select(ExerciseKind),
    BackToMenu,
    QueryEarned,
    FinishAndReport,
    ResetDay,
}

/// Match a command phrase. Earlier rules win when several keywords appear.
pub fn match_command(text: &str) -> Option<VoiceCommand> {
    let has = |needle: &str| text.contains(needle);

    if has("pushup") {
        Some(VoiceCommand::Select(ExerciseKind::Pushups))
    } else if has("squat") {
        Some(VoiceCommand::Select(ExerciseKind::Squats))
    } else if has("jumping jack") {
        Some(VoiceCommand::Select(ExerciseKind::JumpingJacks))
    } else if has("plank") || has("body saw") {
        Some(VoiceCommand::Select(ExerciseKind::BodySawPlank))
    } else if has("stop") || has("back") || has("menu") {
        Some(VoiceCommand::BackToMenu)
    } else if has("time") || has("earned") {
        Some(VoiceCommand::QueryEarned)
    } else if has("finish") || has("report") {
        Some(VoiceCommand::FinishAndReport)
    } else if has("reset") || has("new day") {
        Some(VoiceCommand::ResetDay)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoiceResult {
    /// The dispatcher went from idle to listening on this fragment.
    pub activated: bool,
    pub command: Option<VoiceCommand>,
    /// The recognizer should drop what it has buffered.
    pub reset_recognizer: bool,
}

pub struct VoiceDispatcher {
    wake_word: String,
    timeout: Duration,
    deadline: Option<Instant>,
}

impl VoiceDispatcher {
    pub fn new(wake_word: &str, timeout: Duration) -> Self {
        Self { wake_word: wake_word.to_lowercase(), timeout, deadline: None }
    }

    pub fn is_listening(&self) -> bool {
        self.deadline.is_some()
    }

    /// When the current listening window closes, if listening.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Close the listening window if it has run out. Returns true if it did.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                debug!("Voice command window elapsed");
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Handle one transcript fragment received at `now`.
    pub fn handle(&mut self, fragment: &str, now: Instant) -> VoiceResult {
        self.expire(now);
        let text = fragment.to_lowercase();

        if let Some(pos) = text.rfind(&self.wake_word) {
            let activated = !self.is_listening();
            self.deadline = Some(now + self.timeout);
            if activated {
                info!("Wake word heard, listening for a command");
            }

            let rest = text[pos + self.wake_word.len()..].trim();
            let command = self.dispatch(rest);
            return VoiceResult { activated, command, reset_recognizer: true };
        }

        if !self.is_listening() {
            return VoiceResult::default();
        }

        let command = self.dispatch(&text);
        VoiceResult { activated: false, command, reset_recognizer: command.is_some() }
    }

    fn dispatch(&mut self, text: &str) -> Option<VoiceCommand> {
        let command = match_command(text)?;
        info!("Voice command: {:?}", command);
        self.deadline = None;
        Some(command)
    }
}
