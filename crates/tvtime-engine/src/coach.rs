//! Spoken coaching cues and the question-answering knowledge base.

use std::time::Duration;

use tokio::time::Instant;
use tvtime_common::{CreditPolicy, ExerciseKind};

use crate::config::RatesConfig;

/// Rate limiter for spoken cues. Form corrections are held back during the
/// cooldown; priority cues (rep counts, earned minutes, confirmations) always
/// pass and restart it.
pub struct Coach {
    cooldown: Duration,
    last_spoken: Option<Instant>,
}

impl Coach {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown, last_spoken: None }
    }

    pub fn priority(&mut self, text: impl Into<String>, now: Instant) -> String {
        self.last_spoken = Some(now);
        text.into()
    }

    pub fn correction(&mut self, text: &str, now: Instant) -> Option<String> {
        let cooled = self.last_spoken.map_or(true, |last| now.duration_since(last) > self.cooldown);
        if !cooled {
            return None;
        }
        self.last_spoken = Some(now);
        Some(text.to_string())
    }
}

pub fn rep_cue(count: u32) -> String {
    format!("Correct! {}", count)
}

pub fn earned_cue(earned: f64) -> String {
    format!("You have earned {:.1} minutes.", earned)
}

fn technique(kind: ExerciseKind) -> &'static str {
    match kind {
        ExerciseKind::Pushups => {
            "Keep your back straight. Lower body until elbows are at 90 degrees."
        }
        ExerciseKind::Squats => {
            "Keep feet shoulder-width apart. Lower hips until thighs are parallel to floor."
        }
        ExerciseKind::JumpingJacks => {
            "Start with arms down/legs in. Jump to arms up/legs wide. Repeat."
        }
        ExerciseKind::BodySawPlank => {
            "Start in a forearm plank. Shift your body backward by pushing through your \
             forearms/toes, then return to center."
        }
    }
}

/// Keyword answers to the child's questions.
pub struct KnowledgeBase<'a> {
    pub rates: &'a RatesConfig,
    pub policy: &'a CreditPolicy,
    pub daily_cap: f64,
}

impl KnowledgeBase<'_> {
    pub fn answer(&self, question: &str) -> String {
        let text = question.to_lowercase();
        let has = |needle: &str| text.contains(needle);
        let has_word = |word: &str| {
            text.split(|c: char| !c.is_alphanumeric()).any(|token| token == word)
        };

        let exercise = if has("pushup") {
            Some(ExerciseKind::Pushups)
        } else if has("squat") {
            Some(ExerciseKind::Squats)
        } else if has("jump") || has("jack") {
            Some(ExerciseKind::JumpingJacks)
        } else if has("saw") || has("plank") {
            Some(ExerciseKind::BodySawPlank)
        } else {
            None
        };

        if let Some(kind) = exercise {
            return format!(
                "{} Rate: {} reps = 1 min TV.",
                technique(kind),
                self.rates.rate_for(kind)
            );
        }

        if has("limit") || has("max") {
            return format!(
                "You can earn a maximum of {:.0} minutes of TV time per day.",
                self.daily_cap
            );
        }

        if has("early") || has("time") || has("bonus") {
            return self.policy_answer();
        }

        if has_word("hello") || has_word("hi") {
            return "I am your AI Coach. I count your reps and correct your form.".to_string();
        }

        "I'm not sure about that. Try asking about exercises or rules.".to_string()
    }

    fn policy_answer(&self) -> String {
        let policy = self.policy;
        if !policy.enabled {
            return "Every rep counts in full, whatever the time of day.".to_string();
        }

        format!(
            "Before {h}:00 you get {:.0}% credit. After {h}:00 you get {:.0}% credit.",
            policy.before_cutoff * 100.0,
            policy.after_cutoff * 100.0,
            h = policy.cutoff_hour
        )
    }
}
