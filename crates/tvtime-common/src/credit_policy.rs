// Time-of-day credit policy
//
// Scales earned minutes by the hour at which they are earned. The shipped
// configuration keeps the policy switched off, which credits every minute in full.

use chrono::{DateTime, Local, Timelike};
use serde::{Deserialize, Serialize};

use crate::types::ExerciseKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditPolicy {
    pub enabled: bool,
    /// Local hour (0-23) at which the reduced rate starts.
    pub cutoff_hour: u32,
    pub before_cutoff: f64,
    pub after_cutoff: f64,
    /// Exercises the policy applies to. Empty means every exercise.
    pub exercises: Vec<ExerciseKind>,
}

impl Default for CreditPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            cutoff_hour: 7,
            before_cutoff: 1.0,
            after_cutoff: 0.5,
            exercises: Vec::new(),
        }
    }
}

impl CreditPolicy {
    /// Policy with the reduced rate switched on for the given exercises.
    pub fn enabled_for(exercises: Vec<ExerciseKind>) -> Self {
        Self { enabled: true, exercises, ..Default::default() }
    }

    fn applies_to(&self, kind: ExerciseKind) -> bool {
        self.enabled && (self.exercises.is_empty() || self.exercises.contains(&kind))
    }

    pub fn is_before_cutoff(&self, now: DateTime<Local>) -> bool {
        now.hour() < self.cutoff_hour
    }

    /// Fraction of earned minutes credited for `kind` at `now`.
    pub fn multiplier(&self, kind: ExerciseKind, now: DateTime<Local>) -> f64 {
        if !self.applies_to(kind) {
            return 1.0;
        }

        if self.is_before_cutoff(now) {
            self.before_cutoff
        } else {
            self.after_cutoff
        }
    }

    /// Short note describing the rate in force, used by the coach insight line.
    pub fn describe(&self, now: DateTime<Local>) -> Option<String> {
        if !self.enabled {
            return None;
        }

        let scope = if self.exercises.is_empty() {
            "Exercises".to_string()
        } else {
            self.exercises.iter().map(|k| k.label()).collect::<Vec<_>>().join(", ")
        };

        let note = if self.is_before_cutoff(now) {
            format!(
                "Early Bird: {} are {:.0}% value before {}:00!",
                scope,
                self.before_cutoff * 100.0,
                self.cutoff_hour
            )
        } else {
            format!(
                "Note: {} are {:.0}% value after {}:00.",
                scope,
                self.after_cutoff * 100.0,
                self.cutoff_hour
            )
        };

        Some(note)
    }
}
