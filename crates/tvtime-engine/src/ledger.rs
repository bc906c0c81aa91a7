//! The day's earned-minutes ledger: capped, all-or-nothing accrual with an
//! append-only audit history.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};
use tvtime_common::{CreditPolicy, Error, ExerciseKind, LedgerEntry, LedgerSnapshot, Result};
use tvtime_db::queries::StoredLedger;

/// Calories burned per repetition, a rough heuristic for the dashboard.
const CALORIES_PER_REP: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LedgerStats {
    pub earned_minutes: f64,
    pub remaining_minutes: f64,
    pub total_reps: u32,
    pub calories: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Accrual {
    pub gain: f64,
    pub earned: f64,
    pub entry: LedgerEntry,
}

#[derive(Debug, Clone)]
pub struct TimeLedger {
    date: NaiveDate,
    earned: f64,
    history: Vec<LedgerEntry>,
    cap: f64,
    policy: CreditPolicy,
}

impl TimeLedger {
    pub fn new(date: NaiveDate, cap: f64, policy: CreditPolicy) -> Self {
        Self { date, earned: 0.0, history: Vec::new(), cap, policy }
    }

    /// Rebuild a ledger from its persisted form. Stored values above the cap
    /// are clamped.
    pub fn restore(stored: StoredLedger, cap: f64, policy: CreditPolicy) -> Self {
        let earned = if stored.earned_minutes > cap {
            warn!(
                "Stored ledger for {} exceeds the cap ({:.1} > {:.1}), clamping",
                stored.date, stored.earned_minutes, cap
            );
            cap
        } else {
            stored.earned_minutes.max(0.0)
        };

        Self { date: stored.date, earned, history: stored.history, cap, policy }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn earned(&self) -> f64 {
        self.earned
    }

    pub fn cap(&self) -> f64 {
        self.cap
    }

    pub fn history(&self) -> &[LedgerEntry] {
        &self.history
    }

    pub fn policy(&self) -> &CreditPolicy {
        &self.policy
    }

    pub fn is_stale(&self, today: NaiveDate) -> bool {
        self.date != today
    }

    /// Credit `minutes` of `kind`, earned by `reps` repetitions, at `now`.
    ///
    /// The gain is scaled by the credit policy and then applied whole or not
    /// at all: a gain that would take the day past the cap leaves the ledger
    /// untouched.
    pub fn accrue(
        &mut self,
        minutes: f64,
        kind: ExerciseKind,
        reps: u32,
        now: DateTime<Local>,
    ) -> Result<Accrual> {
        let gain = minutes * self.policy.multiplier(kind, now);

        if self.earned + gain > self.cap {
            info!("Rejected {:.1} minute gain, ledger at {:.1}", gain, self.earned);
            return Err(Error::LedgerCapExceeded { earned: self.earned, gain, cap: self.cap });
        }

        self.earned += gain;
        let entry = LedgerEntry {
            description: format!("{} Set", kind.label()),
            reps,
            minutes: gain,
            exercise: kind,
            recorded_at: now.with_timezone(&Utc),
        };
        self.history.push(entry.clone());

        info!("Accrued {:.1} minutes from {}, total {:.1}", gain, kind, self.earned);
        Ok(Accrual { gain, earned: self.earned, entry })
    }

    pub fn total_reps(&self) -> u32 {
        self.history.iter().map(|entry| entry.reps).sum()
    }

    pub fn stats(&self) -> LedgerStats {
        let total_reps = self.total_reps();
        LedgerStats {
            earned_minutes: self.earned,
            remaining_minutes: (self.cap - self.earned).max(0.0),
            total_reps,
            calories: f64::from(total_reps) * CALORIES_PER_REP,
        }
    }

    /// One-line coaching summary of the day so far.
    pub fn insight(&self, now: DateTime<Local>) -> String {
        let halfway = self.cap / 2.0;
        let mut msg = if self.earned <= 0.0 {
            format!(
                "Start your day with {} Jumping Jacks to earn your first minute!",
                ExerciseKind::JumpingJacks.default_rate()
            )
        } else if self.earned >= self.cap {
            "Daily Goal Reached! You're a machine!".to_string()
        } else if self.earned < halfway {
            format!(
                "You're heating up! {:.1} more minutes to reach the halfway mark.",
                halfway - self.earned
            )
        } else {
            "Welcome back! Ready to train?".to_string()
        };

        if let Some(note) = self.policy.describe(now) {
            msg.push_str(&format!(" ({})", note));
        }

        msg
    }

    pub fn snapshot(&self, child_name: &str, submitted_at: DateTime<Utc>) -> LedgerSnapshot {
        LedgerSnapshot {
            date: self.date,
            child_name: child_name.to_string(),
            earned_minutes: self.earned,
            total_reps: self.total_reps(),
            history: self.history.clone(),
            submitted_at,
        }
    }

    /// Start a fresh, empty ledger for `date`.
    pub fn reset(&mut self, date: NaiveDate) {
        info!("Ledger reset: {} ({:.1} minutes discarded) -> {}", self.date, self.earned, date);
        self.date = date;
        self.earned = 0.0;
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_hour(hour: u32) -> DateTime<Local> {
        NaiveDate::from_ymd_opt(2026, 1, 19)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
            .and_local_timezone(Local)
            .unwrap()
    }

    fn ledger() -> TimeLedger {
        TimeLedger::new(NaiveDate::from_ymd_opt(2026, 1, 19).unwrap(), 10.0, CreditPolicy::default())
    }

    #[test]
    fn test_pushup_set_entry() {
        let mut ledger = ledger();
        let accrual = ledger.accrue(1.0, ExerciseKind::Pushups, 5, at_hour(9)).unwrap();

        assert_eq!(accrual.gain, 1.0);
        assert_eq!(ledger.earned(), 1.0);
        assert_eq!(ledger.history().len(), 1);
        assert_eq!(ledger.history()[0].description, "Pushups Set");
        assert_eq!(ledger.history()[0].minutes, 1.0);
        assert_eq!(ledger.history()[0].reps, 5);
    }

    #[test]
    fn test_gain_past_cap_is_rejected_whole() {
        let mut ledger = ledger();
        ledger.earned = 9.6;

        let result = ledger.accrue(1.0, ExerciseKind::Squats, 10, at_hour(9));
        assert!(matches!(result, Err(Error::LedgerCapExceeded { .. })));
        assert_eq!(ledger.earned(), 9.6);
        assert!(ledger.history().is_empty());
    }

    #[test]
    fn test_reaching_cap_exactly_is_allowed() {
        let mut ledger = ledger();
        for _ in 0..10 {
            ledger.accrue(1.0, ExerciseKind::Pushups, 5, at_hour(9)).unwrap();
        }
        assert_eq!(ledger.earned(), 10.0);
        assert!(ledger.accrue(1.0, ExerciseKind::Pushups, 5, at_hour(9)).is_err());
        assert_eq!(ledger.earned(), 10.0);
    }

    #[test]
    fn test_credit_policy_scales_gain() {
        let mut ledger = TimeLedger::new(
            NaiveDate::from_ymd_opt(2026, 1, 19).unwrap(),
            10.0,
            CreditPolicy::enabled_for(vec![ExerciseKind::Squats]),
        );

        let late = ledger.accrue(1.0, ExerciseKind::Squats, 10, at_hour(9)).unwrap();
        assert_eq!(late.gain, 0.5);
        let early = ledger.accrue(1.0, ExerciseKind::Squats, 10, at_hour(6)).unwrap();
        assert_eq!(early.gain, 1.0);
        let other = ledger.accrue(1.0, ExerciseKind::Pushups, 5, at_hour(9)).unwrap();
        assert_eq!(other.gain, 1.0);
        assert_eq!(ledger.earned(), 2.5);
    }

    #[test]
    fn test_stats_and_insight() {
        let mut ledger = ledger();
        assert!(ledger.insight(at_hour(9)).starts_with("Start your day"));

        ledger.accrue(1.0, ExerciseKind::JumpingJacks, 20, at_hour(9)).unwrap();
        ledger.accrue(1.0, ExerciseKind::Squats, 10, at_hour(9)).unwrap();

        let stats = ledger.stats();
        assert_eq!(stats.total_reps, 30);
        assert!((stats.calories - 3.0).abs() < 1e-9);
        assert_eq!(stats.remaining_minutes, 8.0);
        assert!(ledger.insight(at_hour(9)).contains("3.0 more minutes"));
    }

    #[test]
    fn test_insight_mentions_active_policy() {
        let ledger = TimeLedger::new(
            NaiveDate::from_ymd_opt(2026, 1, 19).unwrap(),
            10.0,
            CreditPolicy::enabled_for(vec![ExerciseKind::Squats]),
        );
        assert!(ledger.insight(at_hour(20)).contains("(Note: Squats are 50% value after 7:00.)"));
    }

    #[test]
    fn test_reset_and_restore() {
        let mut ledger = ledger();
        ledger.accrue(1.0, ExerciseKind::Pushups, 5, at_hour(9)).unwrap();

        let next_day = NaiveDate::from_ymd_opt(2026, 1, 20).unwrap();
        assert!(ledger.is_stale(next_day));
        ledger.reset(next_day);
        assert_eq!(ledger.earned(), 0.0);
        assert!(ledger.history().is_empty());
        assert!(!ledger.is_stale(next_day));

        let restored = TimeLedger::restore(
            StoredLedger { date: next_day, earned_minutes: 12.0, history: Vec::new() },
            10.0,
            CreditPolicy::default(),
        );
        assert_eq!(restored.earned(), 10.0);
    }
}
