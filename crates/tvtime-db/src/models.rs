use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tvtime_common::{ApprovalStatus, ExerciseKind, LedgerEntry, RowId};

use crate::error::{DbError, Result};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbLedger {
    pub date: NaiveDate,
    pub earned_minutes: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbLedgerEntry {
    pub id: i64,
    pub ledger_date: NaiveDate,
    pub position: i64,
    pub description: String,
    pub exercise: String,
    pub reps: i64,
    pub minutes: f64,
    pub recorded_at: DateTime<Utc>,
}

impl DbLedgerEntry {
    pub fn into_entry(self) -> Result<LedgerEntry> {
        let exercise = self
            .exercise
            .parse::<ExerciseKind>()
            .map_err(DbError::InvalidData)?;

        Ok(LedgerEntry {
            description: self.description,
            reps: u32::try_from(self.reps)
                .map_err(|_| DbError::InvalidData(format!("Negative rep count: {}", self.reps)))?,
            minutes: self.minutes,
            exercise,
            recorded_at: self.recorded_at,
        })
    }
}

/// Persisted approval bookkeeping on the child's side.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbSyncState {
    pub last_synced_minutes: f64,
    pub pending_row_id: Option<RowId>,
    pub workflow_status: String, // 'NONE', 'PENDING', 'APPROVED', 'REJECTED'
    pub updated_at: DateTime<Utc>,
}

impl DbSyncState {
    pub fn status(&self) -> Result<ApprovalStatus> {
        self.workflow_status.parse().map_err(DbError::InvalidData)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbApprovalRow {
    pub row_id: RowId,
    pub submitted_at: DateTime<Utc>,
    pub child_name: String,
    pub ledger_date: NaiveDate,
    pub earned_minutes: f64,
    pub total_reps: i64,
    pub history: String,
    pub snapshot: String, // JSON LedgerSnapshot
    pub status: String,   // 'PENDING', 'APPROVED', 'REJECTED'
    pub decided_at: Option<DateTime<Utc>>,
}

impl DbApprovalRow {
    pub fn status(&self) -> Result<ApprovalStatus> {
        self.status.parse().map_err(DbError::InvalidData)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbApprovalNotice {
    pub id: i64,
    pub row_id: RowId,
    pub subject: String,
    pub body: String,
    pub approve_url: String,
    pub reject_url: String,
    pub created_at: DateTime<Utc>,
}

/// Result of applying a parent's decision to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DecisionOutcome {
    /// The row was pending and now carries the decision.
    Recorded { status: ApprovalStatus },
    /// The same decision was already on record; nothing changed.
    AlreadyRecorded { status: ApprovalStatus },
    /// A different decision is on record; nothing changed.
    Conflict { existing: ApprovalStatus },
}

impl DecisionOutcome {
    pub fn status(&self) -> ApprovalStatus {
        match *self {
            DecisionOutcome::Recorded { status } => status,
            DecisionOutcome::AlreadyRecorded { status } => status,
            DecisionOutcome::Conflict { existing } => existing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_conversion_rejects_unknown_exercise() {
        let row = DbLedgerEntry {
            id: 1,
            ledger_date: NaiveDate::from_ymd_opt(2026, 1, 19).unwrap(),
            position: 0,
            description: "Crunches Set".to_string(),
            exercise: "crunches".to_string(),
            reps: 10,
            minutes: 1.0,
            recorded_at: Utc::now(),
        };

        assert!(matches!(row.into_entry(), Err(DbError::InvalidData(_))));
    }

    #[test]
    fn test_decision_outcome_status() {
        let outcome = DecisionOutcome::Conflict { existing: ApprovalStatus::Approved };
        assert_eq!(outcome.status(), ApprovalStatus::Approved);
    }
}
