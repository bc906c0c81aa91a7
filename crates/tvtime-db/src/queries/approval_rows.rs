use chrono::Utc;
use tracing::{debug, info};
use tvtime_common::{ApprovalStatus, Decision, LedgerSnapshot, RowId};

use crate::connection::Database;
use crate::error::{DbError, Result};
use crate::models::{DbApprovalRow, DecisionOutcome};

pub struct ApprovalRowQueries;

impl ApprovalRowQueries {
    /// Append a submitted ledger as a new `PENDING` row and return its id.
    pub async fn append(db: &Database, snapshot: &LedgerSnapshot) -> Result<RowId> {
        let pool = db.pool();
        let snapshot_json = serde_json::to_string(snapshot)?;

        let result = sqlx::query(
            r#"INSERT INTO approval_rows
               (submitted_at, child_name, ledger_date, earned_minutes, total_reps, history, snapshot, status)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(snapshot.submitted_at)
        .bind(&snapshot.child_name)
        .bind(snapshot.date)
        .bind(snapshot.earned_minutes)
        .bind(i64::from(snapshot.total_reps))
        .bind(snapshot.history_summary())
        .bind(snapshot_json)
        .bind(ApprovalStatus::Pending.as_str())
        .execute(pool)
        .await?;

        let row_id = result.last_insert_rowid();
        info!("Appended approval row {} ({:.1} minutes)", row_id, snapshot.earned_minutes);

        Ok(row_id)
    }

    pub async fn get(db: &Database, row_id: RowId) -> Result<Option<DbApprovalRow>> {
        let pool = db.pool();

        let row = sqlx::query_as::<_, DbApprovalRow>(
            r#"SELECT row_id, submitted_at, child_name, ledger_date, earned_minutes, total_reps,
                      history, snapshot, status, decided_at
               FROM approval_rows
               WHERE row_id = ?"#,
        )
        .bind(row_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    pub async fn status(db: &Database, row_id: RowId) -> Result<ApprovalStatus> {
        let row = Self::get(db, row_id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("approval row {}", row_id)))?;
        row.status()
    }

    /// List rows, newest first, optionally restricted to one status.
    pub async fn list(
        db: &Database,
        status: Option<ApprovalStatus>,
        limit: i64,
    ) -> Result<Vec<DbApprovalRow>> {
        let pool = db.pool();

        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, DbApprovalRow>(
                    r#"SELECT row_id, submitted_at, child_name, ledger_date, earned_minutes,
                              total_reps, history, snapshot, status, decided_at
                       FROM approval_rows
                       WHERE status = ?
                       ORDER BY row_id DESC
                       LIMIT ?"#,
                )
                .bind(status.as_str())
                .bind(limit)
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, DbApprovalRow>(
                    r#"SELECT row_id, submitted_at, child_name, ledger_date, earned_minutes,
                              total_reps, history, snapshot, status, decided_at
                       FROM approval_rows
                       ORDER BY row_id DESC
                       LIMIT ?"#,
                )
                .bind(limit)
                .fetch_all(pool)
                .await?
            }
        };

        Ok(rows)
    }

    /// Delete a row that is still `PENDING`, along with its notices. Returns
    /// whether a row was removed; decided rows are left alone.
    pub async fn withdraw(db: &Database, row_id: RowId) -> Result<bool> {
        let pool = db.pool();

        let deleted = sqlx::query("DELETE FROM approval_rows WHERE row_id = ? AND status = 'PENDING'")
            .bind(row_id)
            .execute(pool)
            .await?;

        let removed = deleted.rows_affected() == 1;
        if removed {
            info!("Withdrew approval row {}", row_id);
        } else {
            debug!("Row {} not withdrawn", row_id);
        }
        Ok(removed)
    }

    /// Record a decision on a row. Only a `PENDING` row changes; replaying the
    /// recorded decision is reported as such and a contradicting one is refused.
    pub async fn apply_decision(
        db: &Database,
        row_id: RowId,
        decision: Decision,
    ) -> Result<DecisionOutcome> {
        let pool = db.pool();
        let target = decision.status();

        let updated = sqlx::query(
            r#"UPDATE approval_rows
               SET status = ?, decided_at = ?
               WHERE row_id = ? AND status = 'PENDING'"#,
        )
        .bind(target.as_str())
        .bind(Utc::now())
        .bind(row_id)
        .execute(pool)
        .await?;

        if updated.rows_affected() == 1 {
            info!("Row {} marked {}", row_id, target);
            return Ok(DecisionOutcome::Recorded { status: target });
        }

        let existing = Self::status(db, row_id).await?;
        debug!("Row {} already {}, decision {} not applied", row_id, existing, decision.action());

        if existing == target {
            Ok(DecisionOutcome::AlreadyRecorded { status: existing })
        } else {
            Ok(DecisionOutcome::Conflict { existing })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::DatabaseConfig;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheet.db");
        let db = Database::open(DatabaseConfig { path: path.to_str().unwrap().to_string() })
            .await
            .unwrap();
        (dir, db)
    }

    fn snapshot(minutes: f64) -> LedgerSnapshot {
        LedgerSnapshot {
            date: NaiveDate::from_ymd_opt(2026, 1, 19).unwrap(),
            child_name: "Sam".to_string(),
            earned_minutes: minutes,
            total_reps: 5,
            history: Vec::new(),
            submitted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_appended_row_reads_pending() {
        let (_dir, db) = setup().await;

        let row_id = ApprovalRowQueries::append(&db, &snapshot(1.0)).await.unwrap();
        assert_eq!(ApprovalRowQueries::status(&db, row_id).await.unwrap(), ApprovalStatus::Pending);

        let row = ApprovalRowQueries::get(&db, row_id).await.unwrap().unwrap();
        assert_eq!(row.child_name, "Sam");
        let stored: LedgerSnapshot = serde_json::from_str(&row.snapshot).unwrap();
        assert_eq!(stored.earned_minutes, 1.0);
    }

    #[tokio::test]
    async fn test_decision_is_idempotent() {
        let (_dir, db) = setup().await;
        let row_id = ApprovalRowQueries::append(&db, &snapshot(2.0)).await.unwrap();

        let first = ApprovalRowQueries::apply_decision(&db, row_id, Decision::Approve).await.unwrap();
        assert_eq!(first, DecisionOutcome::Recorded { status: ApprovalStatus::Approved });

        let replay = ApprovalRowQueries::apply_decision(&db, row_id, Decision::Approve).await.unwrap();
        assert_eq!(replay, DecisionOutcome::AlreadyRecorded { status: ApprovalStatus::Approved });

        let contradiction =
            ApprovalRowQueries::apply_decision(&db, row_id, Decision::Reject).await.unwrap();
        assert_eq!(contradiction, DecisionOutcome::Conflict { existing: ApprovalStatus::Approved });

        assert_eq!(
            ApprovalRowQueries::status(&db, row_id).await.unwrap(),
            ApprovalStatus::Approved
        );
    }

    #[tokio::test]
    async fn test_decision_on_missing_row() {
        let (_dir, db) = setup().await;
        let result = ApprovalRowQueries::apply_decision(&db, 404, Decision::Reject).await;
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let (_dir, db) = setup().await;
        let first = ApprovalRowQueries::append(&db, &snapshot(1.0)).await.unwrap();
        let second = ApprovalRowQueries::append(&db, &snapshot(2.0)).await.unwrap();
        ApprovalRowQueries::apply_decision(&db, first, Decision::Reject).await.unwrap();

        let pending = ApprovalRowQueries::list(&db, Some(ApprovalStatus::Pending), 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].row_id, second);

        let all = ApprovalRowQueries::list(&db, None, 10).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].row_id, second);
    }

    #[tokio::test]
    async fn test_withdraw_only_removes_pending_rows() {
        let (_dir, db) = setup().await;
        let pending = ApprovalRowQueries::append(&db, &snapshot(1.0)).await.unwrap();
        let decided = ApprovalRowQueries::append(&db, &snapshot(2.0)).await.unwrap();
        ApprovalRowQueries::apply_decision(&db, decided, Decision::Approve).await.unwrap();

        assert!(ApprovalRowQueries::withdraw(&db, pending).await.unwrap());
        assert!(ApprovalRowQueries::get(&db, pending).await.unwrap().is_none());
        assert!(!ApprovalRowQueries::withdraw(&db, pending).await.unwrap());

        assert!(!ApprovalRowQueries::withdraw(&db, decided).await.unwrap());
        assert_eq!(
            ApprovalRowQueries::status(&db, decided).await.unwrap(),
            ApprovalStatus::Approved
        );
    }
}
