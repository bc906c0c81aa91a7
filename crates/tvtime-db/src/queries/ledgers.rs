use chrono::{NaiveDate, Utc};
use tvtime_common::LedgerEntry;

use crate::connection::Database;
use crate::error::Result;
use crate::models::{DbLedger, DbLedgerEntry};

/// A ledger as read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredLedger {
    pub date: NaiveDate,
    pub earned_minutes: f64,
    pub history: Vec<LedgerEntry>,
}

pub struct LedgerQueries;

impl LedgerQueries {
    /// Replace the stored ledger for `date` with the given totals and history.
    ///
    /// Runs in one transaction so a reader never sees totals without their entries.
    pub async fn save(
        db: &Database,
        date: NaiveDate,
        earned_minutes: f64,
        history: &[LedgerEntry],
    ) -> Result<()> {
        let pool = db.pool();
        let mut tx = pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO ledgers (date, earned_minutes, updated_at)
               VALUES (?, ?, ?)
               ON CONFLICT(date) DO UPDATE SET
                   earned_minutes = excluded.earned_minutes,
                   updated_at = excluded.updated_at"#,
        )
        .bind(date)
        .bind(earned_minutes)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM ledger_entries WHERE ledger_date = ?")
            .bind(date)
            .execute(&mut *tx)
            .await?;

        for (position, entry) in history.iter().enumerate() {
            sqlx::query(
                r#"INSERT INTO ledger_entries
                   (ledger_date, position, description, exercise, reps, minutes, recorded_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(date)
            .bind(position as i64)
            .bind(&entry.description)
            .bind(entry.exercise.as_str())
            .bind(i64::from(entry.reps))
            .bind(entry.minutes)
            .bind(entry.recorded_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn load(db: &Database, date: NaiveDate) -> Result<Option<StoredLedger>> {
        let pool = db.pool();

        let ledger = sqlx::query_as::<_, DbLedger>(
            "SELECT date, earned_minutes, updated_at FROM ledgers WHERE date = ?",
        )
        .bind(date)
        .fetch_optional(pool)
        .await?;

        match ledger {
            Some(ledger) => Ok(Some(Self::with_entries(db, ledger).await?)),
            None => Ok(None),
        }
    }

    /// Most recently written ledger, whatever its date.
    pub async fn latest(db: &Database) -> Result<Option<StoredLedger>> {
        let pool = db.pool();

        let ledger = sqlx::query_as::<_, DbLedger>(
            "SELECT date, earned_minutes, updated_at FROM ledgers ORDER BY updated_at DESC LIMIT 1",
        )
        .fetch_optional(pool)
        .await?;

        match ledger {
            Some(ledger) => Ok(Some(Self::with_entries(db, ledger).await?)),
            None => Ok(None),
        }
    }

    async fn with_entries(db: &Database, ledger: DbLedger) -> Result<StoredLedger> {
        let pool = db.pool();

        let rows = sqlx::query_as::<_, DbLedgerEntry>(
            r#"SELECT id, ledger_date, position, description, exercise, reps, minutes, recorded_at
               FROM ledger_entries
               WHERE ledger_date = ?
               ORDER BY position ASC"#,
        )
        .bind(ledger.date)
        .fetch_all(pool)
        .await?;

        let history = rows.into_iter().map(DbLedgerEntry::into_entry).collect::<Result<Vec<_>>>()?;

        Ok(StoredLedger { date: ledger.date, earned_minutes: ledger.earned_minutes, history })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::DatabaseConfig;
    use tempfile::TempDir;
    use tvtime_common::ExerciseKind;

    async fn setup() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let db = Database::open(DatabaseConfig { path: path.to_str().unwrap().to_string() })
            .await
            .unwrap();
        (dir, db)
    }

    fn entry(kind: ExerciseKind, minutes: f64) -> LedgerEntry {
        LedgerEntry {
            description: format!("{} Set", kind.label()),
            reps: kind.default_rate(),
            minutes,
            exercise: kind,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_save_and_load_preserves_order() {
        let (_dir, db) = setup().await;
        let date = NaiveDate::from_ymd_opt(2026, 1, 19).unwrap();
        let history = vec![entry(ExerciseKind::Pushups, 1.0), entry(ExerciseKind::Squats, 0.5)];

        LedgerQueries::save(&db, date, 1.5, &history).await.unwrap();

        let stored = LedgerQueries::load(&db, date).await.unwrap().unwrap();
        assert_eq!(stored.earned_minutes, 1.5);
        assert_eq!(stored.history.len(), 2);
        assert_eq!(stored.history[0].description, "Pushups Set");
        assert_eq!(stored.history[1].exercise, ExerciseKind::Squats);
    }

    #[tokio::test]
    async fn test_save_replaces_previous_history() {
        let (_dir, db) = setup().await;
        let date = NaiveDate::from_ymd_opt(2026, 1, 19).unwrap();

        LedgerQueries::save(&db, date, 1.0, &[entry(ExerciseKind::Pushups, 1.0)]).await.unwrap();
        LedgerQueries::save(&db, date, 0.0, &[]).await.unwrap();

        let stored = LedgerQueries::load(&db, date).await.unwrap().unwrap();
        assert_eq!(stored.earned_minutes, 0.0);
        assert!(stored.history.is_empty());
    }

    #[tokio::test]
    async fn test_latest_returns_most_recent_write() {
        let (_dir, db) = setup().await;
        let monday = NaiveDate::from_ymd_opt(2026, 1, 19).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2026, 1, 20).unwrap();

        assert!(LedgerQueries::latest(&db).await.unwrap().is_none());

        LedgerQueries::save(&db, monday, 3.0, &[]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        LedgerQueries::save(&db, tuesday, 1.0, &[]).await.unwrap();

        let latest = LedgerQueries::latest(&db).await.unwrap().unwrap();
        assert_eq!(latest.date, tuesday);
    }
}
