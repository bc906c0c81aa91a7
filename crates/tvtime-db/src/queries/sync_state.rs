use chrono::Utc;
use tvtime_common::{ApprovalStatus, RowId};

use crate::connection::Database;
use crate::error::Result;
use crate::models::DbSyncState;

pub struct SyncStateQueries;

impl SyncStateQueries {
    /// Current sync state, or an empty one if nothing was ever submitted.
    pub async fn get(db: &Database) -> Result<DbSyncState> {
        let pool = db.pool();

        let state = sqlx::query_as::<_, DbSyncState>(
            r#"SELECT last_synced_minutes, pending_row_id, workflow_status, updated_at
               FROM sync_state WHERE id = 1"#,
        )
        .fetch_optional(pool)
        .await?;

        Ok(state.unwrap_or_else(|| DbSyncState {
            last_synced_minutes: 0.0,
            pending_row_id: None,
            workflow_status: ApprovalStatus::None.as_str().to_string(),
            updated_at: Utc::now(),
        }))
    }

    pub async fn put(
        db: &Database,
        last_synced_minutes: f64,
        row_id: Option<RowId>,
        status: ApprovalStatus,
    ) -> Result<()> {
        let pool = db.pool();

        sqlx::query(
            r#"INSERT INTO sync_state (id, last_synced_minutes, pending_row_id, workflow_status, updated_at)
               VALUES (1, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   last_synced_minutes = excluded.last_synced_minutes,
                   pending_row_id = excluded.pending_row_id,
                   workflow_status = excluded.workflow_status,
                   updated_at = excluded.updated_at"#,
        )
        .bind(last_synced_minutes)
        .bind(row_id)
        .bind(status.as_str())
        .bind(Utc::now())
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Forget any submission, used when a new day starts.
    pub async fn clear(db: &Database) -> Result<()> {
        Self::put(db, 0.0, None, ApprovalStatus::None).await
    }
}
