use chrono::Utc;
use tvtime_common::{ApprovalNotice, RowId};

use crate::connection::Database;
use crate::error::Result;
use crate::models::DbApprovalNotice;

pub struct ApprovalNoticeQueries;

impl ApprovalNoticeQueries {
    /// Store the rendered notice so the approver can find the decision links.
    pub async fn create(db: &Database, notice: &ApprovalNotice) -> Result<i64> {
        let pool = db.pool();

        let result = sqlx::query(
            r#"INSERT INTO approval_notices
               (row_id, subject, body, approve_url, reject_url, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(notice.row_id)
        .bind(notice.subject())
        .bind(notice.body())
        .bind(&notice.approve_url)
        .bind(&notice.reject_url)
        .bind(Utc::now())
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn list_for_row(db: &Database, row_id: RowId) -> Result<Vec<DbApprovalNotice>> {
        let pool = db.pool();

        let notices = sqlx::query_as::<_, DbApprovalNotice>(
            r#"SELECT id, row_id, subject, body, approve_url, reject_url, created_at
               FROM approval_notices
               WHERE row_id = ?
               ORDER BY id ASC"#,
        )
        .bind(row_id)
        .fetch_all(pool)
        .await?;

        Ok(notices)
    }

    pub async fn list_recent(db: &Database, limit: i64) -> Result<Vec<DbApprovalNotice>> {
        let pool = db.pool();

        let notices = sqlx::query_as::<_, DbApprovalNotice>(
            r#"SELECT id, row_id, subject, body, approve_url, reject_url, created_at
               FROM approval_notices
               ORDER BY id DESC
               LIMIT ?"#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(notices)
    }
}
