//! Approval backend over the local SQLite sheet, for single-machine installs
//! where the parent approves with `tvtime-ctl`.

use async_trait::async_trait;
use tracing::{debug, info};
use tvtime_common::{ApprovalNotice, ApprovalStatus, LedgerSnapshot, RowId};
use tvtime_db::queries::{ApprovalNoticeQueries, ApprovalRowQueries};
use tvtime_db::{Database, DbError};

use super::backend::{ApprovalBackend, BackendError};

#[derive(Clone)]
pub struct SheetBackend {
    db: Database,
}

impl SheetBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ApprovalBackend for SheetBackend {
    async fn append_row(&self, snapshot: &LedgerSnapshot) -> Result<RowId, BackendError> {
        Ok(ApprovalRowQueries::append(&self.db, snapshot).await?)
    }

    async fn read_status(&self, row_id: RowId) -> Result<ApprovalStatus, BackendError> {
        match ApprovalRowQueries::status(&self.db, row_id).await {
            Ok(status) => Ok(status),
            Err(DbError::NotFound(_)) => Err(BackendError::NotFound(row_id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn notify(&self, notice: &ApprovalNotice) -> Result<(), BackendError> {
        ApprovalNoticeQueries::create(&self.db, notice).await?;
        info!("Approval notice queued for row {}: {}", notice.row_id, notice.subject());
        Ok(())
    }

    async fn withdraw_row(&self, row_id: RowId) -> Result<(), BackendError> {
        if !ApprovalRowQueries::withdraw(&self.db, row_id).await? {
            debug!("Row {} was not pending, nothing withdrawn", row_id);
        }
        Ok(())
    }
}
