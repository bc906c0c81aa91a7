use async_trait::async_trait;
use thiserror::Error;
use tvtime_common::{ApprovalNotice, ApprovalStatus, Error, LedgerSnapshot, RowId};
use tvtime_db::DbError;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("Row {0} not found")]
    NotFound(RowId),

    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("Sheet error: {0}")]
    Database(#[from] DbError),
}

impl BackendError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, BackendError::Unauthorized(_))
    }

    /// Classify a failure while polling a row.
    pub fn into_poll_error(self) -> Error {
        match self {
            BackendError::Unauthorized(reason) => Error::AuthorizationFailure(reason),
            other => Error::WorkflowPollFailure(other.to_string()),
        }
    }
}

/// The remote row store and mailer the approval round-trip talks to.
#[async_trait]
pub trait ApprovalBackend: Send + Sync {
    /// Append a `PENDING` row for the snapshot and return its id.
    async fn append_row(&self, snapshot: &LedgerSnapshot) -> Result<RowId, BackendError>;

    async fn read_status(&self, row_id: RowId) -> Result<ApprovalStatus, BackendError>;

    /// Deliver the approval request to the parent.
    async fn notify(&self, notice: &ApprovalNotice) -> Result<(), BackendError>;

    /// Remove a row that is still `PENDING`. Withdrawing a row that is gone
    /// already is not an error.
    async fn withdraw_row(&self, row_id: RowId) -> Result<(), BackendError>;
}
