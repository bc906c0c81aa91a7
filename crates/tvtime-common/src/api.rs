//! JSON bodies exchanged with the approval collaborator over HTTP.

use serde::{Deserialize, Serialize};

use crate::types::{ApprovalStatus, RowId};

/// `POST /rows` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendRowResponse {
    pub row_id: RowId,
}

/// `GET /rows/{id}` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowStatusResponse {
    pub row_id: RowId,
    pub status: ApprovalStatus,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}
