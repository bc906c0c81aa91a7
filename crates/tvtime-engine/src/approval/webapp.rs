//! Approval backend speaking JSON over HTTP to a collaborator such as
//! `tvtime-ctl serve`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::debug;
use tvtime_common::api::{ApiError, AppendRowResponse, RowStatusResponse};
use tvtime_common::{ApprovalNotice, ApprovalStatus, LedgerSnapshot, RowId};
use url::Url;

use super::backend::{ApprovalBackend, BackendError};

const REQUEST_TIMEOUT_SECS: u64 = 10;

pub struct WebAppBackend {
    client: Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl WebAppBackend {
    pub fn new(base_url: Url, token: Option<SecretString>) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        Ok(Self { client, base_url, token })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::Protocol(format!("bad endpoint {}: {}", path, e)))
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, BackendError> {
        match &self.token {
            Some(token) => Ok(builder.bearer_auth(token.expose_secret())),
            None => Err(BackendError::Unauthorized("no API token configured".to_string())),
        }
    }

    /// Send a request; `row_id` names the row a 404 refers to, if any.
    async fn send(
        &self,
        builder: RequestBuilder,
        row_id: Option<RowId>,
    ) -> Result<Response, BackendError> {
        let response = self
            .authorized(builder)?
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.json::<ApiError>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };
        Err(classify(status, message, row_id))
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
        response.json::<T>().await.map_err(|e| BackendError::Protocol(e.to_string()))
    }
}

/// Map a non-success HTTP status to a backend error.
fn classify(status: StatusCode, message: String, row_id: Option<RowId>) -> BackendError {
    match (status, row_id) {
        (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => BackendError::Unauthorized(message),
        (StatusCode::NOT_FOUND, Some(row_id)) => BackendError::NotFound(row_id),
        (status, _) if status.is_server_error() => BackendError::Unavailable(message),
        _ => BackendError::Protocol(format!("{}: {}", status, message)),
    }
}

#[async_trait]
impl ApprovalBackend for WebAppBackend {
    async fn append_row(&self, snapshot: &LedgerSnapshot) -> Result<RowId, BackendError> {
        let url = self.endpoint("rows")?;
        let response = self.send(self.client.post(url).json(snapshot), None).await?;
        let body: AppendRowResponse = Self::read_json(response).await?;

        debug!("Collaborator assigned row {}", body.row_id);
        Ok(body.row_id)
    }

    async fn read_status(&self, row_id: RowId) -> Result<ApprovalStatus, BackendError> {
        let url = self.endpoint(&format!("rows/{}", row_id))?;
        let response = self.send(self.client.get(url), Some(row_id)).await?;
        let body: RowStatusResponse = Self::read_json(response).await?;

        if body.row_id != row_id {
            return Err(BackendError::Protocol(format!(
                "asked for row {}, got row {}",
                row_id, body.row_id
            )));
        }
        Ok(body.status)
    }

    async fn notify(&self, notice: &ApprovalNotice) -> Result<(), BackendError> {
        let url = self.endpoint("notify")?;
        self.send(self.client.post(url).json(notice), Some(notice.row_id)).await?;
        Ok(())
    }

    async fn withdraw_row(&self, row_id: RowId) -> Result<(), BackendError> {
        let url = self.endpoint(&format!("rows/{}", row_id))?;
        match self.send(self.client.delete(url), Some(row_id)).await {
            Ok(_) | Err(BackendError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
