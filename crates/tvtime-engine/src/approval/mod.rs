pub mod backend;
pub mod poller;
pub mod sheet;
pub mod webapp;
pub mod workflow;

use std::sync::Arc;

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;
use tvtime_db::{Database, DatabaseConfig};
use url::Url;

use crate::config::{ApprovalConfig, BackendKind};

pub use backend::{ApprovalBackend, BackendError};
pub use poller::Poller;
pub use sheet::SheetBackend;
pub use webapp::WebAppBackend;
pub use workflow::{
    decision_url, ApprovalEvent, ApprovalWorkflow, SubmitFailure, WorkflowChange, WorkflowState,
};

/// Open the configured approval backend.
pub async fn connect(config: &ApprovalConfig) -> Result<Arc<dyn ApprovalBackend>> {
    match config.backend {
        BackendKind::Sheet => {
            info!("Using approval sheet at {}", config.sheet_path);
            let db = Database::open(DatabaseConfig { path: config.sheet_path.clone() })
                .await
                .with_context(|| format!("Failed to open approval sheet {}", config.sheet_path))?;
            Ok(Arc::new(SheetBackend::new(db)))
        }
        BackendKind::Webapp => {
            let raw = config.webapp_url.as_deref().context("webapp_url is not set")?;
            let url = Url::parse(raw).with_context(|| format!("Invalid webapp_url: {}", raw))?;
            let token = config
                .api_token
                .as_ref()
                .map(|token| SecretString::new(token.expose_secret().into()));
            info!("Using approval web app at {}", url);
            Ok(Arc::new(WebAppBackend::new(url, token)?))
        }
    }
}
