use thiserror::Error;

use crate::types::AntiCheatReason;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds shared by the engine, the CLI and the persistence layer.
///
/// Frame-level kinds (`FrameUnusable`, `AntiCheatViolation`) are recovered inside
/// the per-frame step and never reach the caller of the event loop.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Frame unusable: {0}")]
    FrameUnusable(String),

    #[error("Anti-cheat violation: {}", .0.code())]
    AntiCheatViolation(AntiCheatReason),

    #[error("Daily limit reached: {earned:.1} + {gain:.1} exceeds {cap:.1} minutes")]
    LedgerCapExceeded { earned: f64, gain: f64, cap: f64 },

    #[error("Approval submission failed: {0}")]
    WorkflowSubmitFailure(String),

    #[error("Approval poll failed: {0}")]
    WorkflowPollFailure(String),

    #[error("Authorization failed: {0}")]
    AuthorizationFailure(String),

    #[error("Confirmation required: {0}")]
    ConfirmationRequired(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable snake_case name of the failure kind, used in emitted events.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::FrameUnusable(_) => "frame_unusable",
            Error::AntiCheatViolation(_) => "anti_cheat_violation",
            Error::LedgerCapExceeded { .. } => "ledger_cap_exceeded",
            Error::WorkflowSubmitFailure(_) => "workflow_submit_failure",
            Error::WorkflowPollFailure(_) => "workflow_poll_failure",
            Error::AuthorizationFailure(_) => "authorization_failure",
            Error::ConfirmationRequired(_) => "confirmation_required",
            Error::InvalidState(_) => "invalid_state",
            Error::Config(_) => "config",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
        }
    }

    /// Whether the error leaves the user able to retry the same action unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::WorkflowSubmitFailure(_) | Error::WorkflowPollFailure(_))
    }
}
