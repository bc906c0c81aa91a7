//! Submission and decision tracking for one approval round-trip per day.
//!
//! Backend calls never run on the event loop. Submission and polling are
//! spawned tasks that report back as `ApprovalEvent`s, and the workflow only
//! changes state when the loop hands those events to `handle_event`.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error as ThisError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tvtime_common::{
    ApprovalNotice, ApprovalStatus, Decision, Error, LedgerSnapshot, Result, RowId,
};
use url::Url;

use super::backend::{ApprovalBackend, BackendError};
use super::poller::Poller;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "UPPERCASE")]
pub enum WorkflowState {
    Idle,
    /// Row append and notification are in flight.
    Submitting,
    Pending { row_id: RowId },
    Approved { row_id: RowId },
    Rejected { row_id: RowId },
}

impl WorkflowState {
    /// Persisted status. A submission still in flight is not persisted.
    pub fn status(&self) -> ApprovalStatus {
        match self {
            WorkflowState::Idle | WorkflowState::Submitting => ApprovalStatus::None,
            WorkflowState::Pending { .. } => ApprovalStatus::Pending,
            WorkflowState::Approved { .. } => ApprovalStatus::Approved,
            WorkflowState::Rejected { .. } => ApprovalStatus::Rejected,
        }
    }

    pub fn row_id(&self) -> Option<RowId> {
        match *self {
            WorkflowState::Idle | WorkflowState::Submitting => None,
            WorkflowState::Pending { row_id }
            | WorkflowState::Approved { row_id }
            | WorkflowState::Rejected { row_id } => Some(row_id),
        }
    }
}

/// Why a background submission did not reach `PENDING`.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum SubmitFailure {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Failed(String),
}

impl SubmitFailure {
    pub fn into_error(self) -> Error {
        match self {
            SubmitFailure::Unauthorized(reason) => Error::AuthorizationFailure(reason),
            SubmitFailure::Failed(reason) => Error::WorkflowSubmitFailure(reason),
        }
    }
}

impl From<BackendError> for SubmitFailure {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unauthorized(reason) => SubmitFailure::Unauthorized(reason),
            other => SubmitFailure::Failed(other.to_string()),
        }
    }
}

/// Messages from the submission and polling tasks to the event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalEvent {
    Submitted { attempt: u64, row_id: RowId, earned: f64 },
    SubmitFailed { attempt: u64, failure: SubmitFailure },
    Decided { row_id: RowId, status: ApprovalStatus },
    Unauthorized { row_id: RowId, reason: String },
}

/// What an `ApprovalEvent` did to the workflow.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowChange {
    Submitted { row_id: RowId, earned: f64 },
    SubmitFailed(SubmitFailure),
    Decided { row_id: RowId, status: ApprovalStatus },
    AuthorizationLost { row_id: RowId, reason: String },
}

/// Build the approve/reject link for `row_id` under `base`.
pub fn decision_url(base: &Url, decision: Decision, row_id: RowId) -> Result<Url> {
    let mut url = base
        .join("decision")
        .map_err(|e| Error::Config(format!("Invalid decision base URL {}: {}", base, e)))?;
    url.query_pairs_mut()
        .append_pair("action", decision.action())
        .append_pair("row", &row_id.to_string());
    Ok(url)
}

pub struct ApprovalWorkflow {
    backend: Arc<dyn ApprovalBackend>,
    decision_base_url: Url,
    poll_interval: Duration,
    events: mpsc::UnboundedSender<ApprovalEvent>,
    state: WorkflowState,
    /// Bumped on every submit; results from older attempts are discarded.
    attempt: u64,
    poller: Option<Poller>,
}

impl ApprovalWorkflow {
    pub fn new(
        backend: Arc<dyn ApprovalBackend>,
        decision_base_url: Url,
        poll_interval: Duration,
        events: mpsc::UnboundedSender<ApprovalEvent>,
    ) -> Self {
        Self {
            backend,
            decision_base_url,
            poll_interval,
            events,
            state: WorkflowState::Idle,
            attempt: 0,
            poller: None,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(|poller| !poller.is_finished())
    }

    /// Start submitting `snapshot` for approval and return at once.
    ///
    /// Only allowed while idle and with something earned. The workflow sits in
    /// `SUBMITTING` until the task reports back; it enters `PENDING` only once
    /// the row is written and the parent notified.
    pub fn submit(&mut self, snapshot: LedgerSnapshot) -> Result<()> {
        match self.state {
            WorkflowState::Idle => {}
            WorkflowState::Submitting => {
                return Err(Error::InvalidState("A report is already being sent".to_string()))
            }
            WorkflowState::Pending { row_id } => {
                return Err(Error::InvalidState(format!("Row {} is still awaiting a decision", row_id)))
            }
            state => {
                return Err(Error::InvalidState(format!(
                    "Today's request was already {}",
                    state.status()
                )))
            }
        }

        if snapshot.earned_minutes <= 0.0 {
            return Err(Error::InvalidState("Nothing earned yet".to_string()));
        }

        self.attempt += 1;
        self.state = WorkflowState::Submitting;
        debug!("Submitting {:.1} minutes (attempt {})", snapshot.earned_minutes, self.attempt);

        tokio::spawn(submit_task(
            Arc::clone(&self.backend),
            self.decision_base_url.clone(),
            snapshot,
            self.attempt,
            self.events.clone(),
        ));
        Ok(())
    }

    fn enter_pending(&mut self, row_id: RowId) {
        self.stop_poller();
        self.state = WorkflowState::Pending { row_id };
        self.poller = Some(Poller::spawn(
            Arc::clone(&self.backend),
            row_id,
            self.poll_interval,
            self.events.clone(),
        ));
    }

    fn stop_poller(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
    }

    /// Apply a message from a background task. Results for an attempt or a row
    /// the workflow is no longer waiting on are dropped.
    pub fn handle_event(&mut self, event: ApprovalEvent) -> Option<WorkflowChange> {
        match event {
            ApprovalEvent::Submitted { attempt, row_id, earned } => {
                if self.state != WorkflowState::Submitting || attempt != self.attempt {
                    info!("Withdrawing row {} from a superseded report", row_id);
                    self.withdraw_in_background(row_id);
                    return None;
                }
                info!("Submitted {:.1} minutes for approval as row {}", earned, row_id);
                self.enter_pending(row_id);
                Some(WorkflowChange::Submitted { row_id, earned })
            }
            ApprovalEvent::SubmitFailed { attempt, failure } => {
                if self.state != WorkflowState::Submitting || attempt != self.attempt {
                    debug!("Ignoring failure of superseded attempt {}: {}", attempt, failure);
                    return None;
                }
                self.state = WorkflowState::Idle;
                Some(WorkflowChange::SubmitFailed(failure))
            }
            poll => self.handle_poll_result(poll),
        }
    }

    fn handle_poll_result(&mut self, event: ApprovalEvent) -> Option<WorkflowChange> {
        let pending = match self.state {
            WorkflowState::Pending { row_id } => row_id,
            _ => {
                debug!("Ignoring poller event while not pending: {:?}", event);
                return None;
            }
        };

        match event {
            ApprovalEvent::Decided { row_id, status } if row_id == pending => {
                let decided = match status {
                    ApprovalStatus::Approved => WorkflowState::Approved { row_id },
                    ApprovalStatus::Rejected => WorkflowState::Rejected { row_id },
                    other => {
                        warn!("Poller reported non-final status {} for row {}", other, row_id);
                        return None;
                    }
                };
                self.stop_poller();
                self.state = decided;
                info!("Row {} {}", row_id, status);
                Some(WorkflowChange::Decided { row_id, status })
            }
            ApprovalEvent::Unauthorized { row_id, reason } if row_id == pending => {
                self.stop_poller();
                self.state = WorkflowState::Idle;
                warn!("Approval aborted for row {}: {}", row_id, reason);
                Some(WorkflowChange::AuthorizationLost { row_id, reason })
            }
            stale => {
                debug!("Ignoring poller event for another row: {:?}", stale);
                None
            }
        }
    }

    fn withdraw_in_background(&self, row_id: RowId) {
        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            if let Err(e) = backend.withdraw_row(row_id).await {
                warn!("Failed to withdraw row {}: {}", row_id, e);
            }
        });
    }

    /// Stop waiting for the pending decision and return to idle.
    pub fn cancel(&mut self) -> Result<RowId> {
        match self.state {
            WorkflowState::Pending { row_id } => {
                self.stop_poller();
                self.state = WorkflowState::Idle;
                info!("Cancelled approval request for row {}", row_id);
                Ok(row_id)
            }
            WorkflowState::Submitting => {
                Err(Error::InvalidState("The report is still being sent".to_string()))
            }
            _ => Err(Error::InvalidState("No request is pending".to_string())),
        }
    }

    /// Restore the state persisted before a restart, re-arming the poller
    /// for a pending row.
    pub fn resume(&mut self, row_id: Option<RowId>, status: ApprovalStatus) {
        self.stop_poller();
        match (status, row_id) {
            (ApprovalStatus::Pending, Some(row_id)) => {
                info!("Resuming approval polling for row {}", row_id);
                self.enter_pending(row_id);
            }
            (ApprovalStatus::Approved, Some(row_id)) => {
                self.state = WorkflowState::Approved { row_id }
            }
            (ApprovalStatus::Rejected, Some(row_id)) => {
                self.state = WorkflowState::Rejected { row_id }
            }
            _ => self.state = WorkflowState::Idle,
        }
    }

    /// Forget the day's request, used on a new day. A submission still in
    /// flight is withdrawn when it reports back.
    pub fn reset(&mut self) {
        self.stop_poller();
        self.state = WorkflowState::Idle;
    }
}

async fn submit_task(
    backend: Arc<dyn ApprovalBackend>,
    decision_base_url: Url,
    snapshot: LedgerSnapshot,
    attempt: u64,
    events: mpsc::UnboundedSender<ApprovalEvent>,
) {
    let event = match deliver(backend.as_ref(), &decision_base_url, &snapshot).await {
        Ok(row_id) => ApprovalEvent::Submitted { attempt, row_id, earned: snapshot.earned_minutes },
        Err(failure) => {
            warn!("Approval submission failed: {}", failure);
            ApprovalEvent::SubmitFailed { attempt, failure }
        }
    };

    if events.send(event).is_err() {
        debug!("Event loop gone, dropping result of attempt {}", attempt);
    }
}

/// Append the row and notify the parent. A row whose notice cannot be
/// delivered is withdrawn again.
async fn deliver(
    backend: &dyn ApprovalBackend,
    decision_base_url: &Url,
    snapshot: &LedgerSnapshot,
) -> std::result::Result<RowId, SubmitFailure> {
    let row_id = backend.append_row(snapshot).await?;

    if let Err(failure) = announce(backend, decision_base_url, snapshot, row_id).await {
        match backend.withdraw_row(row_id).await {
            Ok(()) => info!("Withdrew row {} after failed notice", row_id),
            Err(e) => warn!("Row {} left behind, withdraw failed: {}", row_id, e),
        }
        return Err(failure);
    }
    Ok(row_id)
}

async fn announce(
    backend: &dyn ApprovalBackend,
    decision_base_url: &Url,
    snapshot: &LedgerSnapshot,
    row_id: RowId,
) -> std::result::Result<(), SubmitFailure> {
    let link = |decision| {
        decision_url(decision_base_url, decision, row_id)
            .map(String::from)
            .map_err(|e| SubmitFailure::Failed(e.to_string()))
    };
    let notice = ApprovalNotice {
        row_id,
        approve_url: link(Decision::Approve)?,
        reject_url: link(Decision::Reject)?,
        snapshot: snapshot.clone(),
    };
    backend.notify(&notice).await?;
    Ok(())
}
