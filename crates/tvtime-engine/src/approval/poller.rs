//! Background task that polls one submitted row until it is decided.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tvtime_common::RowId;

use super::backend::ApprovalBackend;
use super::workflow::ApprovalEvent;

pub struct Poller {
    row_id: RowId,
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Poller {
    /// Start polling `row_id` every `interval`, beginning one interval from now.
    pub fn spawn(
        backend: Arc<dyn ApprovalBackend>,
        row_id: RowId,
        interval: Duration,
        events: mpsc::UnboundedSender<ApprovalEvent>,
    ) -> Self {
        let cancel_token = CancellationToken::new();
        let handle =
            tokio::spawn(poll_loop(backend, row_id, interval, events, cancel_token.clone()));

        info!("Polling row {} every {:?}", row_id, interval);
        Self { row_id, cancel_token, handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn stop(self) {
        self.cancel_token.cancel();
        debug!("Stopped polling row {}", self.row_id);
    }
}

async fn poll_loop(
    backend: Arc<dyn ApprovalBackend>,
    row_id: RowId,
    interval: Duration,
    events: mpsc::UnboundedSender<ApprovalEvent>,
    cancel_token: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match backend.read_status(row_id).await {
                    Ok(status) if status.is_terminal() => {
                        info!("Row {} decided: {}", row_id, status);
                        let _ = events.send(ApprovalEvent::Decided { row_id, status });
                        break;
                    }
                    Ok(status) => debug!("Row {} still {}", row_id, status),
                    Err(e) if e.is_unauthorized() => {
                        warn!("Polling row {} refused: {}", row_id, e);
                        let _ = events.send(ApprovalEvent::Unauthorized { row_id, reason: e.to_string() });
                        break;
                    }
                    Err(e) => warn!("{}, retrying", e.into_poll_error()),
                }
            }
            _ = cancel_token.cancelled() => break,
        }
    }
}
