//! Local persistence for the ledger and the approval sync state.
//!
//! Writes are queued to a background task so the frame path never waits on
//! SQLite; reads happen once at start-up.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tvtime_common::{ApprovalStatus, LedgerEntry, RowId};
use tvtime_db::queries::{LedgerQueries, StoredLedger, SyncStateQueries};
use tvtime_db::{Database, DbSyncState};

use crate::ledger::TimeLedger;

enum StoreRequest {
    Ledger { date: NaiveDate, earned: f64, history: Vec<LedgerEntry> },
    SyncState { last_synced_minutes: f64, row_id: Option<RowId>, status: ApprovalStatus },
    ClearSyncState,
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct LedgerStore {
    db: Database,
    sender: mpsc::UnboundedSender<StoreRequest>,
}

impl LedgerStore {
    pub fn spawn(db: Database) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<StoreRequest>();
        let writer_db = db.clone();

        let handle = tokio::spawn(async move {
            while let Some(request) = receiver.recv().await {
                if let Err(e) = Self::write(&writer_db, request).await {
                    warn!("Failed to persist state: {:#}", e);
                }
            }
            debug!("Store writer stopped");
        });

        (Self { db, sender }, handle)
    }

    async fn write(db: &Database, request: StoreRequest) -> Result<()> {
        match request {
            StoreRequest::Ledger { date, earned, history } => {
                LedgerQueries::save(db, date, earned, &history)
                    .await
                    .with_context(|| format!("saving ledger for {}", date))?;
            }
            StoreRequest::SyncState { last_synced_minutes, row_id, status } => {
                SyncStateQueries::put(db, last_synced_minutes, row_id, status)
                    .await
                    .context("saving sync state")?;
            }
            StoreRequest::ClearSyncState => {
                SyncStateQueries::clear(db).await.context("clearing sync state")?;
            }
            StoreRequest::Flush(done) => {
                let _ = done.send(());
            }
        }
        Ok(())
    }

    fn queue(&self, request: StoreRequest) {
        if self.sender.send(request).is_err() {
            warn!("Store writer has stopped, dropping write");
        }
    }

    pub fn save_ledger(&self, ledger: &TimeLedger) {
        self.queue(StoreRequest::Ledger {
            date: ledger.date(),
            earned: ledger.earned(),
            history: ledger.history().to_vec(),
        });
    }

    pub fn save_sync_state(
        &self,
        last_synced_minutes: f64,
        row_id: Option<RowId>,
        status: ApprovalStatus,
    ) {
        self.queue(StoreRequest::SyncState { last_synced_minutes, row_id, status });
    }

    /// Forget the day's submission.
    pub fn clear_sync_state(&self) {
        self.queue(StoreRequest::ClearSyncState);
    }

    /// Wait until every write queued so far has been applied.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        self.queue(StoreRequest::Flush(done));
        let _ = wait.await;
    }

    pub async fn load_latest_ledger(&self) -> Result<Option<StoredLedger>> {
        let stored = LedgerQueries::latest(&self.db).await.context("loading latest ledger")?;
        if let Some(ledger) = &stored {
            info!("Loaded ledger for {} ({:.1} minutes)", ledger.date, ledger.earned_minutes);
        }
        Ok(stored)
    }

    pub async fn load_sync_state(&self) -> Result<DbSyncState> {
        SyncStateQueries::get(&self.db).await.context("loading sync state")
    }
}
