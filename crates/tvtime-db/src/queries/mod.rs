pub mod approval_notices;
pub mod approval_rows;
pub mod ledgers;
pub mod sync_state;

pub use approval_notices::ApprovalNoticeQueries;
pub use approval_rows::ApprovalRowQueries;
pub use ledgers::{LedgerQueries, StoredLedger};
pub use sync_state::SyncStateQueries;
