use anyhow::Result;
use tvtime_common::RowId;
use tvtime_db::queries::ApprovalNoticeQueries;
use tvtime_engine::EngineConfig;

use super::open_sheet;

pub async fn list(config: &EngineConfig, row: Option<RowId>, limit: i64) -> Result<()> {
    let db = open_sheet(config).await?;
    let notices = match row {
        Some(row_id) => ApprovalNoticeQueries::list_for_row(&db, row_id).await?,
        None => ApprovalNoticeQueries::list_recent(&db, limit).await?,
    };

    if notices.is_empty() {
        println!("No notices");
        return Ok(());
    }

    for notice in notices {
        println!("== {} (row {}, {})", notice.subject, notice.row_id, notice.created_at.format("%Y-%m-%d %H:%M"));
        println!("{}", notice.body);
        println!();
    }

    Ok(())
}
