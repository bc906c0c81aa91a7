use anyhow::Result;
use chrono::{Local, NaiveDate};
use tvtime_db::queries::{LedgerQueries, StoredLedger, SyncStateQueries};
use tvtime_db::Database;
use tvtime_engine::ledger::TimeLedger;
use tvtime_engine::EngineConfig;

use super::open_local;

/// The ledger for `date`, or the most recent one.
async fn find(db: &Database, date: Option<NaiveDate>) -> Result<Option<StoredLedger>> {
    let stored = match date {
        Some(date) => LedgerQueries::load(db, date).await?,
        None => LedgerQueries::latest(db).await?,
    };
    Ok(stored)
}

pub async fn show(config: &EngineConfig, date: Option<NaiveDate>) -> Result<()> {
    let db = open_local(config).await?;

    let Some(stored) = find(&db, date).await? else {
        match date {
            Some(date) => println!("No ledger recorded for {}", date),
            None => println!("No ledger recorded yet"),
        }
        return Ok(());
    };

    let now = Local::now();
    let ledger = TimeLedger::restore(stored, config.ledger.daily_cap_minutes, config.credit_policy.clone());
    let stats = ledger.stats();

    println!("TV Time ledger for {}", ledger.date());
    println!("==============================");
    if ledger.is_stale(now.date_naive()) {
        println!("(from an earlier day, not reset yet)");
    }
    println!("Earned:    {:.1} / {:.0} minutes", stats.earned_minutes, ledger.cap());
    println!("Remaining: {:.1} minutes", stats.remaining_minutes);
    println!("Reps:      {}", stats.total_reps);
    println!("Calories:  {:.1}", stats.calories);
    println!();
    println!("{}", ledger.insight(now));

    if !ledger.history().is_empty() {
        println!();
        println!("History:");
        for entry in ledger.history() {
            println!(
                "  {} {} ({} reps, +{:.1} min)",
                entry.recorded_at.with_timezone(&Local).format("%H:%M"),
                entry.description,
                entry.reps,
                entry.minutes
            );
        }
    }

    let sync = SyncStateQueries::get(&db).await?;
    println!();
    match sync.pending_row_id {
        Some(row_id) => println!(
            "Approval: {} (row {}, {:.1} minutes submitted)",
            sync.workflow_status, row_id, sync.last_synced_minutes
        ),
        None => println!("Approval: {}", sync.workflow_status),
    }

    Ok(())
}
