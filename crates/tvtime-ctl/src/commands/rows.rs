use anyhow::{bail, Result};
use clap::Subcommand;
use tvtime_common::{ApprovalStatus, Decision, LedgerSnapshot, RowId};
use tvtime_db::queries::ApprovalRowQueries;
use tvtime_db::{DbError, DecisionOutcome};
use tvtime_engine::EngineConfig;

use super::open_sheet;

#[derive(Subcommand)]
pub enum RowsAction {
    /// List approval rows, newest first
    List {
        /// Only rows with this status (pending, approved, rejected)
        #[arg(short, long)]
        status: Option<String>,

        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },

    /// Show one row with its activity breakdown
    Show { row_id: RowId },

    /// Approve a pending row
    Approve { row_id: RowId },

    /// Reject a pending row
    Reject { row_id: RowId },
}

pub async fn list(config: &EngineConfig, status: Option<ApprovalStatus>, limit: i64) -> Result<()> {
    let db = open_sheet(config).await?;
    let rows = ApprovalRowQueries::list(&db, status, limit).await?;

    if rows.is_empty() {
        println!("No approval rows");
        return Ok(());
    }

    println!("{:>5}  {:<10}  {:<10}  {:>7}  {:>5}  {}", "ROW", "DATE", "STATUS", "MINUTES", "REPS", "CHILD");
    for row in rows {
        println!(
            "{:>5}  {:<10}  {:<10}  {:>7.1}  {:>5}  {}",
            row.row_id, row.ledger_date, row.status, row.earned_minutes, row.total_reps, row.child_name
        );
    }

    Ok(())
}

pub async fn show(config: &EngineConfig, row_id: RowId) -> Result<()> {
    let db = open_sheet(config).await?;
    let Some(row) = ApprovalRowQueries::get(&db, row_id).await? else {
        bail!("Row {} not found", row_id);
    };

    println!("Row {}", row.row_id);
    println!("  Child:     {}", row.child_name);
    println!("  Day:       {}", row.ledger_date);
    println!("  Submitted: {}", row.submitted_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  Earned:    {:.1} minutes", row.earned_minutes);
    println!("  Reps:      {}", row.total_reps);
    println!("  Status:    {}", row.status);
    if let Some(decided_at) = row.decided_at {
        println!("  Decided:   {}", decided_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    match serde_json::from_str::<LedgerSnapshot>(&row.snapshot) {
        Ok(snapshot) if !snapshot.history.is_empty() => {
            println!("  Activities:");
            for entry in snapshot.history {
                println!(
                    "    {} {} ({} reps, {:.1} min)",
                    entry.recorded_at.format("%H:%M"),
                    entry.description,
                    entry.reps,
                    entry.minutes
                );
            }
        }
        Ok(_) => println!("  Activities: none"),
        Err(_) => println!("  Activities: {}", row.history),
    }

    Ok(())
}

pub async fn decide(config: &EngineConfig, row_id: RowId, decision: Decision) -> Result<()> {
    let db = open_sheet(config).await?;

    match ApprovalRowQueries::apply_decision(&db, row_id, decision).await {
        Ok(outcome) => {
            println!("{}", describe_outcome(row_id, outcome));
            if let DecisionOutcome::Conflict { .. } = outcome {
                bail!("Row {} was not changed", row_id);
            }
            Ok(())
        }
        Err(DbError::NotFound(_)) => bail!("Row {} not found", row_id),
        Err(e) => Err(e.into()),
    }
}

/// Human summary of a decision outcome, shared by the CLI and the decision page.
pub fn describe_outcome(row_id: RowId, outcome: DecisionOutcome) -> String {
    match outcome {
        DecisionOutcome::Recorded { status } => {
            format!("Row {} is now {}", row_id, status)
        }
        DecisionOutcome::AlreadyRecorded { status } => {
            format!("Row {} was already {}", row_id, status)
        }
        DecisionOutcome::Conflict { existing } => {
            format!("Row {} was already {} and cannot be changed", row_id, existing)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_outcome() {
        let recorded = DecisionOutcome::Recorded { status: ApprovalStatus::Approved };
        assert_eq!(describe_outcome(3, recorded), "Row 3 is now APPROVED");

        let conflict = DecisionOutcome::Conflict { existing: ApprovalStatus::Rejected };
        assert_eq!(describe_outcome(3, conflict), "Row 3 was already REJECTED and cannot be changed");
    }
}
