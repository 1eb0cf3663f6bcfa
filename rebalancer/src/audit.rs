//! JSONL audit trail.
//!
//! Every run appends events to an audit.jsonl file, one JSON object per
//! line, flushed per event so a crashed run still leaves a usable trail.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use kitebal_broker::{to_rupees, OrderId};
use serde::Serialize;

use crate::error::Result;
use crate::executor::ExecutionOutcome;
use crate::planner::RebalanceAction;
use crate::snapshot::PortfolioSnapshot;

/// One line in the audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: &'static str,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Append-only audit logger.
pub struct AuditLog {
    writer: BufWriter<std::fs::File>,
}

impl AuditLog {
    /// Open (or create) the audit log file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Log an event with arbitrary JSON data.
    pub fn log(&mut self, event: &'static str, data: serde_json::Value) -> Result<()> {
        let entry = AuditEvent {
            event,
            ts: Utc::now(),
            data,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Log a simple event with no additional data.
    pub fn log_simple(&mut self, event: &'static str) -> Result<()> {
        self.log(event, serde_json::json!({}))
    }
}

pub fn log_run_started(
    audit: &mut AuditLog,
    basket_file: &str,
    user_id: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    audit.log(
        "run_started",
        serde_json::json!({
            "basket_file": basket_file,
            "user_id": user_id,
            "dry_run": dry_run,
        }),
    )
}

pub fn log_snapshot(audit: &mut AuditLog, snapshot: &PortfolioSnapshot) -> Result<()> {
    let holdings: Vec<_> = snapshot
        .holdings
        .iter()
        .map(|(ticker, state)| {
            serde_json::json!({
                "ticker": ticker.as_str(),
                "quantity": state.quantity,
                "last_price": to_rupees(state.last_price_paise),
            })
        })
        .collect();

    audit.log(
        "snapshot_fetched",
        serde_json::json!({
            "holdings": holdings,
            "total_value": to_rupees(snapshot.total_value_paise),
        }),
    )
}

pub fn log_plan(
    audit: &mut AuditLog,
    iteration: u32,
    actions: &[RebalanceAction],
    total_deficit_paise: i64,
) -> Result<()> {
    let action_data: Vec<_> = actions
        .iter()
        .map(|a| {
            serde_json::json!({
                "ticker": a.ticker.as_str(),
                "side": a.side.to_string(),
                "quantity": a.quantity,
                "price": to_rupees(a.price_paise),
                "value": to_rupees(a.value_paise),
                "deficit": to_rupees(a.deficit_paise),
            })
        })
        .collect();

    audit.log(
        "plan_computed",
        serde_json::json!({
            "iteration": iteration,
            "actions": action_data,
            "total_deficit": to_rupees(total_deficit_paise),
        }),
    )
}

pub fn log_confirmed(audit: &mut AuditLog, approved: bool, quiet: bool) -> Result<()> {
    audit.log(
        "user_confirmed",
        serde_json::json!({ "approved": approved, "quiet": quiet }),
    )
}

pub fn log_order_result(
    audit: &mut AuditLog,
    action: &RebalanceAction,
    outcome: &ExecutionOutcome,
) -> Result<()> {
    let event = if outcome.abandoned {
        "order_abandoned"
    } else {
        "order_submitted"
    };
    audit.log(
        event,
        serde_json::json!({
            "ticker": action.ticker.as_str(),
            "side": action.side.to_string(),
            "quantity": action.quantity,
            "attempts": outcome.attempts,
            "order_id": outcome.order_id.as_ref().map(OrderId::as_str),
        }),
    )
}

pub fn log_iteration_completed(
    audit: &mut AuditLog,
    iteration: u32,
    submitted: usize,
    abandoned: usize,
) -> Result<()> {
    audit.log(
        "iteration_completed",
        serde_json::json!({
            "iteration": iteration,
            "submitted": submitted,
            "abandoned": abandoned,
        }),
    )
}

pub fn log_run_completed(
    audit: &mut AuditLog,
    iterations: u32,
    final_deficit_paise: i64,
    converged: bool,
) -> Result<()> {
    audit.log(
        "run_completed",
        serde_json::json!({
            "iterations": iterations,
            "final_deficit": to_rupees(final_deficit_paise),
            "converged": converged,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_log_writes_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        {
            let mut log = AuditLog::open(&path).unwrap();
            log.log_simple("test_event").unwrap();
            log.log("with_data", serde_json::json!({"key": "value"}))
                .unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        for line in &lines {
            let _: serde_json::Value = serde_json::from_str(line).unwrap();
        }
        assert!(lines[0].contains("\"event\":\"test_event\""));
        assert!(lines[1].contains("\"key\":\"value\""));
    }

    #[test]
    fn audit_log_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("deep").join("audit.jsonl");

        let mut log = AuditLog::open(&path).unwrap();
        log.log_simple("test").unwrap();

        assert!(path.exists());
    }

    #[test]
    fn reopening_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        AuditLog::open(&path).unwrap().log_simple("first").unwrap();
        AuditLog::open(&path).unwrap().log_simple("second").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
