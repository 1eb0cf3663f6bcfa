//! Pre-execution confirmation.
//!
//! Each batch of planned orders is confirmed once before any submission.
//! Interactive runs prompt on the terminal; `--quiet` swaps in auto-approval
//! for cron and pipeline use.

use dialoguer::Confirm;
use log::info;

use crate::error::{Error, Result};

/// Decides whether a planned batch may be executed.
pub trait ConfirmationPolicy {
    /// Returns `Ok(true)` to proceed, `Ok(false)` to decline.
    fn confirm_batch(&self, action_count: usize) -> Result<bool>;
}

/// Terminal prompt via dialoguer. A closed stdin or interrupted prompt is
/// treated as an abort, not a broker error.
pub struct InteractiveConfirm;

impl ConfirmationPolicy for InteractiveConfirm {
    fn confirm_batch(&self, action_count: usize) -> Result<bool> {
        Confirm::new()
            .with_prompt(format!("Execute these {action_count} order(s)?"))
            .default(false)
            .interact()
            .map_err(|_| Error::Aborted("confirmation prompt interrupted".into()))
    }
}

/// Unattended mode: approve every batch, with a log line for the audit trail.
pub struct AutoApprove;

impl ConfirmationPolicy for AutoApprove {
    fn confirm_batch(&self, action_count: usize) -> Result<bool> {
        info!("Quiet mode: auto-approving {action_count} order(s)");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_approve_always_approves() {
        assert!(AutoApprove.confirm_batch(5).unwrap());
        assert!(AutoApprove.confirm_batch(0).unwrap());
    }
}
