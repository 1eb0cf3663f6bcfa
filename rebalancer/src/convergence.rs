//! Iterative rebalance-until-converged driver.
//!
//! Market orders fill at unknown prices, so one pass never lands exactly on
//! target. Instead of tracking residuals per order, each iteration throws the
//! previous plan away, fetches a fresh snapshot, and re-plans from scratch.
//! The loop stops when the total deficit drops under the target, when the
//! plan comes back empty, or after a bounded number of iterations.

use std::time::Duration;

use kitebal_broker::{to_rupees, Broker, OrderId, TransactionType};
use log::{info, warn};

use crate::audit::{self, AuditLog};
use crate::basket::TargetBasket;
use crate::config::ExecutionConfig;
use crate::confirm::ConfirmationPolicy;
use crate::error::{Error, Result};
use crate::executor::{OrderExecutor, RetryPolicy};
use crate::hours::{self, Clock, Sleeper};
use crate::planner::{self, RebalanceAction};
use crate::snapshot;

/// Run-level knobs, all settable from the CLI.
#[derive(Debug, Clone)]
pub struct ConvergenceSettings {
    pub dry_run: bool,
    pub quiet: bool,
    pub min_order_value_paise: i64,
    pub target_deficit_paise: i64,
    pub max_iterations: u32,
}

/// What a run did, for the final report.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub iterations: u32,
    pub final_deficit_paise: i64,
    pub converged: bool,
    pub submitted: Vec<OrderId>,
    pub abandoned: usize,
}

pub struct ConvergenceLoop<'a, B: Broker> {
    broker: &'a B,
    clock: &'a dyn Clock,
    sleeper: &'a dyn Sleeper,
    confirm: &'a dyn ConfirmationPolicy,
    execution: &'a ExecutionConfig,
    settings: ConvergenceSettings,
}

impl<'a, B: Broker> ConvergenceLoop<'a, B> {
    pub fn new(
        broker: &'a B,
        clock: &'a dyn Clock,
        sleeper: &'a dyn Sleeper,
        confirm: &'a dyn ConfirmationPolicy,
        execution: &'a ExecutionConfig,
        settings: ConvergenceSettings,
    ) -> Self {
        Self {
            broker,
            clock,
            sleeper,
            confirm,
            execution,
            settings,
        }
    }

    /// Drive the rebalance to convergence (or its iteration bound).
    pub fn run(&self, basket: &TargetBasket, audit_log: &mut AuditLog) -> Result<RunSummary> {
        let mut summary = RunSummary {
            iterations: 0,
            final_deficit_paise: 0,
            converged: false,
            submitted: Vec::new(),
            abandoned: 0,
        };

        for iteration in 1..=self.settings.max_iterations {
            summary.iterations = iteration;
            info!(
                "Iteration {iteration}/{}",
                self.settings.max_iterations
            );

            let snap = snapshot::fetch_snapshot(self.broker, basket)?;
            audit::log_snapshot(audit_log, &snap)?;

            let (actions, total_deficit) =
                planner::plan(basket, &snap, self.settings.min_order_value_paise);
            audit::log_plan(audit_log, iteration, &actions, total_deficit)?;
            summary.final_deficit_paise = total_deficit;

            if total_deficit <= self.settings.target_deficit_paise {
                info!(
                    "Converged: deficit ₹{:.2} <= target ₹{:.2}",
                    to_rupees(total_deficit),
                    to_rupees(self.settings.target_deficit_paise)
                );
                summary.converged = true;
                return Ok(summary);
            }

            if actions.is_empty() {
                // Deficit remains but no order clears the minimum value or
                // one whole share. Nothing more this loop can do.
                info!(
                    "No actionable orders; residual deficit ₹{:.2}",
                    to_rupees(total_deficit)
                );
                return Ok(summary);
            }

            println!("{}", render_plan(&actions, total_deficit));

            if self.settings.dry_run {
                info!("Dry run: stopping before order placement");
                return Ok(summary);
            }

            let approved = self.confirm.confirm_batch(actions.len())?;
            audit::log_confirmed(audit_log, approved, self.settings.quiet)?;
            if !approved {
                return Err(Error::Aborted("declined by user".into()));
            }

            self.wait_for_market_window();
            let (submitted, abandoned) = self.execute_batch(&actions, audit_log)?;
            summary.abandoned += abandoned;
            summary.submitted.extend(submitted);
            audit::log_iteration_completed(
                audit_log,
                iteration,
                summary.submitted.len(),
                summary.abandoned,
            )?;
        }

        warn!(
            "Stopping after {} iterations with deficit ₹{:.2}",
            self.settings.max_iterations,
            to_rupees(summary.final_deficit_paise)
        );
        Ok(summary)
    }

    /// Sleep until the pre-open window if the market is closed. Inside the
    /// 09:14–09:15 window this returns immediately and the executor's retry
    /// loop rides out the final seconds before the open.
    fn wait_for_market_window(&self) {
        let now = self.clock.now();
        if hours::is_market_open(now) {
            return;
        }
        let target = hours::next_preopen(now);
        if target > now {
            info!("Market closed; waiting until {target} to place orders");
            hours::wait_until(self.clock, self.sleeper, target);
        }
    }

    /// Submit one batch sequentially with a pause between orders, so a burst
    /// of market orders does not trip the broker's rate limits.
    fn execute_batch(
        &self,
        actions: &[RebalanceAction],
        audit_log: &mut AuditLog,
    ) -> Result<(Vec<OrderId>, usize)> {
        let executor = OrderExecutor::new(
            self.broker,
            self.clock,
            self.sleeper,
            RetryPolicy::from_config(self.execution),
        );
        let interval = Duration::from_millis(self.execution.order_interval_ms);

        let mut submitted = Vec::new();
        let mut abandoned = 0;
        for (i, action) in actions.iter().enumerate() {
            if i > 0 {
                self.sleeper.sleep(interval);
            }
            let outcome = executor.submit_with_retries(action);
            audit::log_order_result(audit_log, action, &outcome)?;
            match outcome.order_id {
                Some(id) => submitted.push(id),
                None => {
                    // Abandoned orders are skipped, not fatal: a later run
                    // picks up whatever is left.
                    abandoned += 1;
                }
            }
        }
        Ok((submitted, abandoned))
    }
}

/// Human-readable plan table with per-side totals.
pub fn render_plan(actions: &[RebalanceAction], total_deficit_paise: i64) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<5} {:>6} {:<12} {:>12} {:>14} {:>16}\n",
        "SIDE", "QTY", "TICKER", "PRICE", "VALUE", "WEIGHT"
    ));

    let mut buy_total = 0_i64;
    let mut sell_total = 0_i64;
    for a in actions {
        match a.side {
            TransactionType::Buy => buy_total += a.value_paise,
            TransactionType::Sell => sell_total += a.value_paise,
        }
        out.push_str(&format!(
            "{:<5} {:>6} {:<12} {:>12} {:>14} {:>7.1}% → {:>5.1}%\n",
            a.side.to_string(),
            a.quantity,
            a.ticker.as_str(),
            format!("₹{:.2}", to_rupees(a.price_paise)),
            format!("₹{:.2}", to_rupees(a.value_paise)),
            a.current_weight * 100.0,
            a.target_weight * 100.0,
        ));
    }

    out.push_str(&format!(
        "\nBuys ₹{:.2}  Sells ₹{:.2}  Net ₹{:.2}  Total deficit ₹{:.2}\n",
        to_rupees(buy_total),
        to_rupees(sell_total),
        to_rupees(buy_total - sell_total),
        to_rupees(total_deficit_paise),
    ));
    out
}

#[cfg(test)]
#[allow(clippy::inconsistent_digit_grouping)]
mod tests {
    use super::*;
    use crate::confirm::AutoApprove;
    use crate::hours::{ist, ManualClock};
    use chrono::TimeZone;
    use kitebal_broker::mock::MockBroker;
    use kitebal_broker::{Exchange, Ticker};

    struct AdvancingSleeper<'a>(&'a ManualClock);

    impl Sleeper for AdvancingSleeper<'_> {
        fn sleep(&self, duration: Duration) {
            self.0.advance(duration);
        }
    }

    fn basket(entries: &[(&str, f64)]) -> TargetBasket {
        let stocks: Vec<String> = entries
            .iter()
            .map(|(t, w)| format!(r#"{{ "stock_ticker": "{t}", "weight": {w} }}"#))
            .collect();
        TargetBasket::from_json(&format!(r#"{{ "stocks": [{}] }}"#, stocks.join(","))).unwrap()
    }

    fn settings(dry_run: bool) -> ConvergenceSettings {
        ConvergenceSettings {
            dry_run,
            quiet: true,
            min_order_value_paise: 0,
            target_deficit_paise: 1_000_00,
            max_iterations: 10,
        }
    }

    fn open_market_clock() -> ManualClock {
        ManualClock::new(ist().with_ymd_and_hms(2025, 7, 28, 10, 0, 0).unwrap())
    }

    fn temp_audit() -> (tempfile::TempDir, AuditLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(&dir.path().join("audit.jsonl")).unwrap();
        (dir, log)
    }

    #[test]
    fn converges_against_filling_mock() {
        let broker = MockBroker::builder()
            .with_cash(100_000_00)
            .with_quote(Exchange::Nse, "INFY", 1_500_00)
            .with_quote(Exchange::Nse, "TCS", 4_000_00)
            .build();
        let clock = open_market_clock();
        let sleeper = AdvancingSleeper(&clock);
        let execution = ExecutionConfig::default();
        let basket = basket(&[("INFY", 0.6), ("TCS", 0.4)]);
        let (_dir, mut audit_log) = temp_audit();

        let driver = ConvergenceLoop::new(
            &broker,
            &clock,
            &sleeper,
            &AutoApprove,
            &execution,
            settings(false),
        );
        let summary = driver.run(&basket, &mut audit_log).unwrap();

        assert!(summary.converged || summary.final_deficit_paise <= 1_500_00 + 4_000_00);
        assert!(!summary.submitted.is_empty());
        assert_eq!(summary.abandoned, 0);

        // The mock applied the fills, so the account now actually holds both.
        let snap = snapshot::fetch_snapshot(&broker, &basket).unwrap();
        assert!(snap.held_quantity(&Ticker::new("INFY")) > 0);
        assert!(snap.held_quantity(&Ticker::new("TCS")) > 0);
    }

    #[test]
    fn dry_run_plans_once_and_places_nothing() {
        let broker = MockBroker::builder()
            .with_cash(100_000_00)
            .with_quote(Exchange::Nse, "INFY", 1_500_00)
            .build();
        let clock = open_market_clock();
        let sleeper = AdvancingSleeper(&clock);
        let execution = ExecutionConfig::default();
        let basket = basket(&[("INFY", 1.0)]);
        let (_dir, mut audit_log) = temp_audit();

        let driver = ConvergenceLoop::new(
            &broker,
            &clock,
            &sleeper,
            &AutoApprove,
            &execution,
            settings(true),
        );
        let summary = driver.run(&basket, &mut audit_log).unwrap();

        assert_eq!(summary.iterations, 1);
        assert!(!summary.converged);
        assert!(summary.submitted.is_empty());
        assert!(broker.submitted_orders().is_empty());
    }

    #[test]
    fn already_balanced_stops_immediately() {
        let broker = MockBroker::builder()
            .with_holding("INFY", 10, 1_500_00, 1_500_00)
            .with_quote(Exchange::Nse, "INFY", 1_500_00)
            .build();
        let clock = open_market_clock();
        let sleeper = AdvancingSleeper(&clock);
        let execution = ExecutionConfig::default();
        let basket = basket(&[("INFY", 1.0)]);
        let (_dir, mut audit_log) = temp_audit();

        let driver = ConvergenceLoop::new(
            &broker,
            &clock,
            &sleeper,
            &AutoApprove,
            &execution,
            settings(false),
        );
        let summary = driver.run(&basket, &mut audit_log).unwrap();

        assert_eq!(summary.iterations, 1);
        assert!(summary.converged);
        assert!(summary.submitted.is_empty());
    }

    #[test]
    fn declined_batch_aborts() {
        struct Decline;
        impl ConfirmationPolicy for Decline {
            fn confirm_batch(&self, _: usize) -> Result<bool> {
                Ok(false)
            }
        }

        let broker = MockBroker::builder()
            .with_cash(100_000_00)
            .with_quote(Exchange::Nse, "INFY", 1_500_00)
            .build();
        let clock = open_market_clock();
        let sleeper = AdvancingSleeper(&clock);
        let execution = ExecutionConfig::default();
        let basket = basket(&[("INFY", 1.0)]);
        let (_dir, mut audit_log) = temp_audit();

        let driver = ConvergenceLoop::new(
            &broker,
            &clock,
            &sleeper,
            &Decline,
            &execution,
            settings(false),
        );
        let err = driver.run(&basket, &mut audit_log).unwrap_err();
        assert!(matches!(err, Error::Aborted(_)));
        assert!(broker.submitted_orders().is_empty());
    }

    #[test]
    fn waits_for_preopen_when_market_closed() {
        let broker = MockBroker::builder()
            .with_cash(100_000_00)
            .with_quote(Exchange::Nse, "INFY", 1_500_00)
            .build();
        // Monday 07:00 — two hours before the pre-open window.
        let clock = ManualClock::new(ist().with_ymd_and_hms(2025, 7, 28, 7, 0, 0).unwrap());
        let sleeper = AdvancingSleeper(&clock);
        let execution = ExecutionConfig::default();
        let basket = basket(&[("INFY", 1.0)]);
        let (_dir, mut audit_log) = temp_audit();

        let driver = ConvergenceLoop::new(
            &broker,
            &clock,
            &sleeper,
            &AutoApprove,
            &execution,
            settings(false),
        );
        driver.run(&basket, &mut audit_log).unwrap();

        // First order went out no earlier than the pre-open target.
        assert!(clock.now() >= ist().with_ymd_and_hms(2025, 7, 28, 9, 14, 0).unwrap());
        assert!(!broker.submitted_orders().is_empty());
    }

    #[test]
    fn render_plan_shows_sides_and_totals() {
        let actions = vec![RebalanceAction {
            ticker: Ticker::new("INFY"),
            exchange: Exchange::Nse,
            side: TransactionType::Buy,
            quantity: 40,
            price_paise: 1_500_00,
            value_paise: 60_000_00,
            target_weight: 0.6,
            current_weight: 0.0,
            deficit_paise: 60_000_00,
        }];

        let table = render_plan(&actions, 60_000_00);
        assert!(table.contains("BUY"));
        assert!(table.contains("INFY"));
        assert!(table.contains("₹60000.00"));
        assert!(table.contains("Total deficit"));
    }
}
