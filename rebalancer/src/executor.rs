//! Order submission with bounded retries around market open and transient
//! broker failures.
//!
//! The retry loop is an explicit state machine
//! (`PENDING → SUBMIT_ATTEMPT → {SUCCESS | RETRY_WAIT} → … → ABANDONED`)
//! driven by an injected clock, so every transition is testable without
//! wall-clock time. Each order's loop is bounded by the same-day 15:30
//! close cutoff.

use std::time::Duration;

use chrono::NaiveTime;
use kitebal_broker::{Broker, OrderId, OrderParams, OrderType, Product};
use log::{info, warn};

use crate::config::ExecutionConfig;
use crate::hours::{self, Clock, Sleeper};
use crate::planner::RebalanceAction;

/// How one order's submission ended. `order_id == None` with
/// `abandoned == true` means the trading day closed before any attempt
/// succeeded.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub order_id: Option<OrderId>,
    pub attempts: u32,
    pub abandoned: bool,
}

/// Retry loop states.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SubmitState {
    Pending,
    SubmitAttempt,
    RetryWait(Duration),
    Success(OrderId),
    Abandoned,
}

/// Retry timing: a short fixed delay before the open (rejections are
/// expected to clear the moment the exchange opens), exponential backoff
/// after it (genuine outages should not be hammered).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    preopen_retry: Duration,
    base_secs: f64,
    multiplier: f64,
    cap_secs: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            preopen_retry: Duration::from_secs(config.preopen_retry_secs),
            base_secs: config.retry_base_secs,
            multiplier: config.retry_multiplier,
            cap_secs: config.retry_cap_secs,
        }
    }

    pub fn initial_backoff(&self) -> f64 {
        self.base_secs
    }

    /// Delay before the next attempt given when the failure happened, plus
    /// the advanced backoff value. Pure — no clock, no sleep.
    pub fn next_delay(&self, failed_at: NaiveTime, backoff_secs: f64) -> (Duration, f64) {
        if failed_at < hours::market_open() {
            (self.preopen_retry, backoff_secs)
        } else {
            let delay = backoff_secs.min(self.cap_secs);
            (
                Duration::from_secs_f64(delay),
                (backoff_secs * self.multiplier).min(self.cap_secs),
            )
        }
    }
}

/// Submits one action at a time, retrying until success or the daily cutoff.
pub struct OrderExecutor<'a, B: Broker> {
    broker: &'a B,
    clock: &'a dyn Clock,
    sleeper: &'a dyn Sleeper,
    policy: RetryPolicy,
}

impl<'a, B: Broker> OrderExecutor<'a, B> {
    pub fn new(
        broker: &'a B,
        clock: &'a dyn Clock,
        sleeper: &'a dyn Sleeper,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            broker,
            clock,
            sleeper,
            policy,
        }
    }

    /// Submit a market order for `action`, retrying per the policy until it
    /// succeeds or the same-day close cutoff passes.
    pub fn submit_with_retries(&self, action: &RebalanceAction) -> ExecutionOutcome {
        let cutoff = hours::close_cutoff(self.clock.now());
        let mut state = SubmitState::Pending;
        let mut attempts = 0_u32;
        let mut backoff = self.policy.initial_backoff();

        loop {
            state = match state {
                SubmitState::Pending => SubmitState::SubmitAttempt,

                SubmitState::SubmitAttempt => {
                    if self.clock.now() >= cutoff {
                        SubmitState::Abandoned
                    } else {
                        attempts += 1;
                        match self.broker.place_order(&order_params(action)) {
                            Ok(order_id) => SubmitState::Success(order_id),
                            Err(e) => {
                                // The broker API has no idempotency key: if a
                                // submission landed but its response was lost,
                                // this retry places a duplicate order. Accepted
                                // risk — the next snapshot absorbs any overshoot.
                                let (delay, next_backoff) =
                                    self.policy.next_delay(self.clock.now().time(), backoff);
                                backoff = next_backoff;
                                warn!(
                                    "Order attempt {attempts} for {} failed: {e}. Retrying in {:.0}s",
                                    action.ticker,
                                    delay.as_secs_f64()
                                );
                                SubmitState::RetryWait(delay)
                            }
                        }
                    }
                }

                SubmitState::RetryWait(delay) => {
                    self.sleeper.sleep(delay);
                    SubmitState::SubmitAttempt
                }

                SubmitState::Success(order_id) => {
                    info!(
                        "Order placed for {} after {attempts} attempt(s): {order_id}",
                        action.ticker
                    );
                    return ExecutionOutcome {
                        order_id: Some(order_id),
                        attempts,
                        abandoned: false,
                    };
                }

                SubmitState::Abandoned => {
                    warn!(
                        "Market closed before completing order for {}",
                        action.ticker
                    );
                    return ExecutionOutcome {
                        order_id: None,
                        attempts,
                        abandoned: true,
                    };
                }
            };
        }
    }
}

/// A planner action as broker order parameters: regular market order,
/// delivery product.
pub fn order_params(action: &RebalanceAction) -> OrderParams {
    OrderParams {
        exchange: action.exchange,
        ticker: action.ticker.clone(),
        transaction_type: action.side,
        quantity: action.quantity,
        product: Product::Cnc,
        order_type: OrderType::Market,
    }
}

#[cfg(test)]
#[allow(clippy::inconsistent_digit_grouping)]
mod tests {
    use super::*;
    use crate::hours::{ist, ManualClock};
    use chrono::{DateTime, FixedOffset, TimeZone};
    use kitebal_broker::mock::{FillMode, MockBroker};
    use kitebal_broker::{Exchange, Ticker, TransactionType};

    fn policy() -> RetryPolicy {
        RetryPolicy::from_config(&ExecutionConfig::default())
    }

    fn monday(h: u32, m: u32, s: u32) -> DateTime<FixedOffset> {
        ist().with_ymd_and_hms(2025, 7, 28, h, m, s).unwrap()
    }

    fn buy_action(ticker: &str, quantity: i64) -> RebalanceAction {
        RebalanceAction {
            ticker: Ticker::new(ticker),
            exchange: Exchange::Nse,
            side: TransactionType::Buy,
            quantity,
            price_paise: 100_00,
            value_paise: quantity * 100_00,
            target_weight: 0.5,
            current_weight: 0.0,
            deficit_paise: quantity * 100_00,
        }
    }

    /// Sleeping advances the manual clock, so retry loops make progress.
    struct AdvancingSleeper<'a>(&'a ManualClock);

    impl Sleeper for AdvancingSleeper<'_> {
        fn sleep(&self, duration: Duration) {
            self.0.advance(duration);
        }
    }

    #[test]
    fn preopen_failures_use_fixed_delay() {
        let p = policy();
        let before_open = NaiveTime::from_hms_opt(9, 14, 30).unwrap();
        let (delay, backoff) = p.next_delay(before_open, 2.0);
        assert_eq!(delay, Duration::from_secs(3));
        assert_eq!(backoff, 2.0); // backoff untouched before the open
    }

    #[test]
    fn post_open_backoff_grows_to_cap() {
        let p = policy();
        let after_open = NaiveTime::from_hms_opt(10, 0, 0).unwrap();

        let mut backoff = p.initial_backoff();
        let mut delays = Vec::new();
        for _ in 0..12 {
            let (delay, next) = p.next_delay(after_open, backoff);
            delays.push(delay.as_secs_f64());
            backoff = next;
        }

        assert_eq!(delays[0], 2.0);
        assert!((delays[1] - 3.4).abs() < 1e-9);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*delays.last().unwrap(), 60.0);
    }

    #[test]
    fn first_attempt_succeeds() {
        let broker = MockBroker::builder()
            .with_cash(100_000_00)
            .with_quote(Exchange::Nse, "INFY", 100_00)
            .build();
        let clock = ManualClock::new(monday(10, 0, 0));
        let sleeper = AdvancingSleeper(&clock);
        let executor = OrderExecutor::new(&broker, &clock, &sleeper, policy());

        let outcome = executor.submit_with_retries(&buy_action("INFY", 10));
        assert!(outcome.order_id.is_some());
        assert_eq!(outcome.attempts, 1);
        assert!(!outcome.abandoned);
    }

    #[test]
    fn transient_failures_are_retried_until_success() {
        let broker = MockBroker::builder()
            .with_cash(100_000_00)
            .with_quote(Exchange::Nse, "INFY", 100_00)
            .fail_first_orders(2)
            .build();
        let clock = ManualClock::new(monday(10, 0, 0));
        let sleeper = AdvancingSleeper(&clock);
        let executor = OrderExecutor::new(&broker, &clock, &sleeper, policy());

        let outcome = executor.submit_with_retries(&buy_action("INFY", 10));
        assert!(outcome.order_id.is_some());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(broker.submitted_orders().len(), 3);
    }

    #[test]
    fn persistent_failure_abandons_at_cutoff() {
        let broker = MockBroker::builder().fill_mode(FillMode::Reject).build();
        let clock = ManualClock::new(monday(15, 25, 0));
        let sleeper = AdvancingSleeper(&clock);
        let executor = OrderExecutor::new(&broker, &clock, &sleeper, policy());

        let outcome = executor.submit_with_retries(&buy_action("INFY", 10));
        assert!(outcome.order_id.is_none());
        assert!(outcome.abandoned);
        assert!(outcome.attempts > 0);
        assert!(clock.now() >= monday(15, 30, 0));
    }

    #[test]
    fn already_past_cutoff_abandons_without_attempting() {
        let broker = MockBroker::builder().fill_mode(FillMode::Reject).build();
        let clock = ManualClock::new(monday(16, 0, 0));
        let sleeper = AdvancingSleeper(&clock);
        let executor = OrderExecutor::new(&broker, &clock, &sleeper, policy());

        let outcome = executor.submit_with_retries(&buy_action("INFY", 10));
        assert!(outcome.abandoned);
        assert_eq!(outcome.attempts, 0);
        assert!(broker.submitted_orders().is_empty());
    }

    #[test]
    fn preopen_rejections_clear_after_open() {
        // Start at 09:14; the first few attempts fail (market not open),
        // then the exchange starts accepting.
        let broker = MockBroker::builder()
            .with_cash(100_000_00)
            .with_quote(Exchange::Nse, "INFY", 100_00)
            .fail_first_orders(5)
            .build();
        let clock = ManualClock::new(monday(9, 14, 0));
        let sleeper = AdvancingSleeper(&clock);
        let executor = OrderExecutor::new(&broker, &clock, &sleeper, policy());

        let outcome = executor.submit_with_retries(&buy_action("INFY", 10));
        assert!(outcome.order_id.is_some());
        assert_eq!(outcome.attempts, 6);
        // Five 3s pre-open retries put success just after 09:14:15.
        assert!(clock.now() < monday(9, 16, 0));
    }

    #[test]
    fn order_params_are_delivery_market_orders() {
        let params = order_params(&buy_action("INFY", 10));
        assert_eq!(params.product, Product::Cnc);
        assert_eq!(params.order_type, OrderType::Market);
        assert_eq!(params.quantity, 10);
    }
}
