//! Target→current diff engine.
//!
//! Compares a target basket against a portfolio snapshot and produces the
//! corrective orders plus the total deficit. The deficit is measured over
//! every ticker in the union of basket and holdings — including those whose
//! gap falls under the minimum order value — so it reflects true imbalance,
//! not just actionable imbalance.

use kitebal_broker::{Exchange, Ticker, TransactionType};
use log::{debug, warn};

use crate::basket::TargetBasket;
use crate::snapshot::PortfolioSnapshot;

/// A single corrective order computed by the planner. Ephemeral: created per
/// planning pass and consumed by the executor, never carried across
/// iterations.
#[derive(Debug, Clone)]
pub struct RebalanceAction {
    pub ticker: Ticker,
    pub exchange: Exchange,
    pub side: TransactionType,
    pub quantity: i64,
    pub price_paise: i64,
    pub value_paise: i64,
    pub target_weight: f64,
    pub current_weight: f64,
    /// Signed target−current value gap; positive means under-allocated.
    pub deficit_paise: i64,
}

/// Compute rebalance actions and the total deficit for one snapshot.
///
/// - Tickers with no usable price are skipped entirely (logged, not fatal);
///   their deficit contribution is unknowable.
/// - `|diff| < min_order_value` produces no action but still counts toward
///   the returned total deficit.
/// - SELL quantity never exceeds the held quantity (no short selling).
/// - Actions come back sorted by descending `|deficit|` so the largest
///   imbalances are corrected first.
pub fn plan(
    basket: &TargetBasket,
    snapshot: &PortfolioSnapshot,
    min_order_value_paise: i64,
) -> (Vec<RebalanceAction>, i64) {
    let total_value = snapshot.total_value_paise;

    // Union of basket and held tickers, basket first.
    let mut union: Vec<Ticker> = basket.tickers();
    for ticker in snapshot.holdings.keys() {
        if !union.contains(ticker) {
            union.push(ticker.clone());
        }
    }

    let mut total_deficit = 0_i64;
    let mut scored: Vec<(i64, RebalanceAction)> = Vec::new();

    for ticker in union {
        let target_weight = basket.weight(&ticker);
        let target_value = (total_value as f64 * target_weight).round() as i64;
        let held_quantity = snapshot.held_quantity(&ticker);

        let price = match snapshot.prices.get(&ticker) {
            Some(&p) if p > 0 => p,
            _ => {
                warn!("No price available for {ticker}, skipping");
                continue;
            }
        };

        let current_value = held_quantity * price;
        let diff = target_value - current_value;
        total_deficit += diff.abs();

        if diff.abs() < min_order_value_paise {
            debug!(
                "{ticker}: no action needed (diff ₹{:.2})",
                kitebal_broker::to_rupees(diff)
            );
            continue;
        }

        let current_weight = if total_value > 0 {
            current_value as f64 / total_value as f64
        } else {
            0.0
        };

        let (side, quantity) = if diff > 0 {
            (TransactionType::Buy, diff / price)
        } else {
            // Never sell more than is held.
            (TransactionType::Sell, held_quantity.min(-diff / price))
        };

        // Flooring can leave a sub-share gap; the next iteration's fresh
        // snapshot absorbs it.
        if quantity <= 0 {
            continue;
        }

        scored.push((
            diff.abs(),
            RebalanceAction {
                exchange: snapshot.exchange_for(&ticker),
                ticker,
                side,
                quantity,
                price_paise: price,
                value_paise: quantity * price,
                target_weight,
                current_weight,
                deficit_paise: diff,
            },
        ));
    }

    // Largest imbalance first; ticker as tie-break for determinism.
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.ticker.cmp(&b.1.ticker)));

    (scored.into_iter().map(|(_, a)| a).collect(), total_deficit)
}
