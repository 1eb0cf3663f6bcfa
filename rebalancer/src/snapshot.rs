//! Live portfolio snapshot assembly.
//!
//! One snapshot is one consistent view of the account: settled holdings
//! merged with intraday net positions, a fresh LTP map covering every ticker
//! the planner will look at, and the total account value. A snapshot is
//! never mutated — each convergence iteration fetches a new one.

use kitebal_broker::{Broker, Exchange, Instrument, Ticker};
use log::{info, warn};
use rustc_hash::FxHashMap;

use crate::basket::TargetBasket;
use crate::error::Result;

/// A ticker's merged holding + position state.
#[derive(Debug, Clone)]
pub struct HoldingState {
    pub quantity: i64,
    pub average_price_paise: i64,
    pub last_price_paise: i64,
    pub exchange: Exchange,
}

/// Immutable snapshot of the account at one instant.
#[derive(Debug, Clone)]
pub struct PortfolioSnapshot {
    pub holdings: FxHashMap<Ticker, HoldingState>,
    /// Fresh last-traded prices (paise) for the union of basket and held
    /// tickers. Tickers absent here had no quote from any source.
    pub prices: FxHashMap<Ticker, i64>,
    /// Holdings value + net position value + available cash, in paise.
    pub total_value_paise: i64,
}

impl PortfolioSnapshot {
    pub fn held_quantity(&self, ticker: &Ticker) -> i64 {
        self.holdings.get(ticker).map(|h| h.quantity).unwrap_or(0)
    }

    pub fn exchange_for(&self, ticker: &Ticker) -> Exchange {
        self.holdings
            .get(ticker)
            .map(|h| h.exchange)
            .unwrap_or_default()
    }
}

/// Fetch a fresh snapshot from the broker.
///
/// Failures here are fatal to the run: there is no meaningful partial
/// snapshot to reconcile against. The one exception is the batch LTP fetch,
/// which falls back to the last prices carried on the holdings themselves.
pub fn fetch_snapshot<B: Broker>(broker: &B, basket: &TargetBasket) -> Result<PortfolioSnapshot> {
    let holdings = broker.holdings()?;
    let positions = broker.positions()?;
    let margins = broker.margins()?;

    // Total account value: holdings at last price, net positions at
    // last price × quantity × multiplier, plus available cash.
    let mut total_value_paise = margins.available_cash_paise;
    for h in &holdings {
        total_value_paise += h.quantity * h.last_price_paise;
    }
    for p in &positions.net {
        total_value_paise += p.quantity * p.last_price_paise * p.multiplier;
    }

    // Merge the position book into the holdings map. Quantities add; a
    // position-only ticker enters the map only with a non-zero net quantity.
    let mut merged: FxHashMap<Ticker, HoldingState> = FxHashMap::default();
    for h in holdings {
        merged.insert(
            h.ticker,
            HoldingState {
                quantity: h.quantity,
                average_price_paise: h.average_price_paise,
                last_price_paise: h.last_price_paise,
                exchange: h.exchange,
            },
        );
    }
    for p in positions.net {
        if let Some(state) = merged.get_mut(&p.ticker) {
            state.quantity += p.quantity;
            if p.last_price_paise > 0 {
                state.last_price_paise = p.last_price_paise;
            }
        } else if p.quantity != 0 {
            merged.insert(
                p.ticker,
                HoldingState {
                    quantity: p.quantity,
                    average_price_paise: p.average_price_paise,
                    last_price_paise: p.last_price_paise,
                    exchange: p.exchange,
                },
            );
        }
    }

    let prices = fetch_prices(broker, basket, &merged);

    info!(
        "Snapshot: {} holdings, total value ₹{:.2}",
        merged.len(),
        kitebal_broker::to_rupees(total_value_paise)
    );

    Ok(PortfolioSnapshot {
        holdings: merged,
        prices,
        total_value_paise,
    })
}

/// Fresh LTPs for the union of basket and held tickers, falling back to the
/// holding-carried last price for anything the quote endpoint misses.
fn fetch_prices<B: Broker>(
    broker: &B,
    basket: &TargetBasket,
    merged: &FxHashMap<Ticker, HoldingState>,
) -> FxHashMap<Ticker, i64> {
    let mut union: Vec<Ticker> = basket.tickers();
    for ticker in merged.keys() {
        if !union.contains(ticker) {
            union.push(ticker.clone());
        }
    }

    let instruments: Vec<Instrument> = union
        .iter()
        .map(|t| {
            let exchange = merged.get(t).map(|h| h.exchange).unwrap_or_default();
            Instrument::new(exchange, t.clone())
        })
        .collect();

    let mut prices: FxHashMap<Ticker, i64> = FxHashMap::default();
    match broker.ltp(&instruments) {
        Ok(quotes) => {
            for (instrument, price_paise) in quotes {
                prices.insert(instrument.ticker, price_paise);
            }
        }
        Err(e) => {
            warn!("LTP fetch failed: {e}; falling back to holding prices");
        }
    }

    // Per-ticker fallback: a held position always knows its own last price.
    for (ticker, state) in merged {
        if !prices.contains_key(ticker) && state.last_price_paise > 0 {
            prices.insert(ticker.clone(), state.last_price_paise);
        }
    }

    prices
}

#[cfg(test)]
#[allow(clippy::inconsistent_digit_grouping)]
mod tests {
    use super::*;
    use kitebal_broker::mock::MockBroker;

    fn basket_json(entries: &[(&str, f64)]) -> TargetBasket {
        let stocks: Vec<String> = entries
            .iter()
            .map(|(t, w)| format!(r#"{{ "stock_ticker": "{t}", "weight": {w} }}"#))
            .collect();
        let json = format!(r#"{{ "stocks": [{}] }}"#, stocks.join(","));
        TargetBasket::from_json(&json).unwrap()
    }

    #[test]
    fn total_value_sums_holdings_positions_and_cash() {
        let broker = MockBroker::builder()
            .with_holding("INFY", 10, 1500_00, 1520_00)
            .with_position("SBIN", 5, 800_00, 1)
            .with_cash(25_000_00)
            .with_quote(Exchange::Nse, "INFY", 1520_00)
            .with_quote(Exchange::Nse, "SBIN", 800_00)
            .build();
        let basket = basket_json(&[("INFY", 1.0)]);

        let snapshot = fetch_snapshot(&broker, &basket).unwrap();
        assert_eq!(
            snapshot.total_value_paise,
            10 * 1520_00 + 5 * 800_00 + 25_000_00
        );
    }

    #[test]
    fn position_quantity_merges_into_holding() {
        let broker = MockBroker::builder()
            .with_holding("INFY", 10, 1500_00, 1520_00)
            .with_position("INFY", 5, 1525_00, 1)
            .with_quote(Exchange::Nse, "INFY", 1525_00)
            .build();
        let basket = basket_json(&[("INFY", 1.0)]);

        let snapshot = fetch_snapshot(&broker, &basket).unwrap();
        assert_eq!(snapshot.held_quantity(&Ticker::new("INFY")), 15);
    }

    #[test]
    fn position_only_ticker_appears() {
        let broker = MockBroker::builder()
            .with_position("SBIN", 5, 800_00, 1)
            .with_quote(Exchange::Nse, "SBIN", 800_00)
            .build();
        let basket = basket_json(&[("INFY", 1.0)]);

        let snapshot = fetch_snapshot(&broker, &basket).unwrap();
        assert_eq!(snapshot.held_quantity(&Ticker::new("SBIN")), 5);
    }

    #[test]
    fn prices_cover_basket_only_tickers() {
        let broker = MockBroker::builder()
            .with_cash(100_000_00)
            .with_quote(Exchange::Nse, "TCS", 4000_00)
            .build();
        let basket = basket_json(&[("TCS", 1.0)]);

        let snapshot = fetch_snapshot(&broker, &basket).unwrap();
        assert_eq!(snapshot.prices[&Ticker::new("TCS")], 4000_00);
    }

    #[test]
    fn ltp_failure_falls_back_to_holding_prices() {
        let broker = MockBroker::builder()
            .with_holding("INFY", 10, 1500_00, 1520_00)
            .with_cash(0)
            .fail_ltp()
            .build();
        let basket = basket_json(&[("INFY", 0.5), ("TCS", 0.5)]);

        let snapshot = fetch_snapshot(&broker, &basket).unwrap();
        // Held ticker keeps its carried price; the basket-only ticker has
        // no price at all and will be skipped by the planner.
        assert_eq!(snapshot.prices[&Ticker::new("INFY")], 1520_00);
        assert!(!snapshot.prices.contains_key(&Ticker::new("TCS")));
    }
}
