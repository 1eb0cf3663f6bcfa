//! Mock broker for testing — implements the `Broker` trait with scriptable
//! behavior and no network calls.
//!
//! ```ignore
//! use kitebal_broker::mock::MockBroker;
//! use kitebal_broker::{Exchange, Ticker};
//!
//! let broker = MockBroker::builder()
//!     .with_holding("INFY", 100, 1500_00, 1520_00)
//!     .with_cash(50_000_00)
//!     .with_quote(Exchange::Nse, "INFY", 1520_00)
//!     .build();
//! ```

use std::sync::Mutex;

use crate::error::BrokerError;
use crate::types::*;
use crate::Broker;

/// What happens to a submitted order.
#[derive(Clone, Copy, Debug)]
pub enum FillMode {
    /// Orders fill immediately at the quoted LTP; holdings and cash are
    /// updated so the next snapshot reflects the fill.
    ImmediateFull,
    /// All orders are rejected.
    Reject,
}

/// A recorded order submission for assertion in tests.
#[derive(Clone, Debug)]
pub struct RecordedOrder {
    pub ticker: Ticker,
    pub exchange: Exchange,
    pub transaction_type: TransactionType,
    pub quantity: i64,
    pub product: Product,
}

/// Builder for `MockBroker`.
pub struct MockBrokerBuilder {
    fill_mode: FillMode,
    holdings: Vec<Holding>,
    positions: Vec<NetPosition>,
    quotes: Vec<(Instrument, i64)>,
    cash_paise: i64,
    fail_first_orders: u32,
    fail_ltp: bool,
}

impl MockBrokerBuilder {
    pub fn fill_mode(mut self, mode: FillMode) -> Self {
        self.fill_mode = mode;
        self
    }

    pub fn with_holding(
        mut self,
        ticker: &str,
        quantity: i64,
        average_price_paise: i64,
        last_price_paise: i64,
    ) -> Self {
        self.holdings.push(Holding {
            ticker: Ticker::new(ticker),
            exchange: Exchange::Nse,
            quantity,
            average_price_paise,
            last_price_paise,
        });
        self
    }

    pub fn with_position(
        mut self,
        ticker: &str,
        quantity: i64,
        last_price_paise: i64,
        multiplier: i64,
    ) -> Self {
        self.positions.push(NetPosition {
            ticker: Ticker::new(ticker),
            exchange: Exchange::Nse,
            quantity,
            average_price_paise: last_price_paise,
            last_price_paise,
            multiplier,
        });
        self
    }

    pub fn with_quote(mut self, exchange: Exchange, ticker: &str, last_price_paise: i64) -> Self {
        self.quotes.push((
            Instrument::new(exchange, Ticker::new(ticker)),
            last_price_paise,
        ));
        self
    }

    pub fn with_cash(mut self, cash_paise: i64) -> Self {
        self.cash_paise = cash_paise;
        self
    }

    /// Reject the first `n` submissions with a transient order error, then
    /// fill normally. Exercises the executor's retry path.
    pub fn fail_first_orders(mut self, n: u32) -> Self {
        self.fail_first_orders = n;
        self
    }

    /// Make the batch LTP endpoint fail, forcing the holding-price fallback.
    pub fn fail_ltp(mut self) -> Self {
        self.fail_ltp = true;
        self
    }

    pub fn build(self) -> MockBroker {
        MockBroker {
            fill_mode: self.fill_mode,
            state: Mutex::new(MockState {
                holdings: self.holdings,
                positions: self.positions,
                cash_paise: self.cash_paise,
                failures_remaining: self.fail_first_orders,
                next_order_id: 1,
            }),
            quotes: self.quotes,
            fail_ltp: self.fail_ltp,
            submitted_orders: Mutex::new(Vec::new()),
        }
    }
}

struct MockState {
    holdings: Vec<Holding>,
    positions: Vec<NetPosition>,
    cash_paise: i64,
    failures_remaining: u32,
    next_order_id: u64,
}

/// A mock broker that records submitted orders and applies fills in memory.
pub struct MockBroker {
    fill_mode: FillMode,
    state: Mutex<MockState>,
    quotes: Vec<(Instrument, i64)>,
    fail_ltp: bool,
    submitted_orders: Mutex<Vec<RecordedOrder>>,
}

impl MockBroker {
    pub fn builder() -> MockBrokerBuilder {
        MockBrokerBuilder {
            fill_mode: FillMode::ImmediateFull,
            holdings: Vec::new(),
            positions: Vec::new(),
            quotes: Vec::new(),
            cash_paise: 0,
            fail_first_orders: 0,
            fail_ltp: false,
        }
    }

    /// All orders that were submitted, including rejected ones.
    pub fn submitted_orders(&self) -> Vec<RecordedOrder> {
        self.submitted_orders.lock().unwrap().clone()
    }

    fn quote_for(&self, exchange: Exchange, ticker: &Ticker) -> Option<i64> {
        self.quotes
            .iter()
            .find(|(i, _)| i.exchange == exchange && &i.ticker == ticker)
            .map(|(_, p)| *p)
    }

    fn apply_fill(&self, state: &mut MockState, order: &OrderParams, price: i64) {
        let signed_qty = match order.transaction_type {
            TransactionType::Buy => order.quantity,
            TransactionType::Sell => -order.quantity,
        };
        state.cash_paise -= signed_qty * price;

        if let Some(h) = state
            .holdings
            .iter_mut()
            .find(|h| h.ticker == order.ticker)
        {
            h.quantity += signed_qty;
            h.last_price_paise = price;
        } else {
            state.holdings.push(Holding {
                ticker: order.ticker.clone(),
                exchange: order.exchange,
                quantity: signed_qty,
                average_price_paise: price,
                last_price_paise: price,
            });
        }
        state.holdings.retain(|h| h.quantity != 0);
    }
}

impl Broker for MockBroker {
    fn profile(&self) -> Result<Profile, BrokerError> {
        Ok(Profile {
            user_id: "MOCK01".into(),
            user_name: "Mock User".into(),
        })
    }

    fn holdings(&self) -> Result<Vec<Holding>, BrokerError> {
        Ok(self.state.lock().unwrap().holdings.clone())
    }

    fn positions(&self) -> Result<Positions, BrokerError> {
        Ok(Positions {
            net: self.state.lock().unwrap().positions.clone(),
        })
    }

    fn margins(&self) -> Result<MarginSummary, BrokerError> {
        Ok(MarginSummary {
            available_cash_paise: self.state.lock().unwrap().cash_paise,
        })
    }

    fn ltp(&self, instruments: &[Instrument]) -> Result<Vec<(Instrument, i64)>, BrokerError> {
        if self.fail_ltp {
            return Err(BrokerError::Connection("mock: ltp unavailable".into()));
        }
        Ok(instruments
            .iter()
            .filter_map(|i| {
                self.quote_for(i.exchange, &i.ticker)
                    .map(|p| (i.clone(), p))
            })
            .collect())
    }

    fn place_order(&self, order: &OrderParams) -> Result<OrderId, BrokerError> {
        self.submitted_orders.lock().unwrap().push(RecordedOrder {
            ticker: order.ticker.clone(),
            exchange: order.exchange,
            transaction_type: order.transaction_type,
            quantity: order.quantity,
            product: order.product,
        });

        let mut state = self.state.lock().unwrap();
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(BrokerError::Order("mock: order rejected".into()));
        }

        match self.fill_mode {
            FillMode::Reject => Err(BrokerError::Order("mock: order rejected".into())),
            FillMode::ImmediateFull => {
                let price = self
                    .quote_for(order.exchange, &order.ticker)
                    .ok_or_else(|| {
                        BrokerError::UnknownInstrument(order.ticker.as_str().to_string())
                    })?;
                self.apply_fill(&mut state, order, price);
                let id = state.next_order_id;
                state.next_order_id += 1;
                Ok(OrderId(format!("MOCK{id:06}")))
            }
        }
    }
}
