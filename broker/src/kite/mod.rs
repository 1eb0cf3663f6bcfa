//! Zerodha Kite Connect broker implementation.

pub mod auth;
pub mod client;
pub mod types;

use crate::error::BrokerError;
use crate::types::*;
use crate::Broker;
use client::KiteClient;

/// Kite Connect broker implementing the generic `Broker` trait.
///
/// All calls are blocking REST requests via `reqwest::blocking`. Prices in
/// Kite payloads are float rupees; conversion to integer paise happens here,
/// at the boundary, so everything inward works in integers.
pub struct KiteBroker {
    client: KiteClient,
}

impl KiteBroker {
    /// Create a broker handle from an established session.
    pub fn new(api_key: &str, access_token: &str) -> Self {
        Self {
            client: KiteClient::new(api_key, access_token),
        }
    }

    /// Point the underlying client at a different host (test servers).
    pub fn with_base_url(self, base_url: &str) -> Self {
        Self {
            client: self.client.with_base_url(base_url),
        }
    }
}

impl Broker for KiteBroker {
    fn profile(&self) -> Result<Profile, BrokerError> {
        let p = self.client.profile()?;
        Ok(Profile {
            user_id: p.user_id,
            user_name: p.user_name,
        })
    }

    fn holdings(&self) -> Result<Vec<Holding>, BrokerError> {
        let holdings = self.client.holdings()?;
        Ok(holdings
            .iter()
            .map(|h| Holding {
                ticker: Ticker::new(&h.tradingsymbol),
                exchange: Exchange::parse(&h.exchange),
                quantity: h.quantity,
                average_price_paise: to_paise(h.average_price),
                last_price_paise: to_paise(h.last_price),
            })
            .collect())
    }

    fn positions(&self) -> Result<Positions, BrokerError> {
        let positions = self.client.positions()?;
        Ok(Positions {
            net: positions
                .net
                .iter()
                .map(|p| NetPosition {
                    ticker: Ticker::new(&p.tradingsymbol),
                    exchange: Exchange::parse(&p.exchange),
                    quantity: p.quantity,
                    average_price_paise: to_paise(p.average_price),
                    last_price_paise: to_paise(p.last_price),
                    multiplier: p.multiplier.round() as i64,
                })
                .collect(),
        })
    }

    fn margins(&self) -> Result<MarginSummary, BrokerError> {
        let margins = self.client.margins_equity()?;
        Ok(MarginSummary {
            available_cash_paise: to_paise(margins.available.cash),
        })
    }

    fn ltp(&self, instruments: &[Instrument]) -> Result<Vec<(Instrument, i64)>, BrokerError> {
        let keys: Vec<String> = instruments.iter().map(|i| i.to_string()).collect();
        let data = self.client.ltp(&keys)?;

        // The payload is keyed by "EXCHANGE:TICKER"; pair each quote back up
        // with the instrument that requested it. Unquoted instruments are
        // simply absent.
        Ok(instruments
            .iter()
            .filter_map(|i| {
                data.get(&i.to_string())
                    .map(|q| (i.clone(), to_paise(q.last_price)))
            })
            .collect())
    }

    fn place_order(&self, order: &OrderParams) -> Result<OrderId, BrokerError> {
        let mut fields: Vec<(&str, String)> = vec![
            ("exchange", order.exchange.as_str().to_string()),
            ("tradingsymbol", order.ticker.as_str().to_string()),
            ("transaction_type", order.transaction_type.to_string()),
            ("quantity", order.quantity.to_string()),
            ("product", order.product.as_str().to_string()),
            ("validity", "DAY".to_string()),
        ];
        match order.order_type {
            OrderType::Market => fields.push(("order_type", "MARKET".to_string())),
            OrderType::Limit(price_paise) => {
                fields.push(("order_type", "LIMIT".to_string()));
                fields.push(("price", format!("{:.2}", to_rupees(price_paise))));
            }
        }

        let receipt = self.client.place_order(&fields)?;
        Ok(OrderId(receipt.order_id))
    }
}
