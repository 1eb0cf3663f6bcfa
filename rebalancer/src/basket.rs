//! Target basket loading and validation.
//!
//! A basket document comes from the upstream research pipeline:
//! `{stocks: [{stock_ticker, weight, sources}], stocks_ticker_candidates,
//! reason_summary}`. Only tickers and weights drive the rebalance; the rest
//! is carried for the audit trail.

use std::path::Path;

use kitebal_broker::Ticker;
use serde::Deserialize;

use crate::error::{Error, Result};

/// A target portfolio allocation.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetBasket {
    pub stocks: Vec<BasketStock>,
    #[serde(default)]
    pub stocks_ticker_candidates: Vec<String>,
    #[serde(default)]
    pub reason_summary: Option<String>,
}

/// One target position: ticker + relative weight.
#[derive(Debug, Clone, Deserialize)]
pub struct BasketStock {
    pub stock_ticker: String,
    pub weight: f64,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl TargetBasket {
    /// Load and validate a basket JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::BasketRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let basket: TargetBasket = serde_json::from_str(&contents)?;
        basket.validate()?;
        Ok(basket)
    }

    /// Parse from a JSON string (useful for testing).
    pub fn from_json(json: &str) -> Result<Self> {
        let basket: TargetBasket = serde_json::from_str(json)?;
        basket.validate()?;
        Ok(basket)
    }

    /// Validate the basket document. Weights are used as relative targets
    /// against total account value, so they need not sum to 1.0; each one
    /// still has to be a sane fraction on its own.
    fn validate(&self) -> Result<()> {
        if self.stocks.is_empty() {
            return Err(Error::Basket("stocks list is empty".into()));
        }

        let mut seen = std::collections::HashSet::new();
        for s in &self.stocks {
            if s.stock_ticker.is_empty() {
                return Err(Error::Basket("empty stock_ticker".into()));
            }
            if !seen.insert(s.stock_ticker.to_uppercase()) {
                return Err(Error::Basket(format!(
                    "duplicate ticker: {}",
                    s.stock_ticker
                )));
            }
            if !s.weight.is_finite() {
                return Err(Error::Basket(format!(
                    "weight for {} is not a number",
                    s.stock_ticker
                )));
            }
            if s.weight <= 0.0 || s.weight > 1.0 {
                return Err(Error::Basket(format!(
                    "weight for {} ({}) must be in (0, 1]",
                    s.stock_ticker, s.weight
                )));
            }
        }

        Ok(())
    }

    /// Target weight for a ticker; zero for tickers outside the basket.
    pub fn weight(&self, ticker: &Ticker) -> f64 {
        self.stocks
            .iter()
            .find(|s| s.stock_ticker.eq_ignore_ascii_case(ticker.as_str()))
            .map(|s| s.weight)
            .unwrap_or(0.0)
    }

    /// All basket tickers.
    pub fn tickers(&self) -> Vec<Ticker> {
        self.stocks
            .iter()
            .map(|s| Ticker::new(&s.stock_ticker))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_json() -> &'static str {
        r#"{
            "stocks": [
                { "stock_ticker": "INFY",     "weight": 0.40, "sources": ["screener"] },
                { "stock_ticker": "TCS",      "weight": 0.30 },
                { "stock_ticker": "RELIANCE", "weight": 0.30 }
            ],
            "stocks_ticker_candidates": ["INFY", "TCS", "RELIANCE", "SBIN"],
            "reason_summary": "IT-heavy defensive tilt"
        }"#
    }

    #[test]
    fn parse_valid_basket() {
        let basket = TargetBasket::from_json(valid_json()).unwrap();
        assert_eq!(basket.stocks.len(), 3);
        assert_eq!(basket.stocks[0].stock_ticker, "INFY");
        assert_eq!(basket.stocks[0].weight, 0.40);
        assert_eq!(basket.stocks_ticker_candidates.len(), 4);
        assert!(basket.reason_summary.is_some());
    }

    #[test]
    fn candidates_and_summary_optional() {
        let json = r#"{ "stocks": [{ "stock_ticker": "INFY", "weight": 1.0 }] }"#;
        let basket = TargetBasket::from_json(json).unwrap();
        assert!(basket.stocks_ticker_candidates.is_empty());
        assert!(basket.reason_summary.is_none());
    }

    #[test]
    fn weight_lookup_defaults_to_zero() {
        let basket = TargetBasket::from_json(valid_json()).unwrap();
        assert_eq!(basket.weight(&Ticker::new("TCS")), 0.30);
        assert_eq!(basket.weight(&Ticker::new("SBIN")), 0.0);
    }

    #[test]
    fn reject_empty_stocks() {
        let json = r#"{ "stocks": [] }"#;
        assert!(TargetBasket::from_json(json).is_err());
    }

    #[test]
    fn reject_duplicate_tickers() {
        let json = r#"{
            "stocks": [
                { "stock_ticker": "INFY", "weight": 0.5 },
                { "stock_ticker": "infy", "weight": 0.3 }
            ]
        }"#;
        assert!(TargetBasket::from_json(json).is_err());
    }

    #[test]
    fn reject_zero_weight() {
        let json = r#"{ "stocks": [{ "stock_ticker": "INFY", "weight": 0.0 }] }"#;
        assert!(TargetBasket::from_json(json).is_err());
    }

    #[test]
    fn reject_weight_over_one() {
        let json = r#"{ "stocks": [{ "stock_ticker": "INFY", "weight": 1.5 }] }"#;
        assert!(TargetBasket::from_json(json).is_err());
    }

    #[test]
    fn reject_nan_weight() {
        // JSON has no NaN literal, but a crafted document could carry one
        // through a lenient producer; validate() guards the parsed value.
        let mut basket = TargetBasket::from_json(valid_json()).unwrap();
        basket.stocks[0].weight = f64::NAN;
        assert!(basket.validate().is_err());
    }
}
