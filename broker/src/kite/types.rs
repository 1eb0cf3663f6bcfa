//! Kite Connect API wire types.
//!
//! Every endpoint wraps its payload in a `{"status": ..., "data": ...}`
//! envelope; errors carry a `message` and an `error_type` discriminator.

use std::collections::HashMap;

use serde::Deserialize;

/// Response envelope shared by all endpoints.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub status: String,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct KiteProfile {
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
}

#[derive(Debug, Deserialize)]
pub struct KiteHolding {
    pub tradingsymbol: String,
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub average_price: f64,
    #[serde(default)]
    pub last_price: f64,
}

#[derive(Debug, Deserialize)]
pub struct KitePosition {
    pub tradingsymbol: String,
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub average_price: f64,
    #[serde(default)]
    pub last_price: f64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
pub struct KitePositions {
    #[serde(default)]
    pub net: Vec<KitePosition>,
}

#[derive(Debug, Deserialize)]
pub struct KiteMargins {
    pub available: KiteAvailable,
}

#[derive(Debug, Deserialize)]
pub struct KiteAvailable {
    #[serde(default)]
    pub cash: f64,
}

#[derive(Debug, Deserialize)]
pub struct KiteQuote {
    pub last_price: f64,
}

/// LTP payload: `"NSE:INFY" -> { last_price }`.
pub type KiteLtpData = HashMap<String, KiteQuote>;

#[derive(Debug, Deserialize)]
pub struct KiteOrderReceipt {
    pub order_id: String,
}
