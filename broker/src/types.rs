//! Shared broker types: tickers, holdings, positions, margins, orders.

/// NSE/BSE trading symbol, e.g. `RELIANCE` or `HINDUNILVR`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticker(String);

impl Ticker {
    pub fn new(s: &str) -> Self {
        Ticker(s.to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Exchange segment a ticker trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Exchange {
    #[default]
    Nse,
    Bse,
}

impl Exchange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Nse => "NSE",
            Exchange::Bse => "BSE",
        }
    }

    /// Parse an exchange string as reported by the broker. Unknown values
    /// fall back to NSE, matching how the upstream payloads are consumed.
    pub fn parse(s: &str) -> Self {
        match s {
            "BSE" => Exchange::Bse,
            _ => Exchange::Nse,
        }
    }
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An `EXCHANGE:TICKER` quote key, the form the LTP endpoint expects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instrument {
    pub exchange: Exchange,
    pub ticker: Ticker,
}

impl Instrument {
    pub fn new(exchange: Exchange, ticker: Ticker) -> Self {
        Instrument { exchange, ticker }
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.exchange, self.ticker)
    }
}

/// A settled position held overnight (demat holding). Prices are integer
/// paise.
#[derive(Debug, Clone)]
pub struct Holding {
    pub ticker: Ticker,
    pub exchange: Exchange,
    pub quantity: i64,
    pub average_price_paise: i64,
    pub last_price_paise: i64,
}

/// An intraday net position. Same shape as a holding plus a contract
/// multiplier (non-unit for derivatives).
#[derive(Debug, Clone)]
pub struct NetPosition {
    pub ticker: Ticker,
    pub exchange: Exchange,
    pub quantity: i64,
    pub average_price_paise: i64,
    pub last_price_paise: i64,
    pub multiplier: i64,
}

/// Position book as returned by the broker; only the net leg matters for
/// portfolio valuation.
#[derive(Debug, Clone, Default)]
pub struct Positions {
    pub net: Vec<NetPosition>,
}

/// Equity-segment funds summary.
#[derive(Debug, Clone)]
pub struct MarginSummary {
    pub available_cash_paise: i64,
}

/// Authenticated user identity, used to verify the session.
#[derive(Debug, Clone)]
pub struct Profile {
    pub user_id: String,
    pub user_name: String,
}

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    Buy,
    Sell,
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Buy => write!(f, "BUY"),
            TransactionType::Sell => write!(f, "SELL"),
        }
    }
}

/// Product code: delivery (CNC) or intraday (MIS).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Product {
    Cnc,
    Mis,
}

impl Product {
    pub fn as_str(&self) -> &'static str {
        match self {
            Product::Cnc => "CNC",
            Product::Mis => "MIS",
        }
    }
}

/// Market or limit order. Limit prices are paise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit(i64),
}

/// Parameters for a regular-variety order.
#[derive(Debug, Clone)]
pub struct OrderParams {
    pub exchange: Exchange,
    pub ticker: Ticker,
    pub transaction_type: TransactionType,
    pub quantity: i64,
    pub product: Product,
    pub order_type: OrderType,
}

/// Opaque order ID assigned by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Convert broker-reported rupees to integer paise.
pub fn to_paise(rupees: f64) -> i64 {
    (rupees * 100.0).round() as i64
}

/// Integer paise back to rupees, for display.
pub fn to_rupees(paise: i64) -> f64 {
    paise as f64 / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_uppercases() {
        assert_eq!(Ticker::new("infy").as_str(), "INFY");
    }

    #[test]
    fn instrument_display() {
        let i = Instrument::new(Exchange::Nse, Ticker::new("TCS"));
        assert_eq!(i.to_string(), "NSE:TCS");
    }

    #[test]
    fn exchange_parse_defaults_to_nse() {
        assert_eq!(Exchange::parse("BSE"), Exchange::Bse);
        assert_eq!(Exchange::parse("NFO"), Exchange::Nse);
        assert_eq!(Exchange::parse(""), Exchange::Nse);
    }

    #[test]
    fn paise_round_trip() {
        assert_eq!(to_paise(1543.25), 154325);
        assert_eq!(to_paise(0.005), 1); // rounds, not truncates
        assert_eq!(to_rupees(154325), 1543.25);
    }
}
