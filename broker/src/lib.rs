//! Broker trait and implementations for kitebal.
//!
//! Provides a generic `Broker` trait that abstracts the brokerage surface
//! the rebalancer consumes. Implementations:
//!
//! - **Kite** (feature `kite`): Zerodha Kite Connect REST API
//! - **Mock**: scriptable in-memory broker for tests

pub mod error;
pub mod mock;
pub mod types;

#[cfg(feature = "kite")]
pub mod kite;

pub use error::BrokerError;
pub use types::*;

/// A brokerage session that can report the account and place orders.
///
/// All methods are blocking; the caller owns pacing and retries.
pub trait Broker {
    /// Authenticated user profile. Fails with `BrokerError::Auth` when the
    /// session token is invalid or expired.
    fn profile(&self) -> Result<Profile, BrokerError>;

    /// Settled demat holdings.
    fn holdings(&self) -> Result<Vec<Holding>, BrokerError>;

    /// Intraday position book.
    fn positions(&self) -> Result<Positions, BrokerError>;

    /// Equity funds summary (available cash).
    fn margins(&self) -> Result<MarginSummary, BrokerError>;

    /// Last traded prices for a set of instruments, in paise. Instruments
    /// the broker cannot quote are simply absent from the result.
    fn ltp(&self, instruments: &[Instrument]) -> Result<Vec<(Instrument, i64)>, BrokerError>;

    /// Submit a regular-variety order. Returns the broker-assigned order ID.
    ///
    /// There is no idempotency key: if the submission succeeds but the
    /// response is lost, a retry places a duplicate order.
    fn place_order(&self, order: &OrderParams) -> Result<OrderId, BrokerError>;
}
