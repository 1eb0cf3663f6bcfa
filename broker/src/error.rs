//! Broker error types.

/// Errors that can occur during broker operations.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("order error: {0}")]
    Order(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("rate limit exceeded")]
    RateLimit,

    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("{0}")]
    Other(String),
}

impl BrokerError {
    /// Whether this failure means the session itself is dead. Auth failures
    /// require external re-authentication and must not be retried.
    pub fn is_auth(&self) -> bool {
        matches!(self, BrokerError::Auth(_))
    }
}
