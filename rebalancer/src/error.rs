//! Error types for the rebalancer.
//!
//! Taxonomy: input problems (basket, config) are fatal before any network
//! call; authentication failures are fatal and need external
//! re-authentication; snapshot failures abort the run; per-order broker
//! failures are retried by the executor and never surface here.

use std::path::PathBuf;

use kitebal_broker::BrokerError;

/// All errors that can abort a rebalancer run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("basket file error: {0}")]
    Basket(String),

    #[error("failed to read basket file {path}: {source}")]
    BasketRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse basket JSON: {0}")]
    BasketParse(#[from] serde_json::Error),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("broker error: {0}")]
    Broker(BrokerError),

    #[error("execution aborted: {0}")]
    Aborted(String),

    #[error("audit log error: {0}")]
    Audit(#[from] std::io::Error),
}

impl From<BrokerError> for Error {
    fn from(e: BrokerError) -> Self {
        // Auth failures get their own fatal variant so main can report them
        // as "re-authenticate", not as a generic broker hiccup.
        if e.is_auth() {
            Error::Auth(e.to_string())
        } else {
            Error::Broker(e)
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_broker_errors_become_fatal_auth() {
        let e: Error = BrokerError::Auth("token expired".into()).into();
        assert!(matches!(e, Error::Auth(_)));
    }

    #[test]
    fn transient_broker_errors_stay_broker() {
        let e: Error = BrokerError::RateLimit.into();
        assert!(matches!(e, Error::Broker(_)));
    }
}
