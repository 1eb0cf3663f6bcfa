//! Kite Connect REST client.

use log::debug;
use reqwest::blocking::Client;
use reqwest::StatusCode;

use super::types::{
    Envelope, KiteHolding, KiteLtpData, KiteMargins, KiteOrderReceipt, KitePositions, KiteProfile,
};
use crate::error::BrokerError;

const BASE_URL: &str = "https://api.kite.trade";
const API_VERSION: &str = "3";

/// Blocking Kite Connect REST client.
///
/// Carries a pre-established session (`api_key` + `access_token`); minting
/// the token from a login is the auth collaborator's job.
pub struct KiteClient {
    client: Client,
    api_key: String,
    access_token: String,
    base_url: String,
}

impl KiteClient {
    pub fn new(api_key: &str, access_token: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            access_token: access_token.to_string(),
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point the client at a different host (test servers).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn authorization(&self) -> String {
        format!("token {}:{}", self.api_key, self.access_token)
    }

    /// GET /user/profile
    pub fn profile(&self) -> Result<KiteProfile, BrokerError> {
        self.get("/user/profile")
    }

    /// GET /portfolio/holdings
    pub fn holdings(&self) -> Result<Vec<KiteHolding>, BrokerError> {
        self.get("/portfolio/holdings")
    }

    /// GET /portfolio/positions
    pub fn positions(&self) -> Result<KitePositions, BrokerError> {
        self.get("/portfolio/positions")
    }

    /// GET /user/margins/equity
    pub fn margins_equity(&self) -> Result<KiteMargins, BrokerError> {
        self.get("/user/margins/equity")
    }

    /// GET /quote/ltp?i=NSE:INFY&i=...
    pub fn ltp(&self, instruments: &[String]) -> Result<KiteLtpData, BrokerError> {
        let query: Vec<(&str, &str)> = instruments.iter().map(|i| ("i", i.as_str())).collect();
        let url = format!("{}/quote/ltp", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&query)
            .header("X-Kite-Version", API_VERSION)
            .header("Authorization", self.authorization())
            .send()
            .map_err(|e| BrokerError::Connection(format!("ltp request failed: {e}")))?;
        Self::unwrap_envelope(resp)
    }

    /// POST /orders/regular
    pub fn place_order(&self, fields: &[(&str, String)]) -> Result<KiteOrderReceipt, BrokerError> {
        let url = format!("{}/orders/regular", self.base_url);
        debug!("Submitting Kite order: {fields:?}");

        let resp = self
            .client
            .post(&url)
            .header("X-Kite-Version", API_VERSION)
            .header("Authorization", self.authorization())
            .form(fields)
            .send()
            .map_err(|e| BrokerError::Order(format!("order request failed: {e}")))?;
        Self::unwrap_envelope(resp)
    }

    fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, BrokerError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .header("X-Kite-Version", API_VERSION)
            .header("Authorization", self.authorization())
            .send()
            .map_err(|e| BrokerError::Connection(format!("GET {path} failed: {e}")))?;
        Self::unwrap_envelope(resp)
    }

    /// Unwrap the `{status, data}` envelope, mapping API errors onto
    /// `BrokerError` by HTTP status and Kite's `error_type` discriminator.
    fn unwrap_envelope<T: serde::de::DeserializeOwned>(
        resp: reqwest::blocking::Response,
    ) -> Result<T, BrokerError> {
        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| BrokerError::Connection(format!("failed to read response: {e}")))?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(BrokerError::RateLimit);
        }

        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            BrokerError::Connection(format!("unparseable response ({status}): {e}"))
        })?;

        if envelope.status != "success" {
            let message = envelope.message.unwrap_or_else(|| "unknown error".into());
            return Err(match envelope.error_type.as_deref() {
                Some("TokenException") | Some("PermissionException") => BrokerError::Auth(message),
                Some("NetworkException") => BrokerError::Connection(message),
                Some("OrderException") | Some("InputException") => BrokerError::Order(message),
                _ => BrokerError::Other(message),
            });
        }

        envelope
            .data
            .ok_or_else(|| BrokerError::Connection(format!("empty data field ({status})")))
    }
}
