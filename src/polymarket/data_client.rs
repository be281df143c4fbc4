use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use super::gamma_client::json_kind;
use super::types::RawHolderGroup;

const DATA_API_BASE: &str = "https://data-api.polymarket.com";

#[derive(Debug, Error)]
pub enum DataClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

#[derive(Debug, Clone)]
pub struct DataClient {
    http: Client,
    base_url: String,
}

impl DataClient {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            base_url: DATA_API_BASE.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Top holders of a market, grouped by outcome token.
    pub async fn get_holders(
        &self,
        condition_id: &str,
        limit: usize,
    ) -> Result<Vec<RawHolderGroup>, DataClientError> {
        let url = format!("{}/holders", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("market", condition_id), ("limit", &limit.to_string())])
            .send()
            .await?
            .error_for_status()?;

        let groups: Vec<RawHolderGroup> = resp.json().await?;
        Ok(groups)
    }

    /// Recent trades in a market, newest first.
    pub async fn get_trades(
        &self,
        condition_id: &str,
        limit: usize,
    ) -> Result<Vec<Value>, DataClientError> {
        let url = format!("{}/trades", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("market", condition_id), ("limit", &limit.to_string())])
            .send()
            .await?
            .error_for_status()?;

        match resp.json::<Value>().await? {
            Value::Array(trades) => Ok(trades),
            other => Err(DataClientError::Unexpected(format!(
                "expected a JSON array of trades, got {}",
                json_kind(&other)
            ))),
        }
    }
}
