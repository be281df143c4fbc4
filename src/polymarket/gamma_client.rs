use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

const GAMMA_API_BASE: &str = "https://gamma-api.polymarket.com";

#[derive(Debug, Error)]
pub enum GammaClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

#[derive(Debug, Clone)]
pub struct GammaClient {
    http: Client,
    base_url: String,
}

impl Default for GammaClient {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

impl GammaClient {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            base_url: GAMMA_API_BASE.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetch one page of open markets. Records come back untyped so the
    /// normalizer can reject them one at a time.
    pub async fn get_markets(&self, limit: u32, offset: u32) -> Result<Vec<Value>, GammaClientError> {
        let url = format!("{}/markets", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("active", "true"),
                ("closed", "false"),
                ("limit", &limit.to_string()),
                ("offset", &offset.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        match resp.json::<Value>().await? {
            Value::Array(markets) => Ok(markets),
            other => Err(GammaClientError::Unexpected(format!(
                "expected a JSON array of markets, got {}",
                json_kind(&other)
            ))),
        }
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
