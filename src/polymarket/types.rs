use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// Numeric fields stay as raw JSON values: the APIs send the same field as a
// number in one payload and a string in the next. The normalizer parses them.

// ---------------------------------------------------------------------------
// Market (Gamma API)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawPricePoint {
    #[serde(default)]
    pub t: Option<Value>,
    #[serde(default)]
    pub p: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMarket {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub condition_id: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub group_item_title: Option<String>,
    #[serde(default)]
    pub events: Option<Vec<RawEvent>>,
    #[serde(default)]
    pub volume: Option<Value>,
    #[serde(default)]
    pub volume_num: Option<Value>,
    #[serde(default)]
    pub liquidity: Option<Value>,
    #[serde(default)]
    pub liquidity_num: Option<Value>,
    #[serde(default)]
    pub last_trade_price: Option<Value>,
    /// Stringified JSON array, e.g. "[\"0.62\", \"0.38\"]", or a plain array.
    #[serde(default)]
    pub outcome_prices: Option<Value>,
    #[serde(default)]
    pub clob_token_ids: Option<Value>,
    #[serde(default)]
    pub one_day_price_change: Option<Value>,
    #[serde(default)]
    pub price_history: Option<Vec<RawPricePoint>>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub end_date_iso: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub closed: Option<bool>,
    #[serde(default)]
    pub archived: Option<bool>,
    #[serde(default)]
    pub resolved: Option<bool>,
}

// ---------------------------------------------------------------------------
// Trade (Data API)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTrade {
    #[serde(default, alias = "maker_address", alias = "wallet")]
    pub proxy_wallet: Option<String>,
    #[serde(default, alias = "market", alias = "market_id")]
    pub condition_id: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub size: Option<Value>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub outcome_index: Option<Value>,
}

// ---------------------------------------------------------------------------
// Position / holder row (Data API)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPosition {
    #[serde(default, alias = "address", alias = "wallet")]
    pub proxy_wallet: Option<String>,
    #[serde(default, alias = "conditionId", alias = "market_id")]
    pub market: Option<String>,
    #[serde(default, alias = "shares", alias = "size")]
    pub amount: Option<Value>,
    #[serde(default)]
    pub outcome_index: Option<Value>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(
        default,
        alias = "usdValue",
        alias = "currentValue",
        alias = "value_usd",
        alias = "value"
    )]
    pub value_usd: Option<Value>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub avg_price: Option<Value>,
    #[serde(default, alias = "first_seen")]
    pub first_seen: Option<Value>,
    #[serde(default, alias = "created_at")]
    pub created_at: Option<Value>,
}

/// `/holders` groups rows by outcome token.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawHolderGroup {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub holders: Vec<Value>,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Everything one run consumes, as raw payloads. Records are kept as JSON
/// values so one malformed record is rejected on its own.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSnapshot {
    #[serde(default)]
    pub markets: Vec<Value>,
    #[serde(default)]
    pub trades: Vec<Value>,
    #[serde(default)]
    pub positions: Vec<Value>,
    /// Market id -> whether holder data (or the trades fallback) came back.
    #[serde(default)]
    pub holders_fetched: BTreeMap<String, bool>,
}
