use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalized market. Built once per run by the normalizer and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub market_id: String,
    /// Identifier the Data API expects for holders/trades lookups.
    pub condition_id: Option<String>,
    pub event_id: Option<String>,
    pub group_id: Option<String>,
    pub slug: Option<String>,
    pub question: Option<String>,
    pub volume_usd: Option<Decimal>,
    pub liquidity_usd: Option<Decimal>,
    pub last_price: Option<Decimal>,
    /// Per-outcome prices, indexed like the market's outcome list.
    pub outcome_prices: Vec<Decimal>,
    /// Price history window, oldest first.
    pub price_history: Vec<PricePoint>,
    /// Reported 24h price change; used when the history window is too short.
    pub price_change_24h: Option<Decimal>,
    pub created_at: Option<DateTime<Utc>>,
    pub close_time: Option<DateTime<Utc>>,
    pub active: Option<bool>,
    pub closed: bool,
    pub resolved: bool,
    pub archived: bool,
}

impl Market {
    /// Bare market with only an id; every optional field empty.
    pub fn new(market_id: impl Into<String>) -> Self {
        Self {
            market_id: market_id.into(),
            condition_id: None,
            event_id: None,
            group_id: None,
            slug: None,
            question: None,
            volume_usd: None,
            liquidity_usd: None,
            last_price: None,
            outcome_prices: Vec::new(),
            price_history: Vec::new(),
            price_change_24h: None,
            created_at: None,
            close_time: None,
            active: None,
            closed: false,
            resolved: false,
            archived: false,
        }
    }

    /// Price for the given outcome index, falling back to the last trade price.
    pub fn implied_price(&self, outcome_index: Option<usize>) -> Option<Decimal> {
        outcome_index
            .and_then(|i| self.outcome_prices.get(i).copied())
            .filter(|p| *p > Decimal::ZERO)
            .or(self.last_price.filter(|p| *p > Decimal::ZERO))
    }

    /// Identifiers to try, in order, when asking the Data API about this market.
    pub fn lookup_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::with_capacity(2);
        if let Some(cid) = self.condition_id.as_deref() {
            ids.push(cid);
        }
        if !ids.contains(&self.market_id.as_str()) {
            ids.push(&self.market_id);
        }
        ids
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub at: DateTime<Utc>,
    pub price: Decimal,
}

// ---------------------------------------------------------------------------
// ClusterKey
// ---------------------------------------------------------------------------

/// Identity cluster a market belongs to. Markets sharing a key are treated
/// as one unit when diversifying selections and measuring concentration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterKey(String);

impl ClusterKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
