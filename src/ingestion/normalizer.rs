use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{AppError, Result};
use crate::models::{Market, Outcome, PricePoint, Side, Trade, WalletPosition};
use crate::polymarket::types::{RawMarket, RawPosition, RawSnapshot, RawTrade};

/// Unix timestamps above this are taken as milliseconds.
const UNIX_MILLIS_CUTOFF: i64 = 100_000_000_000;

/// Records rejected by the normalizer, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionStats {
    pub markets: usize,
    pub duplicate_markets: usize,
    pub trades: usize,
    pub positions: usize,
}

impl RejectionStats {
    pub fn total(&self) -> usize {
        self.markets + self.duplicate_markets + self.trades + self.positions
    }
}

/// Typed records for one run. Nothing downstream touches raw JSON.
#[derive(Debug, Clone, Default)]
pub struct NormalizedSnapshot {
    pub markets: Vec<Market>,
    pub trades: Vec<Trade>,
    pub positions: Vec<WalletPosition>,
    pub holders_fetched: BTreeMap<String, bool>,
    pub rejections: RejectionStats,
    pub unknown_outcome_positions: usize,
}

/// Parse every raw record once. Malformed records are counted and dropped;
/// duplicate market ids keep the first record seen.
pub fn normalize_snapshot(raw: &RawSnapshot) -> NormalizedSnapshot {
    let mut out = NormalizedSnapshot {
        holders_fetched: raw.holders_fetched.clone(),
        ..Default::default()
    };

    let mut seen: HashSet<String> = HashSet::new();
    for record in &raw.markets {
        match normalize_market(record) {
            Ok(market) => {
                if seen.insert(market.market_id.clone()) {
                    out.markets.push(market);
                } else {
                    tracing::debug!(market_id = %market.market_id, "Duplicate market dropped");
                    out.rejections.duplicate_markets += 1;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Market rejected");
                out.rejections.markets += 1;
            }
        }
    }

    for record in &raw.trades {
        match normalize_trade(record) {
            Ok(trade) => out.trades.push(trade),
            Err(e) => {
                tracing::debug!(error = %e, "Trade rejected");
                out.rejections.trades += 1;
            }
        }
    }

    let lookup = market_lookup(&out.markets);
    let mut positions = Vec::with_capacity(raw.positions.len());
    for record in &raw.positions {
        let market = record
            .get("market")
            .or_else(|| record.get("conditionId"))
            .or_else(|| record.get("market_id"))
            .and_then(Value::as_str)
            .and_then(|id| lookup.get(id).copied());

        match normalize_position(record, market) {
            Ok(position) => {
                if position.outcome == Outcome::Unknown {
                    out.unknown_outcome_positions += 1;
                }
                positions.push(position);
            }
            Err(e) => {
                tracing::debug!(error = %e, "Position rejected");
                out.rejections.positions += 1;
            }
        }
    }
    out.positions = positions;

    let r = out.rejections;
    counter!("records_rejected_total", "kind" => "market").increment((r.markets + r.duplicate_markets) as u64);
    counter!("records_rejected_total", "kind" => "trade").increment(r.trades as u64);
    counter!("records_rejected_total", "kind" => "position").increment(r.positions as u64);

    if r.total() > 0 {
        tracing::warn!(
            markets = r.markets,
            duplicate_markets = r.duplicate_markets,
            trades = r.trades,
            positions = r.positions,
            "Normalizer rejected records"
        );
    }

    tracing::info!(
        markets = out.markets.len(),
        trades = out.trades.len(),
        positions = out.positions.len(),
        "Snapshot normalized"
    );

    out
}

/// Index markets by every id a trade or holder row may reference.
pub fn market_lookup(markets: &[Market]) -> HashMap<&str, &Market> {
    let mut lookup = HashMap::with_capacity(markets.len() * 2);
    for market in markets {
        for id in market.lookup_ids() {
            lookup.entry(id).or_insert(market);
        }
    }
    lookup
}

// ---------------------------------------------------------------------------
// Markets
// ---------------------------------------------------------------------------

pub fn normalize_market(record: &Value) -> Result<Market> {
    let raw = RawMarket::deserialize(record).map_err(|e| AppError::malformed("market", e.to_string()))?;

    let condition_id = non_empty(raw.condition_id);
    let market_id = raw
        .id
        .as_ref()
        .and_then(value_to_id)
        .or_else(|| condition_id.clone())
        .ok_or_else(|| AppError::malformed("market", "no id or conditionId"))?;

    let event_id = raw
        .events
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find_map(|e| e.id.as_ref().and_then(value_to_id));

    let outcome_prices = parse_list(raw.outcome_prices.as_ref())
        .iter()
        .map(|v| parse_decimal(Some(v)).unwrap_or(Decimal::ZERO))
        .collect();

    let mut price_history: Vec<PricePoint> = raw
        .price_history
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter_map(|pt| {
            Some(PricePoint {
                at: parse_timestamp(pt.t.as_ref())?,
                price: parse_decimal(pt.p.as_ref())?,
            })
        })
        .collect();
    price_history.sort_by_key(|pt| pt.at);

    let close_time = [raw.end_date.as_deref(), raw.end_date_iso.as_deref()]
        .into_iter()
        .flatten()
        .find_map(parse_timestamp_str);

    Ok(Market {
        market_id,
        condition_id,
        event_id,
        group_id: non_empty(raw.group_item_title),
        slug: non_empty(raw.slug),
        question: non_empty(raw.question),
        volume_usd: parse_decimal(raw.volume.as_ref()).or_else(|| parse_decimal(raw.volume_num.as_ref())),
        liquidity_usd: parse_decimal(raw.liquidity.as_ref())
            .or_else(|| parse_decimal(raw.liquidity_num.as_ref())),
        last_price: parse_decimal(raw.last_trade_price.as_ref()),
        outcome_prices,
        price_history,
        price_change_24h: parse_decimal(raw.one_day_price_change.as_ref()),
        created_at: raw.created_at.as_deref().and_then(parse_timestamp_str),
        close_time,
        active: raw.active,
        closed: raw.closed.unwrap_or(false),
        resolved: raw.resolved.unwrap_or(false),
        archived: raw.archived.unwrap_or(false),
    })
}

// ---------------------------------------------------------------------------
// Trades
// ---------------------------------------------------------------------------

pub fn normalize_trade(record: &Value) -> Result<Trade> {
    let raw = RawTrade::deserialize(record).map_err(|e| AppError::malformed("trade", e.to_string()))?;

    let wallet = non_empty(raw.proxy_wallet).ok_or_else(|| AppError::malformed("trade", "missing wallet"))?;
    let market_id =
        non_empty(raw.condition_id).ok_or_else(|| AppError::malformed("trade", "missing market"))?;
    let side = raw
        .side
        .as_deref()
        .and_then(Side::from_api_str)
        .ok_or_else(|| AppError::malformed("trade", format!("bad side {:?}", raw.side)))?;
    let size = parse_decimal(raw.size.as_ref())
        .filter(|s| *s >= Decimal::ZERO)
        .ok_or_else(|| AppError::malformed("trade", "missing or negative size"))?;
    let timestamp =
        parse_timestamp(raw.timestamp.as_ref()).ok_or_else(|| AppError::malformed("trade", "bad timestamp"))?;
    let price = parse_decimal(raw.price.as_ref()).filter(|p| *p > Decimal::ZERO);
    // a fill whose notional cannot be represented is garbage, not a whale
    if price.is_some_and(|p| size.checked_mul(p).is_none()) {
        return Err(AppError::malformed("trade", "notional overflows"));
    }

    Ok(Trade {
        wallet: wallet.to_lowercase(),
        market_id,
        side,
        size,
        price,
        outcome: parse_outcome(raw.outcome.as_deref(), raw.outcome_index.as_ref()),
        timestamp,
    })
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// Normalize a holder row. `market` supplies implied prices when the row
/// carries no USD value of its own.
pub fn normalize_position(record: &Value, market: Option<&Market>) -> Result<WalletPosition> {
    let raw =
        RawPosition::deserialize(record).map_err(|e| AppError::malformed("position", e.to_string()))?;

    let wallet =
        non_empty(raw.proxy_wallet).ok_or_else(|| AppError::malformed("position", "missing wallet"))?;
    let market_id = non_empty(raw.market)
        .or_else(|| market.map(|m| m.market_id.clone()))
        .ok_or_else(|| AppError::malformed("position", "missing market"))?;
    let size = parse_decimal(raw.amount.as_ref())
        .filter(|s| *s >= Decimal::ZERO)
        .ok_or_else(|| AppError::malformed("position", "missing or negative size"))?;

    let outcome_index = raw
        .outcome_index
        .as_ref()
        .and_then(Value::as_u64)
        .and_then(|i| usize::try_from(i).ok());

    let value_usd = match parse_decimal(raw.value_usd.as_ref()) {
        Some(value) => Some(value),
        None => {
            let price = parse_decimal(raw.price.as_ref())
                .filter(|p| *p > Decimal::ZERO)
                .or_else(|| market.and_then(|m| m.implied_price(outcome_index)));
            match price {
                Some(price) => Some(
                    size.checked_mul(price)
                        .ok_or_else(|| AppError::malformed("position", "implied value overflows"))?,
                ),
                None => None,
            }
        }
    };

    let avg_price = parse_decimal(raw.avg_price.as_ref()).filter(|p| *p > Decimal::ZERO);
    if avg_price.is_some_and(|p| size.checked_mul(p).is_none()) {
        return Err(AppError::malformed("position", "cost basis overflows"));
    }

    Ok(WalletPosition {
        wallet: wallet.to_lowercase(),
        market_id,
        outcome: parse_outcome(raw.outcome.as_deref(), raw.outcome_index.as_ref()),
        size,
        avg_price,
        value_usd,
        first_seen: parse_timestamp(raw.first_seen.as_ref())
            .or_else(|| parse_timestamp(raw.created_at.as_ref())),
    })
}

// ---------------------------------------------------------------------------
// Field parsers
// ---------------------------------------------------------------------------

/// Decimal from a JSON number or a numeric string. Anything else is `None`.
pub fn parse_decimal(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else {
                Decimal::from_str(&n.to_string())
                    .or_else(|_| Decimal::from_scientific(&n.to_string()))
                    .ok()
            }
        }
        Value::String(s) => {
            let s = s.trim();
            Decimal::from_str(s).or_else(|_| Decimal::from_scientific(s)).ok()
        }
        _ => None,
    }
}

/// Timestamp from unix seconds or milliseconds (number or digit string),
/// RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS`, or a bare date at midnight UTC.
pub fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::Number(n) => n.as_i64().and_then(from_unix),
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<i64>() {
        return from_unix(secs);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn from_unix(value: i64) -> Option<DateTime<Utc>> {
    if value.abs() >= UNIX_MILLIS_CUTOFF {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}

/// A JSON array, or a string holding one (Gamma stringifies its arrays).
fn parse_list(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn parse_outcome(label: Option<&str>, index: Option<&Value>) -> Outcome {
    let from_label = label.map(Outcome::from_label).unwrap_or(Outcome::Unknown);
    if from_label != Outcome::Unknown {
        return from_label;
    }
    index
        .and_then(Value::as_u64)
        .map(Outcome::from_index)
        .unwrap_or(Outcome::Unknown)
}

fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_empty(Some(s.clone())),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
