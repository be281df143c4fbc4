use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use polyinsider::config::EngineConfig;
use polyinsider::ingestion::NormalizedSnapshot;
use polyinsider::models::{Market, Outcome, WalletPosition};

/// Fresh in-memory database with all migrations applied. One connection,
/// since every in-memory connection is its own database.
#[allow(dead_code)]
pub async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

#[allow(dead_code)]
pub fn as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

#[allow(dead_code)]
pub fn engine_config() -> EngineConfig {
    EngineConfig::default()
}

/// An open market closing in two days, priced at 0.50 / 0.50.
#[allow(dead_code)]
pub fn make_market(id: &str, event: &str, volume: i64, liquidity: i64) -> Market {
    let mut market = Market::new(id);
    market.event_id = Some(event.to_string());
    market.question = Some(format!("Question for {id}?"));
    market.volume_usd = Some(Decimal::from(volume));
    market.liquidity_usd = Some(Decimal::from(liquidity));
    market.last_price = Some(Decimal::new(50, 2));
    market.outcome_prices = vec![Decimal::new(50, 2), Decimal::new(50, 2)];
    market.close_time = Some(as_of() + Duration::days(2));
    market.active = Some(true);
    market
}

#[allow(dead_code)]
pub fn make_position(wallet: &str, market: &str, value: Option<i64>) -> WalletPosition {
    WalletPosition {
        wallet: wallet.to_string(),
        market_id: market.to_string(),
        outcome: Outcome::Yes,
        size: Decimal::from(100),
        avg_price: None,
        value_usd: value.map(Decimal::from),
        first_seen: None,
    }
}

#[allow(dead_code)]
pub fn make_snapshot(
    markets: Vec<Market>,
    positions: Vec<WalletPosition>,
    holders_fetched: &[(&str, bool)],
) -> NormalizedSnapshot {
    NormalizedSnapshot {
        markets,
        positions,
        holders_fetched: holders_fetched
            .iter()
            .map(|(id, ok)| (id.to_string(), *ok))
            .collect::<BTreeMap<_, _>>(),
        ..Default::default()
    }
}

/// A raw snapshot in the shape the Gamma and Data APIs return.
#[allow(dead_code)]
pub fn raw_snapshot_json() -> Value {
    json!({
        "markets": [
            {
                "id": "501",
                "conditionId": "0xaaa",
                "question": "Will the Fed cut rates in March?",
                "slug": "fed-cut-march-2026-03-18",
                "events": [{ "id": 9001, "slug": "fed-march" }],
                "volume": "250000.5",
                "liquidityNum": 40000,
                "lastTradePrice": 0.62,
                "outcomePrices": "[\"0.62\", \"0.38\"]",
                "endDate": "2026-03-18T18:00:00Z",
                "createdAt": "2026-01-10T00:00:00Z",
                "active": true,
                "closed": false
            },
            {
                "id": "502",
                "conditionId": "0xbbb",
                "question": "Will BTC close above 120k?",
                "slug": "btc-above-120k-2026-03-05",
                "volume": 90000,
                "liquidity": "12000",
                "lastTradePrice": "0.31",
                "outcomePrices": ["0.31", "0.69"],
                "endDateIso": "2026-03-05",
                "active": true
            },
            {
                "id": "501",
                "question": "duplicate of the first market"
            },
            {
                "question": "no identifier at all"
            },
            {
                "id": "503",
                "conditionId": "0xccc",
                "question": "Already resolved?",
                "volume": 999999,
                "closed": true
            }
        ],
        "trades": [
            {
                "proxyWallet": "0xTRADER",
                "conditionId": "0xbbb",
                "side": "BUY",
                "size": "200",
                "price": "0.25",
                "outcome": "Yes",
                "timestamp": 1772362800
            },
            {
                "proxyWallet": "0xtrader",
                "side": "BUY",
                "size": 5,
                "timestamp": 1772362800
            }
        ],
        "positions": [
            { "proxyWallet": "0xholder", "market": "0xaaa", "amount": 1000, "outcomeIndex": 0 },
            { "proxyWallet": "0xholder", "market": "0xbbb", "amount": "300", "outcomeIndex": 1, "currentValue": 207 },
            { "proxyWallet": "0xnull", "market": "0xzzz", "amount": 10 },
            { "market": "0xaaa", "amount": 10 }
        ],
        "holders_fetched": { "501": true, "502": false }
    })
}
