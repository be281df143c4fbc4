use std::collections::BTreeMap;
use std::path::Path;

use futures_util::stream::{self, StreamExt};
use serde_json::Value;

use crate::config::HoldersConfig;
use crate::ingestion::normalizer::normalize_snapshot;
use crate::ingestion::pipeline::{rank_markets, RunContext};
use crate::polymarket::types::RawSnapshot;
use crate::polymarket::{DataClient, GammaClient};

/// Gamma caps a page at this many markets.
const GAMMA_PAGE_SIZE: u32 = 100;

/// Trades requested per market when holders come back empty, as a multiple
/// of the holder row budget.
const TRADES_FALLBACK_FACTOR: usize = 5;

/// Read a raw snapshot file for an offline, reproducible run.
pub async fn load_snapshot(path: &Path) -> anyhow::Result<RawSnapshot> {
    let bytes = tokio::fs::read(path).await?;
    let snapshot: RawSnapshot = serde_json::from_slice(&bytes)?;

    tracing::info!(
        path = %path.display(),
        markets = snapshot.markets.len(),
        trades = snapshot.trades.len(),
        positions = snapshot.positions.len(),
        "Snapshot loaded"
    );

    Ok(snapshot)
}

/// Pull markets from Gamma, pick the holder targets the engine will measure
/// coverage over, and fetch their holders (or trades when no holders come back).
pub async fn collect_live(
    ctx: &RunContext,
    gamma: &GammaClient,
    data: &DataClient,
    max_markets: u32,
) -> anyhow::Result<RawSnapshot> {
    let markets = fetch_markets(gamma, max_markets).await?;

    let preview = normalize_snapshot(&RawSnapshot {
        markets: markets.clone(),
        ..Default::default()
    });
    let ranking = rank_markets(ctx, &preview.markets);

    let holders = &ctx.config.holders;
    let targets: Vec<HolderTarget> = ranking
        .holder_targets(holders.max_markets_to_fetch)
        .into_iter()
        .map(|m| HolderTarget {
            market_id: m.market_id().to_string(),
            lookup_ids: m.market.lookup_ids().into_iter().map(String::from).collect(),
        })
        .collect();

    tracing::info!(
        targets = targets.len(),
        concurrency = holders.concurrency,
        "Fetching holders"
    );

    let mut fetches: Vec<HolderFetch> = stream::iter(targets)
        .map(|target| fetch_holders(data, target, holders))
        .buffer_unordered(holders.concurrency)
        .collect()
        .await;
    fetches.sort_by(|a, b| a.market_id.cmp(&b.market_id));

    let mut snapshot = RawSnapshot {
        markets,
        ..Default::default()
    };
    let mut holders_fetched = BTreeMap::new();
    for fetch in fetches {
        holders_fetched.insert(fetch.market_id, fetch.succeeded);
        snapshot.positions.extend(fetch.positions);
        snapshot.trades.extend(fetch.trades);
    }
    snapshot.holders_fetched = holders_fetched;

    Ok(snapshot)
}

/// Page through Gamma until `max_markets` or the last page. A failure on the
/// first page is fatal; a later one ends pagination with what was fetched.
async fn fetch_markets(gamma: &GammaClient, max_markets: u32) -> anyhow::Result<Vec<Value>> {
    let mut markets: Vec<Value> = Vec::new();
    let mut offset: u32 = 0;

    while offset < max_markets {
        let limit = GAMMA_PAGE_SIZE.min(max_markets - offset);
        match gamma.get_markets(limit, offset).await {
            Ok(page) => {
                let batch_len = page.len();
                markets.extend(page);
                if batch_len < limit as usize {
                    break;
                }
                offset += limit;
            }
            Err(e) if offset == 0 => return Err(e.into()),
            Err(e) => {
                tracing::error!(error = %e, offset, "Failed to fetch markets page, continuing with partial set");
                break;
            }
        }
    }

    tracing::info!(markets = markets.len(), "Markets fetched from Gamma");
    Ok(markets)
}

struct HolderTarget {
    market_id: String,
    /// Condition id first, then market id.
    lookup_ids: Vec<String>,
}

struct HolderFetch {
    market_id: String,
    succeeded: bool,
    positions: Vec<Value>,
    trades: Vec<Value>,
}

async fn fetch_holders(data: &DataClient, target: HolderTarget, config: &HoldersConfig) -> HolderFetch {
    let mut fetch = HolderFetch {
        market_id: target.market_id,
        succeeded: false,
        positions: Vec::new(),
        trades: Vec::new(),
    };

    for id in &target.lookup_ids {
        match data.get_holders(id, config.top_n).await {
            Ok(groups) => {
                let rows: Vec<Value> = groups.into_iter().flat_map(|g| g.holders).collect();
                if !rows.is_empty() {
                    tracing::debug!(market_id = %fetch.market_id, identifier = %id, rows = rows.len(), "Holders fetched");
                    fetch.positions = rows
                        .into_iter()
                        .map(|row| tag_market(row, &fetch.market_id))
                        .collect();
                    fetch.succeeded = true;
                    return fetch;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, market_id = %fetch.market_id, identifier = %id, "Holders request failed");
            }
        }
    }

    for id in &target.lookup_ids {
        match data.get_trades(id, config.top_n * TRADES_FALLBACK_FACTOR).await {
            Ok(trades) if !trades.is_empty() => {
                tracing::info!(
                    market_id = %fetch.market_id,
                    trades = trades.len(),
                    "No holders returned, using trades-derived exposure"
                );
                fetch.trades = trades;
                fetch.succeeded = true;
                return fetch;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, market_id = %fetch.market_id, identifier = %id, "Trades request failed");
            }
        }
    }

    tracing::warn!(market_id = %fetch.market_id, "No holder data for market");
    fetch
}

/// Point a holder row at the canonical market id. Other market keys are
/// dropped so the row has exactly one.
fn tag_market(mut row: Value, market_id: &str) -> Value {
    if let Value::Object(map) = &mut row {
        map.remove("conditionId");
        map.remove("market_id");
        map.insert("market".into(), Value::String(market_id.to_string()));
    }
    row
}
