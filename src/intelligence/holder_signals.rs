use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::HolderThresholds;
use crate::models::{ScoredMarket, WalletPosition};

/// Who holds a kept market, summarised against the exposure thresholds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderSignals {
    /// Distinct wallets holding the market.
    pub holders: usize,
    pub conviction_wallets: usize,
    pub conviction_wallets_usd: usize,
    pub conviction_wallets_shares: usize,
    pub whale_wallets: usize,
    pub whale_wallets_usd: usize,
    pub whale_wallets_shares: usize,
    pub new_wallets: usize,
    /// At least `convergence_min_wallets` conviction holders.
    pub convergence: bool,
}

/// One wallet's holding in one market, all outcomes combined.
#[derive(Default)]
struct Holding {
    value_usd: Option<Decimal>,
    shares: Decimal,
    first_seen: Option<DateTime<Utc>>,
}

/// Holder signals for every kept market that has at least one holder row,
/// keyed by canonical market id.
pub fn holder_signals(
    positions: &[WalletPosition],
    kept: &HashMap<&str, &ScoredMarket>,
    run_date: NaiveDate,
    thresholds: &HolderThresholds,
) -> BTreeMap<String, HolderSignals> {
    let mut holdings: BTreeMap<&str, BTreeMap<&str, Holding>> = BTreeMap::new();

    for position in positions {
        let Some(market) = kept.get(position.market_id.as_str()) else {
            continue;
        };
        let holding = holdings
            .entry(market.market_id())
            .or_default()
            .entry(position.wallet.as_str())
            .or_default();

        if let Some(value) = position.value_usd {
            holding.value_usd = Some(holding.value_usd.unwrap_or(Decimal::ZERO).saturating_add(value));
        }
        holding.shares = holding.shares.saturating_add(position.size);
        holding.first_seen = match (holding.first_seen, position.first_seen) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }

    holdings
        .into_iter()
        .map(|(market_id, wallets)| {
            let signals = summarise(wallets.values(), run_date, thresholds);
            (market_id.to_string(), signals)
        })
        .collect()
}

fn summarise<'a>(
    holdings: impl Iterator<Item = &'a Holding>,
    run_date: NaiveDate,
    t: &HolderThresholds,
) -> HolderSignals {
    let mut s = HolderSignals::default();

    for holding in holdings {
        s.holders += 1;

        // USD when the rows carried a value, shares otherwise
        match holding.value_usd {
            Some(value) => {
                if value >= t.conviction_exposure_usd {
                    s.conviction_wallets_usd += 1;
                }
                if value >= t.whale_exposure_usd {
                    s.whale_wallets_usd += 1;
                }
            }
            None => {
                if holding.shares >= t.conviction_exposure_shares {
                    s.conviction_wallets_shares += 1;
                }
                if holding.shares >= t.whale_exposure_shares {
                    s.whale_wallets_shares += 1;
                }
            }
        }

        let is_new = holding
            .first_seen
            .is_some_and(|seen| (run_date - seen.date_naive()).num_days() <= t.new_wallet_days);
        if is_new {
            s.new_wallets += 1;
        }
    }

    s.conviction_wallets = s.conviction_wallets_usd + s.conviction_wallets_shares;
    s.whale_wallets = s.whale_wallets_usd + s.whale_wallets_shares;
    s.convergence = s.conviction_wallets >= t.convergence_min_wallets;
    s
}
