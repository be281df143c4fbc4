use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::scorer::recency_decay;
use crate::config::{WalletConfig, WalletFilters};
use crate::models::{ClusterKey, Outcome, ScoredMarket, Side, Trade, WalletPosition, WalletProfile};

/// A wallet concentrated in at most this many clusters can be flagged as a
/// concentrated event trader.
pub const MAX_CONCENTRATED_CLUSTERS: usize = 3;

/// Wallet classification categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletClass {
    /// Spread across events with a plausible informed pattern.
    SignalCandidate,
    /// Most of its value sits on one event family. Excluded from signals.
    ConcentratedEventTrader,
}

impl WalletClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletClass::SignalCandidate => "signal_candidate",
            WalletClass::ConcentratedEventTrader => "concentrated_event_trader",
        }
    }
}

impl fmt::Display for WalletClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a scored wallet profile.
///
/// Rules:
/// - **ConcentratedEventTrader**: concentration ratio ≥ `threshold` and
///   at most `MAX_CONCENTRATED_CLUSTERS` distinct clusters.
/// - **SignalCandidate**: everything else.
pub fn classify(profile: &WalletProfile, threshold: Decimal) -> WalletClass {
    if profile.concentration_ratio >= threshold
        && profile.clusters_count <= MAX_CONCENTRATED_CLUSTERS
    {
        WalletClass::ConcentratedEventTrader
    } else {
        WalletClass::SignalCandidate
    }
}

/// Why a profiled wallet fails the quality screen. Annotation only: a
/// wallet keeps its class whatever its reasons are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletFilterReason {
    MinTotalUsd,
    MinMarkets,
    MinClusters,
    MaxTopClusterShare,
    MaxTopMarketShare,
    MaxHhiClusters,
    MaxSidedness,
}

impl WalletFilterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletFilterReason::MinTotalUsd => "min_total_usd",
            WalletFilterReason::MinMarkets => "min_markets",
            WalletFilterReason::MinClusters => "min_clusters",
            WalletFilterReason::MaxTopClusterShare => "max_top_cluster_share",
            WalletFilterReason::MaxTopMarketShare => "max_top_market_share",
            WalletFilterReason::MaxHhiClusters => "max_hhi_clusters",
            WalletFilterReason::MaxSidedness => "max_sidedness",
        }
    }
}

impl fmt::Display for WalletFilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every screen the profile fails, in declaration order. Empty means the
/// wallet passes.
pub fn wallet_filter_reasons(profile: &WalletProfile, filters: &WalletFilters) -> Vec<WalletFilterReason> {
    let mut reasons = Vec::new();

    if profile.total_usd < filters.min_total_usd {
        reasons.push(WalletFilterReason::MinTotalUsd);
    }
    if profile.markets_count < filters.min_markets {
        reasons.push(WalletFilterReason::MinMarkets);
    }
    if profile.clusters_count < filters.min_clusters {
        reasons.push(WalletFilterReason::MinClusters);
    }
    if profile.concentration_ratio > filters.max_top_cluster_share {
        reasons.push(WalletFilterReason::MaxTopClusterShare);
    }
    if profile.top_market_share > filters.max_top_market_share {
        reasons.push(WalletFilterReason::MaxTopMarketShare);
    }
    if profile.hhi_clusters > filters.max_hhi_clusters {
        reasons.push(WalletFilterReason::MaxHhiClusters);
    }
    if profile.sidedness > filters.max_sidedness {
        reasons.push(WalletFilterReason::MaxSidedness);
    }

    reasons
}

/// Result of classifying every wallet active in the kept markets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletClassification {
    /// Ordered by signal score desc, then address asc.
    pub signal_candidates: Vec<WalletProfile>,
    /// Ordered by total value desc, then address asc.
    pub concentrated_event_traders: Vec<WalletProfile>,
    /// Wallets with no qualifying (valued, positive) entry.
    pub unscored: usize,
    /// Trades and positions that referenced markets outside the kept set.
    pub ignored_trades: usize,
    pub ignored_positions: usize,
}

/// Build and classify a profile for every wallet with activity in `kept`.
///
/// `kept` maps every identifier a record may use for a kept market
/// (market id and condition id) to that market.
pub fn build_profiles(
    trades: &[Trade],
    positions: &[WalletPosition],
    kept: &HashMap<&str, &ScoredMarket>,
    as_of: DateTime<Utc>,
    config: &WalletConfig,
) -> WalletClassification {
    let mut ignored_trades = 0usize;
    let mut ignored_positions = 0usize;

    // (wallet, canonical market id) -> exposure sources
    let mut exposures: BTreeMap<(&str, &str), Exposure<'_>> = BTreeMap::new();

    for position in positions {
        let Some(market) = kept.get(position.market_id.as_str()).copied() else {
            ignored_positions += 1;
            continue;
        };
        exposures
            .entry((position.wallet.as_str(), market.market_id()))
            .or_insert_with(|| Exposure::new(market))
            .positions
            .push(position);
    }

    for trade in trades {
        let Some(market) = kept.get(trade.market_id.as_str()).copied() else {
            ignored_trades += 1;
            continue;
        };
        exposures
            .entry((trade.wallet.as_str(), market.market_id()))
            .or_insert_with(|| Exposure::new(market))
            .trades
            .push(trade);
    }

    let mut by_wallet: BTreeMap<&str, Vec<Entry<'_>>> = BTreeMap::new();
    for ((wallet, _), exposure) in exposures {
        by_wallet
            .entry(wallet)
            .or_default()
            .push(exposure.into_entry(as_of, config.ranking.half_life_hours));
    }

    let wallets: Vec<(&str, Vec<Entry<'_>>)> = by_wallet.into_iter().collect();
    let profiles: Vec<Option<WalletProfile>> = wallets
        .par_iter()
        .map(|(address, entries)| profile_wallet(address, entries, config))
        .collect();

    let mut result = WalletClassification {
        ignored_trades,
        ignored_positions,
        ..Default::default()
    };

    for profile in profiles {
        match profile {
            None => result.unscored += 1,
            Some(p) if p.class == WalletClass::ConcentratedEventTrader => {
                result.concentrated_event_traders.push(p)
            }
            Some(p) => result.signal_candidates.push(p),
        }
    }

    result.signal_candidates.sort_by(|a, b| {
        b.signal_score
            .total_cmp(&a.signal_score)
            .then_with(|| a.address.cmp(&b.address))
    });
    result.concentrated_event_traders.sort_by(|a, b| {
        b.total_usd
            .cmp(&a.total_usd)
            .then_with(|| a.address.cmp(&b.address))
    });

    result
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Raw records behind one (wallet, market) exposure.
struct Exposure<'a> {
    market: &'a ScoredMarket,
    positions: Vec<&'a WalletPosition>,
    trades: Vec<&'a Trade>,
}

/// One (wallet, market) exposure reduced to the numbers profiling needs.
#[derive(Debug, Clone)]
struct Entry<'a> {
    market_id: &'a str,
    cluster: &'a ClusterKey,
    /// `None` when no record carried a price signal.
    value: Option<Decimal>,
    pnl: Option<Decimal>,
    yes_value: Decimal,
    no_value: Decimal,
    recency_weighted: f64,
}

impl Entry<'_> {
    fn qualifying_value(&self) -> Option<Decimal> {
        self.value.filter(|v| *v > Decimal::ZERO)
    }

    /// Fold one record into the entry. `false` when the running value or
    /// pnl no longer fits a `Decimal`.
    fn add(&mut self, value: Decimal, pnl: Option<Decimal>, yes: bool, no: bool, decay: f64) -> bool {
        let Some(total) = self.value.unwrap_or(Decimal::ZERO).checked_add(value) else {
            return false;
        };
        self.value = Some(total);
        if let Some(pnl) = pnl {
            let Some(sum) = self.pnl.unwrap_or(Decimal::ZERO).checked_add(pnl) else {
                return false;
            };
            self.pnl = Some(sum);
        }
        if yes {
            self.yes_value = self.yes_value.saturating_add(value);
        }
        if no {
            self.no_value = self.no_value.saturating_add(value);
        }
        self.recency_weighted += decimal_to_f64(value) * decay;
        true
    }
}

impl<'a> Exposure<'a> {
    fn new(market: &'a ScoredMarket) -> Self {
        Self {
            market,
            positions: Vec::new(),
            trades: Vec::new(),
        }
    }

    /// Positions win over trades while any of them carries a value; trades
    /// stand in when the wallet holds no valued position in the market.
    fn into_entry(self, as_of: DateTime<Utc>, half_life_hours: f64) -> Entry<'a> {
        let mut entry = Entry {
            market_id: self.market.market_id(),
            cluster: &self.market.cluster_key,
            value: None,
            pnl: None,
            yes_value: Decimal::ZERO,
            no_value: Decimal::ZERO,
            recency_weighted: 0.0,
        };

        let valued_positions: Vec<(&WalletPosition, Decimal)> = self
            .positions
            .iter()
            .filter_map(|p| p.value_usd.map(|v| (*p, v)))
            .collect();

        let overflowed = if !valued_positions.is_empty() {
            valued_positions.iter().any(|(position, value)| {
                let pnl = position.unrealized_pnl();
                let yes = position.outcome == Outcome::Yes;
                let no = position.outcome == Outcome::No;
                // current holdings are aged zero
                !entry.add(*value, pnl, yes, no, 1.0)
            })
        } else {
            let mark = self.market.market.last_price;
            self.trades.iter().any(|trade| {
                let Some(value) = trade.value_usd() else {
                    return false;
                };
                let pnl = mark.and_then(|m| trade.pnl_against(m));
                let (yes, no) = match (trade.side, trade.outcome) {
                    (Side::Buy, Outcome::Yes) | (Side::Sell, Outcome::No) => (true, false),
                    (Side::Buy, Outcome::No) | (Side::Sell, Outcome::Yes) => (false, true),
                    (_, Outcome::Unknown) => (false, false),
                };
                let decay = recency_decay(trade.timestamp, as_of, half_life_hours);
                !entry.add(value, pnl, yes, no, decay)
            })
        };

        if overflowed {
            tracing::debug!(market_id = entry.market_id, "Exposure total overflowed; entry left unvalued");
            entry.value = None;
            entry.pnl = None;
        }
        entry
    }
}

// ---------------------------------------------------------------------------
// Profile metrics
// ---------------------------------------------------------------------------

/// `None` when the wallet has no qualifying entry.
fn profile_wallet(
    address: &str,
    entries: &[Entry<'_>],
    config: &WalletConfig,
) -> Option<WalletProfile> {
    let ranking = &config.ranking;
    let qualifying: Vec<(&Entry<'_>, Decimal)> = entries
        .iter()
        .filter_map(|e| e.qualifying_value().map(|v| (e, v)))
        .collect();
    if qualifying.is_empty() {
        tracing::debug!(wallet = address, entries = entries.len(), "Wallet has no valued entries");
        return None;
    }

    let Some(total) = qualifying
        .iter()
        .try_fold(Decimal::ZERO, |acc, (_, v)| acc.checked_add(*v))
    else {
        tracing::debug!(wallet = address, "Wallet total overflowed; left unscored");
        return None;
    };

    let mut cluster_value: BTreeMap<&ClusterKey, Decimal> = BTreeMap::new();
    let mut cluster_pnl: BTreeMap<&ClusterKey, Decimal> = BTreeMap::new();
    let mut yes = Decimal::ZERO;
    let mut no = Decimal::ZERO;
    let mut recency_weighted_usd = 0.0;

    // every partial sum below is bounded by `total`, except pnl where only the sign matters
    for (entry, value) in &qualifying {
        let bucket = cluster_value.entry(entry.cluster).or_default();
        *bucket = bucket.saturating_add(*value);
        if let Some(pnl) = entry.pnl {
            let bucket = cluster_pnl.entry(entry.cluster).or_default();
            *bucket = bucket.saturating_add(pnl);
        }
        yes = yes.saturating_add(entry.yes_value);
        no = no.saturating_add(entry.no_value);
        recency_weighted_usd += entry.recency_weighted;
    }

    // ascending key walk + strict comparison => smallest key wins ties
    let (top_cluster, top_value) = cluster_value.iter().fold(
        (None::<&ClusterKey>, Decimal::ZERO),
        |(best, best_value), (key, value)| {
            if best.is_none() || *value > best_value {
                (Some(*key), *value)
            } else {
                (best, best_value)
            }
        },
    );
    let top_cluster = top_cluster?.clone();

    let top_market_value = qualifying
        .iter()
        .map(|(_, v)| *v)
        .max()
        .unwrap_or(Decimal::ZERO);

    let clusters_count = cluster_value.len();
    let winning_clusters = cluster_pnl.values().filter(|p| **p > Decimal::ZERO).count();
    let win_consistency = winning_clusters as f64 / clusters_count as f64;

    let hhi_clusters = hhi(cluster_value.values().copied(), total);
    let hhi_markets = hhi(qualifying.iter().map(|(_, v)| *v), total);
    let sidedness = sidedness(yes, no);

    let signal_score = ranking.w_win_consistency * win_consistency
        + ranking.w_position_sizing * recency_weighted_usd.max(0.0).ln_1p()
        + ranking.w_diversity * (1.0 - hhi_clusters)
        - ranking.w_sidedness_penalty * sidedness;

    let mut markets: Vec<&str> = qualifying.iter().map(|(e, _)| e.market_id).collect();
    markets.sort_unstable();
    markets.dedup();

    let mut profile = WalletProfile {
        address: address.to_string(),
        class: WalletClass::SignalCandidate,
        clusters: cluster_value.keys().map(|k| (*k).clone()).collect(),
        clusters_count,
        markets_count: markets.len(),
        total_usd: total,
        top_cluster,
        concentration_ratio: top_value / total,
        top_market_share: decimal_to_f64(top_market_value / total),
        hhi_clusters,
        hhi_markets,
        sidedness,
        win_consistency,
        recency_weighted_usd,
        signal_score,
        qualifying_entries: qualifying.len(),
        excluded_null_entries: entries.len() - qualifying.len(),
        filter_reasons: Vec::new(),
    };
    profile.class = classify(&profile, config.concentration_threshold);
    profile.filter_reasons = wallet_filter_reasons(&profile, &config.filters);
    Some(profile)
}

/// Herfindahl index of the value shares. 1.0 means a single bucket.
fn hhi(values: impl Iterator<Item = Decimal>, total: Decimal) -> f64 {
    if total <= Decimal::ZERO {
        return 0.0;
    }
    values
        .map(|v| {
            let share = decimal_to_f64(v / total);
            share * share
        })
        .sum()
}

/// `|yes_share - 0.5| * 2`: 0 for balanced or unknown, 1 for one-sided.
fn sidedness(yes: Decimal, no: Decimal) -> f64 {
    let sided = yes + no;
    if sided <= Decimal::ZERO {
        return 0.0;
    }
    let yes_share = decimal_to_f64(yes / sided);
    (yes_share - 0.5).abs() * 2.0
}

fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::intelligence::scorer::ScoreBreakdown;
    use crate::models::Market;
    use chrono::{Duration, TimeZone};

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn wallet_config() -> WalletConfig {
        EngineConfig::default().wallets
    }

    fn make_scored(id: &str, cluster: &str) -> ScoredMarket {
        let mut market = Market::new(id);
        market.last_price = Some(Decimal::new(60, 2));
        ScoredMarket {
            market,
            cluster_key: ClusterKey::new(cluster),
            score: 1.0,
            breakdown: ScoreBreakdown::default(),
        }
    }

    fn make_position(wallet: &str, market: &str, value: Option<i64>) -> WalletPosition {
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

    fn make_trade(wallet: &str, market: &str, side: Side, price: Option<Decimal>) -> Trade {
        make_trade_at(wallet, market, side, price, as_of() - Duration::hours(1))
    }

    fn make_trade_at(
        wallet: &str,
        market: &str,
        side: Side,
        price: Option<Decimal>,
        timestamp: DateTime<Utc>,
    ) -> Trade {
        Trade {
            wallet: wallet.to_string(),
            market_id: market.to_string(),
            side,
            size: Decimal::from(100),
            price,
            outcome: Outcome::Yes,
            timestamp,
        }
    }

    fn make_position_with_entry(wallet: &str, market: &str, value: i64, avg_price: Decimal) -> WalletPosition {
        WalletPosition {
            avg_price: Some(avg_price),
            ..make_position(wallet, market, Some(value))
        }
    }

    fn profile<'a>(result: &'a WalletClassification, address: &str) -> &'a WalletProfile {
        result
            .signal_candidates
            .iter()
            .chain(result.concentrated_event_traders.iter())
            .find(|p| p.address == address)
            .unwrap()
    }

    fn index(markets: &[ScoredMarket]) -> HashMap<&str, &ScoredMarket> {
        markets.iter().map(|m| (m.market_id(), m)).collect()
    }

    #[test]
    fn test_null_entry_excluded_from_ratio() {
        // $100 in X plus a null-valued entry in Y
        let markets = vec![make_scored("x1", "event:X"), make_scored("y1", "event:Y")];
        let positions = vec![
            make_position("0xw", "x1", Some(100)),
            make_position("0xw", "y1", None),
        ];
        let result = build_profiles(&[], &positions, &index(&markets), as_of(), &wallet_config());

        assert!(result.signal_candidates.is_empty());
        let wallet = &result.concentrated_event_traders[0];
        assert_eq!(wallet.concentration_ratio, Decimal::ONE);
        assert_eq!(wallet.clusters_count, 1);
        assert_eq!(wallet.excluded_null_entries, 1);
        assert_eq!(wallet.class, WalletClass::ConcentratedEventTrader);
    }

    #[test]
    fn test_spread_wallet_is_candidate() {
        let markets: Vec<ScoredMarket> = (0..5)
            .map(|i| make_scored(&format!("m{i}"), &format!("event:E{i}")))
            .collect();
        let positions: Vec<WalletPosition> = (0..5)
            .map(|i| make_position("0xw", &format!("m{i}"), Some(100)))
            .collect();
        let result = build_profiles(&[], &positions, &index(&markets), as_of(), &wallet_config());

        let wallet = &result.signal_candidates[0];
        assert_eq!(wallet.concentration_ratio, Decimal::new(2, 1));
        assert!((wallet.hhi_clusters - 0.2).abs() < 1e-12);
        assert_eq!(wallet.class, WalletClass::SignalCandidate);
    }

    #[test]
    fn test_many_clusters_never_concentrated() {
        // 90% in one cluster but four clusters overall
        let markets = vec![
            make_scored("a", "k1"),
            make_scored("b", "k2"),
            make_scored("c", "k3"),
            make_scored("d", "k4"),
        ];
        let positions = vec![
            make_position("0xw", "a", Some(900)),
            make_position("0xw", "b", Some(40)),
            make_position("0xw", "c", Some(30)),
            make_position("0xw", "d", Some(30)),
        ];
        let result = build_profiles(&[], &positions, &index(&markets), as_of(), &wallet_config());
        assert_eq!(result.signal_candidates.len(), 1);
        assert_eq!(result.signal_candidates[0].concentration_ratio, Decimal::new(9, 1));
    }

    #[test]
    fn test_unvalued_wallet_is_unscored() {
        let markets = vec![make_scored("a", "k1")];
        let positions = vec![make_position("0xnull", "a", None)];
        let trades = vec![make_trade("0xnoprice", "a", Side::Buy, None)];
        let result = build_profiles(&trades, &positions, &index(&markets), as_of(), &wallet_config());

        assert_eq!(result.unscored, 2);
        assert!(result.signal_candidates.is_empty());
        assert!(result.concentrated_event_traders.is_empty());
    }

    #[test]
    fn test_outside_kept_ignored() {
        let markets = vec![make_scored("a", "k1")];
        let positions = vec![make_position("0xw", "elsewhere", Some(10))];
        let trades = vec![make_trade("0xw", "elsewhere", Side::Buy, Some(Decimal::ONE))];
        let result = build_profiles(&trades, &positions, &index(&markets), as_of(), &wallet_config());

        assert_eq!(result.ignored_positions, 1);
        assert_eq!(result.ignored_trades, 1);
        assert_eq!(result.unscored, 0);
    }

    #[test]
    fn test_trades_used_without_position() {
        let markets = vec![make_scored("a", "k1")];
        // bought at 0.40, market now 0.60: a win
        let trades = vec![make_trade("0xw", "a", Side::Buy, Some(Decimal::new(40, 2)))];
        let result = build_profiles(&trades, &[], &index(&markets), as_of(), &wallet_config());

        let wallet = &result.concentrated_event_traders[0];
        assert_eq!(wallet.total_usd, Decimal::from(40));
        assert_eq!(wallet.win_consistency, 1.0);
        assert_eq!(wallet.sidedness, 1.0);
    }

    #[test]
    fn test_position_preferred_over_trades() {
        let markets = vec![make_scored("a", "k1")];
        let positions = vec![make_position("0xw", "a", Some(75))];
        let trades = vec![make_trade("0xw", "a", Side::Buy, Some(Decimal::new(40, 2)))];
        let result = build_profiles(&trades, &positions, &index(&markets), as_of(), &wallet_config());

        let wallet = &result.concentrated_event_traders[0];
        assert_eq!(wallet.total_usd, Decimal::from(75));
        assert_eq!(wallet.qualifying_entries, 1);
    }

    #[test]
    fn test_score_monotonic_in_sizing() {
        let markets: Vec<ScoredMarket> = (0..4)
            .map(|i| make_scored(&format!("m{i}"), &format!("k{i}")))
            .collect();
        let small: Vec<WalletPosition> = (0..4)
            .map(|i| make_position("0xsmall", &format!("m{i}"), Some(10)))
            .collect();
        let large: Vec<WalletPosition> = (0..4)
            .map(|i| make_position("0xlarge", &format!("m{i}"), Some(10_000)))
            .collect();
        let positions: Vec<WalletPosition> = small.into_iter().chain(large).collect();

        let result = build_profiles(&[], &positions, &index(&markets), as_of(), &wallet_config());
        let order: Vec<&str> = result.signal_candidates.iter().map(|p| p.address.as_str()).collect();
        assert_eq!(order, vec!["0xlarge", "0xsmall"]);
    }

    #[test]
    fn test_top_cluster_tie_takes_smallest_key() {
        let markets = vec![make_scored("a", "k2"), make_scored("b", "k1")];
        let positions = vec![
            make_position("0xw", "a", Some(50)),
            make_position("0xw", "b", Some(50)),
        ];
        let result = build_profiles(&[], &positions, &index(&markets), as_of(), &wallet_config());
        let wallet = result
            .signal_candidates
            .first()
            .or(result.concentrated_event_traders.first())
            .unwrap();
        assert_eq!(wallet.top_cluster.as_str(), "k1");
        assert_eq!(wallet.concentration_ratio, Decimal::new(5, 1));
    }

    #[test]
    fn test_partition_is_complete() {
        let markets: Vec<ScoredMarket> = (0..6)
            .map(|i| make_scored(&format!("m{i}"), &format!("k{}", i % 3)))
            .collect();
        let mut positions = Vec::new();
        for w in 0..30 {
            for m in 0..6 {
                if (w + m) % 4 == 0 {
                    continue;
                }
                let value = if (w * m) % 5 == 0 { None } else { Some((w * 13 + m * 7) as i64) };
                positions.push(make_position(&format!("0x{w:02}"), &format!("m{m}"), value));
            }
        }
        let result = build_profiles(&[], &positions, &index(&markets), as_of(), &wallet_config());

        let total = result.signal_candidates.len()
            + result.concentrated_event_traders.len()
            + result.unscored;
        assert_eq!(total, 30);
    }

    #[test]
    fn test_profiles_deterministic() {
        let markets: Vec<ScoredMarket> = (0..3)
            .map(|i| make_scored(&format!("m{i}"), &format!("k{i}")))
            .collect();
        let positions: Vec<WalletPosition> = (0..20)
            .map(|i| make_position(&format!("0x{i:02}"), &format!("m{}", i % 3), Some(i * 10 + 5)))
            .collect();
        let first = build_profiles(&[], &positions, &index(&markets), as_of(), &wallet_config());
        for _ in 0..5 {
            let again = build_profiles(&[], &positions, &index(&markets), as_of(), &wallet_config());
            assert_eq!(again, first);
        }
    }


    #[test]
    fn test_score_monotonic_in_win_consistency() {
        let markets = vec![make_scored("a", "k1"), make_scored("b", "k2")];
        // 100 shares worth $100: entry at 0.50 is a win, at 1.50 a loss
        let positions = vec![
            make_position_with_entry("0xsteady", "a", 100, Decimal::new(5, 1)),
            make_position_with_entry("0xsteady", "b", 100, Decimal::new(5, 1)),
            make_position_with_entry("0xmixed", "a", 100, Decimal::new(5, 1)),
            make_position_with_entry("0xmixed", "b", 100, Decimal::new(15, 1)),
        ];
        let result = build_profiles(&[], &positions, &index(&markets), as_of(), &wallet_config());

        let order: Vec<&str> = result.signal_candidates.iter().map(|p| p.address.as_str()).collect();
        assert_eq!(order, vec!["0xsteady", "0xmixed"]);
        assert_eq!(result.signal_candidates[0].win_consistency, 1.0);
        assert_eq!(result.signal_candidates[1].win_consistency, 0.5);
        // nothing but win consistency differs
        assert_eq!(result.signal_candidates[0].hhi_clusters, result.signal_candidates[1].hhi_clusters);
        assert_eq!(
            result.signal_candidates[0].recency_weighted_usd,
            result.signal_candidates[1].recency_weighted_usd
        );
    }

    #[test]
    fn test_older_trades_weigh_less() {
        let markets = vec![make_scored("a", "k1")];
        let price = Some(Decimal::new(40, 2));
        let trades = vec![
            make_trade_at("0xfresh", "a", Side::Buy, price, as_of() - Duration::hours(1)),
            make_trade_at("0xstale", "a", Side::Buy, price, as_of() - Duration::days(30)),
        ];
        let result = build_profiles(&trades, &[], &index(&markets), as_of(), &wallet_config());

        let fresh = profile(&result, "0xfresh");
        let stale = profile(&result, "0xstale");
        assert_eq!(fresh.total_usd, stale.total_usd);
        assert!(fresh.recency_weighted_usd > stale.recency_weighted_usd);
        assert!(fresh.signal_score > stale.signal_score);
    }

    #[test]
    fn test_unvalued_position_falls_back_to_trades() {
        let markets = vec![make_scored("a", "k1")];
        let positions = vec![make_position("0xw", "a", None)];
        let trades = vec![make_trade("0xw", "a", Side::Buy, Some(Decimal::new(40, 2)))];
        let result = build_profiles(&trades, &positions, &index(&markets), as_of(), &wallet_config());

        assert_eq!(result.unscored, 0);
        let wallet = profile(&result, "0xw");
        assert_eq!(wallet.total_usd, Decimal::from(40));
        assert_eq!(wallet.excluded_null_entries, 0);
    }

    #[test]
    fn test_overflowing_exposure_is_unscored_not_a_panic() {
        let markets = vec![make_scored("a", "k1"), make_scored("b", "k2")];
        let mut huge_trade = make_trade("0xtrade", "a", Side::Buy, Some(Decimal::from(2)));
        huge_trade.size = Decimal::MAX;
        // each position fits, their sum does not
        let positions = vec![
            WalletPosition {
                value_usd: Some(Decimal::MAX),
                ..make_position("0xsum", "a", None)
            },
            WalletPosition {
                value_usd: Some(Decimal::MAX),
                ..make_position("0xsum", "b", None)
            },
            WalletPosition {
                size: Decimal::MAX,
                avg_price: Some(Decimal::from(2)),
                ..make_position("0xbasis", "a", Some(100))
            },
        ];
        let result = build_profiles(&[huge_trade], &positions, &index(&markets), as_of(), &wallet_config());

        assert_eq!(result.unscored, 2);
        // pnl is unknown but the value still counts
        let basis = profile(&result, "0xbasis");
        assert_eq!(basis.total_usd, Decimal::from(100));
        assert_eq!(basis.win_consistency, 0.0);
    }

    #[test]
    fn test_filter_reasons_annotate_without_reclassifying() {
        let markets: Vec<ScoredMarket> = (0..4)
            .map(|i| make_scored(&format!("m{i}"), &format!("k{}", i % 2)))
            .collect();
        let no = |p: WalletPosition| WalletPosition {
            outcome: Outcome::No,
            ..p
        };
        // balanced Yes/No so sidedness stays out of the way
        let mut positions: Vec<WalletPosition> = (0..4)
            .map(|i| {
                let p = make_position("0xbroad", &format!("m{i}"), Some(2_000));
                if i < 2 { p } else { no(p) }
            })
            .collect();
        positions.push(make_position("0xsmall", "m0", Some(50)));
        positions.push(no(make_position("0xsmall", "m1", Some(50))));
        let result = build_profiles(&[], &positions, &index(&markets), as_of(), &wallet_config());

        let broad = profile(&result, "0xbroad");
        assert!(broad.passes_filters(), "{:?}", broad.filter_reasons);

        let small = profile(&result, "0xsmall");
        assert_eq!(small.class, WalletClass::SignalCandidate);
        assert_eq!(
            small.filter_reasons,
            vec![WalletFilterReason::MinTotalUsd, WalletFilterReason::MinMarkets]
        );
    }

    #[test]
    fn test_one_sided_wallet_flagged() {
        let mut profile = WalletProfile {
            address: "0xw".into(),
            class: WalletClass::SignalCandidate,
            clusters: vec![ClusterKey::new("k1"), ClusterKey::new("k2"), ClusterKey::new("k3")],
            clusters_count: 3,
            markets_count: 3,
            total_usd: Decimal::from(9_000),
            top_cluster: ClusterKey::new("k1"),
            concentration_ratio: Decimal::new(4, 1),
            top_market_share: 0.4,
            hhi_clusters: 0.34,
            hhi_markets: 0.34,
            sidedness: 1.0,
            win_consistency: 1.0,
            recency_weighted_usd: 9_000.0,
            signal_score: 0.0,
            qualifying_entries: 3,
            excluded_null_entries: 0,
            filter_reasons: Vec::new(),
        };
        let filters = wallet_config().filters;
        assert_eq!(wallet_filter_reasons(&profile, &filters), vec![WalletFilterReason::MaxSidedness]);

        profile.sidedness = 0.5;
        assert!(wallet_filter_reasons(&profile, &filters).is_empty());
    }

    #[test]
    fn test_sidedness_balanced_is_zero() {
        assert_eq!(sidedness(Decimal::from(50), Decimal::from(50)), 0.0);
        assert_eq!(sidedness(Decimal::ZERO, Decimal::ZERO), 0.0);
        assert_eq!(sidedness(Decimal::from(10), Decimal::ZERO), 1.0);
    }
}
