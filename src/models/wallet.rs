use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ClusterKey;
use crate::intelligence::classifier::{WalletClass, WalletFilterReason};

/// Per-run view of a wallet's activity across the kept markets.
/// Derived fresh each run; never stored as authoritative state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletProfile {
    pub address: String,
    pub class: WalletClass,
    /// Distinct clusters holding qualifying (non-null, positive) value.
    pub clusters: Vec<ClusterKey>,
    pub clusters_count: usize,
    pub markets_count: usize,
    pub total_usd: Decimal,
    pub top_cluster: ClusterKey,
    /// Value in `top_cluster` divided by `total_usd`.
    pub concentration_ratio: Decimal,
    pub top_market_share: f64,
    pub hhi_clusters: f64,
    pub hhi_markets: f64,
    pub sidedness: f64,
    pub win_consistency: f64,
    pub recency_weighted_usd: f64,
    pub signal_score: f64,
    pub qualifying_entries: usize,
    /// Entries with no USD value, left out of every ratio above.
    pub excluded_null_entries: usize,
    /// Quality screens the wallet fails; empty when it passes them all.
    #[serde(default)]
    pub filter_reasons: Vec<WalletFilterReason>,
}

impl WalletProfile {
    pub fn passes_filters(&self) -> bool {
        self.filter_reasons.is_empty()
    }
}
