use serde::{Deserialize, Serialize};

use super::{ClusterKey, Market};
use crate::intelligence::holder_signals::HolderSignals;
use crate::intelligence::scorer::ScoreBreakdown;

/// A market tagged with its cluster and score for this run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMarket {
    pub market: Market,
    pub cluster_key: ClusterKey,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

impl ScoredMarket {
    pub fn market_id(&self) -> &str {
        &self.market.market_id
    }
}

/// A market admitted into the top list or the watchlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedMarket {
    /// 1-based position within its list.
    pub rank: usize,
    /// How many markets of this cluster the list held once this one was admitted.
    pub cluster_count: usize,
    #[serde(flatten)]
    pub scored: ScoredMarket,
    /// Filled in after selection from the holder rows of this snapshot.
    #[serde(default)]
    pub holder_signals: HolderSignals,
}
