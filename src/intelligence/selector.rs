use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::models::{ClusterKey, ScoredMarket, SelectedMarket};

/// Sizes and per-cluster caps for one selection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionLimits {
    pub top_n: usize,
    pub watchlist_size: usize,
    pub cap_top50: usize,
    pub cap_watchlist: usize,
    pub watchlist_disjoint: bool,
}

impl SelectionLimits {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            top_n: config.selection.top_n,
            watchlist_size: config.selection.watchlist_size,
            cap_top50: config.diversity.max_per_cluster_top50,
            cap_watchlist: config.diversity.max_per_cluster_watchlist,
            watchlist_disjoint: config.diversity.watchlist_disjoint,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub top50: Vec<SelectedMarket>,
    pub watchlist: Vec<SelectedMarket>,
    /// Requested top-list size minus admitted markets.
    pub top50_shortfall: usize,
    pub watchlist_shortfall: usize,
    /// Markets refused by the top list only because their cluster was full.
    pub cap_skipped: usize,
}

impl Selection {
    /// Distinct markets across both lists, top list first, in rank order.
    pub fn kept(&self) -> Vec<&ScoredMarket> {
        let mut seen: HashSet<&str> = HashSet::new();
        self.top50
            .iter()
            .chain(self.watchlist.iter())
            .map(|s| &s.scored)
            .filter(|m| seen.insert(m.market_id()))
            .collect()
    }
}

/// Total order used for ranking: score descending, market id ascending.
pub fn rank_order(a: &ScoredMarket, b: &ScoredMarket) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.market_id().cmp(b.market_id()))
}

/// Rank markets and admit them into the top list and the watchlist under
/// per-cluster caps. Lower-ranked markets from other clusters backfill the
/// slots a capped cluster cannot take; a shortfall is reported, never padded.
pub fn select(mut markets: Vec<ScoredMarket>, limits: SelectionLimits) -> Selection {
    markets.sort_by(rank_order);

    markets
        .into_iter()
        .fold(AdmissionState::default(), |state, market| state.admit(market, &limits))
        .finish(&limits)
}

// ---------------------------------------------------------------------------
// Admission fold
// ---------------------------------------------------------------------------

/// State threaded through the admission walk. Each list has its own
/// per-cluster counter map.
#[derive(Debug, Default)]
struct AdmissionState {
    top50: Vec<SelectedMarket>,
    watchlist: Vec<SelectedMarket>,
    top_counts: HashMap<ClusterKey, usize>,
    watch_counts: HashMap<ClusterKey, usize>,
    cap_skipped: usize,
}

impl AdmissionState {
    fn admit(mut self, market: ScoredMarket, limits: &SelectionLimits) -> Self {
        let mut promoted = false;

        if self.top50.len() < limits.top_n {
            match admit_under_cap(&mut self.top_counts, &market.cluster_key, limits.cap_top50) {
                Some(cluster_count) => {
                    self.top50.push(SelectedMarket {
                        rank: self.top50.len() + 1,
                        cluster_count,
                        scored: market.clone(),
                        holder_signals: Default::default(),
                    });
                    promoted = true;
                }
                None => self.cap_skipped += 1,
            }
        }

        let watch_eligible = !(promoted && limits.watchlist_disjoint);
        if watch_eligible && self.watchlist.len() < limits.watchlist_size {
            if let Some(cluster_count) =
                admit_under_cap(&mut self.watch_counts, &market.cluster_key, limits.cap_watchlist)
            {
                self.watchlist.push(SelectedMarket {
                    rank: self.watchlist.len() + 1,
                    cluster_count,
                    scored: market,
                    holder_signals: Default::default(),
                });
            }
        }

        self
    }

    fn finish(self, limits: &SelectionLimits) -> Selection {
        Selection {
            top50_shortfall: limits.top_n.saturating_sub(self.top50.len()),
            watchlist_shortfall: limits.watchlist_size.saturating_sub(self.watchlist.len()),
            top50: self.top50,
            watchlist: self.watchlist,
            cap_skipped: self.cap_skipped,
        }
    }
}

/// Bump the cluster's counter if it is below `cap`; returns the new count.
fn admit_under_cap(
    counts: &mut HashMap<ClusterKey, usize>,
    cluster: &ClusterKey,
    cap: usize,
) -> Option<usize> {
    let count = counts.entry(cluster.clone()).or_insert(0);
    if *count >= cap {
        return None;
    }
    *count += 1;
    Some(*count)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intelligence::scorer::ScoreBreakdown;
    use crate::models::Market;

    fn make_scored(id: &str, cluster: &str, score: f64) -> ScoredMarket {
        ScoredMarket {
            market: Market::new(id),
            cluster_key: ClusterKey::new(cluster),
            score,
            breakdown: ScoreBreakdown::default(),
        }
    }

    fn limits(top_n: usize, watch: usize, cap_top: usize, cap_watch: usize) -> SelectionLimits {
        SelectionLimits {
            top_n,
            watchlist_size: watch,
            cap_top50: cap_top,
            cap_watchlist: cap_watch,
            watchlist_disjoint: true,
        }
    }

    fn ids(list: &[SelectedMarket]) -> Vec<&str> {
        list.iter().map(|s| s.scored.market_id()).collect()
    }

    #[test]
    fn test_cap_limits_single_event() {
        let markets = vec![
            make_scored("a", "event:E1", 90.0),
            make_scored("b", "event:E1", 85.0),
            make_scored("c", "event:E2", 10.0),
        ];
        let sel = select(markets, limits(50, 20, 1, 1));

        assert_eq!(ids(&sel.top50), vec!["a", "c"]);
        assert_eq!(ids(&sel.watchlist), vec!["b"]);
        assert_eq!(sel.cap_skipped, 1);
    }

    #[test]
    fn test_backfill_from_other_clusters() {
        let mut markets: Vec<ScoredMarket> = (0..10)
            .map(|i| make_scored(&format!("hot{i}"), "event:HOT", 100.0 - i as f64))
            .collect();
        markets.push(make_scored("cold1", "event:C1", 5.0));
        markets.push(make_scored("cold2", "event:C2", 4.0));

        let sel = select(markets, limits(4, 0, 2, 1));

        assert_eq!(ids(&sel.top50), vec!["hot0", "hot1", "cold1", "cold2"]);
        assert_eq!(sel.top50_shortfall, 0);
    }

    #[test]
    fn test_shortfall_reported_not_padded() {
        let markets = vec![
            make_scored("a", "k1", 3.0),
            make_scored("b", "k1", 2.0),
            make_scored("c", "k1", 1.0),
        ];
        let sel = select(markets, limits(50, 20, 2, 1));

        assert_eq!(sel.top50.len(), 2);
        assert_eq!(sel.top50_shortfall, 48);
        assert_eq!(sel.watchlist.len(), 1);
        assert_eq!(sel.watchlist_shortfall, 19);
    }

    #[test]
    fn test_tie_break_by_market_id() {
        let markets = vec![
            make_scored("zeta", "k1", 1.0),
            make_scored("alpha", "k2", 1.0),
            make_scored("mid", "k3", 1.0),
        ];
        let sel = select(markets, limits(3, 0, 1, 1));
        assert_eq!(ids(&sel.top50), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_cluster_count_recorded_at_admission() {
        let markets = vec![
            make_scored("a", "k1", 3.0),
            make_scored("b", "k2", 2.0),
            make_scored("c", "k1", 1.0),
        ];
        let sel = select(markets, limits(3, 0, 5, 1));
        let counts: Vec<usize> = sel.top50.iter().map(|s| s.cluster_count).collect();
        assert_eq!(counts, vec![1, 1, 2]);
        let ranks: Vec<usize> = sel.top50.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_overlapping_watchlist_when_not_disjoint() {
        let markets = vec![
            make_scored("a", "k1", 3.0),
            make_scored("b", "k2", 2.0),
        ];
        let mut lim = limits(1, 5, 1, 1);
        lim.watchlist_disjoint = false;
        let sel = select(markets, lim);

        assert_eq!(ids(&sel.top50), vec!["a"]);
        assert_eq!(ids(&sel.watchlist), vec!["a", "b"]);
        // kept() never double counts
        assert_eq!(sel.kept().len(), 2);
    }

    #[test]
    fn test_caps_hold_for_every_cluster() {
        let markets: Vec<ScoredMarket> = (0..200)
            .map(|i| make_scored(&format!("m{i:03}"), &format!("k{}", i % 7), (i * 37 % 101) as f64))
            .collect();
        let sel = select(markets, limits(50, 20, 3, 2));

        let mut top: HashMap<ClusterKey, usize> = HashMap::new();
        for s in &sel.top50 {
            *top.entry(s.scored.cluster_key.clone()).or_default() += 1;
        }
        let mut watch: HashMap<ClusterKey, usize> = HashMap::new();
        for s in &sel.watchlist {
            *watch.entry(s.scored.cluster_key.clone()).or_default() += 1;
        }

        assert!(top.values().all(|&n| n <= 3));
        assert!(watch.values().all(|&n| n <= 2));
        // 7 clusters x cap 3 = 21 slots at most
        assert_eq!(sel.top50.len(), 21);
        assert_eq!(sel.watchlist.len(), 14);
    }
}
