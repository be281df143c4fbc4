use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::models::ScoredMarket;

/// Holder-fetch coverage over the target markets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoverageStat {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Percent, one decimal, half-to-even.
    pub coverage_pct: Decimal,
}

/// Markets to request holders for: kept markets by volume desc, liquidity
/// desc, id asc, truncated to `max_markets`.
pub fn holder_targets<'a>(kept: &[&'a ScoredMarket], max_markets: usize) -> Vec<&'a ScoredMarket> {
    let mut targets: Vec<&ScoredMarket> = kept.to_vec();
    targets.sort_by(|a, b| {
        let (ma, mb) = (&a.market, &b.market);
        mb.volume_usd
            .unwrap_or(Decimal::ZERO)
            .cmp(&ma.volume_usd.unwrap_or(Decimal::ZERO))
            .then_with(|| {
                mb.liquidity_usd
                    .unwrap_or(Decimal::ZERO)
                    .cmp(&ma.liquidity_usd.unwrap_or(Decimal::ZERO))
            })
            .then_with(|| ma.market_id.cmp(&mb.market_id))
    });
    targets.dedup_by(|a, b| a.market_id() == b.market_id());
    targets.truncate(max_markets);
    targets
}

/// Coverage over the holder targets of `kept`. Flags for markets outside
/// the target set are ignored; a target with no flag counts as failed.
pub fn compute_coverage(
    kept: &[&ScoredMarket],
    holders_fetched: &BTreeMap<String, bool>,
    max_markets: usize,
) -> CoverageStat {
    let targets = holder_targets(kept, max_markets);
    let succeeded = targets
        .iter()
        .filter(|m| holders_fetched.get(m.market_id()).copied().unwrap_or(false))
        .count();

    CoverageStat {
        attempted: targets.len(),
        succeeded,
        failed: targets.len() - succeeded,
        coverage_pct: coverage_pct(succeeded, targets.len()),
    }
}

/// `succeeded / attempted * 100` rounded half-to-even to one decimal.
/// Zero attempts yield 0.0.
pub fn coverage_pct(succeeded: usize, attempted: usize) -> Decimal {
    if attempted == 0 {
        return Decimal::new(0, 1);
    }
    let pct = Decimal::from(succeeded as u64) * Decimal::ONE_HUNDRED / Decimal::from(attempted as u64);
    pct.round_dp_with_strategy(1, RoundingStrategy::MidpointNearestEven)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
