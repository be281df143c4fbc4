use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use metrics::{counter, gauge, histogram};
use rayon::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::filters::{filter_markets, FilterReason, FilterSummary};
use super::normalizer::NormalizedSnapshot;
use crate::config::EngineConfig;
use crate::errors::Result;
use crate::intelligence::{
    build_profiles, cluster, compute_coverage, holder_signals, holder_targets, scorer, select,
    CoverageStat, Selection, SelectionLimits,
};
use crate::models::{Market, ScoredMarket, SelectedMarket, WalletProfile};

/// Everything a run depends on besides its input records.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub as_of: DateTime<Utc>,
    /// Calendar date the run is filed under. UTC unless `in_timezone` moved it.
    pub run_date: NaiveDate,
    pub config: EngineConfig,
}

impl RunContext {
    /// Validates `config`; an invalid config never reaches the engine.
    pub fn new(as_of: DateTime<Utc>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            as_of,
            run_date: as_of.date_naive(),
            config,
        })
    }

    /// Take the run date from the wall clock of `tz` at `as_of`.
    pub fn in_timezone<Z: TimeZone>(mut self, tz: &Z) -> Self {
        self.run_date = self.as_of.with_timezone(tz).date_naive();
        self
    }
}

/// Filtered, scored and diversified markets.
#[derive(Debug, Clone)]
pub struct MarketRanking {
    pub selection: Selection,
    pub filter_summary: FilterSummary,
    pub markets_scored: usize,
}

impl MarketRanking {
    pub fn kept(&self) -> Vec<&ScoredMarket> {
        self.selection.kept()
    }

    /// Markets the fetch layer should request holders for.
    pub fn holder_targets(&self, max_markets: usize) -> Vec<&ScoredMarket> {
        holder_targets(&self.kept(), max_markets)
    }
}

/// Filter, score and select. Pure; scoring runs on the rayon pool.
pub fn rank_markets(ctx: &RunContext, markets: &[Market]) -> MarketRanking {
    let config = &ctx.config;
    let (eligible, filter_summary) = filter_markets(markets, &config.market_filters, ctx.run_date);

    let scored: Vec<ScoredMarket> = eligible
        .par_iter()
        .map(|market| {
            let breakdown = scorer::score_market(market, &config.scorer, ctx.as_of);
            ScoredMarket {
                market: (*market).clone(),
                cluster_key: cluster::assign(market),
                score: breakdown.total(),
                breakdown,
            }
        })
        .collect();

    let markets_scored = scored.len();
    counter!("markets_scored_total").increment(markets_scored as u64);

    let selection = select(scored, SelectionLimits::from_config(config));

    tracing::info!(
        eligible = filter_summary.eligible,
        excluded = filter_summary.excluded,
        top50 = selection.top50.len(),
        watchlist = selection.watchlist.len(),
        cap_skipped = selection.cap_skipped,
        "Markets ranked"
    );
    if selection.top50_shortfall > 0 {
        tracing::warn!(
            shortfall = selection.top50_shortfall,
            "Top list is short: not enough eligible markets under the cluster caps"
        );
    }

    MarketRanking {
        selection,
        filter_summary,
        markets_scored,
    }
}

// ---------------------------------------------------------------------------
// Full run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunDiagnostics {
    pub markets_fetched: usize,
    pub markets_rejected: usize,
    pub duplicate_markets: usize,
    pub markets_eligible: usize,
    pub markets_scored: usize,
    pub kept_markets: usize,
    pub filter_reasons: BTreeMap<FilterReason, usize>,
    pub missing_close_time: usize,
    pub trades_rejected: usize,
    pub positions_rejected: usize,
    pub unknown_outcome_positions: usize,
    pub trades_outside_kept: usize,
    pub positions_outside_kept: usize,
    pub holder_targets: usize,
    pub holder_successes: usize,
    pub holder_failures: usize,
    pub top50_shortfall: usize,
    pub watchlist_shortfall: usize,
    pub cap_skipped: usize,
    pub unscored_wallets: usize,
    pub wallets_failing_filters: usize,
    pub convergent_markets: usize,
}

/// The complete result of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub as_of: DateTime<Utc>,
    pub top50: Vec<SelectedMarket>,
    pub watchlist: Vec<SelectedMarket>,
    pub signal_candidates: Vec<WalletProfile>,
    pub concentrated_event_traders: Vec<WalletProfile>,
    pub unscored_wallets: usize,
    pub coverage: CoverageStat,
    pub diagnostics: RunDiagnostics,
}

/// Run the engine over one normalized snapshot:
/// 1. Filter, score and select markets
/// 2. Profile and classify wallets active in the kept markets
/// 3. Attach holder signals to the selected markets
/// 4. Measure holder coverage over the kept markets
///
/// Deterministic for a given snapshot and context.
pub fn run(ctx: &RunContext, snapshot: &NormalizedSnapshot) -> RunOutput {
    let start = Instant::now();
    let config = &ctx.config;

    // Step 1: markets
    let ranking = rank_markets(ctx, &snapshot.markets);
    let kept = ranking.kept();

    // Step 2: wallets
    let mut index: HashMap<&str, &ScoredMarket> = HashMap::with_capacity(kept.len() * 2);
    for market in &kept {
        for id in market.market.lookup_ids() {
            index.entry(id).or_insert(*market);
        }
    }
    let wallets = build_profiles(&snapshot.trades, &snapshot.positions, &index, ctx.as_of, &config.wallets);
    let classified = wallets.signal_candidates.len() + wallets.concentrated_event_traders.len();
    counter!("wallets_classified_total").increment(classified as u64);
    let wallets_failing_filters = wallets
        .signal_candidates
        .iter()
        .chain(&wallets.concentrated_event_traders)
        .filter(|w| !w.passes_filters())
        .count();

    // Step 3: who holds the kept markets
    let signals = holder_signals(&snapshot.positions, &index, ctx.run_date, &config.thresholds);
    let with_signals = |list: &[SelectedMarket]| -> Vec<SelectedMarket> {
        list.iter()
            .map(|selected| SelectedMarket {
                holder_signals: signals.get(selected.scored.market_id()).copied().unwrap_or_default(),
                ..selected.clone()
            })
            .collect()
    };
    let top50 = with_signals(&ranking.selection.top50);
    let watchlist = with_signals(&ranking.selection.watchlist);
    let convergent_markets = signals.values().filter(|s| s.convergence).count();
    gauge!("convergent_markets").set(convergent_markets as f64);

    // Step 4: coverage
    let coverage = compute_coverage(&kept, &snapshot.holders_fetched, config.holders.max_markets_to_fetch);
    gauge!("holders_coverage_pct").set(coverage.coverage_pct.to_f64().unwrap_or(0.0));

    let rejections = snapshot.rejections;
    let selection = &ranking.selection;
    let diagnostics = RunDiagnostics {
        markets_fetched: snapshot.markets.len() + rejections.markets + rejections.duplicate_markets,
        markets_rejected: rejections.markets,
        duplicate_markets: rejections.duplicate_markets,
        markets_eligible: ranking.filter_summary.eligible,
        markets_scored: ranking.markets_scored,
        kept_markets: kept.len(),
        filter_reasons: ranking.filter_summary.reasons.clone(),
        missing_close_time: ranking.filter_summary.missing_close_time,
        trades_rejected: rejections.trades,
        positions_rejected: rejections.positions,
        unknown_outcome_positions: snapshot.unknown_outcome_positions,
        trades_outside_kept: wallets.ignored_trades,
        positions_outside_kept: wallets.ignored_positions,
        holder_targets: coverage.attempted,
        holder_successes: coverage.succeeded,
        holder_failures: coverage.failed,
        top50_shortfall: selection.top50_shortfall,
        watchlist_shortfall: selection.watchlist_shortfall,
        cap_skipped: selection.cap_skipped,
        unscored_wallets: wallets.unscored,
        wallets_failing_filters,
        convergent_markets,
    };

    tracing::info!(
        as_of = %ctx.as_of,
        kept = diagnostics.kept_markets,
        signal_candidates = wallets.signal_candidates.len(),
        concentrated = wallets.concentrated_event_traders.len(),
        unscored = wallets.unscored,
        failing_filters = wallets_failing_filters,
        convergent = convergent_markets,
        coverage_pct = %coverage.coverage_pct,
        "Run complete"
    );

    let output = RunOutput {
        as_of: ctx.as_of,
        top50,
        watchlist,
        signal_candidates: wallets.signal_candidates,
        concentrated_event_traders: wallets.concentrated_event_traders,
        unscored_wallets: wallets.unscored,
        coverage,
        diagnostics,
    };

    histogram!("run_duration_seconds").record(start.elapsed().as_secs_f64());
    output
}
