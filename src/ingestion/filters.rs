use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::MarketFilters;
use crate::models::Market;

/// Why a market was left out of scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    ClosedOrResolved,
    BelowMinVolume,
    BelowMinLiquidity,
    OutsideDaysToClose,
}

impl FilterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterReason::ClosedOrResolved => "closed_or_resolved",
            FilterReason::BelowMinVolume => "below_min_volume",
            FilterReason::BelowMinLiquidity => "below_min_liquidity",
            FilterReason::OutsideDaysToClose => "outside_days_to_close",
        }
    }
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eligibility {
    /// Empty when the market is eligible.
    pub reasons: Vec<FilterReason>,
    pub missing_close_time: bool,
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        self.reasons.is_empty()
    }
}

/// Check a market against the collection filters. A missing close time is
/// flagged but never excludes the market; neither do missing volume or
/// liquidity while the minimums are zero.
///
/// Days to close count calendar days from `run_date` to the close date, so
/// the time of day never matters.
pub fn evaluate_market(market: &Market, filters: &MarketFilters, run_date: NaiveDate) -> Eligibility {
    let mut reasons = Vec::new();

    if market.closed || market.resolved || market.archived {
        reasons.push(FilterReason::ClosedOrResolved);
    }
    if market.volume_usd.unwrap_or(Decimal::ZERO) < filters.min_volume {
        reasons.push(FilterReason::BelowMinVolume);
    }
    if market.liquidity_usd.unwrap_or(Decimal::ZERO) < filters.min_liquidity {
        reasons.push(FilterReason::BelowMinLiquidity);
    }

    let missing_close_time = match market.close_time {
        Some(close) => {
            if (close.date_naive() - run_date).num_days() > filters.days_to_close {
                reasons.push(FilterReason::OutsideDaysToClose);
            }
            false
        }
        None => true,
    };

    Eligibility {
        reasons,
        missing_close_time,
    }
}

/// Outcome of filtering a whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSummary {
    pub eligible: usize,
    pub excluded: usize,
    pub missing_close_time: usize,
    pub reasons: BTreeMap<FilterReason, usize>,
}

/// Split `markets` into the eligible ones, preserving input order.
pub fn filter_markets<'a>(
    markets: &'a [Market],
    filters: &MarketFilters,
    run_date: NaiveDate,
) -> (Vec<&'a Market>, FilterSummary) {
    let mut summary = FilterSummary::default();
    let mut eligible = Vec::with_capacity(markets.len());

    for market in markets {
        let check = evaluate_market(market, filters, run_date);
        if check.missing_close_time {
            summary.missing_close_time += 1;
        }
        if check.is_eligible() {
            eligible.push(market);
        } else {
            tracing::debug!(
                market_id = %market.market_id,
                reasons = ?check.reasons,
                "Market filtered out"
            );
            summary.excluded += 1;
            for reason in check.reasons {
                *summary.reasons.entry(reason).or_default() += 1;
            }
        }
    }

    summary.eligible = eligible.len();
    (eligible, summary)
}
