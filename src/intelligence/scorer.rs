use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::ScorerWeights;
use crate::models::Market;

/// Weighted components behind a market's score.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub volume: f64,
    pub liquidity: f64,
    pub momentum: f64,
    pub recency: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.volume + self.liquidity + self.momentum + self.recency
    }
}

/// Score a market as of `as_of`. Missing inputs contribute zero.
pub fn score_market(market: &Market, weights: &ScorerWeights, as_of: DateTime<Utc>) -> ScoreBreakdown {
    let recency_anchor = market.close_time.or(market.created_at);

    ScoreBreakdown {
        volume: weights.volume_weight * log_magnitude(market.volume_usd),
        liquidity: weights.liquidity_weight * log_magnitude(market.liquidity_usd),
        momentum: weights.momentum_weight * momentum(market),
        recency: weights.recency_weight
            * recency_anchor
                .map(|at| recency_decay(at, as_of, weights.recency_half_life_hours))
                .unwrap_or(0.0),
    }
}

/// Scalar score, the sum of `score_market`'s components.
pub fn score(market: &Market, weights: &ScorerWeights, as_of: DateTime<Utc>) -> f64 {
    score_market(market, weights, as_of).total()
}

// ---------------------------------------------------------------------------
// Component 1: Volume / liquidity magnitude
// ---------------------------------------------------------------------------

/// ln(1 + x), negatives clamped to zero. Bounds the pull of outliers.
pub fn log_magnitude(value: Option<Decimal>) -> f64 {
    let x = value.and_then(|v| v.to_f64()).unwrap_or(0.0).max(0.0);
    x.ln_1p()
}

// ---------------------------------------------------------------------------
// Component 2: Momentum
// ---------------------------------------------------------------------------

/// Absolute price move across the history window. Falls back to the
/// reported 24h change when the window has fewer than two points.
pub fn momentum(market: &Market) -> f64 {
    let move_size = match (market.price_history.first(), market.price_history.last()) {
        (Some(first), Some(last)) if market.price_history.len() >= 2 => Some(last.price - first.price),
        _ => market.price_change_24h,
    };

    move_size
        .and_then(|d| d.abs().to_f64())
        .unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Component 3: Recency decay
// ---------------------------------------------------------------------------

/// 0.5 ^ (hours between `at` and `as_of` / half-life). 1.0 at zero distance.
pub fn recency_decay(at: DateTime<Utc>, as_of: DateTime<Utc>, half_life_hours: f64) -> f64 {
    if half_life_hours <= 0.0 {
        return 0.0;
    }
    let hours = (at - as_of).num_seconds().unsigned_abs() as f64 / 3_600.0;
    0.5f64.powf(hours / half_life_hours)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
