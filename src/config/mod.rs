use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::{AppError, Result};

const DEFAULT_DATABASE_URL: &str = "sqlite://polyinsider.db";
const DEFAULT_OUT_DIR: &str = "out";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub run: RunSettings,
    pub engine: EngineConfig,
}

/// Settings for the binary around the engine: where to read from and write to.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub database_url: String,
    pub out_dir: PathBuf,
    /// Offline mode: read raw payloads from this JSON file instead of the APIs.
    pub snapshot_path: Option<PathBuf>,
    /// Fixed as-of timestamp for reproducible runs (RUN_AS_OF, RFC 3339).
    pub as_of: Option<DateTime<Utc>>,
    /// Upper bound on markets pulled from the Gamma API.
    pub max_markets: u32,
    /// Zone whose calendar date names the run (RUN_TIMEZONE, IANA name).
    pub timezone: Tz,
}

/// Everything the ranking engine reads. Validated once by `RunContext::new`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub market_filters: MarketFilters,
    pub selection: SelectionConfig,
    pub diversity: DiversityConfig,
    pub holders: HoldersConfig,
    pub thresholds: HolderThresholds,
    pub scorer: ScorerWeights,
    pub wallets: WalletConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketFilters {
    pub days_to_close: i64,
    pub min_volume: Decimal,
    pub min_liquidity: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    pub top_n: usize,
    pub watchlist_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiversityConfig {
    pub max_per_cluster_top50: usize,
    pub max_per_cluster_watchlist: usize,
    /// When true the watchlist only holds markets not already in the top list.
    pub watchlist_disjoint: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldersConfig {
    pub max_markets_to_fetch: usize,
    /// Holder rows kept per market.
    pub top_n: usize,
    /// Concurrent holder requests in flight.
    pub concurrency: usize,
}

/// Per-holder exposure levels behind the market holder signals. USD
/// thresholds apply when a holder row has a value, share thresholds otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolderThresholds {
    pub new_wallet_days: i64,
    pub conviction_exposure_usd: Decimal,
    pub whale_exposure_usd: Decimal,
    pub conviction_exposure_shares: Decimal,
    pub whale_exposure_shares: Decimal,
    /// Conviction holders needed before a market is flagged as converging.
    pub convergence_min_wallets: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerWeights {
    pub volume_weight: f64,
    pub liquidity_weight: f64,
    pub momentum_weight: f64,
    pub recency_weight: f64,
    pub recency_half_life_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Share of value in the top cluster at or above which a wallet counts
    /// as a concentrated event trader. Must lie in (0, 1].
    pub concentration_threshold: Decimal,
    pub ranking: WalletRanking,
    pub filters: WalletFilters,
}

/// Quality screen for profiled wallets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletFilters {
    pub min_total_usd: Decimal,
    pub min_markets: usize,
    pub min_clusters: usize,
    pub max_top_cluster_share: Decimal,
    pub max_top_market_share: f64,
    pub max_hhi_clusters: f64,
    pub max_sidedness: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRanking {
    pub w_win_consistency: f64,
    pub w_position_sizing: f64,
    pub w_diversity: f64,
    pub w_sidedness_penalty: f64,
    pub half_life_hours: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            market_filters: MarketFilters {
                days_to_close: 60,
                min_volume: Decimal::ZERO,
                min_liquidity: Decimal::ZERO,
            },
            selection: SelectionConfig {
                top_n: 50,
                watchlist_size: 20,
            },
            diversity: DiversityConfig {
                max_per_cluster_top50: 10,
                max_per_cluster_watchlist: 8,
                watchlist_disjoint: true,
            },
            holders: HoldersConfig {
                max_markets_to_fetch: 60,
                top_n: 50,
                concurrency: 4,
            },
            thresholds: HolderThresholds {
                new_wallet_days: 14,
                conviction_exposure_usd: Decimal::from(2_000),
                whale_exposure_usd: Decimal::from(20_000),
                conviction_exposure_shares: Decimal::from(1_000),
                whale_exposure_shares: Decimal::from(5_000),
                convergence_min_wallets: 3,
            },
            scorer: ScorerWeights {
                volume_weight: 1.0,
                liquidity_weight: 1.0,
                momentum_weight: 1.0,
                recency_weight: 1.0,
                recency_half_life_hours: 72.0,
            },
            wallets: WalletConfig {
                concentration_threshold: Decimal::new(7, 1),
                ranking: WalletRanking {
                    w_win_consistency: 1.0,
                    w_position_sizing: 1.0,
                    w_diversity: 1.2,
                    w_sidedness_penalty: 0.4,
                    half_life_hours: 168.0,
                },
                filters: WalletFilters {
                    min_total_usd: Decimal::from(5_000),
                    min_markets: 3,
                    min_clusters: 2,
                    max_top_cluster_share: Decimal::new(7, 1),
                    max_top_market_share: 0.5,
                    max_hhi_clusters: 0.65,
                    max_sidedness: 0.9,
                },
            },
        }
    }
}

impl EngineConfig {
    /// Check every range precondition. Any violation aborts the run before
    /// the engine sees a single record.
    pub fn validate(&self) -> Result<()> {
        if self.selection.top_n == 0 {
            return Err(AppError::config("selection.top_n must be positive"));
        }
        if self.diversity.max_per_cluster_top50 == 0 {
            return Err(AppError::config(
                "diversity.max_per_cluster_top50 must be positive",
            ));
        }
        if self.diversity.max_per_cluster_watchlist == 0 {
            return Err(AppError::config(
                "diversity.max_per_cluster_watchlist must be positive",
            ));
        }
        if self.holders.concurrency == 0 {
            return Err(AppError::config("holders.concurrency must be positive"));
        }
        if self.market_filters.days_to_close < 0 {
            return Err(AppError::config(
                "market_filters.days_to_close must not be negative",
            ));
        }

        let threshold = self.wallets.concentration_threshold;
        if threshold <= Decimal::ZERO || threshold > Decimal::ONE {
            return Err(AppError::config(format!(
                "concentration_threshold must be in (0, 1], got {threshold}"
            )));
        }

        let s = &self.scorer;
        check_weight("scorer.volume_weight", s.volume_weight)?;
        check_weight("scorer.liquidity_weight", s.liquidity_weight)?;
        check_weight("scorer.momentum_weight", s.momentum_weight)?;
        check_weight("scorer.recency_weight", s.recency_weight)?;
        check_half_life("scorer.recency_half_life_hours", s.recency_half_life_hours)?;

        let r = &self.wallets.ranking;
        check_weight("wallets.w_win_consistency", r.w_win_consistency)?;
        check_weight("wallets.w_position_sizing", r.w_position_sizing)?;
        check_weight("wallets.w_diversity", r.w_diversity)?;
        check_weight("wallets.w_sidedness_penalty", r.w_sidedness_penalty)?;
        check_half_life("wallets.half_life_hours", r.half_life_hours)?;

        let f = &self.wallets.filters;
        if f.min_total_usd < Decimal::ZERO {
            return Err(AppError::config("wallet_filters.min_total_usd must not be negative"));
        }
        if f.max_top_cluster_share < Decimal::ZERO || f.max_top_cluster_share > Decimal::ONE {
            return Err(AppError::config(format!(
                "wallet_filters.max_top_cluster_share must be in [0, 1], got {}",
                f.max_top_cluster_share
            )));
        }
        check_share("wallet_filters.max_top_market_share", f.max_top_market_share)?;
        check_share("wallet_filters.max_hhi_clusters", f.max_hhi_clusters)?;
        check_share("wallet_filters.max_sidedness", f.max_sidedness)?;

        let t = &self.thresholds;
        if t.new_wallet_days < 0 {
            return Err(AppError::config("thresholds.new_wallet_days must not be negative"));
        }
        if t.conviction_exposure_usd > t.whale_exposure_usd
            || t.conviction_exposure_shares > t.whale_exposure_shares
        {
            return Err(AppError::config(
                "thresholds: conviction exposure must not exceed whale exposure",
            ));
        }

        Ok(())
    }
}

fn check_weight(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::config(format!(
            "{name} must be a finite non-negative number, got {value}"
        )));
    }
    Ok(())
}

fn check_share(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(AppError::config(format!("{name} must be in [0, 1], got {value}")));
    }
    Ok(())
}

fn check_half_life(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(AppError::config(format!(
            "{name} must be positive, got {value}"
        )));
    }
    Ok(())
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = EngineConfig::default();

        let as_of = match env::var("RUN_AS_OF").ok().filter(|s| !s.trim().is_empty()) {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw.trim())
                    .map_err(|e| AppError::config(format!("RUN_AS_OF: {e}")))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        let run = RunSettings {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.into()),
            out_dir: env::var("OUT_DIR")
                .unwrap_or_else(|_| DEFAULT_OUT_DIR.into())
                .into(),
            snapshot_path: env::var("SNAPSHOT_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            as_of,
            max_markets: env_or("RUN_MAX_MARKETS", 200)?,
            timezone: env_or("RUN_TIMEZONE", chrono_tz::America::New_York)?,
        };

        let engine = EngineConfig {
            market_filters: MarketFilters {
                days_to_close: env_or(
                    "FILTER_DAYS_TO_CLOSE",
                    defaults.market_filters.days_to_close,
                )?,
                min_volume: env_or("FILTER_MIN_VOLUME", defaults.market_filters.min_volume)?,
                min_liquidity: env_or(
                    "FILTER_MIN_LIQUIDITY",
                    defaults.market_filters.min_liquidity,
                )?,
            },
            selection: SelectionConfig {
                top_n: env_or("SELECTION_TOP_N", defaults.selection.top_n)?,
                watchlist_size: env_or(
                    "SELECTION_WATCHLIST_SIZE",
                    defaults.selection.watchlist_size,
                )?,
            },
            diversity: DiversityConfig {
                max_per_cluster_top50: env_or(
                    "DIVERSITY_MAX_PER_CLUSTER_TOP50",
                    defaults.diversity.max_per_cluster_top50,
                )?,
                max_per_cluster_watchlist: env_or(
                    "DIVERSITY_MAX_PER_CLUSTER_WATCHLIST",
                    defaults.diversity.max_per_cluster_watchlist,
                )?,
                watchlist_disjoint: env_or(
                    "DIVERSITY_WATCHLIST_DISJOINT",
                    defaults.diversity.watchlist_disjoint,
                )?,
            },
            holders: HoldersConfig {
                max_markets_to_fetch: env_or(
                    "HOLDERS_MAX_MARKETS_TO_FETCH",
                    defaults.holders.max_markets_to_fetch,
                )?,
                top_n: env_or("HOLDERS_TOP_N", defaults.holders.top_n)?,
                concurrency: env_or("HOLDERS_CONCURRENCY", defaults.holders.concurrency)?,
            },
            thresholds: HolderThresholds {
                new_wallet_days: env_or(
                    "THRESHOLD_NEW_WALLET_DAYS",
                    defaults.thresholds.new_wallet_days,
                )?,
                conviction_exposure_usd: env_or(
                    "THRESHOLD_CONVICTION_EXPOSURE_USD",
                    defaults.thresholds.conviction_exposure_usd,
                )?,
                whale_exposure_usd: env_or(
                    "THRESHOLD_WHALE_EXPOSURE_USD",
                    defaults.thresholds.whale_exposure_usd,
                )?,
                conviction_exposure_shares: env_or(
                    "THRESHOLD_CONVICTION_EXPOSURE_SHARES",
                    defaults.thresholds.conviction_exposure_shares,
                )?,
                whale_exposure_shares: env_or(
                    "THRESHOLD_WHALE_EXPOSURE_SHARES",
                    defaults.thresholds.whale_exposure_shares,
                )?,
                convergence_min_wallets: env_or(
                    "THRESHOLD_CONVERGENCE_MIN_WALLETS",
                    defaults.thresholds.convergence_min_wallets,
                )?,
            },
            scorer: ScorerWeights {
                volume_weight: env_or("SCORER_VOLUME_WEIGHT", defaults.scorer.volume_weight)?,
                liquidity_weight: env_or(
                    "SCORER_LIQUIDITY_WEIGHT",
                    defaults.scorer.liquidity_weight,
                )?,
                momentum_weight: env_or(
                    "SCORER_MOMENTUM_WEIGHT",
                    defaults.scorer.momentum_weight,
                )?,
                recency_weight: env_or("SCORER_RECENCY_WEIGHT", defaults.scorer.recency_weight)?,
                recency_half_life_hours: env_or(
                    "SCORER_RECENCY_HALF_LIFE_HOURS",
                    defaults.scorer.recency_half_life_hours,
                )?,
            },
            wallets: WalletConfig {
                concentration_threshold: env_or(
                    "WALLET_CONCENTRATION_THRESHOLD",
                    defaults.wallets.concentration_threshold,
                )?,
                ranking: WalletRanking {
                    w_win_consistency: env_or(
                        "WALLET_W_WIN_CONSISTENCY",
                        defaults.wallets.ranking.w_win_consistency,
                    )?,
                    w_position_sizing: env_or(
                        "WALLET_W_POSITION_SIZING",
                        defaults.wallets.ranking.w_position_sizing,
                    )?,
                    w_diversity: env_or(
                        "WALLET_W_DIVERSITY",
                        defaults.wallets.ranking.w_diversity,
                    )?,
                    w_sidedness_penalty: env_or(
                        "WALLET_W_SIDEDNESS_PENALTY",
                        defaults.wallets.ranking.w_sidedness_penalty,
                    )?,
                    half_life_hours: env_or(
                        "WALLET_HALF_LIFE_HOURS",
                        defaults.wallets.ranking.half_life_hours,
                    )?,
                },
                filters: WalletFilters {
                    min_total_usd: env_or(
                        "WALLET_FILTER_MIN_TOTAL_USD",
                        defaults.wallets.filters.min_total_usd,
                    )?,
                    min_markets: env_or(
                        "WALLET_FILTER_MIN_MARKETS",
                        defaults.wallets.filters.min_markets,
                    )?,
                    min_clusters: env_or(
                        "WALLET_FILTER_MIN_CLUSTERS",
                        defaults.wallets.filters.min_clusters,
                    )?,
                    max_top_cluster_share: env_or(
                        "WALLET_FILTER_MAX_TOP_CLUSTER_SHARE",
                        defaults.wallets.filters.max_top_cluster_share,
                    )?,
                    max_top_market_share: env_or(
                        "WALLET_FILTER_MAX_TOP_MARKET_SHARE",
                        defaults.wallets.filters.max_top_market_share,
                    )?,
                    max_hhi_clusters: env_or(
                        "WALLET_FILTER_MAX_HHI_CLUSTERS",
                        defaults.wallets.filters.max_hhi_clusters,
                    )?,
                    max_sidedness: env_or(
                        "WALLET_FILTER_MAX_SIDEDNESS",
                        defaults.wallets.filters.max_sidedness,
                    )?,
                },
            },
        };

        engine.validate()?;
        Ok(Self { run, engine })
    }
}

/// Read `key` from the environment, falling back to `default` when unset.
/// A set but unparseable value is a configuration error, not a silent default.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| AppError::config(format!("{key}={raw}: {e}"))),
        _ => Ok(default),
    }
}
