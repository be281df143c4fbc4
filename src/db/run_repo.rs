use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::errors::Result;
use crate::ingestion::pipeline::RunOutput;
use crate::models::{SelectedMarket, WalletProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RunRecord {
    pub run_date: NaiveDate,
    pub as_of: DateTime<Utc>,
    pub status: String,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SelectionRow {
    pub list: String,
    pub rank: i64,
    pub market_id: String,
    pub cluster_key: String,
    pub cluster_count: i64,
    pub score: f64,
    pub question: Option<String>,
    pub holders: i64,
    pub conviction_wallets: i64,
    pub whale_wallets: i64,
    pub new_wallets: i64,
    pub convergence: bool,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WalletSignalRow {
    pub address: String,
    pub class: String,
    pub signal_score: f64,
    pub concentration_ratio: String,
    pub total_usd: String,
    pub clusters_count: i64,
    pub top_cluster: String,
    pub filter_reasons: String,
}

/// Mark a run date as running. A previous run for the same date is reset.
pub async fn start_run(pool: &SqlitePool, run_date: NaiveDate, as_of: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO runs (run_date, as_of, status, error, started_at, finished_at)
        VALUES (?, ?, 'running', NULL, ?, NULL)
        ON CONFLICT (run_date) DO UPDATE
            SET as_of = excluded.as_of,
                status = 'running',
                error = NULL,
                started_at = excluded.started_at,
                finished_at = NULL
        "#,
    )
    .bind(run_date)
    .bind(as_of)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Close a run with its final status.
pub async fn finish_run(
    pool: &SqlitePool,
    run_date: NaiveDate,
    status: RunStatus,
    error: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE runs
        SET status = ?, error = ?, finished_at = ?
        WHERE run_date = ?
        "#,
    )
    .bind(status.as_str())
    .bind(error)
    .bind(Utc::now())
    .bind(run_date)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_run(pool: &SqlitePool, run_date: NaiveDate) -> Result<Option<RunRecord>> {
    let run = sqlx::query_as::<_, RunRecord>("SELECT * FROM runs WHERE run_date = ?")
        .bind(run_date)
        .fetch_optional(pool)
        .await?;

    Ok(run)
}

/// Replace every stored result for `run_date` with `output`, atomically.
pub async fn save_run_output(pool: &SqlitePool, run_date: NaiveDate, output: &RunOutput) -> Result<()> {
    let mut tx = pool.begin().await?;

    for table in ["market_selections", "wallet_signals", "run_diagnostics"] {
        sqlx::query(&format!("DELETE FROM {table} WHERE run_date = ?"))
            .bind(run_date)
            .execute(&mut *tx)
            .await?;
    }

    for (list, markets) in [("top50", &output.top50), ("watchlist", &output.watchlist)] {
        for selected in markets {
            insert_selection(&mut tx, run_date, list, selected).await?;
        }
    }

    for profile in output
        .signal_candidates
        .iter()
        .chain(output.concentrated_event_traders.iter())
    {
        insert_wallet_signal(&mut tx, run_date, profile).await?;
    }

    let payload = serde_json::to_string(&output.diagnostics)?;
    sqlx::query(
        r#"
        INSERT INTO run_diagnostics
            (run_date, coverage_pct, holders_attempted, holders_succeeded, unscored_wallets, payload)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(run_date)
    .bind(output.coverage.coverage_pct.to_string())
    .bind(output.coverage.attempted as i64)
    .bind(output.coverage.succeeded as i64)
    .bind(output.unscored_wallets as i64)
    .bind(payload)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::debug!(
        %run_date,
        selections = output.top50.len() + output.watchlist.len(),
        wallets = output.signal_candidates.len() + output.concentrated_event_traders.len(),
        "Run output persisted"
    );

    Ok(())
}

async fn insert_selection(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    run_date: NaiveDate,
    list: &str,
    selected: &SelectedMarket,
) -> Result<()> {
    let market = &selected.scored.market;
    let signals = &selected.holder_signals;
    sqlx::query(
        r#"
        INSERT INTO market_selections
            (run_date, list, rank, market_id, cluster_key, cluster_count, score,
             question, volume_usd, liquidity_usd,
             holders, conviction_wallets, whale_wallets, new_wallets, convergence)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(run_date)
    .bind(list)
    .bind(selected.rank as i64)
    .bind(&market.market_id)
    .bind(selected.scored.cluster_key.as_str())
    .bind(selected.cluster_count as i64)
    .bind(selected.scored.score)
    .bind(market.question.as_deref())
    .bind(market.volume_usd.map(|v| v.to_string()))
    .bind(market.liquidity_usd.map(|v| v.to_string()))
    .bind(signals.holders as i64)
    .bind(signals.conviction_wallets as i64)
    .bind(signals.whale_wallets as i64)
    .bind(signals.new_wallets as i64)
    .bind(signals.convergence)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn insert_wallet_signal(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    run_date: NaiveDate,
    profile: &WalletProfile,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO wallet_signals
            (run_date, address, class, signal_score, concentration_ratio, total_usd,
             clusters_count, markets_count, top_cluster, win_consistency, sidedness, hhi_clusters,
             filter_reasons)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(run_date)
    .bind(&profile.address)
    .bind(profile.class.as_str())
    .bind(profile.signal_score)
    .bind(profile.concentration_ratio.to_string())
    .bind(profile.total_usd.to_string())
    .bind(profile.clusters_count as i64)
    .bind(profile.markets_count as i64)
    .bind(profile.top_cluster.as_str())
    .bind(profile.win_consistency)
    .bind(profile.sidedness)
    .bind(profile.hhi_clusters)
    .bind(join_reasons(profile))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn join_reasons(profile: &WalletProfile) -> String {
    profile
        .filter_reasons
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Stored selections for one list, in rank order.
pub async fn get_selections(pool: &SqlitePool, run_date: NaiveDate, list: &str) -> Result<Vec<SelectionRow>> {
    let rows = sqlx::query_as::<_, SelectionRow>(
        r#"
        SELECT list, rank, market_id, cluster_key, cluster_count, score, question,
               holders, conviction_wallets, whale_wallets, new_wallets, convergence
        FROM market_selections
        WHERE run_date = ? AND list = ?
        ORDER BY rank ASC
        "#,
    )
    .bind(run_date)
    .bind(list)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Stored wallets of one class, best signal first.
pub async fn get_wallet_signals(
    pool: &SqlitePool,
    run_date: NaiveDate,
    class: &str,
) -> Result<Vec<WalletSignalRow>> {
    let rows = sqlx::query_as::<_, WalletSignalRow>(
        r#"
        SELECT address, class, signal_score, concentration_ratio, total_usd, clusters_count, top_cluster,
               filter_reasons
        FROM wallet_signals
        WHERE run_date = ? AND class = ?
        ORDER BY signal_score DESC, address ASC
        "#,
    )
    .bind(run_date)
    .bind(class)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
