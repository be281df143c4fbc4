use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::ingestion::pipeline::{RunDiagnostics, RunOutput};
use crate::intelligence::CoverageStat;
use crate::models::WalletProfile;

#[derive(Debug, Serialize)]
struct WalletsReport<'a> {
    signal_candidates: &'a [WalletProfile],
    concentrated_event_traders: &'a [WalletProfile],
    unscored_wallets: usize,
}

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    run_date: NaiveDate,
    as_of: DateTime<Utc>,
    top50_count: usize,
    watchlist_count: usize,
    signal_candidates_count: usize,
    concentrated_event_traders_count: usize,
    coverage: &'a CoverageStat,
    diagnostics: &'a RunDiagnostics,
}

/// Write the run's JSON files under `out_dir/<run_date>/` and return that
/// directory.
pub async fn write_outputs(out_dir: &Path, run_date: NaiveDate, output: &RunOutput) -> anyhow::Result<PathBuf> {
    let dir = out_dir.join(run_date.to_string());
    tokio::fs::create_dir_all(&dir).await?;

    write_json(&dir.join("top50.json"), &output.top50).await?;
    write_json(&dir.join("watchlist.json"), &output.watchlist).await?;
    write_json(
        &dir.join("wallets.json"),
        &WalletsReport {
            signal_candidates: &output.signal_candidates,
            concentrated_event_traders: &output.concentrated_event_traders,
            unscored_wallets: output.unscored_wallets,
        },
    )
    .await?;
    write_json(
        &dir.join("run_summary.json"),
        &RunSummary {
            run_date,
            as_of: output.as_of,
            top50_count: output.top50.len(),
            watchlist_count: output.watchlist.len(),
            signal_candidates_count: output.signal_candidates.len(),
            concentrated_event_traders_count: output.concentrated_event_traders.len(),
            coverage: &output.coverage,
            diagnostics: &output.diagnostics,
        },
    )
    .await?;

    tracing::info!(dir = %dir.display(), "Reports written");
    Ok(dir)
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let body = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, body).await?;
    Ok(())
}
