use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;

use polyinsider::config::{AppConfig, RunSettings};
use polyinsider::db::{self, run_repo, run_repo::RunStatus};
use polyinsider::ingestion::{normalize_snapshot, pipeline, RunContext, RunOutput};
use polyinsider::polymarket::{DataClient, GammaClient};
use polyinsider::services::{collector, report};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let metrics_handle = polyinsider::metrics::init_metrics()?;

    let as_of = config.run.as_of.unwrap_or_else(Utc::now);
    let ctx = RunContext::new(as_of, config.engine.clone())?.in_timezone(&config.run.timezone);
    let run_date = ctx.run_date;

    tracing::info!("Connecting to database...");
    let pool = db::init_pool(&config.run.database_url).await?;
    tracing::info!("Database connected");

    run_repo::start_run(&pool, run_date, as_of).await?;
    tracing::info!(%run_date, %as_of, "Run started");

    let result = execute(&ctx, &config.run, &pool, run_date).await;

    match &result {
        Ok(output) => {
            run_repo::finish_run(&pool, run_date, RunStatus::Success, None).await?;
            tracing::info!(
                %run_date,
                top50 = output.top50.len(),
                watchlist = output.watchlist.len(),
                signal_candidates = output.signal_candidates.len(),
                coverage_pct = %output.coverage.coverage_pct,
                "Run succeeded"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, %run_date, "Run failed");
            run_repo::finish_run(&pool, run_date, RunStatus::Failed, Some(&e.to_string())).await?;
        }
    }

    let metrics_path = config.run.out_dir.join("metrics.prom");
    if let Err(e) = polyinsider::metrics::write_textfile(&metrics_handle, &metrics_path).await {
        tracing::warn!(error = %e, "Failed to write metrics file");
    }

    result.map(|_| ())
}

/// Fetch (or load), normalize, rank, persist and report one run.
async fn execute(
    ctx: &RunContext,
    settings: &RunSettings,
    pool: &SqlitePool,
    run_date: NaiveDate,
) -> anyhow::Result<RunOutput> {
    let raw = match &settings.snapshot_path {
        Some(path) => collector::load_snapshot(path).await?,
        None => {
            let http = reqwest::Client::new();
            let gamma = GammaClient::new(http.clone());
            let data = DataClient::new(http);
            collector::collect_live(ctx, &gamma, &data, settings.max_markets).await?
        }
    };

    let snapshot = normalize_snapshot(&raw);
    let output = pipeline::run(ctx, &snapshot);

    run_repo::save_run_output(pool, run_date, &output).await?;
    report::write_outputs(&settings.out_dir, run_date, &output).await?;

    Ok(output)
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();
}
