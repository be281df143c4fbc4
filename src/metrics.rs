use std::path::Path;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and register all application metrics.
/// Returns a `PrometheusHandle` whose `render()` method produces the
/// text/plain Prometheus payload.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    // Pre-register counters so they appear even on an empty run.
    counter!("markets_scored_total").absolute(0);
    counter!("wallets_classified_total").absolute(0);
    for kind in ["market", "trade", "position"] {
        counter!("records_rejected_total", "kind" => kind).absolute(0);
    }

    gauge!("holders_coverage_pct").set(0.0);
    gauge!("convergent_markets").set(0.0);

    histogram!("run_duration_seconds").record(0.0);

    Ok(handle)
}

/// Dump the current scrape payload to `path` for a textfile collector.
/// A batch run has no listener to scrape.
pub async fn write_textfile(handle: &PrometheusHandle, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, handle.render()).await?;
    tracing::debug!(path = %path.display(), "Metrics written");
    Ok(())
}
