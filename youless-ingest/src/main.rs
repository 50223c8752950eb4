use anyhow::{bail, Result};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use youless_ingest::{
    config::AppConfig,
    metrics_server, observability,
    pipeline::{Pipeline, ReadingStore, ReportSource},
    profile::{self, GranularityProfile},
    sinks::SqliteMergeSink,
    sources::YoulessHttpSource,
};

async fn run_once<S, K>(pipeline: &Pipeline<S, K>, profiles: &[GranularityProfile]) -> usize
where
    S: ReportSource,
    K: ReadingStore,
{
    pipeline
        .run_cycle(profiles)
        .await
        .iter()
        .filter(|(_, outcome)| outcome.is_err())
        .count()
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let profiles = match &cfg.polling.profiles {
        Some(ids) => profile::select(ids)?,
        None => profile::enabled_profiles(cfg.polling.gas_enabled),
    };

    let store = SqliteMergeSink::connect(&cfg.store).await?;
    let source = YoulessHttpSource::from_config(&cfg.meter)?;
    let pipeline = Pipeline {
        source,
        store,
        page_concurrency: cfg.meter.page_concurrency,
    };

    tracing::info!(
        profiles = ?profiles.iter().map(|p| p.id).collect::<Vec<_>>(),
        meter = %cfg.meter.base_url,
        "starting youless ingestion"
    );

    let Some(interval_secs) = cfg.polling.interval_secs else {
        let failed = run_once(&pipeline, &profiles).await;
        if failed > 0 {
            bail!("{failed} of {} profiles failed", profiles.len());
        }
        return Ok(());
    };

    // A tick that falls due while a cycle is still running is skipped, so
    // cycles for the same table never overlap.
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let failed = run_once(&pipeline, &profiles).await;
                if failed > 0 {
                    tracing::warn!(failed, "cycle finished with failures, retrying next interval");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}
