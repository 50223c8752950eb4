use futures::{StreamExt, TryStreamExt};
use youless_client::domain::Reading;

use crate::{
    pipeline::{IngestError, ReportSource},
    profile::GranularityProfile,
    transform,
};

/// Fetch and decode every page of `profile` into one batch.
///
/// Any failing page aborts the whole collection and whatever was already
/// decoded is dropped, so a truncated window is never handed to a merge.
/// Overlapping pages may yield duplicate timestamps; those are left for the
/// merge to collapse.
pub async fn collect<S>(
    source: &S,
    profile: &GranularityProfile,
    page_concurrency: usize,
) -> Result<Vec<Reading>, IngestError>
where
    S: ReportSource + ?Sized,
{
    tracing::info!(
        profile = profile.id,
        pages = profile.page_count,
        "fetching new data"
    );

    let pages: Vec<Vec<Reading>> = futures::stream::iter(1..=profile.page_count)
        .map(|page| async move {
            let report = source.fetch_page(profile, page).await?;
            transform::decode(&report).map_err(|source| {
                metrics::counter!("youless_decode_errors_total", "profile" => profile.id).increment(1);
                IngestError::MalformedSample { page, source }
            })
        })
        .buffered(page_concurrency.max(1))
        .try_collect()
        .await
        .map_err(|e| {
            tracing::warn!(profile = profile.id, error = %e, "collection aborted");
            e
        })?;

    let batch: Vec<Reading> = pages.into_iter().flatten().collect();

    metrics::counter!("youless_readings_collected_total", "profile" => profile.id)
        .increment(batch.len() as u64);
    tracing::info!(profile = profile.id, entries = batch.len(), "received entries");

    Ok(batch)
}
