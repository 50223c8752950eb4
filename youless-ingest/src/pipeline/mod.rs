use std::{fmt, time::Instant};

use futures::future::join_all;
use time::PrimitiveDateTime;
use youless_client::domain::{Reading, TableRef};

use crate::{
    collector,
    profile::GranularityProfile,
    transform::{DecodeError, RawReport},
};

/// Coarse classification used by callers to decide on retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedSample,
    FetchFailed,
    StoreUnavailable,
    SchemaMismatch,
}

impl ErrorKind {
    /// Whether re-running the whole profile cycle later can succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::FetchFailed | Self::StoreUnavailable)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    #[error("page {page}: {source}")]
    MalformedSample {
        page: u32,
        #[source]
        source: DecodeError,
    },
    #[error("fetching page {page} failed: {reason}")]
    FetchFailed { page: u32, reason: String },
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("schema mismatch on table {table}: {reason}")]
    SchemaMismatch { table: String, reason: String },
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedSample { .. } => ErrorKind::MalformedSample,
            Self::FetchFailed { .. } => ErrorKind::FetchFailed,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Self::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
        }
    }
}

impl From<sqlx::Error> for IngestError {
    fn from(e: sqlx::Error) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}

/// Earliest and latest timestamp of a collected batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: PrimitiveDateTime,
    pub end: PrimitiveDateTime,
}

impl TimeWindow {
    pub fn of(batch: &[Reading]) -> Option<Self> {
        let start = batch.iter().map(|r| r.ts).min()?;
        let end = batch.iter().map(|r| r.ts).max()?;
        Some(Self { start, end })
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// A failed collect+merge cycle for one profile.
#[derive(Debug)]
pub struct CycleError {
    pub profile: &'static str,
    pub table: TableRef,
    pub window: Option<TimeWindow>,
    pub source: IngestError,
}

impl CycleError {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "profile {} (table {}", self.profile, self.table)?;
        if let Some(window) = &self.window {
            write!(f, ", window {window}")?;
        }
        write!(f, "): {}", self.source)
    }
}

impl std::error::Error for CycleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeResult {
    pub inserted: u64,
    pub updated: u64,
}

/// Upstream of report pages.
#[async_trait::async_trait]
pub trait ReportSource: Send + Sync {
    async fn fetch_page(&self, profile: &GranularityProfile, page: u32) -> Result<RawReport, IngestError>;
}

/// Durable, timestamp-keyed reading tables.
#[async_trait::async_trait]
pub trait ReadingStore: Send + Sync {
    /// Reconcile `batch` into `table` atomically: update rows whose
    /// timestamp exists, insert the rest, touch nothing else.
    async fn merge(&self, table: &TableRef, batch: &[Reading]) -> Result<MergeResult, IngestError>;
}

pub type ProfileOutcome = (&'static str, Result<MergeResult, CycleError>);

pub struct Pipeline<S, K> {
    pub source: S,
    pub store: K,
    pub page_concurrency: usize,
}

impl<S, K> Pipeline<S, K>
where
    S: ReportSource,
    K: ReadingStore,
{
    /// Collect every page for `profile`, then merge the whole batch.
    pub async fn run_profile(&self, profile: &GranularityProfile) -> Result<MergeResult, CycleError> {
        let started = Instant::now();
        let fail = |window, source| CycleError {
            profile: profile.id,
            table: profile.table.clone(),
            window,
            source,
        };

        let batch = collector::collect(&self.source, profile, self.page_concurrency)
            .await
            .map_err(|e| fail(None, e))?;

        let result = self
            .store
            .merge(&profile.table, &batch)
            .await
            .map_err(|e| fail(TimeWindow::of(&batch), e))?;

        metrics::histogram!("youless_cycle_duration_seconds", "profile" => profile.id)
            .record(started.elapsed().as_secs_f64());

        Ok(result)
    }

    /// Run every profile concurrently. One profile failing never affects
    /// the others.
    pub async fn run_cycle(&self, profiles: &[GranularityProfile]) -> Vec<ProfileOutcome> {
        let runs = profiles.iter().map(|p| async move { (p.id, self.run_profile(p).await) });
        let outcomes = join_all(runs).await;

        for (profile, outcome) in &outcomes {
            match outcome {
                Ok(res) => tracing::info!(
                    profile,
                    inserted = res.inserted,
                    updated = res.updated,
                    "profile cycle complete"
                ),
                Err(e) => tracing::error!(
                    profile,
                    error = %e,
                    retryable = e.kind().is_retryable(),
                    "profile cycle failed"
                ),
            }
        }

        outcomes
    }
}
