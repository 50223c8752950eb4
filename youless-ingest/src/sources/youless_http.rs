use std::time::Duration;

use time::{macros::format_description, PrimitiveDateTime};

use crate::{
    config::MeterConfig,
    pipeline::{IngestError, ReportSource},
    profile::GranularityProfile,
    transform::RawReport,
};

/// Report page as served by the meter with `f=j`.
#[derive(Debug, serde::Deserialize)]
struct YoulessReport {
    un: String,
    tm: String,
    dt: i64,
    #[serde(default)]
    val: Vec<Option<String>>,
}

impl YoulessReport {
    fn into_raw(self, page: u32) -> Result<RawReport, IngestError> {
        let fmt = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
        let anchor = PrimitiveDateTime::parse(self.tm.trim(), fmt).map_err(|e| IngestError::FetchFailed {
            page,
            reason: format!("invalid tm {:?}: {e}", self.tm),
        })?;

        if self.dt <= 0 {
            return Err(IngestError::FetchFailed {
                page,
                reason: format!("invalid dt {}", self.dt),
            });
        }

        Ok(RawReport {
            anchor,
            interval_seconds: self.dt,
            unit: self.un,
            samples: self.val.into_iter().map(Option::unwrap_or_default).collect(),
        })
    }
}

/// Pulls report pages from the meter's local HTTP interface.
pub struct YoulessHttpSource {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl YoulessHttpSource {
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        max_retries: u32,
        retry_backoff: Duration,
    ) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries,
            retry_backoff,
        })
    }

    pub fn from_config(cfg: &MeterConfig) -> reqwest::Result<Self> {
        Self::new(
            &cfg.base_url,
            Duration::from_millis(cfg.request_timeout_ms),
            cfg.max_retries,
            Duration::from_millis(cfg.retry_backoff_ms),
        )
    }

    fn report_url(&self, profile: &GranularityProfile) -> String {
        format!("{}/{}", self.base_url, profile.upstream_path)
    }

    async fn fetch_once(&self, profile: &GranularityProfile, page: u32) -> Result<RawReport, IngestError> {
        let failed = |reason: String| IngestError::FetchFailed { page, reason };

        let resp = self
            .client
            .get(self.report_url(profile))
            .query(&[("f", "j".to_string()), (profile.page_param, page.to_string())])
            .send()
            .await
            .map_err(|e| failed(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(failed(format!("meter answered HTTP {status}")));
        }

        let body: YoulessReport = resp
            .json()
            .await
            .map_err(|e| failed(format!("malformed body: {e}")))?;

        body.into_raw(page)
    }
}

#[async_trait::async_trait]
impl ReportSource for YoulessHttpSource {
    async fn fetch_page(&self, profile: &GranularityProfile, page: u32) -> Result<RawReport, IngestError> {
        let mut attempt: u32 = 0;
        loop {
            match self.fetch_once(profile, page).await {
                Ok(report) => {
                    metrics::counter!("youless_pages_fetched_total", "profile" => profile.id).increment(1);
                    return Ok(report);
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(
                        profile = profile.id,
                        page,
                        error = %e,
                        attempt,
                        "meter page fetch failed, retrying with backoff"
                    );
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(profile = profile.id, page, error = %e, "meter page fetch failed, giving up");
                    metrics::counter!("youless_fetch_errors_total", "profile" => profile.id).increment(1);
                    return Err(e);
                }
            }
        }
    }
}
