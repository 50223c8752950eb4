use time::{Duration, PrimitiveDateTime};
use youless_client::domain::Reading;

/// Sample text the meter uses for "no observation in this slot".
const MISSING_SENTINEL: &str = "*";

/// One page of a meter report, before decoding.
///
/// `samples[i]` belongs to `anchor + i * interval_seconds`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReport {
    pub anchor: PrimitiveDateTime,
    pub interval_seconds: i64,
    pub unit: String,
    pub samples: Vec<String>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("sample {value:?} in slot {slot} is not a decimal number")]
    MalformedSample { slot: usize, value: String },
    #[error("report interval must be positive, got {0}s")]
    NonPositiveInterval(i64),
    #[error("timestamp of slot {slot} is out of range")]
    TimestampOverflow { slot: usize },
}

fn is_missing(sample: &str) -> bool {
    sample.is_empty() || sample == MISSING_SENTINEL
}

/// Parse one sample, accepting either `.` or `,` as the fractional separator.
///
/// Returns `Ok(None)` for a missing-marker sample.
pub fn parse_sample(slot: usize, raw: &str) -> Result<Option<f64>, DecodeError> {
    let trimmed = raw.trim();
    if is_missing(trimmed) {
        return Ok(None);
    }

    let malformed = || DecodeError::MalformedSample {
        slot,
        value: raw.to_string(),
    };

    // A value carrying both separators is ambiguous ("1,234.5" vs "1.234,5").
    if trimmed.contains(',') && trimmed.contains('.') {
        return Err(malformed());
    }

    let value: f64 = trimmed.replace(',', ".").parse().map_err(|_| malformed())?;
    if !value.is_finite() {
        return Err(malformed());
    }

    Ok(Some(value))
}

/// Pure decoding of one report page into absolute-timestamped readings.
///
/// Missing samples produce no reading but still advance the running
/// timestamp, so later slots keep their position.
pub fn decode(report: &RawReport) -> Result<Vec<Reading>, DecodeError> {
    if report.interval_seconds <= 0 {
        return Err(DecodeError::NonPositiveInterval(report.interval_seconds));
    }

    let step = Duration::seconds(report.interval_seconds);
    let mut out = Vec::with_capacity(report.samples.len());
    let mut ts = Some(report.anchor);

    for (slot, raw) in report.samples.iter().enumerate() {
        let value = parse_sample(slot, raw)?;
        let current = ts.ok_or(DecodeError::TimestampOverflow { slot })?;

        if let Some(value) = value {
            out.push(Reading {
                ts: current,
                value,
                unit: report.unit.clone(),
            });
        }

        ts = current.checked_add(step);
    }

    Ok(out)
}
