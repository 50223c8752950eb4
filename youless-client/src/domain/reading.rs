use time::{format_description::FormatItem, macros::format_description, PrimitiveDateTime};

/// Text layout of the `time` column.
///
/// Matches what earlier deployments wrote, so rows created by them compare
/// equal to rows written here.
pub const STORED_TS_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

const ISO_TS_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

/// One observed sample from the meter.
///
/// `ts` is the meter's local wall clock; the device reports no offset.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reading {
    pub ts: PrimitiveDateTime,
    pub value: f64,
    pub unit: String,
}

impl Reading {
    pub fn new(ts: PrimitiveDateTime, value: f64, unit: impl Into<String>) -> Self {
        Self {
            ts,
            value,
            unit: unit.into(),
        }
    }
}

/// Row shape of a reading table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReadingRow {
    pub time: String,
    pub energy_consumption: f64,
    pub unit: String,
}

impl TryFrom<ReadingRow> for Reading {
    type Error = time::error::Parse;

    fn try_from(row: ReadingRow) -> Result<Self, Self::Error> {
        Ok(Reading {
            ts: parse_stored_ts(&row.time)?,
            value: row.energy_consumption,
            unit: row.unit,
        })
    }
}

/// Render `ts` in the stored layout. Merge keys compare this text, so there
/// is no fallback to another layout.
pub fn format_stored_ts(ts: PrimitiveDateTime) -> Result<String, time::error::Format> {
    ts.format(STORED_TS_FORMAT)
}

/// Parse a stored timestamp, accepting either a space or `T` separator.
pub fn parse_stored_ts(s: &str) -> Result<PrimitiveDateTime, time::error::Parse> {
    let s = s.trim();
    PrimitiveDateTime::parse(s, STORED_TS_FORMAT).or_else(|_| PrimitiveDateTime::parse(s, ISO_TS_FORMAT))
}
