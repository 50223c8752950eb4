use youless_client::domain::{Granularity, MetricStream, TableRef};

/// Where one (metric stream, granularity) pair comes from and where it goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GranularityProfile {
    pub id: &'static str,
    pub stream: MetricStream,
    pub granularity: Granularity,
    /// Report path on the meter, `V` for electricity and `W` for gas.
    pub upstream_path: &'static str,
    /// Query parameter carrying the 1-based page number.
    pub page_param: &'static str,
    pub page_count: u32,
    pub table: TableRef,
}

pub static PROFILES: [GranularityProfile; 5] = [
    GranularityProfile {
        id: "electricity-minute",
        stream: MetricStream::Electricity,
        granularity: Granularity::Minute,
        upstream_path: "V",
        page_param: "h",
        page_count: 20,
        table: TableRef::from_static("youless_minute"),
    },
    GranularityProfile {
        id: "electricity-hour",
        stream: MetricStream::Electricity,
        granularity: Granularity::Hour,
        upstream_path: "V",
        page_param: "d",
        page_count: 70,
        table: TableRef::from_static("youless_hour"),
    },
    GranularityProfile {
        id: "electricity-day",
        stream: MetricStream::Electricity,
        granularity: Granularity::Day,
        upstream_path: "V",
        page_param: "m",
        page_count: 12,
        table: TableRef::from_static("youless_day"),
    },
    GranularityProfile {
        id: "gas-hour",
        stream: MetricStream::Gas,
        granularity: Granularity::Hour,
        upstream_path: "W",
        page_param: "d",
        page_count: 70,
        table: TableRef::from_static("youless_hour_gas"),
    },
    GranularityProfile {
        id: "gas-day",
        stream: MetricStream::Gas,
        granularity: Granularity::Day,
        upstream_path: "W",
        page_param: "m",
        page_count: 12,
        table: TableRef::from_static("youless_day_gas"),
    },
];

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown profile {0:?}")]
pub struct UnknownProfile(pub String);

pub fn lookup(id: &str) -> Option<&'static GranularityProfile> {
    PROFILES.iter().find(|p| p.id == id)
}

/// Electricity profiles always, gas profiles only when the meter has a gas
/// sensor attached.
pub fn enabled_profiles(gas_enabled: bool) -> Vec<GranularityProfile> {
    PROFILES
        .iter()
        .filter(|p| gas_enabled || p.stream != MetricStream::Gas)
        .cloned()
        .collect()
}

/// Profiles named explicitly, in the given order.
pub fn select<S: AsRef<str>>(ids: &[S]) -> Result<Vec<GranularityProfile>, UnknownProfile> {
    ids.iter()
        .map(|id| {
            lookup(id.as_ref())
                .cloned()
                .ok_or_else(|| UnknownProfile(id.as_ref().to_string()))
        })
        .collect()
}
