pub mod collector;
pub mod config;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod profile;
pub mod sinks;
pub mod sources;
pub mod transform;

pub use pipeline::{Pipeline, ReadingStore, ReportSource};
