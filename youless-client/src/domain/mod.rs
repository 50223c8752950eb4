mod reading;
mod table;

pub use reading::{format_stored_ts, parse_stored_ts, Reading, ReadingRow, STORED_TS_FORMAT};
pub use table::{Granularity, InvalidTableName, MetricStream, TableRef};
