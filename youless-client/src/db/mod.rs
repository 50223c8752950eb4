pub mod reading_queries;

pub use reading_queries::{all_readings, latest_reading, readings_between, table_exists};
