pub mod sqlite;

pub use sqlite::SqliteMergeSink;
