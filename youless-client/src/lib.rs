//! Shared domain types for the Youless meter tables and the read-only
//! query surface downstream consumers use to read them.

pub mod db;
pub mod domain;
