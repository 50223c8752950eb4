use std::{borrow::Cow, fmt};

/// Physical quantity tracked by a report stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MetricStream {
    Electricity,
    Gas,
}

impl MetricStream {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Electricity => "electricity",
            Self::Gas => "gas",
        }
    }
}

impl fmt::Display for MetricStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sampling resolution of a report stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Granularity {
    Minute,
    Hour,
    Day,
}

impl Granularity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("invalid table name {0:?}: only a-z, 0-9 and '_' are allowed")]
pub struct InvalidTableName(pub String);

/// Name of one persisted reading table.
///
/// Table names end up inside SQL text, so they are restricted to lowercase
/// ASCII letters, digits and underscores and may not start with a digit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef(Cow<'static, str>);

const fn is_valid_table_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes[0].is_ascii_digit() {
        return false;
    }
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if !(b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_') {
            return false;
        }
        i += 1;
    }
    true
}

impl TableRef {
    /// Compile-time table name. Panics during const evaluation on a bad name.
    pub const fn from_static(name: &'static str) -> Self {
        assert!(is_valid_table_name(name), "invalid table name");
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Result<Self, InvalidTableName> {
        let name = name.into();
        if is_valid_table_name(&name) {
            Ok(Self(Cow::Owned(name)))
        } else {
            Err(InvalidTableName(name))
        }
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Double-quoted identifier for use in SQL text.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_ref_accepts_snake_case_names() {
        let t = TableRef::new("youless_hour_gas").unwrap();
        assert_eq!(t.name(), "youless_hour_gas");
        assert_eq!(t.quoted(), "\"youless_hour_gas\"");
    }

    #[test]
    fn table_ref_rejects_names_that_could_escape_sql() {
        for bad in ["", "1table", "Youless", "a b", "x\"; DROP TABLE y; --", "gas-day"] {
            assert_eq!(TableRef::new(bad), Err(InvalidTableName(bad.to_string())));
        }
    }

    #[test]
    fn static_and_owned_refs_compare_equal() {
        const MINUTE: TableRef = TableRef::from_static("youless_minute");
        assert_eq!(MINUTE, TableRef::new("youless_minute").unwrap());
    }
}
