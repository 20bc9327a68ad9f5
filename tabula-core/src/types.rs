use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UploadId(pub u64);

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage type of an uploaded column.
///
/// Variants are ordered from narrowest to widest in the inference lattice,
/// with `Timestamp` and `Date` forming a separate branch that only `Text`
/// subsumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Decimal,
    Timestamp,
    Date,
    Text,
}

impl ColumnType {
    /// Native storage type used in DDL.
    pub fn storage_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "bigint",
            ColumnType::Decimal => "decimal",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Date => "date",
            ColumnType::Text => "text",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.storage_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_id() {
        let id1 = UploadId(1);
        let id2 = UploadId(2);
        assert_ne!(id1, id2);
        assert_eq!(id1, UploadId(1));
        assert_eq!(id2.to_string(), "2");
    }

    #[test]
    fn test_column_type_storage_type() {
        assert_eq!(ColumnType::Integer.storage_type(), "bigint");
        assert_eq!(ColumnType::Decimal.storage_type(), "decimal");
        assert_eq!(ColumnType::Timestamp.storage_type(), "timestamp");
        assert_eq!(ColumnType::Date.storage_type(), "date");
        assert_eq!(ColumnType::Text.to_string(), "text");
    }

    #[test]
    fn test_column_type_serde() {
        let json = serde_json::to_string(&ColumnType::Decimal).unwrap();
        assert_eq!(json, "\"decimal\"");
        let back: ColumnType = serde_json::from_str("\"timestamp\"").unwrap();
        assert_eq!(back, ColumnType::Timestamp);
    }
}
