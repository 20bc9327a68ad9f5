use crate::types::{ColumnType, UploadId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata row describing one imported dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upload {
    pub id: UploadId,
    /// Logical table name, unique across uploads.
    pub table_name: String,
    /// Derived at ingestion time.
    pub columns: Vec<(String, ColumnType)>,
    /// Principal that created the upload, when known.
    pub creator: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Upload {
    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, t)| *t)
    }
}

/// Upload metadata before the catalog assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUpload {
    pub table_name: String,
    pub columns: Vec<(String, ColumnType)>,
    pub creator: Option<String>,
}
