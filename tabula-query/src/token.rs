use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabula_core::{Error, Result};
use uuid::Uuid;

/// Opaque-to-clients handle on a run that outlived one request's time
/// budget. Clients echo it back unchanged to resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationToken {
    pub run_id: Uuid,
    pub data_source: String,
    pub issued_at: DateTime<Utc>,
}

impl ContinuationToken {
    pub fn new(run_id: Uuid, data_source: impl Into<String>) -> Self {
        Self {
            run_id,
            data_source: data_source.into(),
            issued_at: Utc::now(),
        }
    }

    /// Same run, freshly issued.
    pub fn reissue(&self) -> Self {
        Self::new(self.run_id, self.data_source.clone())
    }

    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| Error::MalformedInput(format!("invalid continuation token: {}", e)))
    }
}
