use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tabula_core::{ColumnType, Upload};
use tabula_query::{ContinuationToken, DispatchOutcome, UPLOADS_DATA_SOURCE};
use uuid::Uuid;

/// Body of every `POST /api/v1/queries/run` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunResponse {
    Pending { token: ContinuationToken },
    Done { payload: String },
    Error { message: String },
}

impl From<DispatchOutcome> for RunResponse {
    fn from(outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Done(payload) => RunResponse::Done { payload },
            DispatchOutcome::Pending(token) => RunResponse::Pending { token },
            DispatchOutcome::Failed(message) => RunResponse::Error { message },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub run_id: Uuid,
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

/// Parameters for a query that previews an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewQuery {
    pub statement: String,
    pub data_source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub id: u64,
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
    pub creator: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub preview: PreviewQuery,
}

impl From<Upload> for UploadResponse {
    fn from(upload: Upload) -> Self {
        Self {
            id: upload.id.0,
            preview: PreviewQuery {
                statement: upload.table_name.clone(),
                data_source: UPLOADS_DATA_SOURCE.to_string(),
            },
            table_name: upload.table_name,
            columns: upload
                .columns
                .into_iter()
                .map(|(name, column_type)| ColumnInfo { name, column_type })
                .collect(),
            creator: upload.creator,
            created_at: upload.created_at,
            updated_at: upload.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_tags() {
        let done = serde_json::to_value(RunResponse::Done {
            payload: "{\"looks\": \"like json\"}".to_string(),
        })
        .unwrap();
        assert_eq!(done, json!({"status": "done", "payload": "{\"looks\": \"like json\"}"}));

        let error: RunResponse =
            serde_json::from_value(json!({"status": "error", "message": "boom"})).unwrap();
        assert_eq!(error, RunResponse::Error { message: "boom".to_string() });
    }

    #[test]
    fn test_pending_carries_token() {
        let token = ContinuationToken::new(Uuid::new_v4(), "uploads");
        let value = serde_json::to_value(RunResponse::Pending { token: token.clone() }).unwrap();
        assert_eq!(value["status"], "pending");
        assert_eq!(value["token"]["run_id"], json!(token.run_id));
    }
}
