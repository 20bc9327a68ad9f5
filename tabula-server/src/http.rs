// HTTP routes for query polling and upload management

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tabula_api::{
    CancelResponse, ErrorResponse, HealthResponse, RunResponse, UploadResponse, USER_HEADER,
};
use tabula_core::{Error, IngestionFailure, UploadId};
use tabula_query::{request::CONTINUATION_KEY, ContinuationToken, Dispatcher, QueryParams};
use tabula_storage::{UploadFile, UploadService};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    pub uploads: Arc<UploadService>,
    pub dispatcher: Arc<Dispatcher>,
    pub max_file_bytes: usize,
}

pub fn create_router(state: ApiState) -> Router {
    let body_limit = state.max_file_bytes;

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/queries/run", post(run_query_handler))
        .route("/api/v1/queries/:run_id", delete(cancel_query_handler))
        .route(
            "/api/v1/uploads",
            get(list_uploads_handler).post(create_upload_handler),
        )
        .route(
            "/api/v1/uploads/:id",
            get(get_upload_handler)
                .put(update_upload_handler)
                .delete(delete_upload_handler),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Map a library error onto a status code and the JSON error body.
pub fn error_response(err: Error) -> Response {
    let status = match &err {
        Error::MalformedInput(_) | Error::InvalidIdentifier(_) => StatusCode::BAD_REQUEST,
        Error::Ingestion {
            reason: IngestionFailure::NotTabular,
            ..
        } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        Error::Ingestion {
            reason: IngestionFailure::StorageRejected,
            ..
        } => StatusCode::UNPROCESSABLE_ENTITY,
        Error::UploadNotFound(_) => StatusCode::NOT_FOUND,
        Error::TableTaken(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!("Request failed: {}", err);
    } else {
        warn!("Request rejected: {}", err);
    }

    let body = Json(ErrorResponse {
        error: err.to_string(),
        code: err.code().to_string(),
    });
    (status, body).into_response()
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn run_query_handler(
    State(state): State<ApiState>,
    Json(params): Json<QueryParams>,
) -> Response {
    let token = match params.get(CONTINUATION_KEY) {
        None | Some(serde_json::Value::Null) => None,
        Some(value) => match ContinuationToken::from_value(value) {
            Ok(token) => Some(token),
            Err(e) => return error_response(e),
        },
    };

    match state.dispatcher.execute(&params, token.as_ref()).await {
        Ok(outcome) => Json(RunResponse::from(outcome)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn cancel_query_handler(
    State(state): State<ApiState>,
    Path(run_id): Path<Uuid>,
) -> impl IntoResponse {
    let cancelled = state.dispatcher.cancel(&run_id);
    Json(CancelResponse { run_id, cancelled })
}

#[derive(Debug, Deserialize)]
struct TableParams {
    table: Option<String>,
}

fn upload_file(headers: &HeaderMap, body: Bytes) -> Option<UploadFile> {
    if body.is_empty() {
        return None;
    }
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Some(UploadFile {
        content_type,
        contents: body,
    })
}

async fn create_upload_handler(
    State(state): State<ApiState>,
    Query(params): Query<TableParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let table_name = params.table.unwrap_or_default();
    let creator = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    info!("Creating upload: {}", table_name);

    match state
        .uploads
        .create(&table_name, upload_file(&headers, body), creator)
        .await
    {
        Ok(upload) => (StatusCode::CREATED, Json(UploadResponse::from(upload))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_uploads_handler(State(state): State<ApiState>) -> Response {
    match state.uploads.list().await {
        Ok(uploads) => {
            let body: Vec<UploadResponse> = uploads.into_iter().map(UploadResponse::from).collect();
            Json(body).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn get_upload_handler(State(state): State<ApiState>, Path(id): Path<u64>) -> Response {
    match state.uploads.show(UploadId(id)).await {
        Ok(upload) => Json(UploadResponse::from(upload)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn update_upload_handler(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
    Query(params): Query<TableParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match state
        .uploads
        .update(UploadId(id), params.table.as_deref(), upload_file(&headers, body))
        .await
    {
        Ok(upload) => Json(UploadResponse::from(upload)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_upload_handler(State(state): State<ApiState>, Path(id): Path<u64>) -> Response {
    match state.uploads.destroy(UploadId(id)).await {
        Ok(upload) => Json(UploadResponse::from(upload)).into_response(),
        Err(e) => error_response(e),
    }
}
