use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tabula_api::{FilePayload, HttpClient, PollCorrelator, PollState, Transport};
use tabula_core::{CellValue, ColumnType, Error, Result, TabulaConfig};
use tabula_query::{QueryEngine, QueryParams, QueryRequest, QueryResult};
use tabula_server::{http::create_router, startup::Application};

/// Sleeps for `delay_ms` (option, default 300) then echoes the `tag` param.
struct SlowEngine;

#[async_trait]
impl QueryEngine for SlowEngine {
    fn name(&self) -> &str {
        "slow"
    }

    async fn run(&self, request: QueryRequest) -> Result<QueryResult> {
        let delay = request.option_usize("delay_ms").unwrap_or(300) as u64;
        tokio::time::sleep(Duration::from_millis(delay)).await;
        if request.statement == "fail" {
            return Err(Error::Execution("relation \"fail\" does not exist".to_string()));
        }
        let tag = request
            .params
            .get("tag")
            .and_then(Value::as_str)
            .unwrap_or("none")
            .to_string();
        Ok(QueryResult {
            columns: vec!["statement".to_string(), "tag".to_string()],
            rows: vec![vec![
                Some(CellValue::Text(request.statement)),
                Some(CellValue::Text(tag)),
            ]],
        })
    }
}

async fn spawn_server() -> (Arc<HttpClient>, Application) {
    let mut config = TabulaConfig::default();
    config.query.time_budget_ms = 50;
    let app = Application::build(&config, vec![Arc::new(SlowEngine)]);
    let router = create_router(app.state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let client = HttpClient::new(&format!("http://{}", addr)).unwrap();
    (Arc::new(client), app)
}

fn params(statement: &str, data_source: &str, options: Value) -> QueryParams {
    let mut params = Map::new();
    params.insert("statement".to_string(), json!(statement));
    params.insert("data_source".to_string(), json!(data_source));
    params.insert("options".to_string(), options);
    params
}

#[tokio::test]
async fn test_slow_query_resolves_through_polling() {
    let (client, _app) = spawn_server().await;
    let correlator = PollCorrelator::new(client).with_interval(Duration::from_millis(20));

    let mut request = params("select 1", "slow", json!({}));
    request.insert("tag".to_string(), json!("keep-me"));
    let payload = correlator.run_query(request).await.unwrap();

    assert!(payload.contains("select 1"));
    assert!(payload.contains("keep-me"));
    assert!(payload.ends_with("(1 row)\n"));
    assert_eq!(correlator.state(), PollState::Completed);
}

#[tokio::test]
async fn test_engine_error_reaches_client_verbatim() {
    let (client, _app) = spawn_server().await;
    let correlator = PollCorrelator::new(client).with_interval(Duration::from_millis(20));

    let err = correlator
        .run_query(params("fail", "slow", json!({ "delay_ms": 100 })))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Execution(ref msg) if msg == "relation \"fail\" does not exist"));
}

#[tokio::test]
async fn test_unknown_data_source_is_transport_error() {
    let (client, _app) = spawn_server().await;
    let correlator = PollCorrelator::new(client);

    let err = correlator
        .run_query(params("select 1", "nowhere", json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(ref msg) if msg.starts_with("HTTP 400")));
}

#[tokio::test]
async fn test_abandoned_poll_cancels_server_run() {
    let (client, app) = spawn_server().await;
    // Abandon while the client sleeps between polls and the run is parked
    let correlator = PollCorrelator::new(client).with_interval(Duration::from_millis(500));

    let request = params("select 1", "slow", json!({ "delay_ms": 60_000 }));
    let abandoned = tokio::time::timeout(Duration::from_millis(200), correlator.run_query(request)).await;
    assert!(abandoned.is_err());

    for _ in 0..50 {
        if app.registry.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(app.registry.is_empty());
}

#[tokio::test]
async fn test_upload_then_preview_over_http() {
    let (client, _app) = spawn_server().await;

    let upload = client
        .create_upload(
            "signups",
            FilePayload::csv("id,amount\n1,10.5\n2,20\n"),
            Some("ana"),
        )
        .await
        .unwrap();
    assert_eq!(upload.columns.len(), 2);
    assert_eq!(upload.columns[1].column_type, ColumnType::Decimal);
    assert_eq!(upload.creator.as_deref(), Some("ana"));

    let preview = params(
        &upload.preview.statement,
        &upload.preview.data_source,
        json!({ "format": "csv" }),
    );
    let payload = PollCorrelator::new(client.clone())
        .with_interval(Duration::from_millis(20))
        .run_query(preview)
        .await
        .unwrap();
    assert_eq!(payload, "id,amount\n1,10.5\n2,20\n");

    let renamed = client.update_upload(upload.id, Some("members"), None).await.unwrap();
    assert_eq!(renamed.table_name, "members");
    assert_eq!(client.list_uploads().await.unwrap().len(), 1);

    client.delete_upload(upload.id).await.unwrap();
    let missing = client.get_upload(upload.id).await.unwrap_err();
    assert!(matches!(missing, Error::Transport(ref msg) if msg.starts_with("HTTP 404")));
}

#[tokio::test]
async fn test_cancel_unknown_run_is_not_an_error() {
    let (client, _app) = spawn_server().await;
    client.cancel(uuid::Uuid::new_v4()).await.unwrap();
}
