// Tabula command line interface

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tabula_api::{FilePayload, HttpClient, PollCorrelator, PollState, UploadResponse};
use tabula_core::TabulaConfig;
use tabula_query::request::{DATA_SOURCE_KEY, OPTIONS_KEY, STATEMENT_KEY};
use tabula_query::QueryParams;
use tracing::debug;

#[derive(Parser)]
#[command(name = "tabula")]
#[command(about = "Tabula command line interface", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, default_value = "http://localhost:8080", global = true)]
    server: String,

    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show server health
    Health,

    /// Run a query and wait for its result
    Query {
        /// Statement text
        statement: String,

        /// Data source id
        #[arg(long, short, default_value = "uploads")]
        data_source: String,

        /// Output format (table, csv)
        #[arg(long, short)]
        format: Option<String>,

        /// Engine option as key=value (repeatable)
        #[arg(long = "option", short = 'o')]
        options: Vec<String>,

        /// Extra request parameter as key=value (repeatable)
        #[arg(long = "param")]
        params: Vec<String>,

        /// Milliseconds between polls (default: TABULA_POLL_INTERVAL_MS or 1000)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Upload a CSV file as a new table
    Upload {
        /// File to upload
        file: String,

        /// Table name
        #[arg(long, short)]
        table: String,

        /// Content type to declare (default: from the file extension)
        #[arg(long)]
        content_type: Option<String>,

        /// User recorded as the creator
        #[arg(long)]
        user: Option<String>,
    },

    /// Replace an upload's data, optionally under a new name
    Reupload {
        id: u64,

        file: String,

        #[arg(long, short)]
        table: Option<String>,

        #[arg(long)]
        content_type: Option<String>,
    },

    /// Rename an upload's table without reloading it
    Rename { id: u64, table: String },

    /// Show one upload
    Show { id: u64 },

    /// List uploads
    List,

    /// Drop an upload and its table
    Drop { id: u64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    }

    let client = Arc::new(HttpClient::new(&cli.server)?);

    match cli.command {
        Commands::Health => {
            let health = client.health().await?;
            println!("{} (v{})", health.status, health.version);
        }
        Commands::Query {
            statement,
            data_source,
            format,
            options,
            params,
            interval,
        } => {
            let params = build_params(statement, data_source, format, &options, &params)?;
            let interval = match interval {
                Some(ms) => Duration::from_millis(ms.max(10)),
                None => {
                    let mut config = TabulaConfig::default();
                    config.apply_env();
                    config.query.poll_interval()
                }
            };
            let output = run_query(client, params, interval).await?;
            print!("{}", output);
        }
        Commands::Upload {
            file,
            table,
            content_type,
            user,
        } => {
            let payload = read_file(&file, content_type).await?;
            let upload = client.create_upload(&table, payload, user.as_deref()).await?;
            print_upload(&upload);
        }
        Commands::Reupload {
            id,
            file,
            table,
            content_type,
        } => {
            let payload = read_file(&file, content_type).await?;
            let upload = client.update_upload(id, table.as_deref(), Some(payload)).await?;
            print_upload(&upload);
        }
        Commands::Rename { id, table } => {
            let upload = client.update_upload(id, Some(&table), None).await?;
            print_upload(&upload);
        }
        Commands::Show { id } => {
            print_upload(&client.get_upload(id).await?);
        }
        Commands::List => {
            for upload in client.list_uploads().await? {
                println!("{:>6}  {}", upload.id, upload.table_name);
            }
        }
        Commands::Drop { id } => {
            let upload = client.delete_upload(id).await?;
            println!("Dropped {} ({})", upload.table_name, upload.id);
        }
    }

    Ok(())
}

fn parse_pairs(pairs: &[String]) -> anyhow::Result<Map<String, Value>> {
    let mut map = Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("expected key=value, got \"{}\"", pair))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        map.insert(key.to_string(), value);
    }
    Ok(map)
}

fn build_params(
    statement: String,
    data_source: String,
    format: Option<String>,
    options: &[String],
    extra: &[String],
) -> anyhow::Result<QueryParams> {
    let mut options = parse_pairs(options)?;
    if let Some(format) = format {
        options.insert("format".to_string(), Value::String(format));
    }

    let mut params = parse_pairs(extra)?;
    params.insert(STATEMENT_KEY.to_string(), Value::String(statement));
    params.insert(DATA_SOURCE_KEY.to_string(), Value::String(data_source));
    params.insert(OPTIONS_KEY.to_string(), Value::Object(options));
    Ok(params)
}

async fn run_query(
    client: Arc<HttpClient>,
    params: QueryParams,
    interval: Duration,
) -> anyhow::Result<String> {
    let correlator = PollCorrelator::new(client).with_interval(interval);
    let mut states = correlator.subscribe();
    let progress = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            if let PollState::Retrying { attempt } = state {
                eprintln!("still running... ({} polls)", attempt);
            }
        }
    });

    let outcome = tokio::select! {
        result = correlator.run_query(params) => result.map_err(anyhow::Error::from),
        _ = tokio::signal::ctrl_c() => {
            debug!("Interrupted, cancelling query");
            Err(anyhow!("interrupted"))
        }
    };
    progress.abort();
    if outcome.is_err() {
        // Give the best-effort cancel a moment to reach the server
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    outcome
}

async fn read_file(path: &str, content_type: Option<String>) -> anyhow::Result<FilePayload> {
    let contents = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path))?;
    let content_type = content_type.unwrap_or_else(|| {
        match Path::new(path).extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => "text/csv".to_string(),
            _ => "application/octet-stream".to_string(),
        }
    });
    Ok(FilePayload {
        content_type,
        contents: contents.into(),
    })
}

fn print_upload(upload: &UploadResponse) {
    println!("Upload {}: {}", upload.id, upload.table_name);
    for column in &upload.columns {
        println!("  {:<32} {}", column.name, column.column_type);
    }
    if let Some(creator) = &upload.creator {
        println!("Created by {} at {}", creator, upload.created_at);
    }
    println!(
        "Preview: tabula query {} --data-source {}",
        upload.preview.statement, upload.preview.data_source
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_params() {
        let params = build_params(
            "sales".to_string(),
            "uploads".to_string(),
            Some("csv".to_string()),
            &["limit=5".to_string()],
            &["trace_id=abc".to_string()],
        )
        .unwrap();
        assert_eq!(params["statement"], "sales");
        assert_eq!(params["options"]["limit"], 5);
        assert_eq!(params["options"]["format"], "csv");
        assert_eq!(params["trace_id"], "abc");
    }

    #[test]
    fn test_bad_pair() {
        assert!(parse_pairs(&["novalue".to_string()]).is_err());
    }
}
