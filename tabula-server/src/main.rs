// Tabula server: CSV uploads and time-budgeted query polling over HTTP

use clap::Parser;
use std::net::SocketAddr;
use tabula_core::TabulaConfig;
use tabula_server::{http::create_router, startup::Application};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tabula-server")]
#[command(about = "Tabula upload and query server", long_about = None)]
struct Args {
    /// Configuration file (JSON, TOML or YAML)
    #[arg(short, long)]
    config: Option<String>,

    /// Bind address
    #[arg(long)]
    host: Option<String>,

    /// Bind port
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    if config.logging.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    info!("Starting Tabula server v{}", env!("CARGO_PKG_VERSION"));

    let app = Application::build(&config, Vec::new());
    let sweeper = app.spawn_sweeper(&config);
    let router = create_router(app.state);

    let addr: SocketAddr = format!("{}:{}", config.network.bind_address, config.network.bind_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address: {}", e))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    sweeper.abort();
    info!("Server stopped");
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<TabulaConfig> {
    let mut config = match &args.config {
        Some(path) => TabulaConfig::from_file(path)?,
        None => TabulaConfig::default(),
    };
    config.apply_env();

    if let Some(host) = &args.host {
        config.network.bind_address = host.clone();
    }
    if let Some(port) = args.port {
        config.network.bind_port = port;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Wait for Ctrl+C or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
