//! Run the explainx coordinator behind HTTP and WebSocket endpoints.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p explainx-web
//! cargo run -p explainx-web -- --port 8080 --data-dir ~/.explainx
//! cargo run -p explainx-web -- --static-dir ./viewer
//! cargo run -p explainx-web -- --allow-origin chrome-extension://<id>
//! ```
//!
//! ## Sending requests
//!
//! **REST** (`POST /api/message`):
//! ```json
//! {"kind": "generateSummary", "content": "Page text..."}
//! ```
//!
//! **WebSocket** (connect to `/ws`):
//! ```json
//! {"id": 1, "request": {"kind": "getSummaries"}}
//! ```

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use axum::http::HeaderValue;
use clap::Parser;
use explainx::config::{AppConfig, DATA_DIR_ENV};
use explainx::coordinator::Coordinator;
use explainx::store::JsonFileBackend;
use explainx::summarizer::RemoteSummarizer;
use explainx_web::{WebConfig, spawn_web};
use tracing::info;

/// Serve the explainx coordinator to browser contexts.
#[derive(Parser)]
#[command(about = "HTTP and WebSocket endpoint for the explainx coordinator")]
struct Args {
    /// Directory holding the summary history and API key.
    #[arg(long, env = DATA_DIR_ENV)]
    data_dir: Option<PathBuf>,

    /// Model used for summaries.
    #[arg(long)]
    model: Option<String>,

    /// OpenAI-compatible chat completions endpoint.
    #[arg(long)]
    endpoint: Option<String>,

    /// Port to listen on.
    #[arg(long, default_value_t = 3001)]
    port: u16,

    /// Serve static files (e.g. a history viewer) from this directory.
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Browser origin allowed to call the API, e.g. chrome-extension://<id>.
    /// Repeatable. Pages served by this server are always allowed.
    #[arg(long = "allow-origin")]
    allow_origins: Vec<String>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

async fn run(args: Args) -> Result<(), String> {
    let config = AppConfig::from_overrides(args.data_dir, args.model, args.endpoint);

    let backend = JsonFileBackend::new(&config.data_dir).map_err(|e| {
        format!(
            "failed to open data directory '{}': {e}",
            config.data_dir.display()
        )
    })?;
    let summarizer = RemoteSummarizer::new(config.coordinator.summarizer.clone())?;
    let handle = Coordinator::new(
        Arc::new(backend),
        Arc::new(summarizer),
        config.coordinator.clone(),
    )
    .and_then(Coordinator::spawn)
    .map_err(|e| format!("failed to load stores: {e}"))?;

    let allowed_origins = args
        .allow_origins
        .iter()
        .map(|o| HeaderValue::from_str(o).map_err(|e| format!("invalid origin '{o}': {e}")))
        .collect::<Result<Vec<_>, _>>()?;

    let web_config = WebConfig {
        bind_addr: ([127, 0, 0, 1], args.port).into(),
        static_dir: args.static_dir,
        allowed_origins,
        ..Default::default()
    };
    let addr = spawn_web(handle, web_config).await?;
    println!("explainx listening on http://{addr}");
    info!("Data directory: {}", config.data_dir.display());

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to wait for shutdown signal: {e}"))?;
    info!("Shutting down");
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    explainx::logging::init(args.verbose);

    if let Err(e) = run(args).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
