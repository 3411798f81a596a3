//! Summarize page text and manage the saved summary history.
//!
//! Runs a coordinator in-process over the on-disk stores, so every command
//! sees the same history and credential as `explainx-web`.
//!
//! # Examples
//!
//! ```sh
//! # Store the API key once
//! explainx set-key sk-or-...
//!
//! # Summarize a page dump and save the result
//! curl -s https://example.com | explainx summarize --title "Example" \
//!   --url https://example.com --save
//!
//! # Browse and prune the history
//! explainx history --search rust
//! explainx delete 1736870400000-0003
//! explainx clear
//! ```

use std::io::{self, Read};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use explainx::config::{AppConfig, DATA_DIR_ENV};
use explainx::prelude::*;

/// Summarize page text and manage the saved summary history.
#[derive(Parser)]
#[command(name = "explainx")]
struct Cli {
    /// Directory holding the summary history and API key
    #[arg(long, env = DATA_DIR_ENV, global = true)]
    data_dir: Option<PathBuf>,

    /// Model used for summaries
    #[arg(long, global = true)]
    model: Option<String>,

    /// OpenAI-compatible chat completions endpoint
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize page text read from a file or stdin
    Summarize {
        /// Read page text from this file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,

        /// Page title stored with the summary
        #[arg(long, default_value = "Untitled page")]
        title: String,

        /// Page URL stored with the summary
        #[arg(long, default_value = "")]
        url: String,

        /// Save the result (the raw text if summarization fails)
        #[arg(long)]
        save: bool,

        /// Seconds to wait for the summary [default: 60]
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// List saved summaries, newest first
    History {
        /// Only show entries whose title or content contains this text
        #[arg(long)]
        search: Option<String>,
    },
    /// Delete one saved summary
    Delete { id: String },
    /// Delete every saved summary
    Clear,
    /// Store the API key used for summaries
    SetKey { key: String },
    /// Show whether an API key is stored
    Key,
}

// ── Helpers ────────────────────────────────────────────────────────

fn read_page_text(file: Option<&PathBuf>) -> Result<String, String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read '{}': {e}", path.display())),
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| format!("failed to read stdin: {e}"))?;
            Ok(buf)
        }
    }
}

fn start_coordinator(config: &AppConfig) -> Result<CoordinatorHandle, String> {
    let backend = JsonFileBackend::new(&config.data_dir).map_err(|e| {
        format!(
            "failed to open data directory '{}': {e}",
            config.data_dir.display()
        )
    })?;
    let summarizer = RemoteSummarizer::new(config.coordinator.summarizer.clone())?;
    Coordinator::new(
        Arc::new(backend),
        Arc::new(summarizer),
        config.coordinator.clone(),
    )
    .and_then(Coordinator::spawn)
    .map_err(|e| format!("failed to load stores: {e}"))
}

async fn summarize(
    handle: CoordinatorHandle,
    page: PageCapture,
    save: bool,
    timeout: Duration,
) -> Result<String, String> {
    let dialog = DialogController::new(handle).with_timeout(timeout);

    let (output, failed) = match dialog.open(&page).await {
        LifecycleState::Showing(summary) => (summary, false),
        LifecycleState::ShowingError(reason) => {
            eprintln!("Error: {reason}");
            (String::new(), true)
        }
        other => return Err(format!("dialog ended {other}")),
    };

    if save {
        if !dialog.is_save_enabled() {
            return Err("nothing to save".to_string());
        }
        let draft = dialog.save().await.map_err(|e| e.to_string())?;
        if draft.is_ai_generated {
            eprintln!("  Saved summary for '{}'", draft.title);
        } else {
            eprintln!("  Saved raw text for '{}'", draft.title);
        }
        return Ok(output);
    }

    if failed {
        return Err("summarization failed".to_string());
    }
    Ok(output)
}

fn render_history(records: &[SummaryRecord]) -> String {
    if records.is_empty() {
        return "No saved summaries.\n".to_string();
    }
    let now = Utc::now();
    let mut out = String::new();
    for r in records {
        let kind = if r.is_ai_generated { "ai " } else { "raw" };
        out.push_str(&format!(
            "{:<18} {:<10} [{kind}] {}\n",
            r.id,
            format_relative(r.saved_at, now),
            r.title
        ));
        if !r.url.is_empty() {
            out.push_str(&format!("{:<33}{}\n", "", r.url));
        }
    }
    out
}

async fn run(cli: Cli) -> Result<String, String> {
    let config = AppConfig::from_overrides(cli.data_dir, cli.model, cli.endpoint);
    let handle = start_coordinator(&config)?;

    match cli.command {
        Command::Summarize {
            file,
            title,
            url,
            save,
            timeout,
        } => {
            let text = read_page_text(file.as_ref())?;
            let page = PageCapture::new(title, url, &text);
            let timeout = timeout
                .map(Duration::from_secs)
                .unwrap_or(config.summary_timeout);
            let summary = summarize(handle, page, save, timeout).await?;
            Ok(if summary.is_empty() {
                summary
            } else {
                format!("{summary}\n")
            })
        }
        Command::History { search } => {
            let records = handle.get_summaries().await.map_err(|e| e.to_string())?;
            let term = search.unwrap_or_default();
            let shown: Vec<SummaryRecord> = records
                .into_iter()
                .filter(|r| matches_search(r, &term))
                .collect();
            Ok(render_history(&shown))
        }
        Command::Delete { id } => {
            handle.delete_summary(id).await.map_err(|e| e.to_string())?;
            Ok(String::new())
        }
        Command::Clear => {
            handle.clear_all().await.map_err(|e| e.to_string())?;
            Ok("History cleared.\n".to_string())
        }
        Command::SetKey { key } => {
            handle.save_api_key(key).await.map_err(|e| e.to_string())?;
            Ok("API key saved.\n".to_string())
        }
        Command::Key => {
            let key = handle.get_api_key().await.map_err(|e| e.to_string())?;
            Ok(match key.map(Credential::new).filter(Credential::is_usable) {
                Some(credential) => format!("API key configured: {}\n", credential.masked()),
                None => "No API key configured.\n".to_string(),
            })
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    explainx::logging::init(cli.verbose);

    match run(cli).await {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
