// ABOUTME: Main entry point for relay: logging, config, and the console transport
// ABOUTME: `relay run` chats through stdin/stdout; `relay sessions` lists persisted sessions

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relay::{
    config::Config,
    console::{Console, ConsoleSink},
    paths,
};
use relay_core::{JsonFileStore, Orchestrator, SessionPersistence};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Relay chat messages to a streaming AI coding assistant, one session per channel.
#[derive(Parser)]
#[command(name = "relay", version, about, long_about = None)]
struct Cli {
    /// Path to config.toml (defaults to $RELAY_CONFIG_PATH, ./config.toml, then the XDG config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chat from the terminal: each line is a prompt, "@name" switches channel
    Run {
        /// Channel to start in
        #[arg(long, default_value = "main")]
        channel: String,
    },
    /// Print the persisted channel -> session map
    Sessions {
        /// Output raw JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let _log_guard = init_logging()?;

    let config = Config::load(cli.config.as_deref())?;
    tracing::info!(
        backend = %config.backend.backend_type(),
        workspace = %config.workspace.path,
        startup_timeout_secs = config.orchestrator.startup_timeout_secs,
        activity_timeout_secs = config.orchestrator.activity_timeout_secs,
        fallback_model = %config.orchestrator.fallback_model,
        "Configuration loaded"
    );

    match cli.command {
        Command::Run { channel } => run(config, &channel).await,
        Command::Sessions { json } => sessions(&config, json).await,
    }
}

/// stderr plus a daily-rolling file in the data dir. The guard must outlive main.
fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = paths::log_dir();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "relay.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    Ok(guard)
}

async fn run(config: Config, channel: &str) -> Result<()> {
    let workspace = config.workspace_path();
    std::fs::create_dir_all(&workspace)
        .with_context(|| format!("Failed to create workspace: {}", workspace.display()))?;

    let client = config.create_client()?;
    let store = Arc::new(JsonFileStore::in_workspace(&workspace));
    let orchestrator = Orchestrator::new(client, store, &workspace, config.orchestrator);
    let restored = orchestrator.restore().await;
    tracing::info!(restored, workspace = %workspace.display(), "Relay ready");

    let sink = Arc::new(ConsoleSink::new(std::io::stdout()));
    let console = Console::new(orchestrator, sink, channel);
    println!(
        "relay: talking in [{}]. Type !help for commands, Ctrl-D to quit.",
        console.current_channel()
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = console.run(stdin) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted - shutting down");
            Ok(())
        }
    }
}

async fn sessions(config: &Config, json: bool) -> Result<()> {
    let store = JsonFileStore::in_workspace(&config.workspace_path());
    let sessions = store.read_all().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }
    if sessions.is_empty() {
        println!("No persisted sessions in {}", store.path().display());
        return Ok(());
    }
    for (key, entry) in &sessions {
        let updated = entry
            .updated_at
            .as_deref()
            .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| {
                ts.with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M")
                    .to_string()
            })
            .unwrap_or_else(|| "-".to_string());
        let label = if entry.label.is_empty() { key } else { &entry.label };
        println!("{:<24} {:<24} {}  {}", key, label, entry.session_id, updated);
    }
    Ok(())
}
