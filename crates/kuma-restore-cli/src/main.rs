//! kuma-restore - restore Uptime Kuma backups into a running instance
//!
//! Reads a backup file, then recreates its notifications, monitor groups and monitors
//! on the target instance through the Socket.IO API, rewriting every cross-reference to
//! the ids the target assigns.

mod commands;

use clap::{Parser, Subcommand};
use commands::{InspectCommand, RestoreCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "KUMA_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "KUMA_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Restore a backup into an Uptime Kuma instance
    Restore(RestoreCommand),
    /// Show what a backup contains without connecting anywhere
    Inspect(InspectCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // If RUST_LOG is set, use it directly; otherwise use our default filter
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .map_err(|e| anyhow::anyhow!("Invalid RUST_LOG environment variable: {}", e))?
    } else {
        tracing_subscriber::EnvFilter::new(default_filter(&cli.log_level))
    };

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer() // "compact" or any other value
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set global default subscriber: {}", e))?;

    match cli.command {
        Commands::Restore(restore_cmd) => restore_cmd.execute(),
        Commands::Inspect(inspect_cmd) => inspect_cmd.execute(),
    }
}

/// Our crates at `level`, noisy dependencies at warn
fn default_filter(level: &str) -> String {
    format!(
        "kuma_restore_cli={level},\
         kuma_restore={level},\
         kuma_restore_socketio={level},\
         kuma_restore_types={level},\
         rustls=warn,\
         tungstenite=warn,\
         tokio_tungstenite=warn",
        level = level
    )
}
