use clap::{Args, ValueEnum};
use colored::Colorize;
use kuma_restore::{RestoreOptions, RestoreOrchestrator, RetryPolicy};
use kuma_restore_socketio::{SocketIoConfig, SocketIoTransport};
use kuma_restore_types::{
    Credentials, EntityKind, KindCounts, Outcome, OutcomeEvent, RestoreReport, Snapshot,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Args)]
pub struct RestoreCommand {
    /// Path to the backup file (Uptime Kuma JSON export)
    backup: PathBuf,

    /// Base URL of the Uptime Kuma instance, e.g. https://status.example.com
    #[arg(long, env = "KUMA_URL")]
    url: String,

    /// Username to log in with
    #[arg(long, env = "KUMA_USERNAME")]
    username: String,

    /// Password to log in with
    #[arg(long, env = "KUMA_PASSWORD", hide_env_values = true)]
    password: String,

    /// Two-factor token, when the account has 2FA enabled
    #[arg(long, env = "KUMA_2FA_TOKEN", hide_env_values = true)]
    totp_token: Option<String>,

    /// Timeout for connecting and for each remote call (seconds)
    #[arg(long, env = "KUMA_TIMEOUT", default_value = "60")]
    timeout: u64,

    /// Pause before retrying a call that failed on a connection problem (milliseconds)
    #[arg(long, env = "KUMA_RETRY_DELAY_MS", default_value = "1000")]
    retry_delay_ms: u64,

    /// Walk through the whole restore without creating anything
    #[arg(long)]
    dry_run: bool,

    /// Do not restore notifications, and drop monitor links to them
    #[arg(long)]
    skip_notifications: bool,

    /// Only restore monitors that are active in the backup
    #[arg(long)]
    only_active: bool,

    /// Output format for the report
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Also write the JSON report to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

impl RestoreCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        if self.timeout == 0 {
            anyhow::bail!("--timeout must be at least 1 second");
        }

        let snapshot = Snapshot::load(&self.backup).map_err(|e| {
            anyhow::anyhow!("Failed to load backup {}: {}", self.backup.display(), e)
        })?;
        info!(
            "Loaded backup {} ({} notifications, {} groups, {} monitors)",
            self.backup.display(),
            snapshot.notifications.len(),
            snapshot.groups.len(),
            snapshot.monitors.len()
        );

        let transport = SocketIoTransport::new(self.transport_config())
            .map_err(|e| anyhow::anyhow!("Invalid target configuration: {}", e))?;
        let orchestrator = RestoreOrchestrator::new(
            Arc::new(transport),
            self.retry_policy(),
            Duration::from_secs(self.timeout),
            self.options(),
        );

        let rt = tokio::runtime::Runtime::new()?;
        let report = rt
            .block_on(orchestrator.run(&snapshot))
            .map_err(|e| anyhow::anyhow!("Restore failed: {}", e))?;

        if let Some(path) = &self.report {
            let json = serde_json::to_string_pretty(&report)?;
            std::fs::write(path, json).map_err(|e| {
                anyhow::anyhow!("Failed to write report to {}: {}", path.display(), e)
            })?;
            info!("Report written to {}", path.display());
        }

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            OutputFormat::Text => print_report(&self.url, &report),
        }

        Ok(())
    }

    fn options(&self) -> RestoreOptions {
        RestoreOptions {
            dry_run: self.dry_run,
            skip_notifications: self.skip_notifications,
            only_active: self.only_active,
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_delay(Duration::from_millis(self.retry_delay_ms))
    }

    fn transport_config(&self) -> SocketIoConfig {
        SocketIoConfig {
            url: self.url.clone(),
            credentials: Credentials {
                username: self.username.clone(),
                password: self.password.clone(),
                totp_token: self
                    .totp_token
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string),
            },
            timeout: Duration::from_secs(self.timeout),
        }
    }
}

fn print_report(url: &str, report: &RestoreReport) {
    let rule = "━".repeat(64);
    println!();
    println!("{}", rule.bright_green());
    let title = if report.dry_run {
        format!("   Dry run against {}", url)
    } else {
        format!("   Restored into {}", url)
    };
    println!("{}", title.bright_white().bold());
    println!("{}", rule.bright_green());
    println!();

    println!(
        "   {:<14}{:>8}{:>9}{:>9}{:>8}{:>8}",
        "", "backup", "created", "skipped", "paused", "failed"
    );
    for kind in [EntityKind::Notification, EntityKind::Group, EntityKind::Monitor] {
        println!("   {}", counts_row(kind, report.summary.counts(kind)));
    }
    println!();

    let failures: Vec<&OutcomeEvent> = report
        .events
        .iter()
        .filter(|e| matches!(e.outcome, Outcome::Failed { .. } | Outcome::PauseFailed { .. }))
        .collect();
    if !failures.is_empty() {
        println!("{}", "Failures:".bright_red().bold());
        for event in failures {
            println!(
                "  {} {} '{}' (backup id {}): {}",
                "✗".bright_red(),
                event.kind,
                event.name.bright_white(),
                event.old_id,
                describe(&event.outcome)
            );
        }
        println!();
    }

    if !report.warnings.is_empty() {
        println!("{}", "Warnings:".bright_yellow().bold());
        for warning in &report.warnings {
            println!("  {} {}", "!".bright_yellow(), warning);
        }
        println!();
    }

    let status = if report.is_clean() {
        "Restore complete".bright_green().bold()
    } else {
        "Restore finished with failures".bright_yellow().bold()
    };
    println!(
        "{} ({} created, {} failed, {:.1}s)",
        status,
        report.summary.total_created().to_string().bright_cyan(),
        report.summary.total_failed().to_string().bright_red(),
        report.duration_seconds
    );
    println!();
}

fn counts_row(kind: EntityKind, counts: &KindCounts) -> String {
    let label = match kind {
        EntityKind::Notification => "Notifications",
        EntityKind::Group => "Groups",
        EntityKind::Monitor => "Monitors",
    };
    format!(
        "{:<14}{:>8}{:>9}{:>9}{:>8}{:>8}",
        label,
        counts.in_snapshot,
        counts.created,
        counts.skipped,
        counts.paused,
        counts.failed + counts.pause_failed
    )
}

fn describe(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Failed { class, message } => format!("{}: {}", class, message),
        Outcome::PauseFailed { new_id, message } => {
            format!("created as {} but could not be paused: {}", new_id, message)
        }
        other => other.label().to_string(),
    }
}
