use super::restore::OutputFormat;
use clap::Args;
use colored::Colorize;
use kuma_restore::{order_groups, ParentLink};
use kuma_restore_types::{Snapshot, SnapshotId, SnapshotLayout};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

#[derive(Args)]
pub struct InspectCommand {
    /// Path to the backup file (Uptime Kuma JSON export)
    backup: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

/// One line of the group tree, in creation order
#[derive(Debug, Clone, PartialEq)]
struct GroupLine {
    name: String,
    old_id: SnapshotId,
    depth: usize,
    detached_from: Option<SnapshotId>,
}

/// What a restore of the backup would submit
#[derive(Debug, Clone)]
struct Inventory {
    layout: SnapshotLayout,
    notifications: usize,
    groups: Vec<GroupLine>,
    monitors: usize,
    inactive_monitors: usize,
    unsupported_types: BTreeMap<String, usize>,
    warnings: Vec<String>,
}

impl Inventory {
    fn of(snapshot: &Snapshot) -> Self {
        let mut depths: HashMap<SnapshotId, usize> = HashMap::new();
        let groups = order_groups(&snapshot.groups)
            .into_iter()
            .map(|ordered| {
                let depth = ordered
                    .parent
                    .in_snapshot()
                    .and_then(|parent| depths.get(&parent))
                    .map_or(0, |d| d + 1);
                depths.insert(ordered.record.old_id, depth);
                GroupLine {
                    name: ordered.record.name.clone(),
                    old_id: ordered.record.old_id,
                    depth,
                    detached_from: match ordered.parent {
                        ParentLink::Detached(parent) => Some(parent),
                        _ => None,
                    },
                }
            })
            .collect();

        let mut unsupported_types = BTreeMap::new();
        for monitor in snapshot.monitors.iter().filter(|m| m.monitor_type.is_none()) {
            *unsupported_types.entry(monitor.type_name.clone()).or_insert(0) += 1;
        }

        Self {
            layout: snapshot.layout,
            notifications: snapshot.notifications.len(),
            groups,
            monitors: snapshot.monitors.len(),
            inactive_monitors: snapshot.monitors.iter().filter(|m| !m.active).count(),
            unsupported_types,
            warnings: snapshot.warnings.clone(),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "layout": self.layout,
            "notifications": self.notifications,
            "groups": self.groups.iter().map(|g| json!({
                "name": g.name,
                "old_id": g.old_id,
                "depth": g.depth,
                "detached_from": g.detached_from,
            })).collect::<Vec<_>>(),
            "monitors": self.monitors,
            "inactive_monitors": self.inactive_monitors,
            "unsupported_types": self.unsupported_types,
            "warnings": self.warnings,
        })
    }
}

impl InspectCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let snapshot = Snapshot::load(&self.backup).map_err(|e| {
            anyhow::anyhow!("Failed to load backup {}: {}", self.backup.display(), e)
        })?;
        let inventory = Inventory::of(&snapshot);

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&inventory.to_json())?)
            }
            OutputFormat::Text => print_inventory(&self.backup, &inventory),
        }
        Ok(())
    }
}

fn print_inventory(path: &std::path::Path, inventory: &Inventory) {
    println!();
    println!(
        "{} {}",
        "Backup:".bright_white().bold(),
        path.display().to_string().bright_cyan()
    );
    let layout = match inventory.layout {
        SnapshotLayout::KumaExport => "Uptime Kuma export",
        SnapshotLayout::Normalized => "normalized",
    };
    println!("  {} {}", "Layout:".bright_white(), layout);
    println!(
        "  {} {}",
        "Notifications:".bright_white(),
        inventory.notifications.to_string().bright_cyan()
    );
    println!(
        "  {} {}",
        "Groups:".bright_white(),
        inventory.groups.len().to_string().bright_cyan()
    );
    println!(
        "  {} {} ({} paused)",
        "Monitors:".bright_white(),
        inventory.monitors.to_string().bright_cyan(),
        inventory.inactive_monitors
    );
    println!();

    if !inventory.groups.is_empty() {
        println!("{}", "Group creation order:".bright_white().bold());
        for group in &inventory.groups {
            let indent = "  ".repeat(group.depth + 1);
            match group.detached_from {
                Some(parent) => println!(
                    "{}{} ({}) {}",
                    indent,
                    group.name,
                    group.old_id,
                    format!("[parent {} unavailable, top level]", parent).bright_yellow()
                ),
                None => println!("{}{} ({})", indent, group.name, group.old_id),
            }
        }
        println!();
    }

    if !inventory.unsupported_types.is_empty() {
        println!("{}", "Unsupported monitor types (skipped):".bright_yellow().bold());
        for (type_name, count) in &inventory.unsupported_types {
            println!("  {} x{}", type_name, count);
        }
        println!();
    }

    if !inventory.warnings.is_empty() {
        println!("{}", "Warnings:".bright_yellow().bold());
        for warning in &inventory.warnings {
            println!("  {} {}", "!".bright_yellow(), warning);
        }
        println!();
    }
}
