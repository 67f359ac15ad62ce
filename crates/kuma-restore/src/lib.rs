//! Restore engine for Uptime Kuma backups
//!
//! Re-creates notifications, groups and monitors from a [`Snapshot`] on a live target,
//! rewriting every cross-reference to the ids the target assigns. The remote side is
//! reached through the [`KumaTransport`] trait, so the engine is independent of the
//! wire protocol.
//!
//! ```ignore
//! let snapshot = Snapshot::load("backup.json")?;
//! let report = RestoreOrchestrator::new(transport, RetryPolicy::default(), timeout, options)
//!     .run(&snapshot)
//!     .await?;
//! ```

pub mod dry_run;
pub mod identity;
pub mod orchestrator;
pub mod ordering;
pub mod retry;
pub mod sanitize;

pub use dry_run::DryRunTransport;
pub use identity::IdentityMap;
pub use orchestrator::{RestoreOptions, RestoreOrchestrator};
pub use ordering::{order_groups, OrderedGroup, ParentLink};
pub use retry::{RetryPolicy, RetryingClient};
pub use sanitize::{monitor_rules, sanitize, FieldRule};

pub use kuma_restore_types::{KumaTransport, Snapshot};
