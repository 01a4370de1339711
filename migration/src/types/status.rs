use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a migration.
///
/// Statuses only move forward, and [`MigrationStatus::Completed`],
/// [`MigrationStatus::Cancelled`] and [`MigrationStatus::Exception`] are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    #[default]
    NotStarted,
    Starting,
    Running,
    Completed,
    Cancelled,
    Exception,
}

impl MigrationStatus {
    /// Returns `true` once the migration can no longer make progress.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MigrationStatus::Completed | MigrationStatus::Cancelled | MigrationStatus::Exception
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::NotStarted => "not_started",
            MigrationStatus::Starting => "starting",
            MigrationStatus::Running => "running",
            MigrationStatus::Completed => "completed",
            MigrationStatus::Cancelled => "cancelled",
            MigrationStatus::Exception => "exception",
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
