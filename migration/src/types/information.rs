use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::MigrationError;
use crate::types::{MigrationId, MigrationParameters, MigrationStatus};

/// Immutable snapshot of a migration, built fresh on every status change and progress tick.
#[derive(Debug, Clone)]
pub struct MigrationInformation {
    pub id: MigrationId,
    pub name: Arc<str>,
    pub status: MigrationStatus,
    pub parameters: Arc<MigrationParameters>,
    /// Failure that ended the run with [`MigrationStatus::Exception`].
    pub last_error: Option<MigrationError>,
    pub total_records_produced: u64,
    /// Records the destination reported as successfully consumed.
    pub total_records_consumed: u64,
    /// Records handed to the destination but not reported as consumed.
    pub total_records_errors: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl MigrationInformation {
    /// Renders the message of the last error, if any.
    pub fn last_error_message(&self) -> Option<String> {
        self.last_error.as_ref().map(MigrationError::message)
    }
}
