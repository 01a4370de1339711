//! Cumulative record accounting of a migration run.

use config::shared::MigrationSettings;
use thiserror::Error;

/// A cumulative limit of a run was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ThresholdError {
    #[error("Max threshold reached and hence exiting.\nCurrent: {current} MaxLimit: {max_limit}")]
    MaxLimitReached { current: u64, max_limit: u64 },
    #[error("Error threshold reached and hence exiting.\nErrors: {errors} Threshold: {threshold}")]
    ErrorThresholdReached { errors: u64, threshold: u64 },
}

impl ThresholdError {
    pub const MAX_LIMIT_REACHED: &'static str = "Max threshold reached and hence exiting.";

    pub const ERROR_THRESHOLD_REACHED: &'static str = "Error threshold reached and hence exiting.";
}

/// Cumulative record counts of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub produced: u64,
    pub consumed: u64,
    pub errors: u64,
}

/// Accumulates record counts, enforces the run limits and decides the notification cadence.
///
/// A progress notification is due every time the produced total crosses a multiple of the
/// notification frequency. The stored bucket advances by one per due notification even when a
/// single update crosses several multiples, so a large update is followed by further due
/// notifications until the bucket catches up.
#[derive(Debug, Clone)]
pub struct StatusCollector {
    max_number_of_records: u64,
    error_threshold_before_exit: u64,
    notify_frequency: u64,
    previous_bucket: u64,
    counts: RecordCounts,
    status_notify: bool,
}

impl StatusCollector {
    pub fn new(settings: &MigrationSettings) -> Self {
        Self {
            max_number_of_records: settings.effective_max_number_of_records(),
            error_threshold_before_exit: settings.error_threshold_before_exit,
            notify_frequency: settings.effective_notify_status_record_size_frequency(),
            previous_bucket: 0,
            counts: RecordCounts::default(),
            status_notify: false,
        }
    }

    /// Adds the deltas of one batch to the totals.
    ///
    /// Fails once the produced total reaches the record ceiling or the error total reaches the
    /// error threshold, the ceiling being checked first. The totals include the deltas even when
    /// a limit is reached. Returns whether a progress notification is due.
    pub fn update(&mut self, produced: u64, consumed: u64, errors: u64) -> Result<bool, ThresholdError> {
        self.counts.produced += produced;
        self.counts.consumed += consumed;
        self.counts.errors += errors;

        if self.counts.produced >= self.max_number_of_records {
            self.status_notify = false;
            return Err(ThresholdError::MaxLimitReached {
                current: self.counts.produced,
                max_limit: self.max_number_of_records,
            });
        }

        if self.counts.errors >= self.error_threshold_before_exit {
            self.status_notify = false;
            return Err(ThresholdError::ErrorThresholdReached {
                errors: self.counts.errors,
                threshold: self.error_threshold_before_exit,
            });
        }

        let current_bucket = self.counts.produced / self.notify_frequency;
        self.status_notify = current_bucket > self.previous_bucket;
        if self.status_notify {
            self.previous_bucket += 1;
        }

        Ok(self.status_notify)
    }

    /// Returns whether the last successful update made a notification due.
    pub fn is_status_notify(&self) -> bool {
        self.status_notify
    }

    pub fn counts(&self) -> RecordCounts {
        self.counts
    }
}
