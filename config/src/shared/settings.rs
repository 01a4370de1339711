use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::shared::ValidationError;

/// Tuning knobs for a single migration run.
///
/// Settings are immutable once a migration starts. Zero values for
/// [`MigrationSettings::notify_status_record_size_frequency`] and
/// [`MigrationSettings::max_number_of_records`] fall back to their defaults, use the
/// `effective_*` accessors to read the values the engine actually applies.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MigrationSettings {
    /// Number of records requested from the source per produce call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between two consecutive batches, in milliseconds.
    #[serde(default = "default_delay_between_batches_ms")]
    pub delay_between_batches_ms: u64,
    /// Cumulative number of failed records at which the run is aborted.
    #[serde(default = "default_error_threshold_before_exit")]
    pub error_threshold_before_exit: u64,
    /// Number of concurrent produce calls per batch.
    #[serde(default = "default_workers")]
    pub number_of_producers: u16,
    /// Number of concurrent consume calls per batch.
    #[serde(default = "default_workers")]
    pub number_of_consumers: u16,
    /// Number of produced records between two progress notifications.
    #[serde(default)]
    pub notify_status_record_size_frequency: u64,
    /// Cumulative number of produced records at which the run is aborted.
    #[serde(default)]
    pub max_number_of_records: u64,
    /// Enables the buffered producer between the source and the consumers.
    #[serde(default)]
    pub buffer: Option<BufferConfig>,
}

impl MigrationSettings {
    /// Default number of records per batch.
    pub const DEFAULT_BATCH_SIZE: usize = 5;

    /// Default delay between batches in milliseconds.
    pub const DEFAULT_DELAY_BETWEEN_BATCHES_MS: u64 = 10;

    /// Default cumulative error threshold.
    pub const DEFAULT_ERROR_THRESHOLD_BEFORE_EXIT: u64 = 10;

    /// Default notification frequency, applied when the configured one is zero.
    pub const DEFAULT_NOTIFY_STATUS_RECORD_SIZE_FREQUENCY: u64 = 100;

    /// Default record ceiling, applied when the configured one is zero.
    pub const DEFAULT_MAX_NUMBER_OF_RECORDS: u64 = 1_000_000;

    /// Smallest allowed number of producers or consumers.
    pub const MIN_WORKERS: u16 = 1;

    /// Largest allowed number of producers or consumers.
    pub const MAX_WORKERS: u16 = 32;

    /// Validates the settings.
    ///
    /// Ensures the batch size is non-zero, the worker counts are within
    /// [`MigrationSettings::MIN_WORKERS`]..=[`MigrationSettings::MAX_WORKERS`] and the
    /// buffer watermarks, when present, are ordered.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 {
            return Err(ValidationError::BatchSizeZero);
        }

        if !(Self::MIN_WORKERS..=Self::MAX_WORKERS).contains(&self.number_of_consumers) {
            return Err(ValidationError::ConsumersOutOfRange {
                actual: self.number_of_consumers,
                min: Self::MIN_WORKERS,
                max: Self::MAX_WORKERS,
            });
        }

        if !(Self::MIN_WORKERS..=Self::MAX_WORKERS).contains(&self.number_of_producers) {
            return Err(ValidationError::ProducersOutOfRange {
                actual: self.number_of_producers,
                min: Self::MIN_WORKERS,
                max: Self::MAX_WORKERS,
            });
        }

        if let Some(buffer) = &self.buffer {
            buffer.validate()?;
        }

        Ok(())
    }

    /// Returns the delay between batches as a [`Duration`].
    pub fn delay_between_batches(&self) -> Duration {
        Duration::from_millis(self.delay_between_batches_ms)
    }

    /// Returns the notification frequency, falling back to the default when unset.
    pub fn effective_notify_status_record_size_frequency(&self) -> u64 {
        if self.notify_status_record_size_frequency == 0 {
            return Self::DEFAULT_NOTIFY_STATUS_RECORD_SIZE_FREQUENCY;
        }

        self.notify_status_record_size_frequency
    }

    /// Returns the record ceiling, falling back to the default when unset.
    pub fn effective_max_number_of_records(&self) -> u64 {
        if self.max_number_of_records == 0 {
            return Self::DEFAULT_MAX_NUMBER_OF_RECORDS;
        }

        self.max_number_of_records
    }
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            delay_between_batches_ms: default_delay_between_batches_ms(),
            error_threshold_before_exit: default_error_threshold_before_exit(),
            number_of_producers: default_workers(),
            number_of_consumers: default_workers(),
            notify_status_record_size_frequency: 0,
            max_number_of_records: 0,
            buffer: None,
        }
    }
}

/// High and low watermarks for the buffered producer cache.
///
/// Production stops once the cache holds `top_limit` records and only resumes after it
/// drained down to `bottom_limit`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BufferConfig {
    /// Cache size at which production pauses.
    pub top_limit: usize,
    /// Cache size at which a paused production resumes.
    pub bottom_limit: usize,
}

impl BufferConfig {
    /// Validates that `top_limit > bottom_limit`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.top_limit <= self.bottom_limit {
            return Err(ValidationError::BufferLimits {
                top_limit: self.top_limit,
                bottom_limit: self.bottom_limit,
            });
        }

        Ok(())
    }
}

fn default_batch_size() -> usize {
    MigrationSettings::DEFAULT_BATCH_SIZE
}

fn default_delay_between_batches_ms() -> u64 {
    MigrationSettings::DEFAULT_DELAY_BETWEEN_BATCHES_MS
}

fn default_error_threshold_before_exit() -> u64 {
    MigrationSettings::DEFAULT_ERROR_THRESHOLD_BEFORE_EXIT
}

fn default_workers() -> u16 {
    MigrationSettings::MIN_WORKERS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = MigrationSettings::default();

        assert!(settings.validate().is_ok());
        assert_eq!(settings.batch_size, 5);
        assert_eq!(settings.delay_between_batches(), Duration::from_millis(10));
        assert_eq!(settings.error_threshold_before_exit, 10);
    }

    #[test]
    fn zero_values_fall_back_to_defaults() {
        let settings = MigrationSettings::default();

        assert_eq!(settings.effective_notify_status_record_size_frequency(), 100);
        assert_eq!(settings.effective_max_number_of_records(), 1_000_000);

        let settings = MigrationSettings {
            notify_status_record_size_frequency: 7,
            max_number_of_records: 42,
            ..MigrationSettings::default()
        };
        assert_eq!(settings.effective_notify_status_record_size_frequency(), 7);
        assert_eq!(settings.effective_max_number_of_records(), 42);
    }

    #[test]
    fn consumers_outside_range_are_rejected() {
        for number_of_consumers in [0, 33] {
            let settings = MigrationSettings {
                number_of_consumers,
                ..MigrationSettings::default()
            };

            assert_eq!(
                settings.validate(),
                Err(ValidationError::ConsumersOutOfRange {
                    actual: number_of_consumers,
                    min: 1,
                    max: 32,
                })
            );
        }
    }

    #[test]
    fn producers_outside_range_are_rejected() {
        let settings = MigrationSettings {
            number_of_producers: 0,
            ..MigrationSettings::default()
        };

        assert!(matches!(
            settings.validate(),
            Err(ValidationError::ProducersOutOfRange { actual: 0, .. })
        ));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let settings = MigrationSettings {
            batch_size: 0,
            ..MigrationSettings::default()
        };

        assert_eq!(settings.validate(), Err(ValidationError::BatchSizeZero));
    }

    #[test]
    fn unordered_buffer_limits_are_rejected() {
        let settings = MigrationSettings {
            buffer: Some(BufferConfig {
                top_limit: 10,
                bottom_limit: 10,
            }),
            ..MigrationSettings::default()
        };

        assert!(matches!(
            settings.validate(),
            Err(ValidationError::BufferLimits { .. })
        ));
    }

    #[test]
    fn deserializes_with_defaults() {
        let settings: MigrationSettings =
            serde_json::from_str(r#"{ "batch_size": 100, "number_of_consumers": 4 }"#).unwrap();

        assert_eq!(settings.batch_size, 100);
        assert_eq!(settings.number_of_consumers, 4);
        assert_eq!(settings.number_of_producers, 1);
        assert_eq!(settings.delay_between_batches_ms, 10);
        assert_eq!(settings.buffer, None);
    }
}
