//! Metric names and labels emitted by the migration engine.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge};

/// Label for the migration name.
pub const MIGRATION_NAME_LABEL: &str = "migration_name";

/// Label for the terminal status of a run.
pub const STATUS_LABEL: &str = "status";

/// Counter of records pulled from sources.
pub const MIGRATION_RECORDS_PRODUCED_TOTAL: &str = "migration_records_produced_total";

/// Counter of records reported as consumed by destinations.
pub const MIGRATION_RECORDS_CONSUMED_TOTAL: &str = "migration_records_consumed_total";

/// Counter of records handed to destinations but not reported as consumed.
pub const MIGRATION_RECORD_ERRORS_TOTAL: &str = "migration_record_errors_total";

/// Counter of finished runs, labelled by terminal status.
pub const MIGRATION_RUNS_TOTAL: &str = "migration_runs_total";

/// Gauge of records waiting in buffered producer caches.
pub const MIGRATION_BUFFERED_RECORDS: &str = "migration_buffered_records";

static REGISTER_METRICS: Once = Once::new();

/// Registers descriptions of the migration metrics with the installed recorder.
///
/// Safe to call more than once.
pub fn register_metrics() {
    REGISTER_METRICS.call_once(|| {
        describe_counter!(
            MIGRATION_RECORDS_PRODUCED_TOTAL,
            Unit::Count,
            "Records pulled from migration sources."
        );
        describe_counter!(
            MIGRATION_RECORDS_CONSUMED_TOTAL,
            Unit::Count,
            "Records successfully written by migration destinations."
        );
        describe_counter!(
            MIGRATION_RECORD_ERRORS_TOTAL,
            Unit::Count,
            "Records that migration destinations failed to write."
        );
        describe_counter!(
            MIGRATION_RUNS_TOTAL,
            Unit::Count,
            "Finished migration runs by terminal status."
        );
        describe_gauge!(
            MIGRATION_BUFFERED_RECORDS,
            Unit::Count,
            "Records waiting in buffered producer caches."
        );
    });
}
