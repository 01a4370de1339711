//! Spreads one logical batch over concurrent source or destination workers.
//!
//! Workers run as tasks on a [`JoinSet`] and the helpers return only once every worker has
//! finished. Worker errors and panics are collected and returned together.

use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::bail;
use crate::destination::Destination;
use crate::error::{ErrorKind, MigrationError, MigrationResult};
use crate::migration_error;
use crate::source::Source;

/// Pulls `batch_size` records from each of `number_of_producers` concurrent produce calls and
/// concatenates the results.
///
/// Records of a single worker keep their order, workers are concatenated in spawn order. This
/// is not a set union: a record returned by two workers appears twice, `T` needs no equality.
pub async fn produce<S, T>(
    source: &S,
    number_of_producers: u16,
    batch_size: usize,
) -> MigrationResult<Vec<T>>
where
    S: Source<T> + Clone + 'static,
    T: Send + 'static,
{
    if number_of_producers == 0 {
        bail!(
            ErrorKind::InvalidSettings,
            "Number of producers must be greater than zero"
        );
    }

    let mut join_set = JoinSet::new();
    for worker in 0..number_of_producers {
        let source = source.clone();
        join_set.spawn(async move { (worker, source.produce(batch_size).await) });
    }

    let results = join_all(
        join_set,
        ErrorKind::ProducerWorkerPanic,
        "Producer worker panicked",
    )
    .await?;

    let mut records = Vec::with_capacity(results.iter().map(|(_, batch)| batch.len()).sum());
    for (_, batch) in results {
        records.extend(batch);
    }

    debug!(
        records = records.len(),
        number_of_producers, "produced batch with fan-out"
    );

    Ok(records)
}

/// Splits `records` over at most `number_of_consumers` concurrent consume calls and returns the
/// sum of the reported success counts.
///
/// The number of workers is clamped to the number of records. Every worker gets a contiguous
/// slice of `records.len() / workers` records in their original order, the last one also gets
/// the remainder. No worker is started for an empty batch.
pub async fn consume<D, T>(
    destination: &D,
    number_of_consumers: u16,
    records: Vec<T>,
) -> MigrationResult<usize>
where
    D: Destination<T> + Clone + 'static,
    T: Send + 'static,
{
    if number_of_consumers == 0 {
        bail!(
            ErrorKind::InvalidSettings,
            "Number of consumers must be greater than zero"
        );
    }

    let size = records.len();
    if size == 0 {
        return Ok(0);
    }

    let chunks = split_records(records, usize::from(number_of_consumers));
    let number_of_workers = chunks.len();
    let mut join_set = JoinSet::new();
    for (worker, chunk) in chunks.into_iter().enumerate() {
        let destination = destination.clone();
        join_set.spawn(async move { (worker, destination.consume(chunk).await) });
    }

    let results = join_all(
        join_set,
        ErrorKind::ConsumerWorkerPanic,
        "Consumer worker panicked",
    )
    .await?;
    let consumed = results.into_iter().map(|(_, consumed)| consumed).sum();

    debug!(
        records = size,
        consumed, number_of_workers, "consumed batch with fan-out"
    );

    Ok(consumed)
}

/// Splits `records` into `min(workers, records.len())` contiguous chunks.
fn split_records<T>(mut records: Vec<T>, workers: usize) -> Vec<Vec<T>> {
    let workers = workers.min(records.len()).max(1);
    let per_worker = records.len() / workers;

    let mut chunks = Vec::with_capacity(workers);
    for _ in 0..workers - 1 {
        let rest = records.split_off(per_worker);
        chunks.push(records);
        records = rest;
    }
    chunks.push(records);

    chunks
}

/// Waits for every worker of `join_set`, returning their outputs ordered by worker index.
async fn join_all<W, O>(
    mut join_set: JoinSet<(W, MigrationResult<O>)>,
    panic_kind: ErrorKind,
    panic_description: &'static str,
) -> MigrationResult<Vec<(W, O)>>
where
    W: Ord + Send + 'static,
    O: Send + 'static,
{
    let mut outputs = Vec::with_capacity(join_set.len());
    let mut errors: Vec<MigrationError> = Vec::new();

    while let Some(result) = join_set.join_next().await {
        match result {
            Ok((worker, Ok(output))) => outputs.push((worker, output)),
            Ok((_, Err(err))) => {
                error!(error = %err.message(), "fan-out worker failed");
                errors.push(err);
            }
            Err(join_err) => {
                error!(error = %join_err, "fan-out worker did not complete");
                errors.push(migration_error!(panic_kind, panic_description, join_err));
            }
        }
    }

    if !errors.is_empty() {
        return Err(errors.into());
    }

    outputs.sort_by(|(a, _), (b, _)| a.cmp(b));

    Ok(outputs)
}
