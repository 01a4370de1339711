//! JSON-lines file bindings.
//!
//! Every line of a file holds one JSON document. Blank lines are skipped when reading.

use std::path::PathBuf;
use std::sync::Arc;

use migration::destination::Destination;
use migration::error::{ErrorKind, MigrationResult};
use migration::migration_error;
use migration::source::Source;
use migration::types::{MigrationParameters, MigrationStatus};
use serde_json::Value;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, Lines};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Parameter holding the path of the file read by [`JsonLinesSource`].
pub const SOURCE_PATH_PARAMETER: &str = "source_path";

/// Parameter holding the path of the file written by [`JsonLinesDestination`].
pub const DESTINATION_PATH_PARAMETER: &str = "destination_path";

fn path_parameter(parameters: &MigrationParameters, key: &'static str) -> MigrationResult<PathBuf> {
    parameters
        .get(key)
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| {
            migration_error!(
                ErrorKind::ConfigError,
                "Missing file path parameter",
                format!("parameter `{key}` is required")
            )
        })
}

#[derive(Debug, Default)]
struct SourceState {
    path: Option<PathBuf>,
    lines: Option<Lines<BufReader<File>>>,
    line_number: u64,
}

/// Source reading JSON documents from a file, one per line.
#[derive(Debug, Clone, Default)]
pub struct JsonLinesSource {
    state: Arc<Mutex<SourceState>>,
}

impl JsonLinesSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Source<Value> for JsonLinesSource {
    fn name() -> &'static str {
        "jsonl"
    }

    async fn prepare(&self, parameters: &MigrationParameters) -> MigrationResult<()> {
        let path = path_parameter(parameters, SOURCE_PATH_PARAMETER)?;
        let file = File::open(&path).await.map_err(|err| {
            migration_error!(
                ErrorKind::SourcePrepareFailed,
                "Failed to open source file",
                path.display(),
                source: err
            )
        })?;

        debug!(path = %path.display(), "opened source file");

        let mut state = self.state.lock().await;
        state.lines = Some(BufReader::new(file).lines());
        state.path = Some(path);
        state.line_number = 0;

        Ok(())
    }

    async fn produce(&self, batch_size: usize) -> MigrationResult<Vec<Value>> {
        let mut state = self.state.lock().await;
        let SourceState {
            path,
            lines,
            line_number,
        } = &mut *state;

        let Some(lines) = lines.as_mut() else {
            return Err(migration_error!(
                ErrorKind::InvalidState,
                "Source file was not opened"
            ));
        };

        let mut records = Vec::with_capacity(batch_size);
        while records.len() < batch_size {
            let next_line = lines.next_line().await.map_err(|err| {
                migration_error!(
                    ErrorKind::SourceIoError,
                    "Failed to read source file",
                    path.as_deref().map(|path| path.display().to_string()).unwrap_or_default(),
                    source: err
                )
            })?;
            let Some(line) = next_line else {
                break;
            };
            *line_number += 1;

            if line.trim().is_empty() {
                continue;
            }

            let record = serde_json::from_str(&line).map_err(|err| {
                migration_error!(
                    ErrorKind::DeserializationError,
                    "Invalid JSON line in source file",
                    format!(
                        "{}:{}",
                        path.as_deref().map(|path| path.display().to_string()).unwrap_or_default(),
                        line_number
                    ),
                    source: err
                )
            })?;
            records.push(record);
        }

        Ok(records)
    }

    async fn cleanup(&self, status: MigrationStatus) -> MigrationResult<()> {
        let mut state = self.state.lock().await;
        state.lines = None;

        debug!(%status, lines = state.line_number, "closed source file");

        Ok(())
    }
}

#[derive(Debug, Default)]
struct DestinationState {
    writer: Option<BufWriter<File>>,
}

/// Destination appending every record to a file as one JSON line.
///
/// Records that cannot be serialized are skipped and not counted as consumed.
#[derive(Debug, Clone, Default)]
pub struct JsonLinesDestination {
    state: Arc<Mutex<DestinationState>>,
}

impl JsonLinesDestination {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Destination<Value> for JsonLinesDestination {
    fn name() -> &'static str {
        "jsonl"
    }

    async fn prepare(&self, parameters: &MigrationParameters) -> MigrationResult<()> {
        let path = path_parameter(parameters, DESTINATION_PATH_PARAMETER)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|err| {
                migration_error!(
                    ErrorKind::DestinationPrepareFailed,
                    "Failed to open destination file",
                    path.display(),
                    source: err
                )
            })?;

        debug!(path = %path.display(), "opened destination file");
        self.state.lock().await.writer = Some(BufWriter::new(file));

        Ok(())
    }

    async fn consume(&self, records: Vec<Value>) -> MigrationResult<usize> {
        let mut state = self.state.lock().await;
        let Some(writer) = state.writer.as_mut() else {
            return Err(migration_error!(
                ErrorKind::InvalidState,
                "Destination file was not opened"
            ));
        };

        let mut written = 0;
        for record in &records {
            let mut line = match serde_json::to_vec(record) {
                Ok(line) => line,
                Err(err) => {
                    warn!(error = %err, "skipping record that cannot be serialized");
                    continue;
                }
            };
            line.push(b'\n');

            writer.write_all(&line).await.map_err(|err| {
                migration_error!(
                    ErrorKind::DestinationIoError,
                    "Failed to write destination file",
                    source: err
                )
            })?;
            written += 1;
        }
        writer.flush().await?;

        Ok(written)
    }

    async fn cleanup(&self, status: MigrationStatus) -> MigrationResult<()> {
        let mut state = self.state.lock().await;
        if let Some(mut writer) = state.writer.take() {
            writer.shutdown().await.map_err(|err| {
                migration_error!(
                    ErrorKind::DestinationCleanupFailed,
                    "Failed to close destination file",
                    source: err
                )
            })?;
        }

        debug!(%status, "closed destination file");

        Ok(())
    }
}
