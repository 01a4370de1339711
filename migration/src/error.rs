//! Error types and result definitions for migration runs.
//!
//! [`MigrationError`] carries a classification, a static description, optional dynamic detail,
//! the originating error and the place it was raised. Errors raised by several fan-out workers
//! or observers at once are aggregated into a single value.

use std::any::Any;
use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

use config::shared::ValidationError;

use crate::status::ThresholdError;

/// Result type used across the migration engine.
pub type MigrationResult<T> = Result<T, MigrationError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Error raised while building, running or tracking a migration.
///
/// Cloning is cheap, the source and the backtrace are shared.
#[derive(Debug, Clone)]
pub struct MigrationError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    /// Failures of several concurrent workers or observers.
    Many {
        errors: Vec<MigrationError>,
        location: &'static Location<'static>,
    },
}

/// Classification of a [`MigrationError`].
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Configuration
    ConfigError,
    InvalidSettings,

    // Thresholds
    MaxLimitReached,
    ErrorThresholdReached,

    // Source
    SourcePrepareFailed,
    SourceProduceFailed,
    SourceIoError,

    // Destination
    DestinationPrepareFailed,
    DestinationConsumeFailed,
    DestinationCleanupFailed,
    DestinationIoError,

    // Workers
    ProducerWorkerPanic,
    ConsumerWorkerPanic,
    BufferedProducerPanic,

    // Observers
    ObserverFailed,
    ObserverPanic,

    // Tracking & state
    MigrationNotFound,
    InvalidState,

    // IO & deserialization
    IoError,
    DeserializationError,

    Unknown,
}

impl MigrationError {
    /// Returns the kind of the error, the first one for aggregates.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every kind contained in this error, flattening aggregates.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => errors.iter().flat_map(|err| err.kinds()).collect(),
        }
    }

    /// Returns the static description, or the first contained one for aggregates.
    pub fn description(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.description.as_ref()),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.description()),
        }
    }

    /// Returns the dynamic detail, or the first contained one for aggregates.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Renders the user-facing message of the error.
    ///
    /// A single error renders as its description, followed by a newline and the detail when one
    /// is attached. Aggregates render every contained message on its own line.
    pub fn message(&self) -> String {
        match &self.repr {
            ErrorRepr::Single(payload) => match &payload.detail {
                Some(detail) => format!("{}\n{}", payload.description, detail),
                None => payload.description.to_string(),
            },
            ErrorRepr::Many { errors, .. } => errors
                .iter()
                .map(MigrationError::message)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Returns the contained errors of an aggregate, or a slice holding only `self`.
    pub fn errors(&self) -> &[MigrationError] {
        match &self.repr {
            ErrorRepr::Single(_) => std::slice::from_ref(self),
            ErrorRepr::Many { errors, .. } => errors,
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches the originating error. Ignored on aggregates.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        MigrationError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }

    /// Wraps a displayable error as the detail of a new error of `kind`.
    #[track_caller]
    fn wrap<E>(kind: ErrorKind, description: &'static str, err: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        let detail = err.to_string();
        MigrationError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl PartialEq for MigrationError {
    fn eq(&self, other: &MigrationError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl Eq for MigrationError {}

impl Hash for MigrationError {
    /// Hashes the kind and the static description only, so repeated failures of the same
    /// category hash alike.
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.repr).hash(state);
        match &self.repr {
            ErrorRepr::Single(payload) => {
                payload.kind.hash(state);
                payload.description.hash(state);
            }
            ErrorRepr::Many { errors, .. } => {
                errors.len().hash(state);
                for error in errors {
                    error.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = &payload.detail {
                    write!(f, "\n  Detail:")?;
                    write_indented(f, detail, "    ")?;
                }

                let backtrace = payload.backtrace.to_string();
                if !backtrace.trim().is_empty() {
                    write!(f, "\n  Backtrace:")?;
                    write_indented(f, &backtrace, "    ")?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                write!(
                    f,
                    "[Many] {} errors aggregated @ {}:{}:{}",
                    errors.len(),
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    write!(f, "\n  {}.", index + 1)?;
                    write_indented(f, &error.to_string(), "     ")?;
                }

                Ok(())
            }
        }
    }
}

fn write_indented(f: &mut fmt::Formatter<'_>, text: &str, indent: &str) -> fmt::Result {
    for line in text.lines() {
        if line.trim().is_empty() {
            write!(f, "\n{indent}")?;
        } else {
            write!(f, "\n{indent}{line}")?;
        }
    }

    Ok(())
}

impl error::Error for MigrationError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

impl From<(ErrorKind, &'static str)> for MigrationError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> MigrationError {
        MigrationError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for MigrationError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> MigrationError {
        MigrationError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors. A single error is returned as is.
impl<E> From<Vec<E>> for MigrationError
where
    E: Into<MigrationError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> MigrationError {
        let location = Location::caller();
        let mut errors: Vec<MigrationError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            return errors.remove(0);
        }

        MigrationError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for MigrationError {
    #[track_caller]
    fn from(err: std::io::Error) -> MigrationError {
        MigrationError::wrap(ErrorKind::IoError, "I/O operation failed", err)
    }
}

impl From<serde_json::Error> for MigrationError {
    #[track_caller]
    fn from(err: serde_json::Error) -> MigrationError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        MigrationError::wrap(kind, description, err)
    }
}

impl From<uuid::Error> for MigrationError {
    #[track_caller]
    fn from(err: uuid::Error) -> MigrationError {
        MigrationError::wrap(ErrorKind::ConfigError, "Migration id is not a valid UUID", err)
    }
}

/// Settings violations map to [`ErrorKind::InvalidSettings`], everything else to
/// [`ErrorKind::ConfigError`].
impl From<ValidationError> for MigrationError {
    #[track_caller]
    fn from(err: ValidationError) -> MigrationError {
        let kind = match err {
            ValidationError::BatchSizeZero
            | ValidationError::ProducersOutOfRange { .. }
            | ValidationError::ConsumersOutOfRange { .. }
            | ValidationError::BufferLimits { .. } => ErrorKind::InvalidSettings,
            _ => ErrorKind::ConfigError,
        };

        MigrationError::wrap(kind, "Invalid migration configuration", err)
    }
}

/// The rendered [`MigrationError::message`] of a threshold error equals its [`fmt::Display`].
impl From<ThresholdError> for MigrationError {
    #[track_caller]
    fn from(err: ThresholdError) -> MigrationError {
        let (kind, description, detail) = match err {
            ThresholdError::MaxLimitReached { current, max_limit } => (
                ErrorKind::MaxLimitReached,
                ThresholdError::MAX_LIMIT_REACHED,
                format!("Current: {current} MaxLimit: {max_limit}"),
            ),
            ThresholdError::ErrorThresholdReached { errors, threshold } => (
                ErrorKind::ErrorThresholdReached,
                ThresholdError::ERROR_THRESHOLD_REACHED,
                format!("Errors: {errors} Threshold: {threshold}"),
            ),
        };

        MigrationError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Extracts the message of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        return (*message).to_owned();
    }

    if let Some(message) = panic.downcast_ref::<String>() {
        return message.clone();
    }

    "unknown panic payload".to_owned()
}
