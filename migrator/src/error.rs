use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use migration::error::MigrationError;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

pub type MigratorResult<T> = Result<T, MigratorError>;

/// Backtrace captured when a [`MigratorError`] is created.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type of the migrator service.
#[derive(Debug)]
pub enum MigratorError {
    /// A migration failed or could not be built.
    Migration(MigrationError),
    /// Configuration could not be loaded or is invalid.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    /// Wiring of the service failed.
    Setup(anyhow::Error),
    Io(std::io::Error, CapturedBacktrace),
}

impl MigratorError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            MigratorError::Migration(_) => "migration error",
            MigratorError::Config(_, _) => "configuration error",
            MigratorError::Setup(_) => "setup error",
            MigratorError::Io(_, _) => "i/o error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            MigratorError::Migration(err) => err.backtrace(),
            MigratorError::Config(_, backtrace) | MigratorError::Io(_, backtrace) => {
                Some(&backtrace.0)
            }
            MigratorError::Setup(err) => Some(err.backtrace()),
        }
    }

    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        MigratorError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a report of the error and its causes for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("migrator failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {self}\n"));

        let is_aggregate = matches!(self, MigratorError::Migration(err) if err.errors().len() > 1);
        if !is_aggregate {
            let mut source = Error::source(self);
            let mut idx = 1usize;
            while let Some(err) = source {
                out.push_str(&format!("cause {idx}: {err}\n"));
                source = err.source();
                idx += 1;
            }
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for MigratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigratorError::Migration(err) => write!(f, "{err}"),
            MigratorError::Config(source, _) => write!(f, "configuration error: {source}"),
            MigratorError::Setup(err) => write!(f, "setup error: {err:#}"),
            MigratorError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for MigratorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MigratorError::Migration(err) => err.source(),
            MigratorError::Config(source, _) => Some(source.as_ref()),
            MigratorError::Setup(err) => err.source(),
            MigratorError::Io(source, _) => Some(source),
        }
    }
}

impl From<std::io::Error> for MigratorError {
    fn from(err: std::io::Error) -> Self {
        MigratorError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<MigrationError> for MigratorError {
    fn from(err: MigrationError) -> Self {
        MigratorError::Migration(err)
    }
}

impl From<anyhow::Error> for MigratorError {
    fn from(err: anyhow::Error) -> Self {
        MigratorError::Setup(err)
    }
}
