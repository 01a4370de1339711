//! Macros for building and returning [`crate::error::MigrationError`] values.

/// Creates a [`crate::error::MigrationError`] from a kind and a static description.
///
/// An optional detail can be given either as `detail = <Into<Cow<str>>>` to move an owned
/// string, or as any displayable expression. A `source: <error>` argument attaches the
/// originating error.
#[macro_export]
macro_rules! migration_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::MigrationError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::MigrationError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        $crate::error::MigrationError::from(($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr, source: $source:expr) => {
        $crate::error::MigrationError::from(($kind, $desc, $detail)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::MigrationError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::MigrationError::from(($kind, $desc, $detail.to_string()))
            .with_source($source)
    };
}

/// Returns early with a [`crate::error::MigrationError`] built by [`migration_error!`].
#[macro_export]
macro_rules! bail {
    ($($arg:tt)+) => {
        return ::core::result::Result::Err($crate::migration_error!($($arg)+))
    };
}
