use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The batch size must be strictly positive.
    #[error("`batch_size` cannot be zero")]
    BatchSizeZero,
    /// The number of producers is outside the supported range.
    #[error("`number_of_producers` must be between {min} and {max}, got {actual}")]
    ProducersOutOfRange { actual: u16, min: u16, max: u16 },
    /// The number of consumers is outside the supported range.
    #[error("`number_of_consumers` must be between {min} and {max}, got {actual}")]
    ConsumersOutOfRange { actual: u16, min: u16, max: u16 },
    /// The buffer watermarks are not ordered.
    #[error("Invalid buffer config: `top_limit` ({top_limit}) must be greater than `bottom_limit` ({bottom_limit})")]
    BufferLimits { top_limit: usize, bottom_limit: usize },
    /// A migration name is blank.
    #[error("migration names cannot be blank")]
    BlankMigrationName,
    /// A binding (source, destination or model) is blank.
    #[error("migration `{migration}` has a blank `{field}` binding")]
    BlankBinding {
        migration: String,
        field: &'static str,
    },
    /// Two migrations share the same name.
    #[error("migration `{0}` is configured more than once")]
    DuplicateMigration(String),
    /// A run refers to a migration that is not configured.
    #[error("run refers to unknown migration `{0}`")]
    UnknownMigration(String),
    /// Invalid manager configuration.
    #[error("Invalid manager config: {0}")]
    ManagerConfig(String),
}
