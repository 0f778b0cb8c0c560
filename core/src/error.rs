//! The engine-wide error taxonomy.
//!
//! Library code never terminates the process; every failure travels up as
//! a [`CoreError`] value. Step-level execution failures are not errors at
//! this level — they are recorded in `ExecutionResult.errors` so a partial
//! run can be reported in full.

use migration_connector::ConnectorError;
use sql_ddl_parser::Diagnostics;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// One or more syntax errors across the schema sources. No partial
    /// schema is returned.
    #[error("{} syntax error(s) in schema sources", .diagnostics.error_count())]
    Syntax { diagnostics: Diagnostics },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid schema JSON in {}: {message}", .path.display())]
    InvalidJson { path: PathBuf, message: String },

    #[error("duplicate definition of table `{table}`")]
    DuplicateTable { table: String },

    #[error("index `{index}` targets unknown table `{table}`")]
    UnresolvedIndex { index: String, table: String },

    #[error("schema violates structural invariants: {}", .errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    InvalidModel { errors: Vec<schema_model::ModelError> },

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// The target is not in the state the plan was generated from.
    #[error("source hash mismatch: plan was generated from {expected}, target is at {actual}")]
    SourceHashMismatch { expected: String, actual: String },

    #[error("shadow validation failed: {0}")]
    ShadowValidationFailed(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("no active multi-phase migration")]
    NoActiveMigration,

    #[error("phase {requested} is out of order; next executable phase is {next}")]
    PhaseOutOfOrder { requested: u32, next: u32 },

    #[error("phase {0} is already complete")]
    PhaseAlreadyComplete(u32),

    #[error("a multi-phase migration is already in progress: {id}")]
    MigrationAlreadyActive { id: String },

    #[error("a shadow reservation already exists at {} (use force to overwrite)", .path.display())]
    ReservationExists { path: PathBuf },

    #[error("state file {} is corrupt: {message}", .path.display())]
    CorruptState { path: PathBuf, message: String },
}

impl CoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
        CoreError::Io {
            path: path.into(),
            source,
        }
    }
}
