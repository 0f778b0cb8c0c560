use schema_model::Dialect;

/// Errors produced at the database boundary.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("unsupported dialect: {0}")]
    UnsupportedDialect(String),

    /// The driver cannot express this change as an ALTER; the planner
    /// falls back to a table rebuild or a multi-phase plan.
    #[error("unsupported alteration: {0}")]
    UnsupportedAlteration(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("statement failed: {0}")]
    QueryFailed(String),

    #[error("introspection failed: {0}")]
    IntrospectionFailed(String),

    /// A driver was handed a connection for another dialect.
    #[error("connection is for a different dialect (expected {expected})")]
    ConnectionMismatch { expected: Dialect },

    #[error("environment `{0}` is not configured")]
    EnvironmentNotFound(String),

    #[error("no shadow database configured for environment `{0}`")]
    ShadowNotConfigured(String),
}

impl From<tokio_postgres::Error> for ConnectorError {
    fn from(err: tokio_postgres::Error) -> ConnectorError {
        ConnectorError::QueryFailed(err.to_string())
    }
}

impl From<rusqlite::Error> for ConnectorError {
    fn from(err: rusqlite::Error) -> ConnectorError {
        ConnectorError::QueryFailed(err.to_string())
    }
}
