//! Live database sessions.
//!
//! One enum, one arm per backend. PostgreSQL goes through tokio-postgres
//! with the connection task spawned onto the runtime; SQLite and local
//! libSQL files go through rusqlite. Transactions are driven with plain
//! BEGIN/COMMIT/ROLLBACK statements so the same call surface works for
//! both backends.

use crate::ConnectorError;
use schema_model::Dialect;

/// Classify a schema source string as a database connection URL.
///
/// Recognized: `postgres://`, `postgresql://`, `libsql://`, `sqlite://`,
/// `file:`, `:memory:`, and bare paths ending in `.db`, `.sqlite` or
/// `.sqlite3`.
pub fn classify_url(source: &str) -> Option<Dialect> {
    let lower = source.to_ascii_lowercase();
    if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
        return Some(Dialect::Postgres);
    }
    if lower.starts_with("libsql://") {
        return Some(Dialect::Libsql);
    }
    if lower.starts_with("sqlite://") || lower.starts_with("file:") || lower == ":memory:" {
        return Some(Dialect::Sqlite);
    }
    for ext in [".db", ".sqlite", ".sqlite3"] {
        if lower.ends_with(ext) {
            return Some(Dialect::Sqlite);
        }
    }
    None
}

#[derive(Debug)]
pub enum DatabaseConnection {
    Postgres(tokio_postgres::Client),
    Sqlite(rusqlite::Connection),
}

impl DatabaseConnection {
    /// Open a connection for a recognized URL.
    ///
    /// Remote libSQL endpoints are refused: the engine treats libSQL as
    /// SQLite and only local files are reachable.
    pub async fn connect(url: &str) -> Result<DatabaseConnection, ConnectorError> {
        match classify_url(url) {
            Some(Dialect::Postgres) => {
                let (client, connection) = tokio_postgres::connect(url, tokio_postgres::NoTls)
                    .await
                    .map_err(|e| ConnectorError::Connection(e.to_string()))?;
                tokio::spawn(async move {
                    if let Err(err) = connection.await {
                        tracing::error!(error = %err, "postgres connection task ended");
                    }
                });
                Ok(DatabaseConnection::Postgres(client))
            }
            Some(Dialect::Sqlite) => {
                let path = url
                    .strip_prefix("sqlite://")
                    .or_else(|| url.strip_prefix("file:"))
                    .unwrap_or(url);
                let conn = if path == ":memory:" {
                    rusqlite::Connection::open_in_memory()
                } else {
                    rusqlite::Connection::open(path)
                }
                .map_err(|e| ConnectorError::Connection(e.to_string()))?;
                Ok(DatabaseConnection::Sqlite(conn))
            }
            Some(Dialect::Libsql) => Err(ConnectorError::UnsupportedDialect(
                "remote libsql endpoints are not supported; use a local file path".into(),
            )),
            _ => Err(ConnectorError::UnsupportedDialect(format!(
                "not a recognized connection string: {url}"
            ))),
        }
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            DatabaseConnection::Postgres(_) => Dialect::Postgres,
            DatabaseConnection::Sqlite(_) => Dialect::Sqlite,
        }
    }

    /// Execute a statement, discarding any result rows.
    pub async fn raw_cmd(&mut self, sql: &str) -> Result<(), ConnectorError> {
        tracing::debug!(sql, "executing");
        match self {
            DatabaseConnection::Postgres(client) => {
                client.batch_execute(sql).await?;
            }
            DatabaseConnection::Sqlite(conn) => {
                conn.execute_batch(sql)?;
            }
        }
        Ok(())
    }

    /// Open a transaction. Serializable on PostgreSQL; SQLite transactions
    /// are serializable by construction.
    pub async fn begin(&mut self) -> Result<(), ConnectorError> {
        match self {
            DatabaseConnection::Postgres(_) => {
                self.raw_cmd("BEGIN ISOLATION LEVEL SERIALIZABLE").await
            }
            DatabaseConnection::Sqlite(_) => self.raw_cmd("BEGIN IMMEDIATE").await,
        }
    }

    pub async fn commit(&mut self) -> Result<(), ConnectorError> {
        self.raw_cmd("COMMIT").await
    }

    pub async fn rollback(&mut self) -> Result<(), ConnectorError> {
        self.raw_cmd("ROLLBACK").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_connection_strings() {
        assert_eq!(classify_url("postgres://localhost/app"), Some(Dialect::Postgres));
        assert_eq!(classify_url("postgresql://localhost/app"), Some(Dialect::Postgres));
        assert_eq!(classify_url("libsql://db.turso.io"), Some(Dialect::Libsql));
        assert_eq!(classify_url("sqlite://app.db"), Some(Dialect::Sqlite));
        assert_eq!(classify_url("file:app.db"), Some(Dialect::Sqlite));
        assert_eq!(classify_url(":memory:"), Some(Dialect::Sqlite));
        assert_eq!(classify_url("data/app.sqlite3"), Some(Dialect::Sqlite));
        assert_eq!(classify_url("schema/users.sql"), None);
        assert_eq!(classify_url("schema.json"), None);
    }

    #[tokio::test]
    async fn sqlite_transactions_round_trip() {
        let mut conn = DatabaseConnection::connect(":memory:").await.unwrap();
        conn.raw_cmd("CREATE TABLE t (id integer primary key)")
            .await
            .unwrap();

        conn.begin().await.unwrap();
        conn.raw_cmd("INSERT INTO t (id) VALUES (1)").await.unwrap();
        conn.rollback().await.unwrap();

        let DatabaseConnection::Sqlite(raw) = &conn else {
            panic!("expected sqlite");
        };
        let count: i64 = raw
            .query_row("SELECT count(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn remote_libsql_is_refused() {
        let err = DatabaseConnection::connect("libsql://db.example.io")
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::UnsupportedDialect(_)));
    }
}
