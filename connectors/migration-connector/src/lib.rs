//! The database boundary: dialect drivers, live connections, environment
//! resolution.
//!
//! [`DialectDriver`] is a closed set of tagged variants rather than a trait
//! object; the in-scope dialects are PostgreSQL and SQLite (libSQL rides
//! the SQLite variant). Every SQL emitter returns a statement with no
//! trailing semicolon. Alterations a dialect cannot express come back as
//! [`ConnectorError::UnsupportedAlteration`], which is the planner's signal
//! to fall back to a table rebuild or a multi-phase plan.

mod config;
mod connection;
mod error;
mod postgres;
mod sqlite;

pub use config::{ConfigProvider, EnvVarsProvider, ResolvedEnvironment};
pub use connection::{classify_url, DatabaseConnection};
pub use error::ConnectorError;
pub use postgres::PostgresDriver;
pub use sqlite::SqliteDriver;

use schema_model::{Column, Dialect, ForeignKey, Index, Schema, Table, TypeMetadata};

#[derive(Debug, Clone, Copy)]
pub enum DialectDriver {
    Postgres(PostgresDriver),
    Sqlite(SqliteDriver),
}

impl DialectDriver {
    pub fn for_dialect(dialect: Dialect) -> Result<DialectDriver, ConnectorError> {
        match dialect {
            Dialect::Postgres => Ok(DialectDriver::Postgres(PostgresDriver)),
            Dialect::Sqlite | Dialect::Libsql => Ok(DialectDriver::Sqlite(SqliteDriver)),
            Dialect::Unknown => Err(ConnectorError::UnsupportedDialect(
                "schema has no dialect; pass one explicitly".into(),
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DialectDriver::Postgres(d) => d.name(),
            DialectDriver::Sqlite(d) => d.name(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            DialectDriver::Postgres(d) => d.dialect(),
            DialectDriver::Sqlite(d) => d.dialect(),
        }
    }

    // ------------------------------------------------------------------
    // Capability probes
    // ------------------------------------------------------------------

    pub fn supports_schemas(&self) -> bool {
        matches!(self, DialectDriver::Postgres(_))
    }

    /// Both in-scope dialects run DDL inside transactions.
    pub fn supports_transactional_ddl(&self) -> bool {
        true
    }

    pub fn supports_concurrent_index(&self) -> bool {
        matches!(self, DialectDriver::Postgres(_))
    }

    pub fn supports_table_rebuild(&self) -> bool {
        matches!(self, DialectDriver::Sqlite(_))
    }

    /// SQLite foreign keys only exist inline in CREATE TABLE, so created
    /// tables need no separate FK steps there.
    pub fn create_table_includes_foreign_keys(&self) -> bool {
        matches!(self, DialectDriver::Sqlite(_))
    }

    pub fn supports_row_level_security(&self) -> bool {
        matches!(self, DialectDriver::Postgres(_))
    }

    // ------------------------------------------------------------------
    // SQL emission
    // ------------------------------------------------------------------

    pub fn create_table(&self, table: &Table) -> String {
        match self {
            DialectDriver::Postgres(d) => d.create_table(table),
            DialectDriver::Sqlite(d) => d.create_table(table),
        }
    }

    pub fn drop_table(&self, table: &Table) -> String {
        match self {
            DialectDriver::Postgres(d) => d.drop_table(table),
            DialectDriver::Sqlite(d) => d.drop_table(table),
        }
    }

    pub fn add_column(&self, table: &Table, column: &Column) -> String {
        match self {
            DialectDriver::Postgres(d) => d.add_column(table, column),
            DialectDriver::Sqlite(d) => d.add_column(table, column),
        }
    }

    pub fn drop_column(&self, table: &Table, column: &str) -> String {
        match self {
            DialectDriver::Postgres(d) => d.drop_column(table, column),
            DialectDriver::Sqlite(d) => d.drop_column(table, column),
        }
    }

    pub fn alter_column_type(
        &self,
        table: &Table,
        column: &str,
        new_type: &TypeMetadata,
    ) -> Result<String, ConnectorError> {
        match self {
            DialectDriver::Postgres(d) => Ok(d.alter_column_type(table, column, new_type)),
            DialectDriver::Sqlite(_) => Err(ConnectorError::UnsupportedAlteration(
                "sqlite cannot change a column type in place".into(),
            )),
        }
    }

    pub fn set_nullable(
        &self,
        table: &Table,
        column: &str,
        nullable: bool,
    ) -> Result<String, ConnectorError> {
        match self {
            DialectDriver::Postgres(d) => Ok(d.set_nullable(table, column, nullable)),
            DialectDriver::Sqlite(_) => Err(ConnectorError::UnsupportedAlteration(
                "sqlite cannot change column nullability in place".into(),
            )),
        }
    }

    pub fn set_default(
        &self,
        table: &Table,
        column: &str,
        default: Option<&str>,
    ) -> Result<String, ConnectorError> {
        match self {
            DialectDriver::Postgres(d) => Ok(d.set_default(table, column, default)),
            DialectDriver::Sqlite(_) => Err(ConnectorError::UnsupportedAlteration(
                "sqlite cannot change a column default in place".into(),
            )),
        }
    }

    pub fn set_primary_key(
        &self,
        table: &Table,
        columns: &[String],
    ) -> Result<String, ConnectorError> {
        match self {
            DialectDriver::Postgres(d) => Ok(d.set_primary_key(table, columns)),
            DialectDriver::Sqlite(_) => Err(ConnectorError::UnsupportedAlteration(
                "sqlite cannot add a primary key in place".into(),
            )),
        }
    }

    pub fn drop_primary_key(&self, table: &Table) -> Result<String, ConnectorError> {
        match self {
            DialectDriver::Postgres(d) => Ok(d.drop_primary_key(table)),
            DialectDriver::Sqlite(_) => Err(ConnectorError::UnsupportedAlteration(
                "sqlite cannot drop a primary key in place".into(),
            )),
        }
    }

    pub fn add_unique_constraint(
        &self,
        table: &Table,
        column: &str,
    ) -> Result<String, ConnectorError> {
        match self {
            DialectDriver::Postgres(d) => Ok(d.add_unique_constraint(table, column)),
            DialectDriver::Sqlite(_) => Err(ConnectorError::UnsupportedAlteration(
                "sqlite cannot add a unique constraint in place".into(),
            )),
        }
    }

    pub fn drop_unique_constraint(
        &self,
        table: &Table,
        column: &str,
    ) -> Result<String, ConnectorError> {
        match self {
            DialectDriver::Postgres(d) => Ok(d.drop_unique_constraint(table, column)),
            DialectDriver::Sqlite(_) => Err(ConnectorError::UnsupportedAlteration(
                "sqlite cannot drop a unique constraint in place".into(),
            )),
        }
    }

    pub fn add_index(&self, table: &Table, index: &Index, concurrently: bool) -> String {
        match self {
            DialectDriver::Postgres(d) => d.add_index(table, index, concurrently),
            DialectDriver::Sqlite(d) => d.add_index(table, index),
        }
    }

    pub fn drop_index(&self, table: &Table, index_name: &str) -> String {
        match self {
            DialectDriver::Postgres(d) => d.drop_index(table, index_name),
            DialectDriver::Sqlite(d) => d.drop_index(index_name),
        }
    }

    pub fn add_foreign_key(&self, table: &Table, fk: &ForeignKey) -> Result<String, ConnectorError> {
        match self {
            DialectDriver::Postgres(d) => Ok(d.add_foreign_key(table, fk)),
            DialectDriver::Sqlite(_) => Err(ConnectorError::UnsupportedAlteration(
                "sqlite foreign keys can only be declared in CREATE TABLE".into(),
            )),
        }
    }

    pub fn drop_foreign_key(
        &self,
        table: &Table,
        fk_name: &str,
    ) -> Result<String, ConnectorError> {
        match self {
            DialectDriver::Postgres(d) => Ok(d.drop_foreign_key(table, fk_name)),
            DialectDriver::Sqlite(_) => Err(ConnectorError::UnsupportedAlteration(
                "sqlite foreign keys can only be removed by rebuilding the table".into(),
            )),
        }
    }

    pub fn enable_rls(&self, table: &Table) -> Result<String, ConnectorError> {
        match self {
            DialectDriver::Postgres(d) => Ok(d.enable_rls(table)),
            DialectDriver::Sqlite(_) => Err(ConnectorError::UnsupportedAlteration(
                "row level security is a postgres feature".into(),
            )),
        }
    }

    pub fn disable_rls(&self, table: &Table) -> Result<String, ConnectorError> {
        match self {
            DialectDriver::Postgres(d) => Ok(d.disable_rls(table)),
            DialectDriver::Sqlite(_) => Err(ConnectorError::UnsupportedAlteration(
                "row level security is a postgres feature".into(),
            )),
        }
    }

    pub fn comment_on_table(
        &self,
        table: &Table,
        comment: Option<&str>,
    ) -> Result<String, ConnectorError> {
        match self {
            DialectDriver::Postgres(d) => Ok(d.comment_on_table(table, comment)),
            DialectDriver::Sqlite(_) => Err(ConnectorError::UnsupportedAlteration(
                "sqlite has no COMMENT ON".into(),
            )),
        }
    }

    pub fn comment_on_column(
        &self,
        table: &Table,
        column: &str,
        comment: Option<&str>,
    ) -> Result<String, ConnectorError> {
        match self {
            DialectDriver::Postgres(d) => Ok(d.comment_on_column(table, column, comment)),
            DialectDriver::Sqlite(_) => Err(ConnectorError::UnsupportedAlteration(
                "sqlite has no COMMENT ON".into(),
            )),
        }
    }

    pub fn rename_column(&self, table: &Table, old: &str, new: &str) -> String {
        match self {
            DialectDriver::Postgres(d) => d.rename_column(table, old, new),
            DialectDriver::Sqlite(d) => d.rename_column(table, old, new),
        }
    }

    pub fn rename_table(&self, table: &Table, new_name: &str) -> String {
        match self {
            DialectDriver::Postgres(d) => d.rename_table(table, new_name),
            DialectDriver::Sqlite(d) => d.rename_table(table, new_name),
        }
    }

    /// The create-copy-swap recipe, for dialects that advertise
    /// [`supports_table_rebuild`](Self::supports_table_rebuild).
    pub fn rebuild_table(
        &self,
        before: &Table,
        after: &Table,
    ) -> Result<Vec<String>, ConnectorError> {
        match self {
            DialectDriver::Sqlite(d) => Ok(d.rebuild_table(before, after)),
            DialectDriver::Postgres(_) => Err(ConnectorError::UnsupportedAlteration(
                "postgres alters columns in place; no rebuild recipe".into(),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Introspection and session control
    // ------------------------------------------------------------------

    pub async fn introspect_schemas(
        &self,
        conn: &mut DatabaseConnection,
        namespaces: Option<&[String]>,
    ) -> Result<Schema, ConnectorError> {
        match self {
            DialectDriver::Postgres(d) => d.introspect_schemas(conn, namespaces).await,
            DialectDriver::Sqlite(d) => {
                let raw = d.connection(conn)?;
                d.introspect(raw)
            }
        }
    }

    pub async fn get_tables(
        &self,
        conn: &mut DatabaseConnection,
    ) -> Result<Vec<String>, ConnectorError> {
        match self {
            DialectDriver::Postgres(d) => d.get_tables(conn).await,
            DialectDriver::Sqlite(d) => {
                let raw = d.connection(conn)?;
                d.get_tables(raw)
            }
        }
    }

    pub async fn create_schema(
        &self,
        conn: &mut DatabaseConnection,
        name: &str,
    ) -> Result<(), ConnectorError> {
        match self {
            DialectDriver::Postgres(d) => d.create_schema(conn, name).await,
            DialectDriver::Sqlite(_) => Err(ConnectorError::UnsupportedAlteration(
                "sqlite has no schemas".into(),
            )),
        }
    }

    pub async fn set_schema(
        &self,
        conn: &mut DatabaseConnection,
        name: &str,
    ) -> Result<(), ConnectorError> {
        match self {
            DialectDriver::Postgres(d) => d.set_schema(conn, name).await,
            DialectDriver::Sqlite(_) => Err(ConnectorError::UnsupportedAlteration(
                "sqlite has no schemas".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_selection_maps_libsql_to_sqlite() {
        let driver = DialectDriver::for_dialect(Dialect::Libsql).unwrap();
        assert_eq!(driver.name(), "sqlite");
        assert!(driver.supports_table_rebuild());
        assert!(!driver.supports_schemas());
    }

    #[test]
    fn unknown_dialect_is_refused() {
        assert!(matches!(
            DialectDriver::for_dialect(Dialect::Unknown),
            Err(ConnectorError::UnsupportedDialect(_))
        ));
    }

    #[test]
    fn sqlite_rejects_in_place_alters() {
        let driver = DialectDriver::for_dialect(Dialect::Sqlite).unwrap();
        let table = Table::new("", "t");
        assert!(matches!(
            driver.set_nullable(&table, "c", false),
            Err(ConnectorError::UnsupportedAlteration(_))
        ));
    }

    #[test]
    fn postgres_capabilities() {
        let driver = DialectDriver::for_dialect(Dialect::Postgres).unwrap();
        assert!(driver.supports_schemas());
        assert!(driver.supports_concurrent_index());
        assert!(driver.supports_transactional_ddl());
        assert!(!driver.supports_table_rebuild());
    }
}
