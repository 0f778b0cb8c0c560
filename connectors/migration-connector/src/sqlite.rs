//! SQLite driver.
//!
//! SQLite's ALTER TABLE covers adding, dropping and renaming columns and
//! nothing else; every other column change goes through the table-rebuild
//! recipe (create shadow, copy, drop, rename). Foreign keys only exist
//! inline in CREATE TABLE, so `create_table` renders them and rebuilds
//! carry them along.

use crate::{ConnectorError, DatabaseConnection};
use schema_model::{
    Column, Dialect, ForeignKey, ForeignKeyAction, Index, IndexColumn, Schema, SortOrder, Table,
};
use std::collections::BTreeMap;

const REBUILD_PREFIX: &str = "__lockplane_rebuild_";

#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDriver;

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl SqliteDriver {
    pub fn name(&self) -> &'static str {
        "sqlite"
    }

    pub fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    // ------------------------------------------------------------------
    // Emission
    // ------------------------------------------------------------------

    pub fn create_table(&self, table: &Table) -> String {
        let mut lines: Vec<String> = table
            .columns
            .iter()
            .map(|c| format!("    {}", self.render_column(c)))
            .collect();

        let pk_cols: Vec<&str> = table
            .columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.as_str())
            .collect();
        if let Some(pk) = table.indexes.iter().find(|i| i.is_primary) {
            lines.push(format!(
                "    PRIMARY KEY ({})",
                pk.columns
                    .iter()
                    .map(|c| quote_ident(&c.name))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        } else if !pk_cols.is_empty() {
            lines.push(format!(
                "    PRIMARY KEY ({})",
                pk_cols.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
            ));
        }

        for fk in &table.foreign_keys {
            let mut clause = format!(
                "    FOREIGN KEY ({}) REFERENCES {}",
                fk.columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
                quote_ident(&fk.referenced_table),
            );
            if !fk.referenced_columns.is_empty() {
                clause.push_str(&format!(
                    " ({})",
                    fk.referenced_columns
                        .iter()
                        .map(|c| quote_ident(c))
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
            if fk.on_update != ForeignKeyAction::NoAction {
                clause.push_str(&format!(" ON UPDATE {}", fk.on_update.as_sql()));
            }
            if fk.on_delete != ForeignKeyAction::NoAction {
                clause.push_str(&format!(" ON DELETE {}", fk.on_delete.as_sql()));
            }
            lines.push(clause);
        }

        format!(
            "CREATE TABLE {} (\n{}\n)",
            quote_ident(&table.name),
            lines.join(",\n")
        )
    }

    fn render_column(&self, column: &Column) -> String {
        let mut sql = format!(
            "{} {}",
            quote_ident(&column.name),
            column.type_metadata.canonical_name()
        );
        if let Some(expr) = column.generation_expr.as_deref() {
            sql.push_str(&format!(" GENERATED ALWAYS AS ({expr}) STORED"));
        }
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = column.default.as_deref() {
            sql.push_str(&format!(" DEFAULT {default}"));
        }
        if column.is_unique {
            sql.push_str(" UNIQUE");
        }
        sql
    }

    pub fn drop_table(&self, table: &Table) -> String {
        format!("DROP TABLE {}", quote_ident(&table.name))
    }

    pub fn add_column(&self, table: &Table, column: &Column) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_ident(&table.name),
            self.render_column(column)
        )
    }

    pub fn drop_column(&self, table: &Table, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            quote_ident(&table.name),
            quote_ident(column)
        )
    }

    pub fn rename_column(&self, table: &Table, old: &str, new: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            quote_ident(&table.name),
            quote_ident(old),
            quote_ident(new)
        )
    }

    pub fn rename_table(&self, table: &Table, new_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(&table.name),
            quote_ident(new_name)
        )
    }

    pub fn add_index(&self, table: &Table, index: &Index) -> String {
        let unique = if index.is_unique { "UNIQUE " } else { "" };
        let columns = index
            .columns
            .iter()
            .map(|c| {
                let mut sql = quote_ident(&c.name);
                if c.direction == SortOrder::Desc {
                    sql.push_str(" DESC");
                }
                sql
            })
            .collect::<Vec<_>>()
            .join(", ");
        let predicate = index
            .predicate
            .as_deref()
            .map(|p| format!(" WHERE {p}"))
            .unwrap_or_default();
        format!(
            "CREATE {unique}INDEX {} ON {} ({columns}){predicate}",
            quote_ident(&index.name),
            quote_ident(&table.name)
        )
    }

    pub fn drop_index(&self, index_name: &str) -> String {
        format!("DROP INDEX {}", quote_ident(index_name))
    }

    /// The rebuild recipe for changes ALTER TABLE cannot express: build the
    /// target shape under a scratch name, copy the surviving columns, swap.
    /// Index recreation is appended so the caller gets one statement list.
    pub fn rebuild_table(&self, before: &Table, after: &Table) -> Vec<String> {
        let scratch_name = format!("{REBUILD_PREFIX}{}", after.name);
        let mut scratch = after.clone();
        scratch.name = scratch_name.clone();

        let common: Vec<String> = after
            .columns
            .iter()
            .filter(|c| !c.is_generated && before.column(&c.name).is_some())
            .map(|c| c.name.clone())
            .collect();

        let mut statements = vec![self.create_table(&scratch)];
        if !common.is_empty() {
            let list = common.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
            statements.push(format!(
                "INSERT INTO {} ({list}) SELECT {list} FROM {}",
                quote_ident(&scratch_name),
                quote_ident(&before.name)
            ));
        }
        statements.push(self.drop_table(before));
        statements.push(format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(&scratch_name),
            quote_ident(&after.name)
        ));
        for index in after.indexes.iter().filter(|i| !i.is_primary) {
            statements.push(self.add_index(after, index));
        }
        statements
    }

    // ------------------------------------------------------------------
    // Session helpers
    // ------------------------------------------------------------------

    pub fn get_tables(&self, conn: &rusqlite::Connection) -> Result<Vec<String>, ConnectorError> {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub(crate) fn connection<'a>(
        &self,
        conn: &'a mut DatabaseConnection,
    ) -> Result<&'a rusqlite::Connection, ConnectorError> {
        match conn {
            DatabaseConnection::Sqlite(conn) => Ok(conn),
            _ => Err(ConnectorError::ConnectionMismatch {
                expected: Dialect::Sqlite,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn introspect(&self, conn: &rusqlite::Connection) -> Result<Schema, ConnectorError> {
        let mut schema = Schema::new(Dialect::Sqlite);

        for table_name in self.get_tables(conn)? {
            if table_name.starts_with(REBUILD_PREFIX) {
                continue;
            }
            let table = self.introspect_table(conn, &table_name)?;
            schema.tables.push(table);
        }

        // Foreign keys that reference a primary key implicitly come back
        // with no target columns; resolve them now that every table is in.
        let pk_by_table: BTreeMap<String, Vec<String>> = schema
            .tables
            .iter()
            .map(|t| (t.name.clone(), pk_columns(t)))
            .collect();
        for table in &mut schema.tables {
            for fk in &mut table.foreign_keys {
                if fk.referenced_columns.is_empty() {
                    if let Some(pk) = pk_by_table.get(&fk.referenced_table) {
                        fk.referenced_columns = pk.clone();
                    }
                }
            }
        }

        Ok(schema)
    }

    fn introspect_table(
        &self,
        conn: &rusqlite::Connection,
        name: &str,
    ) -> Result<Table, ConnectorError> {
        let mut table = Table::new("", name);

        struct RawColumn {
            name: String,
            data_type: String,
            notnull: bool,
            default: Option<String>,
            pk_position: i64,
        }

        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(name)))?;
        let raw_columns = stmt
            .query_map([], |row| {
                Ok(RawColumn {
                    name: row.get(1)?,
                    data_type: row.get(2)?,
                    notnull: row.get::<_, i64>(3)? != 0,
                    default: row.get(4)?,
                    pk_position: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let pk_count = raw_columns.iter().filter(|c| c.pk_position > 0).count();
        for raw in &raw_columns {
            let mut column = Column::new(&raw.name, &raw.data_type, Dialect::Sqlite);
            column.nullable = !raw.notnull && raw.pk_position == 0;
            column.default = raw.default.clone();
            if raw.pk_position > 0 {
                column.nullable = false;
                if pk_count == 1 {
                    column.is_primary_key = true;
                }
            }
            table.columns.push(column);
        }

        if pk_count > 1 {
            let mut pk_members: Vec<(i64, String)> = raw_columns
                .iter()
                .filter(|c| c.pk_position > 0)
                .map(|c| (c.pk_position, c.name.clone()))
                .collect();
            pk_members.sort();
            table.indexes.push(Index {
                name: format!("{name}_pkey"),
                columns: pk_members
                    .into_iter()
                    .map(|(_, col)| IndexColumn::new(col))
                    .collect(),
                is_unique: true,
                is_primary: true,
                method: None,
                predicate: None,
            });
        }

        self.introspect_indexes(conn, &mut table)?;
        self.introspect_foreign_keys(conn, &mut table)?;
        Ok(table)
    }

    fn introspect_indexes(
        &self,
        conn: &rusqlite::Connection,
        table: &mut Table,
    ) -> Result<(), ConnectorError> {
        struct RawIndex {
            name: String,
            unique: bool,
            origin: String,
            partial: bool,
        }

        let mut stmt = conn.prepare(&format!("PRAGMA index_list({})", quote_ident(&table.name)))?;
        let raw_indexes = stmt
            .query_map([], |row| {
                Ok(RawIndex {
                    name: row.get(1)?,
                    unique: row.get::<_, i64>(2)? != 0,
                    origin: row.get(3)?,
                    partial: row.get::<_, i64>(4)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        for raw in raw_indexes {
            if raw.origin == "pk" {
                continue;
            }

            let mut stmt =
                conn.prepare(&format!("PRAGMA index_info({})", quote_ident(&raw.name)))?;
            let columns = stmt
                .query_map([], |row| row.get::<_, Option<String>>(2))?
                .collect::<Result<Vec<_>, _>>()?;
            let columns: Vec<String> = columns.into_iter().flatten().collect();

            // An inline UNIQUE becomes an auto-index; fold it back onto the
            // column so text and introspection agree.
            if raw.origin == "u" && columns.len() == 1 {
                if let Some(column) = table.columns.iter_mut().find(|c| c.name == columns[0]) {
                    column.is_unique = true;
                    continue;
                }
            }

            let name = if raw.origin == "u" {
                format!("{}_{}_key", table.name, columns.join("_"))
            } else {
                raw.name.clone()
            };

            let predicate = if raw.partial {
                index_predicate(conn, &raw.name)?
            } else {
                None
            };

            table.indexes.push(Index {
                name,
                columns: columns.into_iter().map(IndexColumn::new).collect(),
                is_unique: raw.unique,
                is_primary: false,
                method: None,
                predicate,
            });
        }
        Ok(())
    }

    fn introspect_foreign_keys(
        &self,
        conn: &rusqlite::Connection,
        table: &mut Table,
    ) -> Result<(), ConnectorError> {
        struct RawFk {
            id: i64,
            referenced_table: String,
            from: String,
            to: Option<String>,
            on_update: String,
            on_delete: String,
        }

        let mut stmt =
            conn.prepare(&format!("PRAGMA foreign_key_list({})", quote_ident(&table.name)))?;
        let raw_fks = stmt
            .query_map([], |row| {
                Ok(RawFk {
                    id: row.get(0)?,
                    referenced_table: row.get(2)?,
                    from: row.get(3)?,
                    to: row.get(4)?,
                    on_update: row.get(5)?,
                    on_delete: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut grouped: BTreeMap<i64, ForeignKey> = BTreeMap::new();
        for raw in raw_fks {
            let entry = grouped.entry(raw.id).or_insert_with(|| ForeignKey {
                name: String::new(),
                columns: Vec::new(),
                referenced_schema: String::new(),
                referenced_table: raw.referenced_table.clone(),
                referenced_columns: Vec::new(),
                on_update: fk_action(&raw.on_update),
                on_delete: fk_action(&raw.on_delete),
            });
            entry.columns.push(raw.from);
            if let Some(to) = raw.to {
                entry.referenced_columns.push(to);
            }
        }

        for (_, mut fk) in grouped {
            // SQLite foreign keys are anonymous; synthesize the same name
            // the parser would.
            fk.name = format!("{}_{}_fkey", table.name, fk.columns.join("_"));
            table.foreign_keys.push(fk);
        }
        Ok(())
    }
}

fn pk_columns(table: &Table) -> Vec<String> {
    if let Some(pk) = table.indexes.iter().find(|i| i.is_primary) {
        return pk.columns.iter().map(|c| c.name.clone()).collect();
    }
    table
        .columns
        .iter()
        .filter(|c| c.is_primary_key)
        .map(|c| c.name.clone())
        .collect()
}

fn index_predicate(
    conn: &rusqlite::Connection,
    index_name: &str,
) -> Result<Option<String>, ConnectorError> {
    let sql: Option<String> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'index' AND name = ?1",
            [index_name],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|err| match err {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?
        .flatten();

    Ok(sql.and_then(|sql| {
        let upper = sql.to_uppercase();
        upper
            .rfind(" WHERE ")
            .map(|pos| sql[pos + " WHERE ".len()..].trim().to_string())
    }))
}

fn fk_action(action: &str) -> ForeignKeyAction {
    match action {
        "RESTRICT" => ForeignKeyAction::Restrict,
        "CASCADE" => ForeignKeyAction::Cascade,
        "SET NULL" => ForeignKeyAction::SetNull,
        "SET DEFAULT" => ForeignKeyAction::SetDefault,
        _ => ForeignKeyAction::NoAction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> rusqlite::Connection {
        rusqlite::Connection::open_in_memory().unwrap()
    }

    #[test]
    fn introspects_columns_primary_key_and_defaults() {
        let conn = connection();
        conn.execute_batch(
            "CREATE TABLE users (id integer PRIMARY KEY, email text NOT NULL UNIQUE, age integer DEFAULT 0);",
        )
        .unwrap();

        let schema = SqliteDriver.introspect(&conn).unwrap();
        let users = schema.table("", "users").unwrap();

        let id = users.column("id").unwrap();
        assert!(id.is_primary_key);
        assert!(!id.nullable);

        let email = users.column("email").unwrap();
        assert!(email.is_unique);
        assert!(!email.nullable);
        assert!(users.indexes.is_empty(), "auto-index folded onto the column");

        let age = users.column("age").unwrap();
        assert_eq!(age.default.as_deref(), Some("0"));
    }

    #[test]
    fn introspects_compound_primary_key_as_primary_index() {
        let conn = connection();
        conn.execute_batch(
            "CREATE TABLE memberships (user_id integer, org_id integer, PRIMARY KEY (user_id, org_id));",
        )
        .unwrap();

        let schema = SqliteDriver.introspect(&conn).unwrap();
        let table = schema.table("", "memberships").unwrap();
        let pk = table.indexes.iter().find(|i| i.is_primary).unwrap();
        assert_eq!(
            pk.columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            ["user_id", "org_id"]
        );
        assert!(table.columns.iter().all(|c| !c.nullable));
    }

    #[test]
    fn introspects_foreign_keys_and_resolves_pk_targets() {
        let conn = connection();
        conn.execute_batch(
            "CREATE TABLE orgs (id integer PRIMARY KEY);
             CREATE TABLE users (id integer PRIMARY KEY, org_id integer REFERENCES orgs ON DELETE CASCADE);",
        )
        .unwrap();

        let schema = SqliteDriver.introspect(&conn).unwrap();
        let users = schema.table("", "users").unwrap();
        let fk = &users.foreign_keys[0];
        assert_eq!(fk.name, "users_org_id_fkey");
        assert_eq!(fk.referenced_table, "orgs");
        assert_eq!(fk.referenced_columns, vec!["id".to_string()]);
        assert_eq!(fk.on_delete, ForeignKeyAction::Cascade);
    }

    #[test]
    fn introspects_partial_index_predicate() {
        let conn = connection();
        conn.execute_batch(
            "CREATE TABLE t (id integer PRIMARY KEY, deleted integer);
             CREATE INDEX t_live_idx ON t (id) WHERE deleted = 0;",
        )
        .unwrap();

        let schema = SqliteDriver.introspect(&conn).unwrap();
        let table = schema.table("", "t").unwrap();
        let index = table.index("t_live_idx").unwrap();
        assert_eq!(index.predicate.as_deref(), Some("deleted = 0"));
    }

    #[test]
    fn rebuild_recipe_creates_copies_and_swaps() {
        let before_sql = "CREATE TABLE t (id integer PRIMARY KEY, name text, legacy text)";
        let conn = connection();
        conn.execute_batch(&format!("{before_sql};")).unwrap();
        let before = SqliteDriver.introspect(&conn).unwrap().tables.remove(0);

        let mut after = before.clone();
        after.columns.retain(|c| c.name != "legacy");

        let statements = SqliteDriver.rebuild_table(&before, &after);
        assert!(statements[0].starts_with("CREATE TABLE \"__lockplane_rebuild_t\""));
        assert!(statements[1].contains("INSERT INTO \"__lockplane_rebuild_t\" (\"id\", \"name\")"));
        assert_eq!(statements[2], "DROP TABLE \"t\"");
        assert!(statements[3].contains("RENAME TO \"t\""));

        // The recipe must actually run.
        conn.execute_batch("INSERT INTO t (id, name, legacy) VALUES (1, 'a', 'x');")
            .unwrap();
        for statement in &statements {
            conn.execute_batch(statement).unwrap();
        }
        let rebuilt = SqliteDriver.introspect(&conn).unwrap();
        assert!(rebuilt.tables[0].column("legacy").is_none());
        let count: i64 = conn
            .query_row("SELECT count(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
