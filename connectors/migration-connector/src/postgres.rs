//! PostgreSQL driver: identifier quoting, DDL emission and catalog
//! introspection.

use crate::{ConnectorError, DatabaseConnection};
use schema_model::{
    Column, Dialect, ForeignKey, ForeignKeyAction, Index, IndexColumn, NullsOrder, Schema,
    SortOrder, Table, TypeMetadata,
};
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDriver;

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn table_ref(table: &Table) -> String {
    if table.schema.is_empty() {
        quote_ident(&table.name)
    } else {
        format!("{}.{}", quote_ident(&table.schema), quote_ident(&table.name))
    }
}

impl PostgresDriver {
    pub fn name(&self) -> &'static str {
        "postgres"
    }

    pub fn dialect(&self) -> Dialect {
        Dialect::Postgres
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
        let compound_pk = table.indexes.iter().find(|i| i.is_primary);

        if let Some(pk) = compound_pk {
            lines.push(format!(
                "    CONSTRAINT {} PRIMARY KEY ({})",
                quote_ident(&pk.name),
                pk.columns
                    .iter()
                    .map(|c| quote_ident(&c.name))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        } else if !pk_cols.is_empty() {
            lines.push(format!(
                "    CONSTRAINT {} PRIMARY KEY ({})",
                quote_ident(&format!("{}_pkey", table.name)),
                pk_cols
                    .iter()
                    .map(|c| quote_ident(c))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        format!("CREATE TABLE {} (\n{}\n)", table_ref(table), lines.join(",\n"))
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
        format!("DROP TABLE {}", table_ref(table))
    }

    pub fn add_column(&self, table: &Table, column: &Column) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            table_ref(table),
            self.render_column(column)
        )
    }

    pub fn drop_column(&self, table: &Table, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            table_ref(table),
            quote_ident(column)
        )
    }

    pub fn alter_column_type(&self, table: &Table, column: &str, new_type: &TypeMetadata) -> String {
        format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
            table_ref(table),
            quote_ident(column),
            new_type.canonical_name()
        )
    }

    pub fn set_nullable(&self, table: &Table, column: &str, nullable: bool) -> String {
        let verb = if nullable { "DROP" } else { "SET" };
        format!(
            "ALTER TABLE {} ALTER COLUMN {} {verb} NOT NULL",
            table_ref(table),
            quote_ident(column)
        )
    }

    pub fn set_default(&self, table: &Table, column: &str, default: Option<&str>) -> String {
        match default {
            Some(expr) => format!(
                "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {expr}",
                table_ref(table),
                quote_ident(column)
            ),
            None => format!(
                "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
                table_ref(table),
                quote_ident(column)
            ),
        }
    }

    pub fn set_primary_key(&self, table: &Table, columns: &[String]) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
            table_ref(table),
            quote_ident(&format!("{}_pkey", table.name)),
            columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
        )
    }

    pub fn drop_primary_key(&self, table: &Table) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            table_ref(table),
            quote_ident(&format!("{}_pkey", table.name))
        )
    }

    pub fn add_unique_constraint(&self, table: &Table, column: &str) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
            table_ref(table),
            quote_ident(&format!("{}_{}_key", table.name, column)),
            quote_ident(column)
        )
    }

    pub fn drop_unique_constraint(&self, table: &Table, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            table_ref(table),
            quote_ident(&format!("{}_{}_key", table.name, column))
        )
    }

    pub fn add_index(&self, table: &Table, index: &Index, concurrently: bool) -> String {
        let unique = if index.is_unique { "UNIQUE " } else { "" };
        let concurrently = if concurrently { "CONCURRENTLY " } else { "" };
        let method = index
            .method
            .as_deref()
            .map(|m| format!(" USING {m}"))
            .unwrap_or_default();
        let columns = index
            .columns
            .iter()
            .map(render_index_column)
            .collect::<Vec<_>>()
            .join(", ");
        let predicate = index
            .predicate
            .as_deref()
            .map(|p| format!(" WHERE {p}"))
            .unwrap_or_default();
        format!(
            "CREATE {unique}INDEX {concurrently}{} ON {}{method} ({columns}){predicate}",
            quote_ident(&index.name),
            table_ref(table)
        )
    }

    pub fn drop_index(&self, table: &Table, index_name: &str) -> String {
        if table.schema.is_empty() {
            format!("DROP INDEX {}", quote_ident(index_name))
        } else {
            format!(
                "DROP INDEX {}.{}",
                quote_ident(&table.schema),
                quote_ident(index_name)
            )
        }
    }

    pub fn add_foreign_key(&self, table: &Table, fk: &ForeignKey) -> String {
        let referenced = if fk.referenced_schema.is_empty() {
            quote_ident(&fk.referenced_table)
        } else {
            format!(
                "{}.{}",
                quote_ident(&fk.referenced_schema),
                quote_ident(&fk.referenced_table)
            )
        };
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {referenced} ({}) ON UPDATE {} ON DELETE {}",
            table_ref(table),
            quote_ident(&fk.name),
            fk.columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
            fk.referenced_columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
            fk.on_update.as_sql(),
            fk.on_delete.as_sql(),
        )
    }

    pub fn drop_foreign_key(&self, table: &Table, fk_name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            table_ref(table),
            quote_ident(fk_name)
        )
    }

    pub fn enable_rls(&self, table: &Table) -> String {
        format!("ALTER TABLE {} ENABLE ROW LEVEL SECURITY", table_ref(table))
    }

    pub fn disable_rls(&self, table: &Table) -> String {
        format!("ALTER TABLE {} DISABLE ROW LEVEL SECURITY", table_ref(table))
    }

    pub fn comment_on_table(&self, table: &Table, comment: Option<&str>) -> String {
        format!(
            "COMMENT ON TABLE {} IS {}",
            table_ref(table),
            comment.map(quote_literal).unwrap_or_else(|| "NULL".into())
        )
    }

    pub fn comment_on_column(&self, table: &Table, column: &str, comment: Option<&str>) -> String {
        format!(
            "COMMENT ON COLUMN {}.{} IS {}",
            table_ref(table),
            quote_ident(column),
            comment.map(quote_literal).unwrap_or_else(|| "NULL".into())
        )
    }

    pub fn rename_column(&self, table: &Table, old: &str, new: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            table_ref(table),
            quote_ident(old),
            quote_ident(new)
        )
    }

    pub fn rename_table(&self, table: &Table, new_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            table_ref(table),
            quote_ident(new_name)
        )
    }

    // ------------------------------------------------------------------
    // Session helpers
    // ------------------------------------------------------------------

    pub async fn create_schema(
        &self,
        conn: &mut DatabaseConnection,
        name: &str,
    ) -> Result<(), ConnectorError> {
        conn.raw_cmd(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(name)))
            .await
    }

    pub async fn set_schema(
        &self,
        conn: &mut DatabaseConnection,
        name: &str,
    ) -> Result<(), ConnectorError> {
        conn.raw_cmd(&format!("SET search_path TO {}", quote_ident(name)))
            .await
    }

    pub async fn get_tables(
        &self,
        conn: &mut DatabaseConnection,
    ) -> Result<Vec<String>, ConnectorError> {
        let client = self.client(conn)?;
        let rows = client
            .query(
                "SELECT tablename FROM pg_tables WHERE schemaname = current_schema() ORDER BY tablename",
                &[],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    fn client<'a>(
        &self,
        conn: &'a mut DatabaseConnection,
    ) -> Result<&'a tokio_postgres::Client, ConnectorError> {
        match conn {
            DatabaseConnection::Postgres(client) => Ok(client),
            _ => Err(ConnectorError::ConnectionMismatch {
                expected: Dialect::Postgres,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Read tables, columns, primary keys, indexes, foreign keys, comments
    /// and RLS state for the given namespaces (default: `public`).
    pub async fn introspect_schemas(
        &self,
        conn: &mut DatabaseConnection,
        namespaces: Option<&[String]>,
    ) -> Result<Schema, ConnectorError> {
        let client = self.client(conn)?;
        let namespaces: Vec<String> = match namespaces {
            Some(ns) if !ns.is_empty() => ns.to_vec(),
            _ => vec!["public".to_string()],
        };

        let mut schema = Schema::new(Dialect::Postgres);
        // Keyed by (namespace, table) for attachment of columns and
        // constraints; cycles resolve because FK endpoints are attached
        // only after every table exists.
        let mut table_slots: BTreeMap<(String, String), usize> = BTreeMap::new();

        let table_rows = client
            .query(
                r#"
                SELECT ns.nspname AS schema,
                       c.relname AS name,
                       c.relrowsecurity AS rls_enabled,
                       obj_description(c.oid, 'pg_class') AS comment
                FROM pg_class c
                JOIN pg_namespace ns ON ns.oid = c.relnamespace
                WHERE c.relkind = 'r' AND ns.nspname = ANY($1)
                ORDER BY ns.nspname, c.relname
                "#,
                &[&namespaces],
            )
            .await
            .map_err(|e| ConnectorError::IntrospectionFailed(e.to_string()))?;

        for row in &table_rows {
            let namespace: String = row.get("schema");
            let name: String = row.get("name");
            let mut table = Table::new(namespace.clone(), name.clone());
            table.rls_enabled = row.get("rls_enabled");
            table.comment = row.get("comment");
            table_slots.insert((namespace, name), schema.tables.len());
            schema.tables.push(table);
        }

        let column_rows = client
            .query(
                r#"
                -- information_schema columns are domain types; cast to the
                -- base types the driver can decode.
                SELECT c.table_schema::text AS schema,
                       c.table_name::text AS table,
                       c.column_name::text AS name,
                       c.udt_name::text AS udt,
                       c.character_maximum_length::int4 AS char_length,
                       c.numeric_precision::int4 AS precision,
                       c.numeric_scale::int4 AS scale,
                       c.is_nullable = 'YES' AS nullable,
                       c.column_default::text AS default_value,
                       c.is_generated = 'ALWAYS' AS is_generated,
                       c.generation_expression::text AS generation_expr,
                       col_description(format('%I.%I', c.table_schema, c.table_name)::regclass,
                                       c.ordinal_position::int4) AS comment
                FROM information_schema.columns c
                WHERE c.table_schema::text = ANY($1)
                ORDER BY c.table_schema, c.table_name, c.ordinal_position
                "#,
                &[&namespaces],
            )
            .await
            .map_err(|e| ConnectorError::IntrospectionFailed(e.to_string()))?;

        for row in &column_rows {
            let namespace: String = row.get("schema");
            let table_name: String = row.get("table");
            let Some(&slot) = table_slots.get(&(namespace, table_name)) else {
                continue;
            };
            schema.tables[slot].columns.push(column_from_row(row));
        }

        let index_rows = client
            .query(
                r#"
                SELECT ns.nspname AS schema,
                       tbl.relname AS table,
                       idx.relname AS name,
                       ix.indisunique AS is_unique,
                       ix.indisprimary AS is_primary,
                       am.amname AS method,
                       pg_get_expr(ix.indpred, ix.indrelid) AS predicate,
                       a.attname AS column_name,
                       (ix.indoption[s.n - 1] & 1) = 1 AS is_desc,
                       (ix.indoption[s.n - 1] & 2) = 2 AS nulls_first
                FROM pg_index ix
                JOIN pg_class idx ON idx.oid = ix.indexrelid
                JOIN pg_class tbl ON tbl.oid = ix.indrelid
                JOIN pg_namespace ns ON ns.oid = tbl.relnamespace
                JOIN pg_am am ON am.oid = idx.relam
                JOIN generate_series(1, ix.indnkeyatts) AS s(n) ON TRUE
                JOIN pg_attribute a ON a.attrelid = tbl.oid AND a.attnum = ix.indkey[s.n - 1]
                WHERE ns.nspname = ANY($1)
                ORDER BY ns.nspname, tbl.relname, idx.relname, s.n
                "#,
                &[&namespaces],
            )
            .await
            .map_err(|e| ConnectorError::IntrospectionFailed(e.to_string()))?;

        let mut indexes: BTreeMap<(String, String, String), Index> = BTreeMap::new();
        for row in &index_rows {
            let namespace: String = row.get("schema");
            let table_name: String = row.get("table");
            let index_name: String = row.get("name");
            let entry = indexes
                .entry((namespace, table_name, index_name.clone()))
                .or_insert_with(|| Index {
                    name: index_name,
                    columns: Vec::new(),
                    is_unique: row.get("is_unique"),
                    is_primary: row.get("is_primary"),
                    method: normalize_method(row.get("method")),
                    predicate: row.get("predicate"),
                });
            let is_desc: bool = row.get("is_desc");
            let nulls_first: bool = row.get("nulls_first");
            entry.columns.push(IndexColumn {
                name: row.get("column_name"),
                direction: if is_desc { SortOrder::Desc } else { SortOrder::Asc },
                // Ascending indexes default to NULLS LAST; only record the
                // deviation so text-declared indexes compare clean.
                nulls: match (is_desc, nulls_first) {
                    (false, true) => Some(NullsOrder::First),
                    (true, false) => Some(NullsOrder::Last),
                    _ => None,
                },
            });
        }

        for ((namespace, table_name, _), index) in indexes {
            let Some(&slot) = table_slots.get(&(namespace, table_name)) else {
                continue;
            };
            let table = &mut schema.tables[slot];

            if index.is_primary {
                if index.columns.len() == 1 {
                    let col_name = index.columns[0].name.clone();
                    if let Some(column) =
                        table.columns.iter_mut().find(|c| c.name == col_name)
                    {
                        column.is_primary_key = true;
                        column.nullable = false;
                        continue;
                    }
                }
                table.indexes.push(index);
                continue;
            }

            // A single-column unique index with the default constraint name
            // is how an inline UNIQUE surfaces in the catalog.
            if index.is_unique && index.columns.len() == 1 {
                let col_name = index.columns[0].name.clone();
                if index.name == format!("{}_{}_key", table.name, col_name) {
                    if let Some(column) =
                        table.columns.iter_mut().find(|c| c.name == col_name)
                    {
                        column.is_unique = true;
                        continue;
                    }
                }
            }

            table.indexes.push(index);
        }

        let fk_rows = client
            .query(
                r#"
                SELECT con.conname AS name,
                       ns.nspname AS schema,
                       tbl.relname AS table,
                       fns.nspname AS referenced_schema,
                       ftbl.relname AS referenced_table,
                       a.attname AS column_name,
                       fa.attname AS referenced_column,
                       con.confupdtype::text AS on_update,
                       con.confdeltype::text AS on_delete
                FROM pg_constraint con
                JOIN pg_class tbl ON tbl.oid = con.conrelid
                JOIN pg_namespace ns ON ns.oid = tbl.relnamespace
                JOIN pg_class ftbl ON ftbl.oid = con.confrelid
                JOIN pg_namespace fns ON fns.oid = ftbl.relnamespace
                JOIN generate_series(1, array_length(con.conkey, 1)) AS s(n) ON TRUE
                JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = con.conkey[s.n]
                JOIN pg_attribute fa ON fa.attrelid = con.confrelid AND fa.attnum = con.confkey[s.n]
                WHERE con.contype = 'f' AND ns.nspname = ANY($1)
                ORDER BY ns.nspname, tbl.relname, con.conname, s.n
                "#,
                &[&namespaces],
            )
            .await
            .map_err(|e| ConnectorError::IntrospectionFailed(e.to_string()))?;

        let mut fks: BTreeMap<(String, String, String), ForeignKey> = BTreeMap::new();
        for row in &fk_rows {
            let namespace: String = row.get("schema");
            let table_name: String = row.get("table");
            let name: String = row.get("name");
            let entry = fks
                .entry((namespace, table_name, name.clone()))
                .or_insert_with(|| ForeignKey {
                    name,
                    columns: Vec::new(),
                    referenced_schema: row.get("referenced_schema"),
                    referenced_table: row.get("referenced_table"),
                    referenced_columns: Vec::new(),
                    on_update: fk_action(row.get("on_update")),
                    on_delete: fk_action(row.get("on_delete")),
                });
            entry.columns.push(row.get("column_name"));
            entry.referenced_columns.push(row.get("referenced_column"));
        }
        for ((namespace, table_name, _), fk) in fks {
            if let Some(&slot) = table_slots.get(&(namespace, table_name)) {
                schema.tables[slot].foreign_keys.push(fk);
            }
        }

        Ok(schema)
    }
}

pub(crate) fn render_index_column(col: &IndexColumn) -> String {
    let mut sql = quote_ident(&col.name);
    if col.direction == SortOrder::Desc {
        sql.push_str(" DESC");
    }
    match col.nulls {
        Some(NullsOrder::First) => sql.push_str(" NULLS FIRST"),
        Some(NullsOrder::Last) => sql.push_str(" NULLS LAST"),
        None => {}
    }
    sql
}

fn normalize_method(method: String) -> Option<String> {
    // btree is the default access method; recording it would make every
    // text-declared index look different from its introspected twin.
    (method != "btree").then_some(method)
}

fn fk_action(code: String) -> ForeignKeyAction {
    match code.as_str() {
        "r" => ForeignKeyAction::Restrict,
        "c" => ForeignKeyAction::Cascade,
        "n" => ForeignKeyAction::SetNull,
        "d" => ForeignKeyAction::SetDefault,
        _ => ForeignKeyAction::NoAction,
    }
}

fn column_from_row(row: &tokio_postgres::Row) -> Column {
    let udt: String = row.get("udt");
    let (element, is_array) = match udt.strip_prefix('_') {
        Some(element) => (element.to_string(), true),
        None => (udt, false),
    };
    let raw = if is_array {
        format!("{element}[]")
    } else {
        element
    };

    let mut metadata = TypeMetadata::parse(&raw, Dialect::Postgres);
    match metadata.logical {
        schema_model::LogicalType::Numeric => {
            metadata.precision = row.get::<_, Option<i32>>("precision").map(|v| v as u32);
            metadata.scale = row.get::<_, Option<i32>>("scale").map(|v| v as u32);
        }
        schema_model::LogicalType::Char | schema_model::LogicalType::Varchar => {
            if let Some(len) = row.get::<_, Option<i32>>("char_length") {
                metadata.length = Some(len as u32);
            }
        }
        _ => {}
    }

    let mut default: Option<String> = row.get("default_value");
    // A nextval() default over an integer type is how serial columns come
    // back from the catalog.
    if default
        .as_deref()
        .is_some_and(|d| d.trim_start().starts_with("nextval("))
    {
        use schema_model::LogicalType::*;
        let serial = match metadata.logical {
            SmallInt => Some(SmallSerial),
            Integer => Some(Serial),
            BigInt => Some(BigSerial),
            _ => None,
        };
        if let Some(serial) = serial {
            metadata.logical = serial;
            default = None;
        }
    }

    let is_generated: bool = row.get("is_generated");
    Column {
        name: row.get("name"),
        data_type: raw,
        type_metadata: metadata,
        nullable: row.get("nullable"),
        default,
        is_primary_key: false,
        is_unique: false,
        is_generated,
        generation_expr: if is_generated {
            row.get("generation_expr")
        } else {
            None
        },
        comment: row.get("comment"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Table {
        let mut table = Table::new("public", "users");
        let mut id = Column::new("id", "integer", Dialect::Postgres);
        id.nullable = false;
        id.is_primary_key = true;
        table.columns.push(id);
        let mut email = Column::new("email", "text", Dialect::Postgres);
        email.nullable = false;
        table.columns.push(email);
        table
    }

    #[test]
    fn create_table_renders_columns_and_primary_key() {
        let sql = PostgresDriver.create_table(&users());
        assert_eq!(
            sql,
            "CREATE TABLE \"public\".\"users\" (\n    \"id\" integer NOT NULL,\n    \"email\" text NOT NULL,\n    CONSTRAINT \"users_pkey\" PRIMARY KEY (\"id\")\n)"
        );
    }

    #[test]
    fn add_column_has_no_trailing_semicolon() {
        let table = users();
        let column = Column::new("nickname", "varchar(40)", Dialect::Postgres);
        let sql = PostgresDriver.add_column(&table, &column);
        assert_eq!(
            sql,
            "ALTER TABLE \"public\".\"users\" ADD COLUMN \"nickname\" varchar(40)"
        );
    }

    #[test]
    fn quoted_identifiers_escape_quotes() {
        assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
    }

    #[test]
    fn index_emission_covers_order_and_predicate() {
        let table = users();
        let index = Index {
            name: "users_email_idx".into(),
            columns: vec![IndexColumn {
                name: "email".into(),
                direction: SortOrder::Desc,
                nulls: Some(NullsOrder::Last),
            }],
            is_unique: true,
            is_primary: false,
            method: None,
            predicate: Some("deleted_at IS NULL".into()),
        };
        let sql = PostgresDriver.add_index(&table, &index, true);
        assert_eq!(
            sql,
            "CREATE UNIQUE INDEX CONCURRENTLY \"users_email_idx\" ON \"public\".\"users\" (\"email\" DESC NULLS LAST) WHERE deleted_at IS NULL"
        );
    }

    #[test]
    fn foreign_key_emission_includes_actions() {
        let table = users();
        let fk = ForeignKey {
            name: "users_org_id_fkey".into(),
            columns: vec!["org_id".into()],
            referenced_schema: "public".into(),
            referenced_table: "orgs".into(),
            referenced_columns: vec!["id".into()],
            on_update: ForeignKeyAction::NoAction,
            on_delete: ForeignKeyAction::Cascade,
        };
        let sql = PostgresDriver.add_foreign_key(&table, &fk);
        assert!(sql.ends_with("ON UPDATE NO ACTION ON DELETE CASCADE"));
    }

    #[test]
    fn comment_escapes_single_quotes() {
        let sql = PostgresDriver.comment_on_table(&users(), Some("it's the users"));
        assert!(sql.ends_with("IS 'it''s the users'"));
        let cleared = PostgresDriver.comment_on_table(&users(), None);
        assert!(cleared.ends_with("IS NULL"));
    }
}
