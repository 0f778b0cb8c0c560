//! Canonical form and source hashing.
//!
//! The canonical form is what equality and the plan source hash are defined
//! over: tables sorted by `(schema, name)`, columns kept in declared order,
//! indexes and foreign keys sorted by name, defaults trimmed of outer
//! whitespace, and the raw type spelling replaced by the normalized one.
//! The dialect tag is excluded so a hash is portable between a schema
//! loaded from SQL text and the same schema introspected from a live
//! database.

use crate::{Column, ForeignKey, Index, Schema, Table};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Produce the canonical rendition of a schema.
pub fn canonicalize(schema: &Schema) -> CanonicalSchema {
    let mut tables: Vec<&Table> = schema.tables.iter().collect();
    tables.sort_by(|a, b| (&a.schema, &a.name).cmp(&(&b.schema, &b.name)));

    CanonicalSchema {
        tables: tables.into_iter().map(canonical_table).collect(),
    }
}

/// Two schemas are equivalent iff their canonical forms are equal.
pub fn schemas_equivalent(a: &Schema, b: &Schema) -> bool {
    canonicalize(a) == canonicalize(b)
}

/// SHA-256 over the canonical JSON rendering, hex-encoded.
///
/// This is the fingerprint stamped on plans; the executor refuses a plan
/// whose hash does not match the target's current state.
pub fn source_hash(schema: &Schema) -> String {
    let canonical = canonicalize(schema);
    let json = serde_json::to_vec(&canonical).expect("canonical schema serializes");
    hex::encode(Sha256::digest(&json))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalSchema {
    tables: Vec<CanonicalTable>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct CanonicalTable {
    schema: String,
    name: String,
    columns: Vec<CanonicalColumn>,
    indexes: Vec<CanonicalIndex>,
    foreign_keys: Vec<CanonicalForeignKey>,
    rls_enabled: bool,
    comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct CanonicalColumn {
    name: String,
    /// Normalized type name; the raw spelling never participates.
    data_type: String,
    nullable: bool,
    default: Option<String>,
    is_primary_key: bool,
    is_unique: bool,
    is_generated: bool,
    generation_expr: Option<String>,
    comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct CanonicalIndex {
    name: String,
    columns: Vec<String>,
    is_unique: bool,
    is_primary: bool,
    method: Option<String>,
    predicate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct CanonicalForeignKey {
    name: String,
    columns: Vec<String>,
    referenced_schema: String,
    referenced_table: String,
    referenced_columns: Vec<String>,
    on_update: String,
    on_delete: String,
}

fn canonical_table(table: &Table) -> CanonicalTable {
    let mut indexes: Vec<&Index> = table.indexes.iter().collect();
    indexes.sort_by(|a, b| a.name.cmp(&b.name));

    let mut foreign_keys: Vec<&ForeignKey> = table.foreign_keys.iter().collect();
    foreign_keys.sort_by(|a, b| a.name.cmp(&b.name));

    CanonicalTable {
        schema: table.schema.clone(),
        name: table.name.clone(),
        columns: table.columns.iter().map(canonical_column).collect(),
        indexes: indexes.into_iter().map(canonical_index).collect(),
        foreign_keys: foreign_keys.into_iter().map(canonical_foreign_key).collect(),
        rls_enabled: table.rls_enabled,
        comment: table.comment.clone(),
    }
}

fn canonical_column(column: &Column) -> CanonicalColumn {
    CanonicalColumn {
        name: column.name.clone(),
        data_type: column.type_metadata.canonical_name(),
        nullable: column.nullable,
        default: column.default.as_ref().map(|d| d.trim().to_string()),
        is_primary_key: column.is_primary_key,
        is_unique: column.is_unique,
        is_generated: column.is_generated,
        generation_expr: column.generation_expr.clone(),
        comment: column.comment.clone(),
    }
}

fn canonical_index(index: &Index) -> CanonicalIndex {
    CanonicalIndex {
        name: index.name.clone(),
        columns: index
            .columns
            .iter()
            .map(|c| {
                let mut rendered = c.name.clone();
                if c.direction == crate::SortOrder::Desc {
                    rendered.push_str(" desc");
                }
                if let Some(nulls) = c.nulls {
                    rendered.push_str(match nulls {
                        crate::NullsOrder::First => " nulls first",
                        crate::NullsOrder::Last => " nulls last",
                    });
                }
                rendered
            })
            .collect(),
        is_unique: index.is_unique,
        is_primary: index.is_primary,
        method: index.method.clone(),
        predicate: index.predicate.clone(),
    }
}

fn canonical_foreign_key(fk: &ForeignKey) -> CanonicalForeignKey {
    CanonicalForeignKey {
        name: fk.name.clone(),
        columns: fk.columns.clone(),
        referenced_schema: fk.referenced_schema.clone(),
        referenced_table: fk.referenced_table.clone(),
        referenced_columns: fk.referenced_columns.clone(),
        on_update: fk.on_update.as_sql().to_string(),
        on_delete: fk.on_delete.as_sql().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Column, Dialect, Schema, Table};

    fn schema_with(tables: Vec<Table>) -> Schema {
        Schema {
            dialect: Dialect::Postgres,
            tables,
        }
    }

    fn table(name: &str) -> Table {
        let mut t = Table::new("public", name);
        let mut id = Column::new("id", "integer", Dialect::Postgres);
        id.nullable = false;
        id.is_primary_key = true;
        t.columns.push(id);
        t
    }

    #[test]
    fn hash_is_stable_under_table_order() {
        let a = schema_with(vec![table("a"), table("b")]);
        let b = schema_with(vec![table("b"), table("a")]);
        assert_eq!(source_hash(&a), source_hash(&b));
    }

    #[test]
    fn hash_ignores_raw_type_spelling() {
        let mut a = schema_with(vec![table("t")]);
        a.tables[0].columns.push(Column::new("n", "INT4", Dialect::Postgres));
        let mut b = schema_with(vec![table("t")]);
        b.tables[0].columns.push(Column::new("n", "integer", Dialect::Postgres));
        assert_eq!(source_hash(&a), source_hash(&b));
        assert!(schemas_equivalent(&a, &b));
    }

    #[test]
    fn hash_ignores_dialect_tag() {
        let mut a = schema_with(vec![table("t")]);
        a.dialect = Dialect::Postgres;
        let mut b = a.clone();
        b.dialect = Dialect::Sqlite;
        assert_eq!(source_hash(&a), source_hash(&b));
    }

    #[test]
    fn hash_changes_when_column_order_changes() {
        let mut a = schema_with(vec![table("t")]);
        a.tables[0].columns.push(Column::new("x", "text", Dialect::Postgres));
        a.tables[0].columns.push(Column::new("y", "text", Dialect::Postgres));

        let mut b = schema_with(vec![table("t")]);
        b.tables[0].columns.push(Column::new("y", "text", Dialect::Postgres));
        b.tables[0].columns.push(Column::new("x", "text", Dialect::Postgres));

        assert_ne!(source_hash(&a), source_hash(&b));
    }

    #[test]
    fn hash_trims_default_whitespace() {
        let mut a = schema_with(vec![table("t")]);
        let mut col = Column::new("n", "integer", Dialect::Postgres);
        col.default = Some(" 0 ".into());
        a.tables[0].columns.push(col);

        let mut b = schema_with(vec![table("t")]);
        let mut col = Column::new("n", "integer", Dialect::Postgres);
        col.default = Some("0".into());
        b.tables[0].columns.push(col);

        assert_eq!(source_hash(&a), source_hash(&b));
    }
}
