//! Canonical, dialect-aware representation of a relational schema.
//!
//! A [`Schema`] is a value: loaders construct one (from SQL text, a JSON
//! model, or live introspection) and nothing mutates it afterwards. Tables
//! are identified by `(schema, name)`; the namespace defaults to the
//! dialect's default namespace. Equality is structural and ignores the raw
//! spelling of types — see [`canonical`] for the precise rules.

mod canonical;
mod types;

pub use canonical::{canonicalize, schemas_equivalent, source_hash, CanonicalSchema};
pub use types::{
    is_canonical_default_expr, Dialect, LogicalType, TypeMetadata, CANONICAL_DEFAULT_EXPRS,
};

use serde::{Deserialize, Serialize};

/// An ordered collection of tables plus the owning dialect.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub dialect: Dialect,
    #[serde(default)]
    pub tables: Vec<Table>,
}

impl Schema {
    pub fn new(dialect: Dialect) -> Schema {
        Schema {
            dialect,
            tables: Vec::new(),
        }
    }

    /// Look a table up by `(namespace, name)`.
    pub fn table(&self, namespace: &str, name: &str) -> Option<&Table> {
        self.tables
            .iter()
            .find(|t| t.schema == namespace && t.name == name)
    }

    pub fn table_mut(&mut self, namespace: &str, name: &str) -> Option<&mut Table> {
        self.tables
            .iter_mut()
            .find(|t| t.schema == namespace && t.name == name)
    }

    /// Check the structural invariants: unique column and index names,
    /// resolvable foreign keys, index columns that exist, non-nullable
    /// primary key columns.
    pub fn validate(&self) -> Result<(), Vec<ModelError>> {
        let mut errors = Vec::new();

        for table in &self.tables {
            for (i, column) in table.columns.iter().enumerate() {
                if table.columns[..i].iter().any(|c| c.name == column.name) {
                    errors.push(ModelError::DuplicateColumn {
                        table: table.name.clone(),
                        column: column.name.clone(),
                    });
                }
                if column.is_primary_key && column.nullable {
                    errors.push(ModelError::NullablePrimaryKey {
                        table: table.name.clone(),
                        column: column.name.clone(),
                    });
                }
            }

            for (i, index) in table.indexes.iter().enumerate() {
                if table.indexes[..i].iter().any(|x| x.name == index.name) {
                    errors.push(ModelError::DuplicateIndex {
                        table: table.name.clone(),
                        index: index.name.clone(),
                    });
                }
                for col in &index.columns {
                    if table.column(&col.name).is_none() {
                        errors.push(ModelError::UnknownIndexColumn {
                            table: table.name.clone(),
                            index: index.name.clone(),
                            column: col.name.clone(),
                        });
                    }
                }
            }

            for fk in &table.foreign_keys {
                if self.table(&fk.referenced_schema, &fk.referenced_table).is_none() {
                    errors.push(ModelError::UnresolvedForeignKey {
                        table: table.name.clone(),
                        foreign_key: fk.name.clone(),
                        referenced: fk.referenced_table.clone(),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Owning namespace. `public` on PostgreSQL, empty on SQLite.
    #[serde(default)]
    pub schema: String,
    pub name: String,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub indexes: Vec<Index>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub rls_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Table {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Table {
        Table {
            schema: schema.into(),
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            rls_enabled: false,
            comment: None,
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub fn foreign_key(&self, name: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|f| f.name == name)
    }

    /// Columns marked as (part of) the primary key, in declared order.
    pub fn primary_key_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.is_primary_key)
    }

    /// Display name including the namespace when one is set.
    pub fn qualified_name(&self) -> String {
        if self.schema.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.schema, self.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// The type as written in the source.
    #[serde(rename = "type")]
    pub data_type: String,
    /// Re-derived from `type` when a JSON model omits it.
    #[serde(default)]
    pub type_metadata: TypeMetadata,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub is_generated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_expr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Column {
    /// A plain column of the given type, nullable and unconstrained.
    pub fn new(name: impl Into<String>, raw_type: &str, dialect: Dialect) -> Column {
        Column {
            name: name.into(),
            data_type: raw_type.to_string(),
            type_metadata: TypeMetadata::parse(raw_type, dialect),
            nullable: true,
            default: None,
            is_primary_key: false,
            is_unique: false,
            is_generated: false,
            generation_expr: None,
            comment: None,
        }
    }
}

/// Sort direction of one index column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexColumn {
    pub name: String,
    #[serde(default)]
    pub direction: SortOrder,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nulls: Option<NullsOrder>,
}

impl IndexColumn {
    pub fn new(name: impl Into<String>) -> IndexColumn {
        IndexColumn {
            name: name.into(),
            direction: SortOrder::Asc,
            nulls: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    /// Ordered; column order within an index is significant.
    pub columns: Vec<IndexColumn>,
    #[serde(default)]
    pub is_unique: bool,
    /// Compound primary keys are expressed as a primary index.
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
}

/// Referential action on update or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ForeignKeyAction {
    pub fn as_sql(self) -> &'static str {
        match self {
            ForeignKeyAction::NoAction => "NO ACTION",
            ForeignKeyAction::Restrict => "RESTRICT",
            ForeignKeyAction::Cascade => "CASCADE",
            ForeignKeyAction::SetNull => "SET NULL",
            ForeignKeyAction::SetDefault => "SET DEFAULT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    #[serde(default)]
    pub on_update: ForeignKeyAction,
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
}

/// Structural invariant violations reported by [`Schema::validate`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("duplicate column `{column}` on table `{table}`")]
    DuplicateColumn { table: String, column: String },
    #[error("duplicate index `{index}` on table `{table}`")]
    DuplicateIndex { table: String, index: String },
    #[error("index `{index}` on table `{table}` references unknown column `{column}`")]
    UnknownIndexColumn {
        table: String,
        index: String,
        column: String,
    },
    #[error("foreign key `{foreign_key}` on table `{table}` references unknown table `{referenced}`")]
    UnresolvedForeignKey {
        table: String,
        foreign_key: String,
        referenced: String,
    },
    #[error("primary key column `{column}` on table `{table}` is nullable")]
    NullablePrimaryKey { table: String, column: String },
}
