//! Structural diff between two schemas.
//!
//! Pure and deterministic: tables are keyed by `(schema, name)`, top-level
//! output is sorted by that key, and comparison never looks at the raw
//! spelling of a type. Index and foreign-key order within a table is
//! irrelevant; column order within an index is not.

use enumflags2::{bitflags, BitFlags};
use schema_model::{Column, ForeignKey, Index, Schema, Table};
use std::collections::BTreeMap;

/// One changed attribute of a column.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnChange {
    Type,
    Nullable,
    Default,
    PrimaryKey,
    Unique,
    Generation,
    Comment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDiff {
    pub column: String,
    pub changes: BitFlags<ColumnChange>,
    pub before: Column,
    pub after: Column,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableDiff {
    pub schema: String,
    pub table: String,
    pub added_columns: Vec<Column>,
    pub removed_columns: Vec<Column>,
    pub modified_columns: Vec<ColumnDiff>,
    pub added_indexes: Vec<Index>,
    pub removed_indexes: Vec<Index>,
    /// `(before, after)` pairs that share a name but differ in content.
    pub modified_indexes: Vec<(Index, Index)>,
    pub added_foreign_keys: Vec<ForeignKey>,
    pub removed_foreign_keys: Vec<ForeignKey>,
    pub rls_changed: bool,
    pub rls_enabled: bool,
    pub comment_changed: bool,
    pub comment: Option<String>,
    /// `(removed, added)` column pair that looks like a rename: exactly one
    /// column dropped and one added, with equal types.
    pub rename_candidate: Option<(String, String)>,
}

impl TableDiff {
    pub fn is_empty(&self) -> bool {
        self.added_columns.is_empty()
            && self.removed_columns.is_empty()
            && self.modified_columns.is_empty()
            && self.added_indexes.is_empty()
            && self.removed_indexes.is_empty()
            && self.modified_indexes.is_empty()
            && self.added_foreign_keys.is_empty()
            && self.removed_foreign_keys.is_empty()
            && !self.rls_changed
            && !self.comment_changed
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaDiff {
    pub added_tables: Vec<Table>,
    pub removed_tables: Vec<Table>,
    pub modified_tables: Vec<TableDiff>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.added_tables.is_empty()
            && self.removed_tables.is_empty()
            && self.modified_tables.iter().all(TableDiff::is_empty)
    }
}

pub fn diff(before: &Schema, after: &Schema) -> SchemaDiff {
    let before_tables: BTreeMap<(&str, &str), &Table> = before
        .tables
        .iter()
        .map(|t| ((t.schema.as_str(), t.name.as_str()), t))
        .collect();
    let after_tables: BTreeMap<(&str, &str), &Table> = after
        .tables
        .iter()
        .map(|t| ((t.schema.as_str(), t.name.as_str()), t))
        .collect();

    let mut result = SchemaDiff::default();

    for (key, table) in &after_tables {
        if !before_tables.contains_key(key) {
            result.added_tables.push((*table).clone());
        }
    }
    for (key, table) in &before_tables {
        if !after_tables.contains_key(key) {
            result.removed_tables.push((*table).clone());
        }
    }
    for (key, before_table) in &before_tables {
        if let Some(after_table) = after_tables.get(key) {
            let table_diff = diff_table(before_table, after_table);
            if !table_diff.is_empty() {
                result.modified_tables.push(table_diff);
            }
        }
    }

    result
}

fn diff_table(before: &Table, after: &Table) -> TableDiff {
    let mut diff = TableDiff {
        schema: after.schema.clone(),
        table: after.name.clone(),
        ..TableDiff::default()
    };

    for column in &after.columns {
        if before.column(&column.name).is_none() {
            diff.added_columns.push(column.clone());
        }
    }
    for column in &before.columns {
        match after.column(&column.name) {
            None => diff.removed_columns.push(column.clone()),
            Some(after_column) => {
                let changes = column_changes(column, after_column);
                if !changes.is_empty() {
                    diff.modified_columns.push(ColumnDiff {
                        column: column.name.clone(),
                        changes,
                        before: column.clone(),
                        after: after_column.clone(),
                    });
                }
            }
        }
    }

    if diff.removed_columns.len() == 1 && diff.added_columns.len() == 1 {
        let removed = &diff.removed_columns[0];
        let added = &diff.added_columns[0];
        if removed.type_metadata.semantic_eq(&added.type_metadata) {
            diff.rename_candidate = Some((removed.name.clone(), added.name.clone()));
        }
    }

    for index in &after.indexes {
        match before.index(&index.name) {
            None => diff.added_indexes.push(index.clone()),
            Some(before_index) => {
                if !indexes_match(before_index, index) {
                    diff.modified_indexes
                        .push((before_index.clone(), index.clone()));
                }
            }
        }
    }
    for index in &before.indexes {
        if after.index(&index.name).is_none() {
            diff.removed_indexes.push(index.clone());
        }
    }

    for fk in &after.foreign_keys {
        match before.foreign_key(&fk.name) {
            None => diff.added_foreign_keys.push(fk.clone()),
            Some(before_fk) => {
                if !foreign_keys_match(before_fk, fk) {
                    // A changed foreign key is a drop plus an add.
                    diff.removed_foreign_keys.push(before_fk.clone());
                    diff.added_foreign_keys.push(fk.clone());
                }
            }
        }
    }
    for fk in &before.foreign_keys {
        if after.foreign_key(&fk.name).is_none() {
            diff.removed_foreign_keys.push(fk.clone());
        }
    }

    if before.rls_enabled != after.rls_enabled {
        diff.rls_changed = true;
        diff.rls_enabled = after.rls_enabled;
    }
    if before.comment != after.comment {
        diff.comment_changed = true;
        diff.comment = after.comment.clone();
    }

    diff
}

fn column_changes(before: &Column, after: &Column) -> BitFlags<ColumnChange> {
    let mut changes = BitFlags::empty();
    if !before.type_metadata.semantic_eq(&after.type_metadata) {
        changes |= ColumnChange::Type;
    }
    if before.nullable != after.nullable {
        changes |= ColumnChange::Nullable;
    }
    if !defaults_match(before.default.as_deref(), after.default.as_deref()) {
        changes |= ColumnChange::Default;
    }
    if before.is_primary_key != after.is_primary_key {
        changes |= ColumnChange::PrimaryKey;
    }
    if before.is_unique != after.is_unique {
        changes |= ColumnChange::Unique;
    }
    if before.is_generated != after.is_generated
        || normalized_expr(before.generation_expr.as_deref())
            != normalized_expr(after.generation_expr.as_deref())
    {
        changes |= ColumnChange::Generation;
    }
    if before.comment != after.comment {
        changes |= ColumnChange::Comment;
    }
    changes
}

fn defaults_match(before: Option<&str>, after: Option<&str>) -> bool {
    match (before, after) {
        (None, None) => true,
        (Some(a), Some(b)) => a.trim() == b.trim(),
        _ => false,
    }
}

fn normalized_expr(expr: Option<&str>) -> Option<String> {
    expr.map(|e| strip_outer_parens(e.trim()).to_string())
}

/// `(deleted_at IS NULL)` and `deleted_at IS NULL` are the same predicate;
/// catalogs add the parentheses.
fn strip_outer_parens(expr: &str) -> &str {
    let mut current = expr.trim();
    while current.starts_with('(') && current.ends_with(')') {
        let inner = &current[1..current.len() - 1];
        // Only strip when the parens actually wrap the whole expression.
        let mut depth = 0i32;
        let mut wraps = true;
        for c in inner.chars() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth < 0 {
                        wraps = false;
                        break;
                    }
                }
                _ => {}
            }
        }
        if wraps && depth == 0 {
            current = inner.trim();
        } else {
            break;
        }
    }
    current
}

fn indexes_match(before: &Index, after: &Index) -> bool {
    before.is_unique == after.is_unique
        && before.is_primary == after.is_primary
        && normalize_method(before.method.as_deref()) == normalize_method(after.method.as_deref())
        && predicates_match(before.predicate.as_deref(), after.predicate.as_deref())
        && before.columns.len() == after.columns.len()
        && before
            .columns
            .iter()
            .zip(&after.columns)
            .all(|(a, b)| a.name == b.name && a.direction == b.direction && a.nulls == b.nulls)
}

fn normalize_method(method: Option<&str>) -> Option<&str> {
    method.filter(|m| !m.eq_ignore_ascii_case("btree"))
}

fn predicates_match(before: Option<&str>, after: Option<&str>) -> bool {
    match (before, after) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            strip_outer_parens(a).eq_ignore_ascii_case(strip_outer_parens(b))
        }
        _ => false,
    }
}

fn foreign_keys_match(before: &ForeignKey, after: &ForeignKey) -> bool {
    before.columns == after.columns
        && before.referenced_schema == after.referenced_schema
        && before.referenced_table == after.referenced_table
        && before.referenced_columns == after.referenced_columns
        && before.on_update == after.on_update
        && before.on_delete == after.on_delete
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema_model::Dialect;

    fn table_with_columns(name: &str, specs: &[(&str, &str)]) -> Table {
        let mut table = Table::new("public", name);
        for (col, ty) in specs {
            table.columns.push(Column::new(*col, *ty, Dialect::Postgres));
        }
        table
    }

    fn schema_of(tables: Vec<Table>) -> Schema {
        Schema {
            dialect: Dialect::Postgres,
            tables,
        }
    }

    #[test]
    fn diff_is_reflexively_empty() {
        let schema = schema_of(vec![table_with_columns("t", &[("id", "integer")])]);
        assert!(diff(&schema, &schema).is_empty());
    }

    #[test]
    fn raw_type_spelling_does_not_diff() {
        let before = schema_of(vec![table_with_columns("t", &[("age", "INT4")])]);
        let after = schema_of(vec![table_with_columns("t", &[("age", "INTEGER")])]);
        assert!(diff(&before, &after).is_empty());
    }

    #[test]
    fn added_and_removed_tables_are_detected() {
        let before = schema_of(vec![table_with_columns("a", &[("id", "int")])]);
        let after = schema_of(vec![table_with_columns("b", &[("id", "int")])]);
        let d = diff(&before, &after);
        assert_eq!(d.added_tables[0].name, "b");
        assert_eq!(d.removed_tables[0].name, "a");
    }

    #[test]
    fn column_change_set_is_precise() {
        let before = schema_of(vec![table_with_columns("t", &[("n", "integer")])]);
        let mut after = before.clone();
        {
            let col = &mut after.tables[0].columns[0];
            col.nullable = false;
            col.default = Some("0".into());
        }
        let d = diff(&before, &after);
        let changes = d.modified_tables[0].modified_columns[0].changes;
        assert_eq!(changes, ColumnChange::Nullable | ColumnChange::Default);
    }

    #[test]
    fn default_comparison_trims_whitespace() {
        let mut before = schema_of(vec![table_with_columns("t", &[("n", "integer")])]);
        before.tables[0].columns[0].default = Some(" 0 ".into());
        let mut after = before.clone();
        after.tables[0].columns[0].default = Some("0".into());
        assert!(diff(&before, &after).is_empty());
    }

    #[test]
    fn index_order_across_table_is_irrelevant() {
        let mut before = schema_of(vec![table_with_columns("t", &[("a", "int"), ("b", "int")])]);
        let idx = |name: &str, col: &str| Index {
            name: name.into(),
            columns: vec![schema_model::IndexColumn::new(col)],
            is_unique: false,
            is_primary: false,
            method: None,
            predicate: None,
        };
        before.tables[0].indexes = vec![idx("i_a", "a"), idx("i_b", "b")];
        let mut after = before.clone();
        after.tables[0].indexes = vec![idx("i_b", "b"), idx("i_a", "a")];
        assert!(diff(&before, &after).is_empty());
    }

    #[test]
    fn btree_method_and_predicate_parens_are_normalized() {
        let mut before = schema_of(vec![table_with_columns("t", &[("a", "int")])]);
        before.tables[0].indexes = vec![Index {
            name: "i".into(),
            columns: vec![schema_model::IndexColumn::new("a")],
            is_unique: false,
            is_primary: false,
            method: Some("btree".into()),
            predicate: Some("(a > 0)".into()),
        }];
        let mut after = before.clone();
        after.tables[0].indexes[0].method = None;
        after.tables[0].indexes[0].predicate = Some("a > 0".into());
        assert!(diff(&before, &after).is_empty());
    }

    #[test]
    fn changed_foreign_key_is_a_drop_plus_add() {
        let fk = |action| ForeignKey {
            name: "t_a_fkey".into(),
            columns: vec!["a".into()],
            referenced_schema: "public".into(),
            referenced_table: "u".into(),
            referenced_columns: vec!["id".into()],
            on_update: schema_model::ForeignKeyAction::NoAction,
            on_delete: action,
        };
        let mut before = schema_of(vec![
            table_with_columns("t", &[("a", "int")]),
            table_with_columns("u", &[("id", "int")]),
        ]);
        before.tables[0].foreign_keys = vec![fk(schema_model::ForeignKeyAction::NoAction)];
        let mut after = before.clone();
        after.tables[0].foreign_keys = vec![fk(schema_model::ForeignKeyAction::Cascade)];

        let d = diff(&before, &after);
        let td = &d.modified_tables[0];
        assert_eq!(td.removed_foreign_keys.len(), 1);
        assert_eq!(td.added_foreign_keys.len(), 1);
    }

    #[test]
    fn rename_candidate_is_detected() {
        let before = schema_of(vec![table_with_columns("users", &[("id", "int"), ("email", "text")])]);
        let after = schema_of(vec![table_with_columns(
            "users",
            &[("id", "int"), ("email_address", "text")],
        )]);
        let d = diff(&before, &after);
        assert_eq!(
            d.modified_tables[0].rename_candidate,
            Some(("email".to_string(), "email_address".to_string()))
        );
    }

    #[test]
    fn rls_toggle_is_reported() {
        let before = schema_of(vec![table_with_columns("t", &[("id", "int")])]);
        let mut after = before.clone();
        after.tables[0].rls_enabled = true;
        let d = diff(&before, &after);
        assert!(d.modified_tables[0].rls_changed);
        assert!(d.modified_tables[0].rls_enabled);
    }
}
