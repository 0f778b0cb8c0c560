//! Schema loading.
//!
//! One entry point, three source kinds: a database connection string, a
//! JSON model, or SQL DDL (a single file or a directory walked in
//! lexicographic order). Directories are merged declaratively: `ALTER
//! TABLE` statements fold into the referenced `CREATE TABLE` (with a
//! warning — schema files are meant to declare the end state), `CREATE
//! INDEX` attaches to its table, and the merge fails if anything stays
//! unresolved.

use crate::error::CoreError;
use migration_connector::{classify_url, DatabaseConnection, DialectDriver};
use schema_model::{Dialect, Schema, Table, TypeMetadata};
use sql_ddl_parser::{
    parse_source, AlterAction, CommentTarget, Diagnostic, Diagnostics, ParsedStatement,
};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Dialect for SQL sources and JSON models that do not carry one.
    pub dialect: Option<Dialect>,
    /// Promote declarative-merge warnings to errors.
    pub strict: bool,
}

#[derive(Debug)]
pub struct LoadedSchema {
    pub schema: Schema,
    /// Warnings that did not block the load.
    pub diagnostics: Diagnostics,
}

/// Load a schema from a connection string, a `.json` model, a `.sql` file
/// or a directory of SQL files.
pub async fn load_schema(source: &str, options: &LoadOptions) -> Result<LoadedSchema, CoreError> {
    if let Some(dialect) = classify_url(source) {
        let mut conn = DatabaseConnection::connect(source).await?;
        let driver = DialectDriver::for_dialect(dialect)?;
        let mut schema = driver.introspect_schemas(&mut conn, None).await?;
        // Remember that the source was libSQL even though the SQLite
        // driver did the work.
        if dialect == Dialect::Libsql {
            schema.dialect = Dialect::Libsql;
        }
        return Ok(LoadedSchema {
            schema,
            diagnostics: Diagnostics::new(),
        });
    }

    let path = Path::new(source);
    if path.extension().is_some_and(|ext| ext == "json") {
        return load_json_file(path, options);
    }
    load_sql_path(path, options)
}

/// Load a JSON schema model.
pub fn load_json_file(path: &Path, options: &LoadOptions) -> Result<LoadedSchema, CoreError> {
    let contents = std::fs::read_to_string(path).map_err(|err| CoreError::io(path, err))?;
    let mut schema: Schema =
        serde_json::from_str(&contents).map_err(|err| CoreError::InvalidJson {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

    if schema.dialect == Dialect::Unknown {
        schema.dialect = options.dialect.unwrap_or(Dialect::Unknown);
    }
    let dialect = schema.dialect;
    for table in &mut schema.tables {
        for column in &mut table.columns {
            if column.type_metadata.raw.is_empty() {
                column.type_metadata = TypeMetadata::parse(&column.data_type, dialect);
            }
        }
    }

    finish_load(schema, Diagnostics::new(), options)
}

/// Load a `.sql` file or a directory of them.
pub fn load_sql_path(path: &Path, options: &LoadOptions) -> Result<LoadedSchema, CoreError> {
    let merged = parse_and_merge(path, options)?;

    if let Some(table) = merged.duplicate_tables.into_iter().next() {
        return Err(CoreError::DuplicateTable { table });
    }
    if let Some((index, table)) = merged.unresolved_indexes.into_iter().next() {
        return Err(CoreError::UnresolvedIndex { index, table });
    }
    if merged.diagnostics.has_errors() {
        return Err(CoreError::Syntax {
            diagnostics: merged.diagnostics,
        });
    }

    finish_load(merged.schema, merged.diagnostics, options)
}

/// The pre-execution validation pass: parse and merge everything, return
/// every diagnostic instead of failing on the first.
pub fn check_sources(path: &Path, options: &LoadOptions) -> Result<Diagnostics, CoreError> {
    let merged = parse_and_merge(path, options)?;
    let mut diagnostics = merged.diagnostics;
    if let Err(errors) = merged.schema.validate() {
        for error in errors {
            diagnostics.push(Diagnostic::error("model", error.to_string()));
        }
    }
    Ok(diagnostics)
}

fn finish_load(
    schema: Schema,
    mut diagnostics: Diagnostics,
    options: &LoadOptions,
) -> Result<LoadedSchema, CoreError> {
    let mut schema = schema;
    resolve_foreign_key_targets(&mut schema);

    if let Err(errors) = schema.validate() {
        return Err(CoreError::InvalidModel { errors });
    }
    if options.strict && diagnostics.warning_count() > 0 {
        diagnostics.promote_warnings();
        return Err(CoreError::Syntax { diagnostics });
    }
    Ok(LoadedSchema {
        schema,
        diagnostics,
    })
}

struct MergedSources {
    schema: Schema,
    diagnostics: Diagnostics,
    duplicate_tables: Vec<String>,
    unresolved_indexes: Vec<(String, String)>,
}

fn parse_and_merge(path: &Path, options: &LoadOptions) -> Result<MergedSources, CoreError> {
    let dialect = options.dialect.unwrap_or(Dialect::Postgres);
    let files = collect_sql_files(path)?;
    let mut diagnostics = Diagnostics::new();
    let mut duplicate_tables = Vec::new();
    let mut unresolved_indexes = Vec::new();
    let mut schema = Schema::new(dialect);

    // First pass: parse everything, keeping non-CREATE-TABLE statements
    // for a second pass so file order cannot break references.
    let mut deferred: Vec<(String, ParsedStatement)> = Vec::new();

    for file in &files {
        let contents = std::fs::read_to_string(file).map_err(|err| CoreError::io(file, err))?;
        let display = file.display().to_string();
        let (statements, file_diagnostics) = parse_source(&contents, Some(&display), dialect);
        diagnostics.extend(file_diagnostics);

        for statement in statements {
            match statement {
                ParsedStatement::CreateTable { table } => {
                    if schema.table(&table.schema, &table.name).is_some() {
                        diagnostics.push(
                            Diagnostic::error(
                                "duplicate-table",
                                format!("duplicate definition of table `{}`", table.qualified_name()),
                            )
                            .at(Some(&display), 1, 1),
                        );
                        duplicate_tables.push(table.qualified_name());
                        continue;
                    }
                    schema.tables.push(table);
                }
                other => deferred.push((display.clone(), other)),
            }
        }
    }

    for (file, statement) in deferred {
        match statement {
            ParsedStatement::CreateTable { .. } => unreachable!("handled in the first pass"),
            ParsedStatement::CreateIndex {
                table_schema,
                table,
                index,
            } => {
                let namespace =
                    table_schema.unwrap_or_else(|| dialect.default_namespace().to_string());
                match schema.table_mut(&namespace, &table) {
                    Some(target) => target.indexes.push(index),
                    None => {
                        diagnostics.push(
                            Diagnostic::error(
                                "unresolved-index",
                                format!(
                                    "index `{}` targets unknown table `{table}`",
                                    index.name
                                ),
                            )
                            .at(Some(&file), 1, 1),
                        );
                        unresolved_indexes.push((index.name, table));
                    }
                }
            }
            ParsedStatement::AlterTable {
                table_schema,
                table,
                actions,
            } => {
                let namespace =
                    table_schema.unwrap_or_else(|| dialect.default_namespace().to_string());
                match schema.table_mut(&namespace, &table) {
                    Some(target) => {
                        diagnostics.push(Diagnostic::warning(
                            "declarative-alter",
                            format!(
                                "ALTER TABLE {} merged into the declared table; schema files should declare the end state",
                                target.qualified_name()
                            ),
                        ));
                        apply_alter_actions(target, actions, &file, &mut diagnostics);
                    }
                    None => diagnostics.push(Diagnostic::error(
                        "unknown-table",
                        format!("ALTER TABLE targets unknown table `{table}`"),
                    )),
                }
            }
            ParsedStatement::CommentOn(target) => {
                apply_comment(&mut schema, target, dialect, &mut diagnostics)
            }
        }
    }

    Ok(MergedSources {
        schema,
        diagnostics,
        duplicate_tables,
        unresolved_indexes,
    })
}

fn apply_alter_actions(
    table: &mut Table,
    actions: Vec<AlterAction>,
    file: &str,
    diagnostics: &mut Diagnostics,
) {
    for action in actions {
        match action {
            AlterAction::AddColumn {
                column,
                foreign_keys,
            } => {
                table.columns.push(column);
                table.foreign_keys.extend(foreign_keys);
            }
            AlterAction::DropColumn { column } => {
                table.columns.retain(|c| c.name != column);
            }
            AlterAction::SetNotNull { column } => {
                mutate_column(table, &column, file, diagnostics, |c| c.nullable = false);
            }
            AlterAction::DropNotNull { column } => {
                mutate_column(table, &column, file, diagnostics, |c| c.nullable = true);
            }
            AlterAction::SetDefault { column, default } => {
                mutate_column(table, &column, file, diagnostics, |c| {
                    c.default = Some(default.clone())
                });
            }
            AlterAction::DropDefault { column } => {
                mutate_column(table, &column, file, diagnostics, |c| c.default = None);
            }
            AlterAction::SetType {
                column,
                data_type,
                type_metadata,
            } => {
                mutate_column(table, &column, file, diagnostics, |c| {
                    c.data_type = data_type.clone();
                    c.type_metadata = type_metadata.clone();
                });
            }
            AlterAction::AddForeignKey(fk) => table.foreign_keys.push(fk),
            AlterAction::AddUniqueIndex(index) => {
                if index.columns.len() == 1 {
                    let column = index.columns[0].name.clone();
                    mutate_column(table, &column, file, diagnostics, |c| c.is_unique = true);
                } else {
                    table.indexes.push(index);
                }
            }
            AlterAction::AddPrimaryKey {
                constraint,
                columns,
            } => {
                for name in &columns {
                    mutate_column(table, name, file, diagnostics, |c| {
                        c.nullable = false;
                        if columns.len() == 1 {
                            c.is_primary_key = true;
                        }
                    });
                }
                if columns.len() > 1 {
                    table.indexes.push(schema_model::Index {
                        name: constraint.unwrap_or_else(|| format!("{}_pkey", table.name)),
                        columns: columns
                            .into_iter()
                            .map(schema_model::IndexColumn::new)
                            .collect(),
                        is_unique: true,
                        is_primary: true,
                        method: None,
                        predicate: None,
                    });
                }
            }
            AlterAction::AddCheck { .. } => {
                // Check constraints are not part of the model.
            }
            AlterAction::EnableRowLevelSecurity => table.rls_enabled = true,
            AlterAction::DisableRowLevelSecurity => table.rls_enabled = false,
        }
    }
}

fn mutate_column(
    table: &mut Table,
    column: &str,
    file: &str,
    diagnostics: &mut Diagnostics,
    mutate: impl FnOnce(&mut schema_model::Column),
) {
    match table.columns.iter_mut().find(|c| c.name == column) {
        Some(target) => mutate(target),
        None => diagnostics.push(
            Diagnostic::error(
                "unknown-column",
                format!("ALTER COLUMN targets unknown column `{}.{column}`", table.name),
            )
            .at(Some(file), 1, 1),
        ),
    }
}

fn apply_comment(
    schema: &mut Schema,
    target: CommentTarget,
    dialect: Dialect,
    diagnostics: &mut Diagnostics,
) {
    match target {
        CommentTarget::Table {
            schema: namespace,
            table,
            comment,
        } => {
            let namespace = namespace.unwrap_or_else(|| dialect.default_namespace().to_string());
            match schema.table_mut(&namespace, &table) {
                Some(t) => t.comment = comment,
                None => diagnostics.push(Diagnostic::error(
                    "unknown-table",
                    format!("COMMENT ON targets unknown table `{table}`"),
                )),
            }
        }
        CommentTarget::Column {
            schema: namespace,
            table,
            column,
            comment,
        } => {
            let namespace = namespace.unwrap_or_else(|| dialect.default_namespace().to_string());
            match schema
                .table_mut(&namespace, &table)
                .and_then(|t| t.columns.iter_mut().find(|c| c.name == column))
            {
                Some(c) => c.comment = comment,
                None => diagnostics.push(Diagnostic::error(
                    "unknown-column",
                    format!("COMMENT ON targets unknown column `{table}.{column}`"),
                )),
            }
        }
    }
}

/// Fill in `REFERENCES t` (no column list) with the referenced table's
/// primary key.
fn resolve_foreign_key_targets(schema: &mut Schema) {
    let pk_by_table: std::collections::BTreeMap<(String, String), Vec<String>> = schema
        .tables
        .iter()
        .map(|t| {
            let pk = t
                .indexes
                .iter()
                .find(|i| i.is_primary)
                .map(|i| i.columns.iter().map(|c| c.name.clone()).collect())
                .unwrap_or_else(|| {
                    t.primary_key_columns().map(|c| c.name.clone()).collect()
                });
            ((t.schema.clone(), t.name.clone()), pk)
        })
        .collect();

    for table in &mut schema.tables {
        for fk in &mut table.foreign_keys {
            if fk.referenced_columns.is_empty() {
                if let Some(pk) = pk_by_table
                    .get(&(fk.referenced_schema.clone(), fk.referenced_table.clone()))
                {
                    fk.referenced_columns = pk.clone();
                }
            }
        }
    }
}

fn collect_sql_files(path: &Path) -> Result<Vec<PathBuf>, CoreError> {
    let metadata = std::fs::metadata(path).map_err(|err| CoreError::io(path, err))?;
    if metadata.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    let mut stack = vec![path.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|err| CoreError::io(&dir, err))?;
        for entry in entries {
            let entry = entry.map_err(|err| CoreError::io(&dir, err))?;
            let entry_path = entry.path();
            if entry_path.is_dir() {
                stack.push(entry_path);
            } else if entry_path.extension().is_some_and(|ext| ext == "sql") {
                files.push(entry_path);
            }
        }
    }
    // Lexicographic path order keeps directory merges deterministic.
    files.sort();
    Ok(files)
}
