//! Diff → plan translation.
//!
//! Steps come out in dependency order: foreign keys that block other work
//! are dropped first, tables are dropped before they are recreated
//! elsewhere, and cross-table foreign keys are added last, after every
//! referenced table exists. Column alterations are decomposed into atomic
//! driver calls; when a driver rejects one, the whole table falls back to
//! the rebuild recipe (create-copy-swap) if the dialect supports it, or a
//! multi-phase placeholder step if it does not.

mod rollback;

pub use rollback::generate_rollback;

use crate::differ::{ColumnChange, ColumnDiff, SchemaDiff, TableDiff};
use crate::error::CoreError;
use crate::plan::{OperationKind, Plan, PlanStep, Safety, SafetyLevel};
use crate::safety;
use migration_connector::{ConnectorError, DialectDriver};
use schema_model::{source_hash, Schema, Table};
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Stamp the plan with the canonical hash of the `before` schema.
    pub stamp_source_hash: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        PlanOptions {
            stamp_source_hash: true,
        }
    }
}

pub fn plan(
    diff: &SchemaDiff,
    before: &Schema,
    after: &Schema,
    driver: &DialectDriver,
) -> Result<Plan, CoreError> {
    plan_with_options(diff, before, after, driver, &PlanOptions::default())
}

pub fn plan_with_options(
    diff: &SchemaDiff,
    before: &Schema,
    after: &Schema,
    driver: &DialectDriver,
    options: &PlanOptions,
) -> Result<Plan, CoreError> {
    let mut result = Plan::new(driver.dialect());
    let mut deferred_fks: Vec<PlanStep> = Vec::new();

    let added_keys: BTreeSet<(String, String)> = diff
        .added_tables
        .iter()
        .map(|t| (t.schema.clone(), t.name.clone()))
        .collect();

    // Foreign keys first: on dropped tables and removed from modified
    // tables, so later drops cannot be blocked by dependent constraints.
    // Dialects without ALTER-level foreign keys handle these via table
    // drop or rebuild instead.
    let mut fk_rebuild_tables: BTreeSet<(String, String)> = BTreeSet::new();
    for table in &diff.removed_tables {
        for fk in &table.foreign_keys {
            match driver.drop_foreign_key(table, &fk.name) {
                Ok(sql) => result.steps.push(step(
                    format!("drop foreign key {} on {}", fk.name, table.qualified_name()),
                    vec![sql],
                    OperationKind::DropForeignKey,
                    member_ref(table, &fk.name),
                    safety::drop_foreign_key(),
                    true,
                )),
                Err(ConnectorError::UnsupportedAlteration(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
    }
    for table_diff in &diff.modified_tables {
        let table = lookup_table(before, &table_diff.schema, &table_diff.table)?;
        for fk in &table_diff.removed_foreign_keys {
            match driver.drop_foreign_key(table, &fk.name) {
                Ok(sql) => result.steps.push(step(
                    format!("drop foreign key {} on {}", fk.name, table.qualified_name()),
                    vec![sql],
                    OperationKind::DropForeignKey,
                    member_ref(table, &fk.name),
                    safety::drop_foreign_key(),
                    true,
                )),
                Err(ConnectorError::UnsupportedAlteration(_)) => {
                    fk_rebuild_tables
                        .insert((table_diff.schema.clone(), table_diff.table.clone()));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    // Indexes on tables that are going away.
    for table in &diff.removed_tables {
        for index in table.indexes.iter().filter(|i| !i.is_primary) {
            result.steps.push(step(
                format!("drop index {} on {}", index.name, table.qualified_name()),
                vec![driver.drop_index(table, &index.name)],
                OperationKind::DropIndex,
                member_ref(table, &index.name),
                safety::drop_index(),
                true,
            ));
        }
    }

    for table in &diff.removed_tables {
        result.steps.push(step(
            format!("drop table {}", table.qualified_name()),
            vec![driver.drop_table(table)],
            OperationKind::DropTable,
            table.qualified_name(),
            safety::drop_table(),
            false,
        ));
    }

    for table in &diff.added_tables {
        result.steps.push(step(
            format!("create table {}", table.qualified_name()),
            vec![driver.create_table(table)],
            OperationKind::CreateTable,
            table.qualified_name(),
            safety::create_table(),
            true,
        ));
        for index in table.indexes.iter().filter(|i| !i.is_primary) {
            result.steps.push(step(
                format!("create index {} on {}", index.name, table.qualified_name()),
                vec![driver.add_index(table, index, false)],
                OperationKind::AddIndex,
                member_ref(table, &index.name),
                safety::add_index(driver.supports_concurrent_index()),
                true,
            ));
        }
        if !driver.create_table_includes_foreign_keys() {
            for fk in &table.foreign_keys {
                let fk_step = step(
                    format!("add foreign key {} on {}", fk.name, table.qualified_name()),
                    vec![driver.add_foreign_key(table, fk)?],
                    OperationKind::AddForeignKey,
                    member_ref(table, &fk.name),
                    safety::add_foreign_key(),
                    true,
                );
                let self_referencing = fk.referenced_table == table.name
                    && fk.referenced_schema == table.schema;
                if self_referencing {
                    result.steps.push(fk_step);
                } else {
                    deferred_fks.push(fk_step);
                }
            }
        }
    }

    for table_diff in &diff.modified_tables {
        let before_table = lookup_table(before, &table_diff.schema, &table_diff.table)?;
        let after_table = lookup_table(after, &table_diff.schema, &table_diff.table)?;
        let pre_marked = fk_rebuild_tables
            .contains(&(table_diff.schema.clone(), table_diff.table.clone()));

        let outcome = build_table_steps(table_diff, before_table, after_table, driver, &added_keys);
        let unsupported = match &outcome {
            Err(CoreError::Connector(ConnectorError::UnsupportedAlteration(message))) => {
                Some(message.clone())
            }
            _ => None,
        };

        if pre_marked || unsupported.is_some() {
            if driver.supports_table_rebuild() {
                result
                    .steps
                    .push(rebuild_step(table_diff, before_table, after_table, driver)?);
            } else {
                let message = unsupported
                    .unwrap_or_else(|| "change set requires a table rebuild".to_string());
                result
                    .steps
                    .push(multi_phase_placeholder(table_diff, after_table, &message));
            }
            continue;
        }

        let (steps, deferred) = outcome?;
        result.steps.extend(steps);
        deferred_fks.extend(deferred);
    }

    // Cross-table foreign keys close the plan, once everything they
    // reference exists.
    result.steps.extend(deferred_fks);

    if options.stamp_source_hash {
        result.source_hash = Some(source_hash(before));
    }
    Ok(result)
}

fn rebuild_step(
    table_diff: &TableDiff,
    before_table: &Table,
    after_table: &Table,
    driver: &DialectDriver,
) -> Result<PlanStep, CoreError> {
    if table_diff.rls_changed {
        // A rebuild cannot smuggle in what the dialect does not have.
        return Err(ConnectorError::UnsupportedAlteration(format!(
            "row level security on {} is not available in this dialect",
            after_table.qualified_name()
        ))
        .into());
    }
    let sql = driver.rebuild_table(before_table, after_table)?;
    let mut safety = safety::rebuild_table();
    if !table_diff.removed_columns.is_empty() {
        safety.level = SafetyLevel::Lossy;
        safety.data_loss = true;
        safety.rollback_data_loss = true;
    }
    Ok(step(
        format!(
            "rebuild table {} (create new shape, copy rows, swap)",
            after_table.qualified_name()
        ),
        sql,
        OperationKind::RebuildTable,
        after_table.qualified_name(),
        safety,
        false,
    ))
}

fn multi_phase_placeholder(
    table_diff: &TableDiff,
    after_table: &Table,
    message: &str,
) -> PlanStep {
    let mut safety = Safety {
        level: SafetyLevel::MultiPhase,
        breaking_change: true,
        data_loss: false,
        rollback_description: "not applicable; no SQL was emitted".into(),
        rollback_data_loss: false,
        safer_alternatives: vec![
            "compose a multi-phase plan for this change (rename_column / narrow_type / drop_column_safely)"
                .into(),
        ],
    };
    safety.safer_alternatives.push(message.to_string());
    step(
        format!(
            "change to {} cannot be expressed as a single alteration: {message}",
            table_diff.table
        ),
        Vec::new(),
        OperationKind::RebuildTable,
        after_table.qualified_name(),
        safety,
        false,
    )
}

type TableSteps = (Vec<PlanStep>, Vec<PlanStep>);

fn build_table_steps(
    table_diff: &TableDiff,
    before_table: &Table,
    after_table: &Table,
    driver: &DialectDriver,
    added_keys: &BTreeSet<(String, String)>,
) -> Result<TableSteps, CoreError> {
    let mut steps = Vec::new();
    let mut deferred = Vec::new();

    for index in &table_diff.removed_indexes {
        steps.push(step(
            format!("drop index {} on {}", index.name, before_table.qualified_name()),
            vec![driver.drop_index(before_table, &index.name)],
            OperationKind::DropIndex,
            member_ref(before_table, &index.name),
            safety::drop_index(),
            true,
        ));
    }
    for (old, _) in &table_diff.modified_indexes {
        steps.push(step(
            format!(
                "drop index {} on {} (definition changed)",
                old.name,
                before_table.qualified_name()
            ),
            vec![driver.drop_index(before_table, &old.name)],
            OperationKind::DropIndex,
            member_ref(before_table, &old.name),
            safety::drop_index(),
            true,
        ));
    }

    // Removed foreign keys were already dropped in the early pass.

    for column in &table_diff.removed_columns {
        let renamed_to = table_diff
            .rename_candidate
            .as_ref()
            .filter(|(old, _)| old == &column.name)
            .map(|(_, new)| new.clone());
        let safety = match &renamed_to {
            Some(new) => with_rename_hint(safety::rename_column(&column.name, new)),
            None => safety::drop_column(),
        };
        steps.push(step(
            format!("drop column {} from {}", column.name, before_table.qualified_name()),
            vec![driver.drop_column(before_table, &column.name)],
            OperationKind::DropColumn,
            member_ref(before_table, &column.name),
            safety,
            false,
        ));
    }

    for column_diff in &table_diff.modified_columns {
        alter_column_steps(column_diff, before_table, after_table, driver, &mut steps)?;
    }

    for column in &table_diff.added_columns {
        let renamed_from = table_diff
            .rename_candidate
            .as_ref()
            .filter(|(_, new)| new == &column.name)
            .map(|(old, _)| old.clone());
        let safety = match &renamed_from {
            Some(old) => with_rename_hint(safety::rename_column(old, &column.name)),
            None => safety::add_column(column.nullable, column.default.is_some()),
        };
        steps.push(step(
            format!("add column {} to {}", column.name, after_table.qualified_name()),
            vec![driver.add_column(after_table, column)],
            OperationKind::AddColumn,
            member_ref(after_table, &column.name),
            safety,
            true,
        ));
    }

    if table_diff.rls_changed {
        if table_diff.rls_enabled {
            steps.push(step(
                format!("enable row level security on {}", after_table.qualified_name()),
                vec![driver.enable_rls(after_table)?],
                OperationKind::EnableRls,
                after_table.qualified_name(),
                safety::enable_rls(),
                true,
            ));
        } else {
            steps.push(step(
                format!("disable row level security on {}", after_table.qualified_name()),
                vec![driver.disable_rls(after_table)?],
                OperationKind::DisableRls,
                after_table.qualified_name(),
                safety::disable_rls(),
                true,
            ));
        }
    }

    for index in &table_diff.added_indexes {
        steps.push(step(
            format!("create index {} on {}", index.name, after_table.qualified_name()),
            vec![driver.add_index(after_table, index, false)],
            OperationKind::AddIndex,
            member_ref(after_table, &index.name),
            safety::add_index(driver.supports_concurrent_index()),
            true,
        ));
    }
    for (_, new) in &table_diff.modified_indexes {
        steps.push(step(
            format!(
                "create index {} on {} (new definition)",
                new.name,
                after_table.qualified_name()
            ),
            vec![driver.add_index(after_table, new, false)],
            OperationKind::AddIndex,
            member_ref(after_table, &new.name),
            safety::add_index(driver.supports_concurrent_index()),
            true,
        ));
    }

    for fk in &table_diff.added_foreign_keys {
        let fk_step = step(
            format!("add foreign key {} on {}", fk.name, after_table.qualified_name()),
            vec![driver.add_foreign_key(after_table, fk)?],
            OperationKind::AddForeignKey,
            member_ref(after_table, &fk.name),
            safety::add_foreign_key(),
            true,
        );
        let references_new_table = added_keys
            .contains(&(fk.referenced_schema.clone(), fk.referenced_table.clone()));
        if references_new_table {
            deferred.push(fk_step);
        } else {
            steps.push(fk_step);
        }
    }

    if table_diff.comment_changed {
        match driver.comment_on_table(after_table, table_diff.comment.as_deref()) {
            Ok(sql) => steps.push(step(
                format!("update comment on {}", after_table.qualified_name()),
                vec![sql],
                OperationKind::CommentOnTable,
                after_table.qualified_name(),
                safety::change_comment(),
                true,
            )),
            // Dialects without COMMENT ON simply have no comment to sync.
            Err(ConnectorError::UnsupportedAlteration(_)) => {}
            Err(err) => return Err(err.into()),
        }
    }

    Ok((steps, deferred))
}

/// §-ordered decomposition of one column's change set:
/// type, then nullability, then default, then uniqueness, then primary key.
fn alter_column_steps(
    column_diff: &ColumnDiff,
    before_table: &Table,
    after_table: &Table,
    driver: &DialectDriver,
    steps: &mut Vec<PlanStep>,
) -> Result<(), CoreError> {
    let column = &column_diff.column;
    let before = &column_diff.before;
    let after = &column_diff.after;
    let entity = member_ref(after_table, column);

    if column_diff.changes.contains(ColumnChange::Generation) {
        return Err(ConnectorError::UnsupportedAlteration(format!(
            "generated expression of {}.{column} cannot be altered in place",
            after_table.name
        ))
        .into());
    }

    if column_diff.changes.contains(ColumnChange::Type) {
        let kind = safety::type_change_kind(&before.type_metadata, &after.type_metadata);
        let reversible = kind == safety::TypeChangeKind::Widening;
        steps.push(step(
            format!(
                "change type of {}.{column} from {} to {}",
                after_table.name,
                before.type_metadata.canonical_name(),
                after.type_metadata.canonical_name()
            ),
            vec![driver.alter_column_type(after_table, column, &after.type_metadata)?],
            OperationKind::AlterColumnType,
            entity.clone(),
            safety::alter_type(kind),
            reversible,
        ));
    }

    if column_diff.changes.contains(ColumnChange::Nullable) {
        if after.nullable {
            steps.push(step(
                format!("drop NOT NULL on {}.{column}", after_table.name),
                vec![driver.set_nullable(after_table, column, true)?],
                OperationKind::DropNotNull,
                entity.clone(),
                safety::drop_not_null(),
                true,
            ));
        } else {
            steps.push(step(
                format!("set NOT NULL on {}.{column}", after_table.name),
                vec![driver.set_nullable(after_table, column, false)?],
                OperationKind::SetNotNull,
                entity.clone(),
                safety::set_not_null(),
                true,
            ));
        }
    }

    if column_diff.changes.contains(ColumnChange::Default) {
        steps.push(step(
            format!("change default of {}.{column}", after_table.name),
            vec![driver.set_default(after_table, column, after.default.as_deref())?],
            OperationKind::ChangeDefault,
            entity.clone(),
            safety::change_default(),
            true,
        ));
    }

    if column_diff.changes.contains(ColumnChange::Unique) {
        if after.is_unique {
            steps.push(step(
                format!("add unique constraint on {}.{column}", after_table.name),
                vec![driver.add_unique_constraint(after_table, column)?],
                OperationKind::AddUnique,
                entity.clone(),
                safety::add_unique(),
                true,
            ));
        } else {
            steps.push(step(
                format!("drop unique constraint on {}.{column}", after_table.name),
                vec![driver.drop_unique_constraint(after_table, column)?],
                OperationKind::DropUnique,
                entity.clone(),
                safety::drop_unique(),
                true,
            ));
        }
    }

    if column_diff.changes.contains(ColumnChange::PrimaryKey) {
        if after.is_primary_key {
            steps.push(step(
                format!("set primary key on {}.{column}", after_table.name),
                vec![driver.set_primary_key(after_table, &[column.clone()])?],
                OperationKind::SetPrimaryKey,
                entity.clone(),
                safety::set_primary_key(),
                true,
            ));
        } else {
            steps.push(step(
                format!("drop primary key on {}", after_table.name),
                vec![driver.drop_primary_key(after_table)?],
                OperationKind::DropPrimaryKey,
                entity.clone(),
                safety::drop_primary_key(),
                true,
            ));
        }
    }

    if column_diff.changes.contains(ColumnChange::Comment) {
        match driver.comment_on_column(after_table, column, after.comment.as_deref()) {
            Ok(sql) => steps.push(step(
                format!("update comment on {}.{column}", after_table.name),
                vec![sql],
                OperationKind::CommentOnColumn,
                entity.clone(),
                safety::change_comment(),
                true,
            )),
            Err(ConnectorError::UnsupportedAlteration(_)) => {}
            Err(err) => return Err(err.into()),
        }
    }

    Ok(())
}

fn with_rename_hint(mut safety: Safety) -> Safety {
    safety
        .safer_alternatives
        .push("this drop/add pair looks like a rename; consider the rename_column multi-phase pattern".into());
    safety
}

pub(crate) fn step(
    description: String,
    sql: Vec<String>,
    operation_kind: OperationKind,
    entity_ref: String,
    safety: Safety,
    reversible: bool,
) -> PlanStep {
    PlanStep {
        description,
        sql,
        operation_kind,
        entity_ref,
        safety,
        reversible,
    }
}

pub(crate) fn member_ref(table: &Table, member: &str) -> String {
    format!("{}.{member}", table.qualified_name())
}

pub(crate) fn lookup_table<'a>(
    schema: &'a Schema,
    namespace: &str,
    name: &str,
) -> Result<&'a Table, CoreError> {
    schema
        .table(namespace, name)
        .ok_or_else(|| CoreError::EntityNotFound(format!("table {namespace}.{name}")))
}
