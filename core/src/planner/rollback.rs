//! Forward-plan inversion.
//!
//! Walks the forward steps in reverse and emits the inverse of each, using
//! the `before` schema as the authoritative description of the state being
//! restored. Structure comes back; data does not. Steps that cannot be
//! restored from structure alone are retained with `reversible = false`
//! and an explanation instead of SQL, so a rollback plan always accounts
//! for every forward step.

use super::{lookup_table, step};
use crate::error::CoreError;
use crate::plan::{OperationKind, Plan, PlanStep, Safety, SafetyLevel};
use crate::safety;
use migration_connector::{ConnectorError, DialectDriver};
use schema_model::{Schema, Table};

pub fn generate_rollback(
    forward: &Plan,
    before: &Schema,
    driver: &DialectDriver,
) -> Result<Plan, CoreError> {
    let mut rollback = Plan::new(forward.target_dialect);

    for forward_step in forward.steps.iter().rev() {
        if let Some(inverse) = invert_step(forward_step, before, driver)? {
            rollback.steps.push(inverse);
        }
    }

    Ok(rollback)
}

fn invert_step(
    forward: &PlanStep,
    before: &Schema,
    driver: &DialectDriver,
) -> Result<Option<PlanStep>, CoreError> {
    let entity = &forward.entity_ref;

    let inverse = match forward.operation_kind {
        OperationKind::CreateTable => {
            let (namespace, name) = split_table_ref(entity);
            let stub = Table::new(namespace, name);
            step(
                format!("drop table {entity} (was created by the forward plan)"),
                vec![driver.drop_table(&stub)],
                OperationKind::DropTable,
                entity.clone(),
                safety::drop_table(),
                false,
            )
        }

        OperationKind::DropTable => {
            let (namespace, name) = split_table_ref(entity);
            let table = lookup_table(before, &namespace, &name)?;
            let mut sql = vec![driver.create_table(table)];
            for index in table.indexes.iter().filter(|i| !i.is_primary) {
                sql.push(driver.add_index(table, index, false));
            }
            if !driver.create_table_includes_foreign_keys() {
                for fk in &table.foreign_keys {
                    sql.push(driver.add_foreign_key(table, fk)?);
                }
            }
            let mut safety = safety::create_table();
            safety.rollback_description =
                "the table structure is restored; row data is not".into();
            step(
                format!("restore table {entity} (structure only, data is lost)"),
                sql,
                OperationKind::CreateTable,
                entity.clone(),
                safety,
                false,
            )
        }

        OperationKind::AddColumn => {
            // The column does not exist in `before`; dropping it restores
            // the old shape regardless.
            let stub = table_or_stub(before, entity);
            let column_name = member_name(entity);
            step(
                format!("drop column {entity} (was added by the forward plan)"),
                vec![driver.drop_column(&stub, &column_name)],
                OperationKind::DropColumn,
                entity.clone(),
                safety::drop_column(),
                false,
            )
        }

        OperationKind::DropColumn => {
            let (table, column_name) = split_member_ref(entity);
            let table = lookup_table_qualified(before, &table)?;
            let column = table.column(&column_name).ok_or_else(|| {
                CoreError::EntityNotFound(format!("column {entity} in the before schema"))
            })?;
            let mut safety = safety::add_column(column.nullable, column.default.is_some());
            safety.rollback_description =
                "the column is re-added with its original definition; values are not restored"
                    .into();
            step(
                format!("restore column {entity} (definition only, data is lost)"),
                vec![driver.add_column(table, column)],
                OperationKind::AddColumn,
                entity.clone(),
                safety,
                false,
            )
        }

        OperationKind::AlterColumnType => {
            let (table_ref, column_name) = split_member_ref(entity);
            let table = lookup_table_qualified(before, &table_ref)?;
            let column = table.column(&column_name).ok_or_else(|| {
                CoreError::EntityNotFound(format!("column {entity} in the before schema"))
            })?;
            match driver.alter_column_type(table, &column_name, &column.type_metadata) {
                Ok(sql) => step(
                    format!(
                        "restore type of {entity} to {}",
                        column.type_metadata.canonical_name()
                    ),
                    vec![sql],
                    OperationKind::AlterColumnType,
                    entity.clone(),
                    safety::alter_type(safety::TypeChangeKind::Widening),
                    true,
                ),
                Err(ConnectorError::UnsupportedAlteration(message)) => {
                    non_restorable(forward, &message)
                }
                Err(err) => return Err(err.into()),
            }
        }

        OperationKind::SetNotNull => {
            invert_nullability(forward, before, driver, entity, true)?
        }
        OperationKind::DropNotNull => {
            invert_nullability(forward, before, driver, entity, false)?
        }

        OperationKind::ChangeDefault => {
            let (table_ref, column_name) = split_member_ref(entity);
            let table = lookup_table_qualified(before, &table_ref)?;
            let column = table.column(&column_name).ok_or_else(|| {
                CoreError::EntityNotFound(format!("column {entity} in the before schema"))
            })?;
            match driver.set_default(table, &column_name, column.default.as_deref()) {
                Ok(sql) => step(
                    format!("restore default of {entity}"),
                    vec![sql],
                    OperationKind::ChangeDefault,
                    entity.clone(),
                    safety::change_default(),
                    true,
                ),
                Err(ConnectorError::UnsupportedAlteration(message)) => {
                    non_restorable(forward, &message)
                }
                Err(err) => return Err(err.into()),
            }
        }

        OperationKind::AddUnique => {
            let (table_ref, column_name) = split_member_ref(entity);
            let table = lookup_table_qualified(before, &table_ref)?;
            match driver.drop_unique_constraint(table, &column_name) {
                Ok(sql) => step(
                    format!("drop unique constraint on {entity}"),
                    vec![sql],
                    OperationKind::DropUnique,
                    entity.clone(),
                    safety::drop_unique(),
                    true,
                ),
                Err(ConnectorError::UnsupportedAlteration(message)) => {
                    non_restorable(forward, &message)
                }
                Err(err) => return Err(err.into()),
            }
        }

        OperationKind::DropUnique => {
            let (table_ref, column_name) = split_member_ref(entity);
            let table = lookup_table_qualified(before, &table_ref)?;
            match driver.add_unique_constraint(table, &column_name) {
                Ok(sql) => step(
                    format!("re-add unique constraint on {entity}"),
                    vec![sql],
                    OperationKind::AddUnique,
                    entity.clone(),
                    safety::add_unique(),
                    true,
                ),
                Err(ConnectorError::UnsupportedAlteration(message)) => {
                    non_restorable(forward, &message)
                }
                Err(err) => return Err(err.into()),
            }
        }

        OperationKind::SetPrimaryKey => {
            let (table_ref, _) = split_member_ref(entity);
            let table = lookup_table_qualified(before, &table_ref)?;
            match driver.drop_primary_key(table) {
                Ok(sql) => step(
                    format!("drop primary key added on {table_ref}"),
                    vec![sql],
                    OperationKind::DropPrimaryKey,
                    entity.clone(),
                    safety::drop_primary_key(),
                    true,
                ),
                Err(ConnectorError::UnsupportedAlteration(message)) => {
                    non_restorable(forward, &message)
                }
                Err(err) => return Err(err.into()),
            }
        }

        OperationKind::DropPrimaryKey => {
            let (table_ref, _) = split_member_ref(entity);
            let table = lookup_table_qualified(before, &table_ref)?;
            let pk_columns: Vec<String> = table
                .primary_key_columns()
                .map(|c| c.name.clone())
                .collect();
            if pk_columns.is_empty() {
                non_restorable(forward, "the before schema has no primary key to restore")
            } else {
                match driver.set_primary_key(table, &pk_columns) {
                    Ok(sql) => step(
                        format!("restore primary key on {table_ref}"),
                        vec![sql],
                        OperationKind::SetPrimaryKey,
                        entity.clone(),
                        safety::set_primary_key(),
                        true,
                    ),
                    Err(ConnectorError::UnsupportedAlteration(message)) => {
                        non_restorable(forward, &message)
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }

        OperationKind::AddIndex => {
            let (table_ref, index_name) = split_member_ref(entity);
            let stub = stub_table(&table_ref);
            step(
                format!("drop index {index_name} (was created by the forward plan)"),
                vec![driver.drop_index(&stub, &index_name)],
                OperationKind::DropIndex,
                entity.clone(),
                safety::drop_index(),
                true,
            )
        }

        OperationKind::DropIndex => {
            let (table_ref, index_name) = split_member_ref(entity);
            let table = lookup_table_qualified(before, &table_ref)?;
            let index = table.index(&index_name).ok_or_else(|| {
                CoreError::EntityNotFound(format!("index {entity} in the before schema"))
            })?;
            step(
                format!("recreate index {index_name} on {table_ref}"),
                vec![driver.add_index(table, index, false)],
                OperationKind::AddIndex,
                entity.clone(),
                safety::add_index(driver.supports_concurrent_index()),
                true,
            )
        }

        OperationKind::AddForeignKey => {
            let (table_ref, fk_name) = split_member_ref(entity);
            let stub = stub_table(&table_ref);
            match driver.drop_foreign_key(&stub, &fk_name) {
                Ok(sql) => step(
                    format!("drop foreign key {fk_name} (was added by the forward plan)"),
                    vec![sql],
                    OperationKind::DropForeignKey,
                    entity.clone(),
                    safety::drop_foreign_key(),
                    true,
                ),
                Err(ConnectorError::UnsupportedAlteration(message)) => {
                    non_restorable(forward, &message)
                }
                Err(err) => return Err(err.into()),
            }
        }

        OperationKind::DropForeignKey => {
            let (table_ref, fk_name) = split_member_ref(entity);
            let table = lookup_table_qualified(before, &table_ref)?;
            let fk = table.foreign_key(&fk_name).ok_or_else(|| {
                CoreError::EntityNotFound(format!("foreign key {entity} in the before schema"))
            })?;
            match driver.add_foreign_key(table, fk) {
                Ok(sql) => step(
                    format!("re-add foreign key {fk_name} on {table_ref}"),
                    vec![sql],
                    OperationKind::AddForeignKey,
                    entity.clone(),
                    safety::add_foreign_key(),
                    true,
                ),
                Err(ConnectorError::UnsupportedAlteration(message)) => {
                    non_restorable(forward, &message)
                }
                Err(err) => return Err(err.into()),
            }
        }

        OperationKind::EnableRls => {
            let stub = stub_table(entity);
            match driver.disable_rls(&stub) {
                Ok(sql) => step(
                    format!("disable row level security on {entity}"),
                    vec![sql],
                    OperationKind::DisableRls,
                    entity.clone(),
                    safety::disable_rls(),
                    true,
                ),
                Err(ConnectorError::UnsupportedAlteration(message)) => {
                    non_restorable(forward, &message)
                }
                Err(err) => return Err(err.into()),
            }
        }

        OperationKind::DisableRls => {
            let stub = stub_table(entity);
            match driver.enable_rls(&stub) {
                Ok(sql) => step(
                    format!("re-enable row level security on {entity}"),
                    vec![sql],
                    OperationKind::EnableRls,
                    entity.clone(),
                    safety::enable_rls(),
                    true,
                ),
                Err(ConnectorError::UnsupportedAlteration(message)) => {
                    non_restorable(forward, &message)
                }
                Err(err) => return Err(err.into()),
            }
        }

        OperationKind::RebuildTable => non_restorable(
            forward,
            "the table was rebuilt in place; restoring requires the original definition and data",
        ),

        OperationKind::CommentOnTable => {
            let (namespace, name) = split_table_ref(entity);
            let table = lookup_table(before, &namespace, &name)?;
            match driver.comment_on_table(table, table.comment.as_deref()) {
                Ok(sql) => step(
                    format!("restore comment on {entity}"),
                    vec![sql],
                    OperationKind::CommentOnTable,
                    entity.clone(),
                    safety::change_comment(),
                    true,
                ),
                Err(ConnectorError::UnsupportedAlteration(message)) => {
                    non_restorable(forward, &message)
                }
                Err(err) => return Err(err.into()),
            }
        }

        OperationKind::CommentOnColumn => {
            let (table_ref, column_name) = split_member_ref(entity);
            let table = lookup_table_qualified(before, &table_ref)?;
            let comment = table
                .column(&column_name)
                .and_then(|c| c.comment.as_deref());
            match driver.comment_on_column(table, &column_name, comment) {
                Ok(sql) => step(
                    format!("restore comment on {entity}"),
                    vec![sql],
                    OperationKind::CommentOnColumn,
                    entity.clone(),
                    safety::change_comment(),
                    true,
                ),
                Err(ConnectorError::UnsupportedAlteration(message)) => {
                    non_restorable(forward, &message)
                }
                Err(err) => return Err(err.into()),
            }
        }
    };

    Ok(Some(inverse))
}

fn invert_nullability(
    forward: &PlanStep,
    before: &Schema,
    driver: &DialectDriver,
    entity: &str,
    make_nullable: bool,
) -> Result<PlanStep, CoreError> {
    let (table_ref, column_name) = split_member_ref(entity);
    let table = lookup_table_qualified(before, &table_ref)?;
    match driver.set_nullable(table, &column_name, make_nullable) {
        Ok(sql) => Ok(if make_nullable {
            step(
                format!("drop NOT NULL on {entity}"),
                vec![sql],
                OperationKind::DropNotNull,
                entity.to_string(),
                safety::drop_not_null(),
                true,
            )
        } else {
            step(
                format!("restore NOT NULL on {entity}"),
                vec![sql],
                OperationKind::SetNotNull,
                entity.to_string(),
                safety::set_not_null(),
                true,
            )
        }),
        Err(ConnectorError::UnsupportedAlteration(message)) => {
            Ok(non_restorable(forward, &message))
        }
        Err(err) => Err(err.into()),
    }
}

/// A retained, SQL-less step for forward operations whose effect cannot be
/// restored from structure alone.
fn non_restorable(forward: &PlanStep, reason: &str) -> PlanStep {
    step(
        format!("cannot invert `{}`: {reason}", forward.description),
        Vec::new(),
        forward.operation_kind,
        forward.entity_ref.clone(),
        Safety {
            level: SafetyLevel::Dangerous,
            breaking_change: true,
            data_loss: forward.safety.data_loss,
            rollback_description: reason.to_string(),
            rollback_data_loss: forward.safety.data_loss,
            safer_alternatives: Vec::new(),
        },
        false,
    )
}

fn split_table_ref(entity: &str) -> (String, String) {
    match entity.split_once('.') {
        Some((namespace, name)) => (namespace.to_string(), name.to_string()),
        None => (String::new(), entity.to_string()),
    }
}

fn split_member_ref(entity: &str) -> (String, String) {
    match entity.rsplit_once('.') {
        Some((table, member)) => (table.to_string(), member.to_string()),
        None => (String::new(), entity.to_string()),
    }
}

fn member_name(entity: &str) -> String {
    split_member_ref(entity).1
}

fn stub_table(table_ref: &str) -> Table {
    let (namespace, name) = split_table_ref(table_ref);
    Table::new(namespace, name)
}

fn table_or_stub(schema: &Schema, member_entity: &str) -> Table {
    let (table_ref, _) = split_member_ref(member_entity);
    let (namespace, name) = split_table_ref(&table_ref);
    schema
        .table(&namespace, &name)
        .cloned()
        .unwrap_or_else(|| Table::new(namespace, name))
}

fn lookup_table_qualified<'a>(schema: &'a Schema, table_ref: &str) -> Result<&'a Table, CoreError> {
    let (namespace, name) = split_table_ref(table_ref);
    lookup_table(schema, &namespace, &name)
}
