//! Multi-phase plans for breaking changes.
//!
//! The composer turns a high-level intent (rename a column, narrow a type,
//! drop a column safely) into a sequence of phases following the
//! expand/contract pattern: widen the schema, let code catch up, then
//! contract. Phases that need a code deploy gate automatic execution.

use crate::error::CoreError;
use crate::plan::{OperationKind, Plan, PlanStep};
use crate::planner::{member_ref, step};
use crate::safety;
use migration_connector::{ConnectorError, DialectDriver};
use schema_model::{Table, TypeMetadata};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiPhasePlan {
    /// Discriminator in the persisted JSON shape; always `true`.
    pub multi_phase: bool,
    pub operation: String,
    pub pattern: String,
    pub total_phases: u32,
    pub description: String,
    pub phases: Vec<Phase>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    /// 1-based position in the sequence.
    pub index: u32,
    pub name: String,
    pub description: String,
    /// `None` for phases that are pure code-deploy or bookkeeping steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    pub requires_code_deploy: bool,
    #[serde(default)]
    pub code_changes_required: Vec<String>,
    #[serde(default)]
    pub verification: Vec<String>,
}

impl MultiPhasePlan {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("multi-phase plan serializes")
    }

    pub fn from_json(json: &str) -> Result<MultiPhasePlan, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn phase(&self, number: u32) -> Option<&Phase> {
        self.phases.iter().find(|p| p.index == number)
    }
}

fn single_step_plan(driver: &DialectDriver, steps: Vec<PlanStep>) -> Plan {
    let mut plan = Plan::new(driver.dialect());
    plan.steps = steps;
    plan
}

/// Expand/contract rename: add the new column, deploy code writing to
/// both, then make the new column authoritative and drop the old one.
pub fn rename_column(
    table: &Table,
    old: &str,
    new: &str,
    driver: &DialectDriver,
) -> Result<MultiPhasePlan, CoreError> {
    let old_column = table
        .column(old)
        .ok_or_else(|| CoreError::EntityNotFound(format!("column {}.{old}", table.name)))?;

    let mut new_column = old_column.clone();
    new_column.name = new.to_string();
    new_column.nullable = true;
    new_column.is_primary_key = false;

    let phase1 = single_step_plan(
        driver,
        vec![step(
            format!("add column {new} to {} (same type as {old})", table.name),
            vec![driver.add_column(table, &new_column)],
            OperationKind::AddColumn,
            member_ref(table, new),
            safety::add_column(true, new_column.default.is_some()),
            true,
        )],
    );

    let mut phase2_steps = Vec::new();
    if !old_column.nullable {
        match driver.set_nullable(table, new, false) {
            Ok(sql) => phase2_steps.push(step(
                format!("set NOT NULL on {}.{new}", table.name),
                vec![sql],
                OperationKind::SetNotNull,
                member_ref(table, new),
                safety::set_not_null(),
                true,
            )),
            Err(ConnectorError::UnsupportedAlteration(_)) => {
                tracing::warn!(
                    table = %table.name,
                    column = new,
                    "dialect cannot set NOT NULL in place; the renamed column stays nullable"
                );
            }
            Err(err) => return Err(err.into()),
        }
    }
    phase2_steps.push(step(
        format!("drop column {old} from {}", table.name),
        vec![driver.drop_column(table, old)],
        OperationKind::DropColumn,
        member_ref(table, old),
        safety::drop_column(),
        false,
    ));
    let phase2 = single_step_plan(driver, phase2_steps);

    Ok(MultiPhasePlan {
        multi_phase: true,
        operation: format!("rename {}.{old} to {new}", table.name),
        pattern: "rename_column".into(),
        total_phases: 3,
        description: format!(
            "rename column {old} to {new} on {} without breaking running code",
            table.qualified_name()
        ),
        phases: vec![
            Phase {
                index: 1,
                name: "expand".into(),
                description: format!("add {new} alongside {old} and start dual-writing"),
                plan: Some(phase1),
                requires_code_deploy: false,
                code_changes_required: vec![
                    format!("write to both {old} and {new}"),
                    format!("backfill {new} from {old} (UPDATE ... SET {new} = {old} WHERE {new} IS NULL)"),
                ],
                verification: vec![format!(
                    "SELECT count(*) FROM {} WHERE {new} IS DISTINCT FROM {old}",
                    table.qualified_name()
                )],
            },
            Phase {
                index: 2,
                name: "contract".into(),
                description: format!("make {new} authoritative and drop {old}"),
                plan: Some(phase2),
                requires_code_deploy: true,
                code_changes_required: vec![format!("read and write only {new}")],
                verification: vec![format!(
                    "confirm no code references {}.{old}",
                    table.name
                )],
            },
            Phase {
                index: 3,
                name: "complete".into(),
                description: "rename finished; clean up feature flags".into(),
                plan: None,
                requires_code_deploy: false,
                code_changes_required: Vec::new(),
                verification: Vec::new(),
            },
        ],
    })
}

/// Narrow a column's type through a shadow column: add, backfill, swap
/// usage in code, then replace the original.
pub fn narrow_type(
    table: &Table,
    column: &str,
    new_type: &TypeMetadata,
    driver: &DialectDriver,
) -> Result<MultiPhasePlan, CoreError> {
    let old_column = table
        .column(column)
        .ok_or_else(|| CoreError::EntityNotFound(format!("column {}.{column}", table.name)))?;

    let shadow_name = format!("{column}_new");
    let mut shadow = old_column.clone();
    shadow.name = shadow_name.clone();
    shadow.data_type = new_type.canonical_name();
    shadow.type_metadata = new_type.clone();
    shadow.nullable = true;
    shadow.is_primary_key = false;

    let phase1 = single_step_plan(
        driver,
        vec![step(
            format!(
                "add shadow column {shadow_name} ({}) to {}",
                new_type.canonical_name(),
                table.name
            ),
            vec![driver.add_column(table, &shadow)],
            OperationKind::AddColumn,
            member_ref(table, &shadow_name),
            safety::add_column(true, false),
            true,
        )],
    );

    let phase4 = single_step_plan(
        driver,
        vec![
            step(
                format!("drop column {column} from {}", table.name),
                vec![driver.drop_column(table, column)],
                OperationKind::DropColumn,
                member_ref(table, column),
                safety::drop_column(),
                false,
            ),
            step(
                format!("rename {shadow_name} to {column} on {}", table.name),
                vec![driver.rename_column(table, &shadow_name, column)],
                OperationKind::AddColumn,
                member_ref(table, column),
                crate::plan::Safety {
                    level: crate::plan::SafetyLevel::Safe,
                    breaking_change: false,
                    data_loss: false,
                    rollback_description: format!("rename {column} back to {shadow_name}"),
                    rollback_data_loss: false,
                    safer_alternatives: Vec::new(),
                },
                true,
            ),
        ],
    );

    Ok(MultiPhasePlan {
        multi_phase: true,
        operation: format!(
            "narrow {}.{column} to {}",
            table.name,
            new_type.canonical_name()
        ),
        pattern: "narrow_type".into(),
        total_phases: 4,
        description: format!(
            "narrow the type of {}.{column} via a shadow column, keeping data verifiable at every step",
            table.name
        ),
        phases: vec![
            Phase {
                index: 1,
                name: "add shadow column".into(),
                description: format!("add {shadow_name} with the narrower type"),
                plan: Some(phase1),
                requires_code_deploy: false,
                code_changes_required: Vec::new(),
                verification: Vec::new(),
            },
            Phase {
                index: 2,
                name: "backfill".into(),
                description: format!("backfill {shadow_name} from {column} in batches"),
                plan: None,
                requires_code_deploy: false,
                code_changes_required: vec![format!(
                    "run the backfill: UPDATE {} SET {shadow_name} = {column} WHERE {shadow_name} IS NULL",
                    table.qualified_name()
                )],
                verification: vec![format!(
                    "SELECT count(*) FROM {} WHERE {shadow_name} IS NULL AND {column} IS NOT NULL",
                    table.qualified_name()
                )],
            },
            Phase {
                index: 3,
                name: "swap usage".into(),
                description: format!("deploy code reading and writing {shadow_name}"),
                plan: None,
                requires_code_deploy: true,
                code_changes_required: vec![format!("use {shadow_name} everywhere {column} was used")],
                verification: Vec::new(),
            },
            Phase {
                index: 4,
                name: "replace".into(),
                description: format!("drop {column} and rename {shadow_name} into place"),
                plan: Some(phase4),
                requires_code_deploy: true,
                code_changes_required: vec![format!("switch back to the name {column}")],
                verification: Vec::new(),
            },
        ],
    })
}

/// Stop writes first, then drop.
pub fn drop_column_safely(
    table: &Table,
    column: &str,
    driver: &DialectDriver,
) -> Result<MultiPhasePlan, CoreError> {
    table
        .column(column)
        .ok_or_else(|| CoreError::EntityNotFound(format!("column {}.{column}", table.name)))?;

    let phase2 = single_step_plan(
        driver,
        vec![step(
            format!("drop column {column} from {}", table.name),
            vec![driver.drop_column(table, column)],
            OperationKind::DropColumn,
            member_ref(table, column),
            safety::drop_column(),
            false,
        )],
    );

    Ok(MultiPhasePlan {
        multi_phase: true,
        operation: format!("drop {}.{column} safely", table.name),
        pattern: "drop_column_safely".into(),
        total_phases: 2,
        description: format!(
            "remove {}.{column} after confirming nothing writes to it",
            table.name
        ),
        phases: vec![
            Phase {
                index: 1,
                name: "stop writes".into(),
                description: format!("deploy code that no longer reads or writes {column}"),
                plan: None,
                requires_code_deploy: true,
                code_changes_required: vec![format!("remove all usage of {}.{column}", table.name)],
                verification: vec![format!(
                    "confirm query logs show no access to {}.{column}",
                    table.name
                )],
            },
            Phase {
                index: 2,
                name: "drop".into(),
                description: format!("drop {column}"),
                plan: Some(phase2),
                requires_code_deploy: false,
                code_changes_required: Vec::new(),
                verification: Vec::new(),
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema_model::{Column, Dialect};

    fn users(driver_dialect: Dialect) -> Table {
        let mut table = Table::new(
            if driver_dialect == Dialect::Postgres { "public" } else { "" },
            "users",
        );
        let mut id = Column::new("id", "integer", driver_dialect);
        id.nullable = false;
        id.is_primary_key = true;
        table.columns.push(id);
        let mut email = Column::new("email", "text", driver_dialect);
        email.nullable = false;
        table.columns.push(email);
        table
    }

    #[test]
    fn rename_column_is_three_phases() {
        let driver = DialectDriver::for_dialect(Dialect::Postgres).unwrap();
        let plan = rename_column(&users(Dialect::Postgres), "email", "email_address", &driver)
            .unwrap();

        assert_eq!(plan.total_phases, 3);
        assert_eq!(plan.pattern, "rename_column");

        let phase1 = plan.phase(1).unwrap();
        let sql = &phase1.plan.as_ref().unwrap().steps[0].sql[0];
        assert!(sql.contains("ADD COLUMN \"email_address\""));

        let phase2 = plan.phase(2).unwrap();
        assert!(phase2.requires_code_deploy);
        let drops: Vec<_> = phase2
            .plan
            .as_ref()
            .unwrap()
            .steps
            .iter()
            .filter(|s| s.operation_kind == OperationKind::DropColumn)
            .collect();
        assert_eq!(drops.len(), 1);
        assert!(drops[0].sql[0].contains("DROP COLUMN \"email\""));

        assert!(plan.phase(3).unwrap().plan.is_none());
    }

    #[test]
    fn narrow_type_is_four_phases_with_external_backfill() {
        let driver = DialectDriver::for_dialect(Dialect::Postgres).unwrap();
        let table = users(Dialect::Postgres);
        let new_type = TypeMetadata::parse("varchar(100)", Dialect::Postgres);
        let plan = narrow_type(&table, "email", &new_type, &driver).unwrap();

        assert_eq!(plan.total_phases, 4);
        assert!(plan.phase(2).unwrap().plan.is_none(), "backfill is external");
        assert!(plan.phase(3).unwrap().requires_code_deploy);
        let phase4_sql: Vec<_> = plan
            .phase(4)
            .unwrap()
            .plan
            .as_ref()
            .unwrap()
            .steps
            .iter()
            .flat_map(|s| s.sql.clone())
            .collect();
        assert!(phase4_sql.iter().any(|s| s.contains("RENAME COLUMN \"email_new\" TO \"email\"")));
    }

    #[test]
    fn drop_column_safely_gates_on_code_deploy() {
        let driver = DialectDriver::for_dialect(Dialect::Postgres).unwrap();
        let plan = drop_column_safely(&users(Dialect::Postgres), "email", &driver).unwrap();
        assert_eq!(plan.total_phases, 2);
        assert!(plan.phase(1).unwrap().requires_code_deploy);
        assert!(plan.phase(1).unwrap().plan.is_none());
        assert!(plan.phase(2).unwrap().plan.is_some());
    }

    #[test]
    fn unknown_column_is_reported() {
        let driver = DialectDriver::for_dialect(Dialect::Postgres).unwrap();
        let err = rename_column(&users(Dialect::Postgres), "nope", "x", &driver).unwrap_err();
        assert!(matches!(err, CoreError::EntityNotFound(_)));
    }

    #[test]
    fn multi_phase_plan_json_round_trips() {
        let driver = DialectDriver::for_dialect(Dialect::Postgres).unwrap();
        let plan = rename_column(&users(Dialect::Postgres), "email", "email_address", &driver)
            .unwrap();
        let back = MultiPhasePlan::from_json(&plan.to_json()).unwrap();
        assert_eq!(back, plan);
        assert!(plan.to_json().contains("\"multi_phase\": true"));
    }
}
