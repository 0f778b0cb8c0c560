//! Multi-phase composition and the phase state machine, end to end.

use lockplane_core::{multi_phase, CoreError, PhaseState};
use migration_connector::DialectDriver;
use schema_model::{Column, Dialect, Table};

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
fn rename_email_produces_the_expected_three_phases() {
    let driver = DialectDriver::for_dialect(Dialect::Postgres).unwrap();
    let plan = multi_phase::rename_column(&users(), "email", "email_address", &driver).unwrap();

    assert_eq!(plan.total_phases, 3);

    let phase1 = plan.phase(1).unwrap();
    let phase1_sql: Vec<_> = phase1
        .plan
        .as_ref()
        .unwrap()
        .steps
        .iter()
        .flat_map(|s| s.sql.clone())
        .collect();
    assert!(phase1_sql.iter().any(|s| s.contains("ADD COLUMN \"email_address\"")));

    let phase2 = plan.phase(2).unwrap();
    let phase2_sql: Vec<_> = phase2
        .plan
        .as_ref()
        .unwrap()
        .steps
        .iter()
        .flat_map(|s| s.sql.clone())
        .collect();
    assert!(phase2_sql.iter().any(|s| s.contains("DROP COLUMN \"email\"")));

    assert!(plan.phase(3).unwrap().plan.is_none());
}

#[test]
fn phase_two_cannot_run_before_phase_one_completes() {
    let driver = DialectDriver::for_dialect(Dialect::Postgres).unwrap();
    let plan = multi_phase::rename_column(&users(), "email", "email_address", &driver).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let mut state = PhaseState::load(dir.path()).unwrap();
    state
        .start(
            "rename-users-email",
            &plan.operation,
            &plan.pattern,
            "users",
            "email",
            plan.total_phases,
            "plans/rename.json",
        )
        .unwrap();
    state.save(dir.path()).unwrap();

    let mut state = PhaseState::load(dir.path()).unwrap();
    assert!(matches!(
        state.can_execute(2),
        Err(CoreError::PhaseOutOfOrder { requested: 2, next: 1 })
    ));

    state.can_execute(1).unwrap();
    assert!(!state.complete(1).unwrap());
    state.save(dir.path()).unwrap();

    let state = PhaseState::load(dir.path()).unwrap();
    state.can_execute(2).unwrap();
    assert_eq!(state.next_phase(), Some(2));
}

#[test]
fn completing_every_phase_clears_the_state_file() {
    let driver = DialectDriver::for_dialect(Dialect::Postgres).unwrap();
    let plan = multi_phase::drop_column_safely(&users(), "email", &driver).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let mut state = PhaseState::default();
    state
        .start(
            "drop-users-email",
            &plan.operation,
            &plan.pattern,
            "users",
            "email",
            plan.total_phases,
            "plans/drop.json",
        )
        .unwrap();

    assert!(!state.complete(1).unwrap());
    assert!(state.complete(2).unwrap());
    state.save(dir.path()).unwrap();

    assert!(PhaseState::load(dir.path()).unwrap().is_idle());
}

#[test]
fn multi_phase_plan_file_round_trips_through_json() {
    let driver = DialectDriver::for_dialect(Dialect::Postgres).unwrap();
    let new_type = schema_model::TypeMetadata::parse("varchar(120)", Dialect::Postgres);
    let plan = multi_phase::narrow_type(&users(), "email", &new_type, &driver).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("narrow.json");
    std::fs::write(&path, plan.to_json()).unwrap();

    let loaded =
        multi_phase::MultiPhasePlan::from_json(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(loaded, plan);
    assert_eq!(loaded.total_phases, 4);
    assert!(loaded.phase(2).unwrap().plan.is_none());
    assert!(loaded
        .phase(2)
        .unwrap()
        .verification
        .iter()
        .any(|v| v.contains("count(*)")));
}
