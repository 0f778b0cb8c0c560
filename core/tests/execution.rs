//! Executor and shadow behavior against real SQLite databases.

use lockplane_core::{
    differ, executor, loader::LoadOptions, planner, shadow, ApplyOptions, CoreError,
};
use migration_connector::{DatabaseConnection, DialectDriver};
use schema_model::{schemas_equivalent, source_hash, Dialect, Schema};
use tokio_util::sync::CancellationToken;

fn load_sqlite(sql: &str) -> Schema {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("schema.sql"), sql).unwrap();
    lockplane_core::loader::load_sql_path(
        dir.path(),
        &LoadOptions {
            dialect: Some(Dialect::Sqlite),
            strict: false,
        },
    )
    .unwrap()
    .schema
}

async fn sqlite_at(sql: &str) -> DatabaseConnection {
    let mut conn = DatabaseConnection::connect(":memory:").await.unwrap();
    if !sql.trim().is_empty() {
        conn.raw_cmd(sql).await.unwrap();
    }
    conn
}

async fn introspect(conn: &mut DatabaseConnection) -> Schema {
    DialectDriver::for_dialect(Dialect::Sqlite)
        .unwrap()
        .introspect_schemas(conn, None)
        .await
        .unwrap()
}

#[tokio::test]
async fn plan_apply_introspect_round_trips() {
    let before_sql = "CREATE TABLE t (id integer PRIMARY KEY);";
    let before = load_sqlite(before_sql);
    let after = load_sqlite(
        r#"
        CREATE TABLE t (id integer PRIMARY KEY, email text);
        CREATE TABLE audit (id integer PRIMARY KEY, note text);
        CREATE INDEX t_email_idx ON t (email);
        "#,
    );
    let driver = DialectDriver::for_dialect(Dialect::Sqlite).unwrap();
    let plan = planner::plan(&differ::diff(&before, &after), &before, &after, &driver).unwrap();

    let mut target = sqlite_at(before_sql).await;
    let result = executor::apply(
        &mut target,
        &plan,
        None,
        &before,
        &driver,
        &ApplyOptions::default(),
    )
    .await
    .unwrap();

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.steps_applied, plan.steps.len());

    let live = introspect(&mut target).await;
    assert!(
        schemas_equivalent(&live, &after),
        "introspected state must canonicalize to the declared target"
    );
}

#[tokio::test]
async fn text_and_introspection_agree_on_the_same_schema() {
    let sql = r#"
        CREATE TABLE users (
            id integer PRIMARY KEY,
            email text NOT NULL UNIQUE,
            age integer DEFAULT 0
        );
        CREATE INDEX users_age_idx ON users (age);
    "#;
    let declared = load_sqlite(sql);
    let mut live = sqlite_at(sql).await;
    let introspected = introspect(&mut live).await;

    assert!(differ::diff(&declared, &introspected).is_empty());
    assert_eq!(source_hash(&declared), source_hash(&introspected));
}

#[tokio::test]
async fn source_hash_mismatch_refuses_to_touch_the_target() {
    // Plan generated against state B, target sitting at state A.
    let state_b = load_sqlite("CREATE TABLE t (id integer PRIMARY KEY, email text);");
    let after = load_sqlite(
        "CREATE TABLE t (id integer PRIMARY KEY, email text, phone text);",
    );
    let driver = DialectDriver::for_dialect(Dialect::Sqlite).unwrap();
    let plan = planner::plan(&differ::diff(&state_b, &after), &state_b, &after, &driver).unwrap();

    let state_a_sql = "CREATE TABLE t (id integer PRIMARY KEY);";
    let mut target = sqlite_at(state_a_sql).await;
    let pre = introspect(&mut target).await;

    let err = executor::apply(
        &mut target,
        &plan,
        None,
        &state_b,
        &driver,
        &ApplyOptions::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CoreError::SourceHashMismatch { .. }));

    let post = introspect(&mut target).await;
    assert!(schemas_equivalent(&pre, &post), "target must be untouched");
}

#[tokio::test]
async fn a_failing_step_rolls_the_whole_transaction_back() {
    let before_sql = "CREATE TABLE t (id integer PRIMARY KEY);";
    let before = load_sqlite(before_sql);
    let after = load_sqlite("CREATE TABLE t (id integer PRIMARY KEY, email text);");
    let driver = DialectDriver::for_dialect(Dialect::Sqlite).unwrap();
    let mut plan =
        planner::plan(&differ::diff(&before, &after), &before, &after, &driver).unwrap();

    // Sabotage the plan with a second step that cannot execute.
    let mut broken = plan.steps[0].clone();
    broken.description = "reference a missing table".into();
    broken.sql = vec!["ALTER TABLE missing ADD COLUMN x text".into()];
    plan.steps.push(broken);

    let mut target = sqlite_at(before_sql).await;
    let pre = introspect(&mut target).await;

    let result = executor::apply(
        &mut target,
        &plan,
        None,
        &before,
        &driver,
        &ApplyOptions::default(),
    )
    .await
    .unwrap();

    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].step_index, 1);

    let post = introspect(&mut target).await;
    assert!(
        schemas_equivalent(&pre, &post),
        "the successful first step must not survive the abort"
    );
}

#[tokio::test]
async fn shadow_validation_failure_prevents_target_mutation() {
    let before_sql = "CREATE TABLE t (id integer PRIMARY KEY);";
    let before = load_sqlite(before_sql);
    let driver = DialectDriver::for_dialect(Dialect::Sqlite).unwrap();

    let mut plan = lockplane_core::Plan::new(Dialect::Sqlite);
    plan.steps.push(lockplane_core::PlanStep {
        description: "bad statement".into(),
        sql: vec!["ALTER TABLE missing ADD COLUMN x text".into()],
        operation_kind: lockplane_core::OperationKind::AddColumn,
        entity_ref: "missing.x".into(),
        safety: lockplane_core::Safety {
            level: lockplane_core::SafetyLevel::Safe,
            breaking_change: false,
            data_loss: false,
            rollback_description: String::new(),
            rollback_data_loss: false,
            safer_alternatives: vec![],
        },
        reversible: true,
    });

    let mut target = sqlite_at(before_sql).await;
    let mut shadow_conn = sqlite_at("").await;
    let pre = introspect(&mut target).await;

    let err = executor::apply(
        &mut target,
        &plan,
        Some(&mut shadow_conn),
        &before,
        &driver,
        &ApplyOptions::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CoreError::ShadowValidationFailed(_)));

    let post = introspect(&mut target).await;
    assert!(schemas_equivalent(&pre, &post));
}

#[tokio::test]
async fn dry_run_leaves_the_shadow_at_the_preloaded_state() {
    let before = load_sqlite("CREATE TABLE t (id integer PRIMARY KEY);");
    let after = load_sqlite(
        "CREATE TABLE t (id integer PRIMARY KEY);\nCREATE TABLE extra (id integer PRIMARY KEY);",
    );
    let driver = DialectDriver::for_dialect(Dialect::Sqlite).unwrap();
    let plan = planner::plan(&differ::diff(&before, &after), &before, &after, &driver).unwrap();

    let mut shadow_conn = sqlite_at("CREATE TABLE junk (x integer);").await;
    shadow::dry_run(&mut shadow_conn, &plan, &before, &driver, None, false)
        .await
        .unwrap();

    let state = introspect(&mut shadow_conn).await;
    assert!(
        schemas_equivalent(&state, &before),
        "replay must be rolled back and junk cleaned up; shadow holds only the preload"
    );
}

#[tokio::test]
async fn rollback_restores_the_original_structure() {
    let before_sql = "CREATE TABLE t (id integer PRIMARY KEY);";
    let before = load_sqlite(before_sql);
    let after = load_sqlite(
        r#"
        CREATE TABLE t (id integer PRIMARY KEY, email text);
        CREATE TABLE audit (id integer PRIMARY KEY);
        CREATE INDEX t_email_idx ON t (email);
        "#,
    );
    let driver = DialectDriver::for_dialect(Dialect::Sqlite).unwrap();
    let forward =
        planner::plan(&differ::diff(&before, &after), &before, &after, &driver).unwrap();

    let mut target = sqlite_at(before_sql).await;
    let applied = executor::apply(
        &mut target,
        &forward,
        None,
        &before,
        &driver,
        &ApplyOptions::default(),
    )
    .await
    .unwrap();
    assert!(applied.success);

    let rollback = planner::generate_rollback(&forward, &before, &driver).unwrap();
    let rolled_back = executor::apply(
        &mut target,
        &rollback,
        None,
        &after,
        &driver,
        &ApplyOptions::default(),
    )
    .await
    .unwrap();
    assert!(rolled_back.success, "errors: {:?}", rolled_back.errors);

    let live = introspect(&mut target).await;
    assert!(schemas_equivalent(&live, &before));
}

#[tokio::test]
async fn cancellation_before_the_transaction_leaves_the_target_alone() {
    let before_sql = "CREATE TABLE t (id integer PRIMARY KEY);";
    let before = load_sqlite(before_sql);
    let after = load_sqlite("CREATE TABLE t (id integer PRIMARY KEY, email text);");
    let driver = DialectDriver::for_dialect(Dialect::Sqlite).unwrap();
    let plan = planner::plan(&differ::diff(&before, &after), &before, &after, &driver).unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let options = ApplyOptions {
        verbose: false,
        cancellation: token,
    };

    let mut target = sqlite_at(before_sql).await;
    let pre = introspect(&mut target).await;

    let result = executor::apply(&mut target, &plan, None, &before, &driver, &options)
        .await
        .unwrap();
    assert!(!result.success);
    assert!(result.errors[0].error.contains("cancelled"));

    let post = introspect(&mut target).await;
    assert!(schemas_equivalent(&pre, &post));
}
