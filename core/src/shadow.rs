//! Shadow database orchestration.
//!
//! The shadow is disposable by contract: every dry-run starts by dropping
//! whatever tables it holds, preloads the engine's view of the current
//! state, replays the plan inside a transaction and always rolls back. A
//! reservation file records that a shadow was prepared for an environment
//! so repeated runs can skip the stateful setup knowingly.

use crate::differ;
use crate::error::CoreError;
use crate::plan::Plan;
use crate::planner;
use migration_connector::{DatabaseConnection, DialectDriver};
use schema_model::{Schema, Table};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SHADOW_RESERVATION_FILE: &str = ".lockplane-shadow.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowReservation {
    pub environment: String,
    pub shadow_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow_schema: Option<String>,
    pub created_at: String,
}

impl ShadowReservation {
    pub fn new(environment: &str, shadow_url: &str, shadow_schema: Option<&str>) -> Self {
        ShadowReservation {
            environment: environment.to_string(),
            shadow_url: shadow_url.to_string(),
            shadow_schema: shadow_schema.map(str::to_string),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Replay a plan on the shadow and roll it back.
///
/// Succeeds iff cleanup, preload and every plan statement succeed. The
/// shadow ends the call holding only the preloaded current state (the
/// replay itself is always rolled back).
pub async fn dry_run(
    shadow: &mut DatabaseConnection,
    plan: &Plan,
    current_schema: &Schema,
    driver: &DialectDriver,
    shadow_schema: Option<&str>,
    verbose: bool,
) -> Result<(), CoreError> {
    cleanup(shadow, driver, shadow_schema).await?;
    preload(shadow, current_schema, driver).await?;
    replay(shadow, plan, verbose).await
}

/// Drop every table in the shadow namespace, in one transaction.
pub async fn cleanup(
    shadow: &mut DatabaseConnection,
    driver: &DialectDriver,
    shadow_schema: Option<&str>,
) -> Result<(), CoreError> {
    if let Some(namespace) = shadow_schema {
        if driver.supports_schemas() {
            driver.create_schema(shadow, namespace).await?;
            driver.set_schema(shadow, namespace).await?;
        }
    }

    let tables = driver.get_tables(shadow).await?;
    if tables.is_empty() {
        return Ok(());
    }

    tracing::debug!(count = tables.len(), "dropping shadow tables");
    shadow.begin().await?;
    for name in &tables {
        let stub = Table::new(shadow_schema.unwrap_or_default(), name.clone());
        let sql = if driver.supports_schemas() {
            // CASCADE cuts through inter-table constraints so drop order
            // does not matter.
            format!("{} CASCADE", driver.drop_table(&stub))
        } else {
            driver.drop_table(&stub)
        };
        if let Err(err) = shadow.raw_cmd(&sql).await {
            let _ = shadow.rollback().await;
            return Err(err.into());
        }
    }
    shadow.commit().await?;
    Ok(())
}

/// Apply the engine's view of the current state to the shadow: tables
/// first, then indexes, foreign keys last so cycles cannot block creation.
async fn preload(
    shadow: &mut DatabaseConnection,
    current_schema: &Schema,
    driver: &DialectDriver,
) -> Result<(), CoreError> {
    shadow.begin().await?;

    let result: Result<(), CoreError> = async {
        for table in &current_schema.tables {
            shadow.raw_cmd(&driver.create_table(table)).await?;
            for index in table.indexes.iter().filter(|i| !i.is_primary) {
                shadow.raw_cmd(&driver.add_index(table, index, false)).await?;
            }
        }
        if !driver.create_table_includes_foreign_keys() {
            for table in &current_schema.tables {
                for fk in &table.foreign_keys {
                    shadow.raw_cmd(&driver.add_foreign_key(table, fk)?).await?;
                }
            }
        }
        Ok(())
    }
    .await;

    match result {
        Ok(()) => shadow.commit().await.map_err(Into::into),
        Err(err) => {
            let _ = shadow.rollback().await;
            Err(err)
        }
    }
}

/// Execute the plan's statements and roll back regardless of outcome.
async fn replay(
    shadow: &mut DatabaseConnection,
    plan: &Plan,
    verbose: bool,
) -> Result<(), CoreError> {
    shadow.begin().await?;

    for (step_index, step) in plan.steps.iter().enumerate() {
        if verbose {
            tracing::info!(step = step_index + 1, "shadow: {}", step.description);
        }
        for sql in &step.sql {
            let trimmed = sql.trim();
            if trimmed.is_empty() || trimmed.lines().all(|l| l.trim().starts_with("--")) {
                continue;
            }
            if let Err(err) = shadow.raw_cmd(sql).await {
                let _ = shadow.rollback().await;
                return Err(CoreError::ShadowValidationFailed(format!(
                    "step {} ({}) failed on the shadow: {err}",
                    step_index + 1,
                    step.description
                )));
            }
        }
    }

    shadow.rollback().await?;
    Ok(())
}

/// Clean the shadow and record a reservation. Refuses to overwrite an
/// existing reservation unless forced.
pub async fn prepare(
    shadow: &mut DatabaseConnection,
    driver: &DialectDriver,
    working_dir: &Path,
    reservation: ShadowReservation,
    force: bool,
) -> Result<PathBuf, CoreError> {
    let path = working_dir.join(SHADOW_RESERVATION_FILE);
    if path.exists() && !force {
        return Err(CoreError::ReservationExists { path });
    }

    cleanup(shadow, driver, reservation.shadow_schema.as_deref()).await?;
    save_reservation(working_dir, &reservation)?;
    Ok(path)
}

/// Introspect both sides and produce the plan that would bring the target
/// to the shadow's state. Preview only; nothing is written.
pub async fn shadow_diff(
    target: &mut DatabaseConnection,
    shadow: &mut DatabaseConnection,
    driver: &DialectDriver,
) -> Result<Plan, CoreError> {
    let current = driver.introspect_schemas(target, None).await?;
    let desired = driver.introspect_schemas(shadow, None).await?;
    let diff = differ::diff(&current, &desired);
    planner::plan(&diff, &current, &desired, driver)
}

/// Write-temp-then-rename, same crash discipline as the state file.
pub fn save_reservation(dir: &Path, reservation: &ShadowReservation) -> Result<(), CoreError> {
    let path = dir.join(SHADOW_RESERVATION_FILE);
    let tmp = dir.join(format!("{SHADOW_RESERVATION_FILE}.tmp"));
    let json = serde_json::to_string_pretty(reservation).expect("reservation serializes");
    std::fs::write(&tmp, json).map_err(|err| CoreError::io(&tmp, err))?;
    std::fs::rename(&tmp, &path).map_err(|err| CoreError::io(&path, err))?;
    Ok(())
}

pub fn load_reservation(dir: &Path) -> Result<Option<ShadowReservation>, CoreError> {
    let path = dir.join(SHADOW_RESERVATION_FILE);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(CoreError::io(path, err)),
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|err| CoreError::CorruptState {
            path,
            message: err.to_string(),
        })
}

/// Delete the reservation. Returns whether one existed.
pub fn release_reservation(dir: &Path) -> Result<bool, CoreError> {
    let path = dir.join(SHADOW_RESERVATION_FILE);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(CoreError::io(path, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservation_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let reservation =
            ShadowReservation::new("staging", "postgres://localhost/shadow", Some("lp_shadow"));
        save_reservation(dir.path(), &reservation).unwrap();
        assert_eq!(load_reservation(dir.path()).unwrap(), Some(reservation));
        assert!(release_reservation(dir.path()).unwrap());
        assert!(!release_reservation(dir.path()).unwrap());
        assert_eq!(load_reservation(dir.path()).unwrap(), None);
    }

    #[tokio::test]
    async fn prepare_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let driver = DialectDriver::for_dialect(schema_model::Dialect::Sqlite).unwrap();
        let mut shadow = DatabaseConnection::connect(":memory:").await.unwrap();

        let reservation = ShadowReservation::new("dev", ":memory:", None);
        prepare(&mut shadow, &driver, dir.path(), reservation.clone(), false)
            .await
            .unwrap();

        let err = prepare(&mut shadow, &driver, dir.path(), reservation.clone(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ReservationExists { .. }));

        prepare(&mut shadow, &driver, dir.path(), reservation, true)
            .await
            .unwrap();
    }
}
