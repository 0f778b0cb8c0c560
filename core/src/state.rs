//! Persisted multi-phase migration state.
//!
//! `.lockplane-state.json` tracks the active multi-phase migration and
//! which phases have committed. Phases must complete in order, 1-based and
//! contiguous; `--force` can override the ordering check but the override
//! is logged. The file is replaced atomically (write temp, rename) after
//! every successful phase commit.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const STATE_FILE: &str = ".lockplane-state.json";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PhaseState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_migration: Option<ActiveMigration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveMigration {
    pub id: String,
    pub operation: String,
    pub pattern: String,
    pub table: String,
    pub column: String,
    pub total_phases: u32,
    pub plan_path: String,
    #[serde(default)]
    pub phases_completed: Vec<u32>,
    pub started_at: String,
}

impl PhaseState {
    /// Load from a working directory. A missing file is the idle state; a
    /// file that exists but does not parse is an error, not idle.
    pub fn load(dir: &Path) -> Result<PhaseState, CoreError> {
        let path = dir.join(STATE_FILE);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PhaseState::default())
            }
            Err(err) => return Err(CoreError::io(path, err)),
        };
        serde_json::from_str(&contents).map_err(|err| CoreError::CorruptState {
            path,
            message: err.to_string(),
        })
    }

    /// Atomic replace: write a temp file next to the target, then rename.
    pub fn save(&self, dir: &Path) -> Result<(), CoreError> {
        let path = dir.join(STATE_FILE);
        let tmp = dir.join(format!("{STATE_FILE}.tmp"));
        let json = serde_json::to_string_pretty(self).expect("state serializes");
        std::fs::write(&tmp, json).map_err(|err| CoreError::io(&tmp, err))?;
        std::fs::rename(&tmp, &path).map_err(|err| CoreError::io(&path, err))?;
        Ok(())
    }

    pub fn is_idle(&self) -> bool {
        self.active_migration.is_none()
    }

    /// Begin tracking a multi-phase migration. Valid only from idle.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        &mut self,
        id: &str,
        operation: &str,
        pattern: &str,
        table: &str,
        column: &str,
        total_phases: u32,
        plan_path: &str,
    ) -> Result<(), CoreError> {
        if let Some(active) = &self.active_migration {
            return Err(CoreError::MigrationAlreadyActive {
                id: active.id.clone(),
            });
        }
        self.active_migration = Some(ActiveMigration {
            id: id.to_string(),
            operation: operation.to_string(),
            pattern: pattern.to_string(),
            table: table.to_string(),
            column: column.to_string(),
            total_phases,
            plan_path: plan_path.to_string(),
            phases_completed: Vec::new(),
            started_at: chrono::Utc::now().to_rfc3339(),
        });
        Ok(())
    }

    /// Check whether `phase_number` is the next executable phase.
    pub fn can_execute(&self, phase_number: u32) -> Result<(), CoreError> {
        let active = self
            .active_migration
            .as_ref()
            .ok_or(CoreError::NoActiveMigration)?;

        if active.phases_completed.contains(&phase_number) {
            return Err(CoreError::PhaseAlreadyComplete(phase_number));
        }
        let next = active
            .phases_completed
            .iter()
            .copied()
            .max()
            .unwrap_or(0)
            + 1;
        if phase_number != next || phase_number > active.total_phases {
            return Err(CoreError::PhaseOutOfOrder {
                requested: phase_number,
                next,
            });
        }
        Ok(())
    }

    /// As [`can_execute`](Self::can_execute), with a logged escape hatch.
    pub fn can_execute_forced(&self, phase_number: u32, force: bool) -> Result<(), CoreError> {
        match self.can_execute(phase_number) {
            Err(CoreError::PhaseOutOfOrder { requested, next }) if force => {
                tracing::warn!(
                    requested,
                    next,
                    "phase ordering overridden with --force"
                );
                Ok(())
            }
            other => other,
        }
    }

    /// Record a committed phase. Returns `true` when the migration is
    /// complete (and cleared).
    pub fn complete(&mut self, phase_number: u32) -> Result<bool, CoreError> {
        let active = self
            .active_migration
            .as_mut()
            .ok_or(CoreError::NoActiveMigration)?;
        if active.phases_completed.contains(&phase_number) {
            return Err(CoreError::PhaseAlreadyComplete(phase_number));
        }
        active.phases_completed.push(phase_number);
        if active.phases_completed.len() as u32 == active.total_phases {
            self.active_migration = None;
            return Ok(true);
        }
        Ok(false)
    }

    /// The lowest phase not yet completed (`--next`).
    pub fn next_phase(&self) -> Option<u32> {
        let active = self.active_migration.as_ref()?;
        (1..=active.total_phases).find(|n| !active.phases_completed.contains(n))
    }

    /// Clear the active migration without completing it. User-initiated
    /// and dangerous: already-applied phases are not rolled back.
    pub fn abort(&mut self) {
        if let Some(active) = self.active_migration.take() {
            tracing::warn!(id = %active.id, "multi-phase migration aborted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> PhaseState {
        let mut state = PhaseState::default();
        state
            .start(
                "20260801-users-email",
                "rename users.email to email_address",
                "rename_column",
                "users",
                "email",
                3,
                "plans/rename-email.json",
            )
            .unwrap();
        state
    }

    #[test]
    fn phases_must_run_in_order() {
        let mut state = started();
        assert!(matches!(
            state.can_execute(2),
            Err(CoreError::PhaseOutOfOrder { requested: 2, next: 1 })
        ));
        state.can_execute(1).unwrap();
        assert!(!state.complete(1).unwrap());
        state.can_execute(2).unwrap();
        assert!(matches!(
            state.can_execute(1),
            Err(CoreError::PhaseAlreadyComplete(1))
        ));
    }

    #[test]
    fn completing_the_last_phase_returns_to_idle() {
        let mut state = started();
        assert!(!state.complete(1).unwrap());
        assert!(!state.complete(2).unwrap());
        assert!(state.complete(3).unwrap());
        assert!(state.is_idle());
    }

    #[test]
    fn start_refuses_while_active() {
        let mut state = started();
        let err = state
            .start("other", "op", "pattern", "t", "c", 2, "p.json")
            .unwrap_err();
        assert!(matches!(err, CoreError::MigrationAlreadyActive { .. }));
    }

    #[test]
    fn can_execute_without_active_migration_fails() {
        let state = PhaseState::default();
        assert!(matches!(
            state.can_execute(1),
            Err(CoreError::NoActiveMigration)
        ));
    }

    #[test]
    fn force_overrides_ordering_but_not_completion() {
        let state = started();
        state.can_execute_forced(3, true).unwrap();
        let mut state = started();
        state.complete(1).unwrap();
        assert!(matches!(
            state.can_execute_forced(1, true),
            Err(CoreError::PhaseAlreadyComplete(1))
        ));
    }

    #[test]
    fn next_phase_is_the_lowest_missing() {
        let mut state = started();
        assert_eq!(state.next_phase(), Some(1));
        state.complete(1).unwrap();
        assert_eq!(state.next_phase(), Some(2));
    }

    #[test]
    fn state_file_round_trips_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let state = started();
        state.save(dir.path()).unwrap();
        let loaded = PhaseState::load(dir.path()).unwrap();
        assert_eq!(loaded, state);
        assert!(!dir.path().join(format!("{STATE_FILE}.tmp")).exists());
    }

    #[test]
    fn missing_state_file_is_idle() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PhaseState::load(dir.path()).unwrap().is_idle());
    }

    #[test]
    fn corrupt_state_file_is_an_error_not_idle() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(STATE_FILE), "{not json").unwrap();
        assert!(matches!(
            PhaseState::load(dir.path()),
            Err(CoreError::CorruptState { .. })
        ));
    }
}
