//! Lockplane core: declarative schema migrations.
//!
//! Declare the schema you want; the engine loads it (from SQL files, a
//! JSON model, or a live database), diffs it against the current state,
//! plans an ordered list of SQL steps with safety and reversibility
//! annotations, validates the plan on a disposable shadow database, and
//! applies it in one transaction. Breaking changes compose into
//! multi-phase plans with code-deploy gates tracked in a state file.
//!
//! Everything here is a library: no global state, no process exit. The
//! pure subsystems (differ, planner, classifier, composer) never touch a
//! database; the executor and shadow orchestrator own their connections
//! only for the duration of a call.

pub mod differ;
pub mod engine;
pub mod error;
pub mod executor;
pub mod loader;
pub mod multi_phase;
pub mod plan;
pub mod planner;
mod safety;
pub mod shadow;
pub mod state;

pub use differ::{diff, ColumnChange, ColumnDiff, SchemaDiff, TableDiff};
pub use engine::EngineContext;
pub use error::CoreError;
pub use executor::{apply, ApplyOptions, ExecutionError, ExecutionResult};
pub use loader::{check_sources, load_schema, LoadOptions, LoadedSchema};
pub use multi_phase::{MultiPhasePlan, Phase};
pub use plan::{OperationKind, Plan, PlanStep, Safety, SafetyLevel};
pub use planner::{generate_rollback, plan, plan_with_options, PlanOptions};
pub use shadow::{dry_run, ShadowReservation, SHADOW_RESERVATION_FILE};
pub use state::{ActiveMigration, PhaseState, STATE_FILE};
