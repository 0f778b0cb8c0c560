//! Plan execution.
//!
//! One serializable transaction on the target. Before the transaction
//! opens, two gates: the source-hash check (the target must still be in
//! the state the plan was generated from) and, when a shadow connection is
//! supplied, a full dry-run replay on it. Any statement failure aborts the
//! transaction and the target is left untouched.

use crate::error::CoreError;
use crate::plan::Plan;
use crate::shadow;
use migration_connector::{DatabaseConnection, DialectDriver};
use schema_model::{source_hash, Schema};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ExecutionError {
    pub step_index: usize,
    pub statement_index: usize,
    pub description: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub steps_applied: usize,
    pub errors: Vec<ExecutionError>,
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub verbose: bool,
    /// Checked before every statement; honored between shadow validation
    /// and the target transaction.
    pub cancellation: CancellationToken,
}

/// Apply a plan to the target inside a single transaction.
///
/// `current_schema` is the engine's view of the target used for the
/// source-hash check and for preloading the shadow.
pub async fn apply(
    target: &mut DatabaseConnection,
    plan: &Plan,
    mut shadow: Option<&mut DatabaseConnection>,
    current_schema: &Schema,
    driver: &DialectDriver,
    options: &ApplyOptions,
) -> Result<ExecutionResult, CoreError> {
    if let Some(expected) = &plan.source_hash {
        let live = driver.introspect_schemas(target, None).await?;
        let actual = source_hash(&live);
        if &actual != expected {
            return Err(CoreError::SourceHashMismatch {
                expected: expected.clone(),
                actual,
            });
        }
    }

    if let Some(shadow_conn) = shadow.as_deref_mut() {
        shadow::dry_run(shadow_conn, plan, current_schema, driver, None, options.verbose)
            .await
            .map_err(|err| match err {
                CoreError::ShadowValidationFailed(_) => err,
                other => CoreError::ShadowValidationFailed(other.to_string()),
            })?;
    }

    // A cancellation arriving after the dry run must not touch the target.
    if options.cancellation.is_cancelled() {
        return Ok(cancelled_result(0, 0, "cancelled before the target transaction began"));
    }

    execute_in_transaction(target, plan, options).await
}

async fn execute_in_transaction(
    target: &mut DatabaseConnection,
    plan: &Plan,
    options: &ApplyOptions,
) -> Result<ExecutionResult, CoreError> {
    let mut result = ExecutionResult::default();

    target.begin().await?;

    for (step_index, step) in plan.steps.iter().enumerate() {
        if options.verbose {
            tracing::info!(step = step_index + 1, total = plan.steps.len(), "{}", step.description);
        }

        for (statement_index, sql) in step.sql.iter().enumerate() {
            if is_skippable(sql) {
                continue;
            }

            if options.cancellation.is_cancelled() {
                let _ = target.rollback().await;
                return Ok(cancelled_result(step_index, statement_index, "cancelled"));
            }

            let outcome = tokio::select! {
                biased;
                _ = options.cancellation.cancelled() => None,
                outcome = target.raw_cmd(sql) => Some(outcome),
            };
            let Some(outcome) = outcome else {
                let _ = target.rollback().await;
                return Ok(cancelled_result(step_index, statement_index, "cancelled"));
            };

            if let Err(err) = outcome {
                tracing::error!(
                    step = step_index + 1,
                    statement = statement_index + 1,
                    error = %err,
                    "statement failed; rolling back"
                );
                let _ = target.rollback().await;
                result.errors.push(ExecutionError {
                    step_index,
                    statement_index,
                    description: step.description.clone(),
                    error: err.to_string(),
                });
                return Ok(result);
            }
        }
        result.steps_applied += 1;
    }

    if let Err(err) = target.commit().await {
        result.errors.push(ExecutionError {
            step_index: plan.steps.len(),
            statement_index: 0,
            description: "commit".into(),
            error: format!("commit failed: {err}"),
        });
        return Ok(result);
    }

    result.success = true;
    Ok(result)
}

/// Empty strings and lone `--` comment lines carry no SQL to run.
fn is_skippable(sql: &str) -> bool {
    let trimmed = sql.trim();
    trimmed.is_empty() || trimmed.lines().all(|l| l.trim().starts_with("--"))
}

fn cancelled_result(step_index: usize, statement_index: usize, reason: &str) -> ExecutionResult {
    ExecutionResult {
        success: false,
        steps_applied: 0,
        errors: vec![ExecutionError {
            step_index,
            statement_index,
            description: "cancellation".into(),
            error: reason.to_string(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skippable_statements() {
        assert!(is_skippable(""));
        assert!(is_skippable("   "));
        assert!(is_skippable("--"));
        assert!(is_skippable("-- nothing to do"));
        assert!(!is_skippable("DROP TABLE t"));
    }
}
