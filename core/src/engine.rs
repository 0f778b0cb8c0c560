//! The per-invocation engine context.
//!
//! No process-wide state: a CLI (or test) builds one `EngineContext` per
//! invocation from a resolved environment and threads it through the
//! high-level operations.

use crate::differ::{self, SchemaDiff};
use crate::error::CoreError;
use crate::executor::{self, ApplyOptions, ExecutionResult};
use crate::loader::{self, LoadOptions, LoadedSchema};
use crate::plan::Plan;
use crate::planner;
use migration_connector::{
    classify_url, DatabaseConnection, DialectDriver, ResolvedEnvironment,
};
use schema_model::{Dialect, Schema};

pub struct EngineContext {
    pub environment: ResolvedEnvironment,
    pub load_options: LoadOptions,
}

impl EngineContext {
    pub fn new(environment: ResolvedEnvironment) -> EngineContext {
        let dialect = classify_url(&environment.database_url);
        EngineContext {
            environment,
            load_options: LoadOptions {
                dialect,
                strict: false,
            },
        }
    }

    pub fn strict(mut self, strict: bool) -> EngineContext {
        self.load_options.strict = strict;
        self
    }

    pub fn target_dialect(&self) -> Dialect {
        classify_url(&self.environment.database_url).unwrap_or(Dialect::Unknown)
    }

    pub fn driver(&self) -> Result<DialectDriver, CoreError> {
        Ok(DialectDriver::for_dialect(self.target_dialect())?)
    }

    pub async fn connect_target(&self) -> Result<DatabaseConnection, CoreError> {
        Ok(DatabaseConnection::connect(&self.environment.database_url).await?)
    }

    pub async fn connect_shadow(&self) -> Result<DatabaseConnection, CoreError> {
        let url = self.environment.require_shadow()?;
        Ok(DatabaseConnection::connect(url).await?)
    }

    pub async fn load_schema(&self, source: &str) -> Result<LoadedSchema, CoreError> {
        loader::load_schema(source, &self.load_options).await
    }

    /// Load both sides and compute their structural diff.
    pub async fn diff_sources(
        &self,
        before_source: &str,
        after_source: &str,
    ) -> Result<(Schema, Schema, SchemaDiff), CoreError> {
        let before = self.load_schema(before_source).await?.schema;
        let after = self.load_schema(after_source).await?.schema;
        let diff = differ::diff(&before, &after);
        Ok((before, after, diff))
    }

    /// Diff two sources and translate the result into a plan.
    pub async fn plan_migration(
        &self,
        before_source: &str,
        after_source: &str,
    ) -> Result<Plan, CoreError> {
        let (before, after, diff) = self.diff_sources(before_source, after_source).await?;
        let driver = self.driver()?;
        planner::plan(&diff, &before, &after, &driver)
    }

    /// Apply a plan to the environment's target, dry-running on the shadow
    /// first when one is configured.
    pub async fn apply_plan(
        &self,
        plan: &Plan,
        current_schema: &Schema,
        options: &ApplyOptions,
    ) -> Result<ExecutionResult, CoreError> {
        let driver = self.driver()?;
        let mut target = self.connect_target().await?;
        let mut shadow = match self.environment.shadow_database_url.as_deref() {
            Some(url) => Some(DatabaseConnection::connect(url).await?),
            None => None,
        };
        executor::apply(
            &mut target,
            plan,
            shadow.as_mut(),
            current_schema,
            &driver,
            options,
        )
        .await
    }
}
