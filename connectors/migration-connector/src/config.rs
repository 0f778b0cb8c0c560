//! Environment resolution.
//!
//! Configuration loading itself (TOML files, per-environment dotenv) lives
//! outside the engine; what arrives here is a flat key/value map. The
//! provider turns that map into a [`ResolvedEnvironment`] the engine can
//! act on.

use crate::{classify_url, ConnectorError};
use std::collections::HashMap;

/// Everything the engine needs to know about one target environment.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResolvedEnvironment {
    pub name: String,
    pub database_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow_database_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow_schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

pub trait ConfigProvider {
    fn resolve_environment(&self, name: Option<&str>)
        -> Result<ResolvedEnvironment, ConnectorError>;
}

/// Key/value-backed provider: the dotenv passthrough.
///
/// Recognized keys, first match wins:
/// target — `DATABASE_URL`, `POSTGRES_URL`, `SQLITE_DB_PATH`, `LIBSQL_URL`;
/// shadow — `SHADOW_DATABASE_URL`, `POSTGRES_SHADOW_URL`,
/// `SQLITE_SHADOW_DB_PATH` (alias `SHADOW_SQLITE_DB_PATH`),
/// `LIBSQL_SHADOW_DB_PATH`; plus `SHADOW_SCHEMA`, `SCHEMA_PATH` and
/// `LIBSQL_AUTH_TOKEN`.
#[derive(Debug, Clone, Default)]
pub struct EnvVarsProvider {
    vars: HashMap<String, String>,
}

const TARGET_KEYS: &[&str] = &["DATABASE_URL", "POSTGRES_URL", "SQLITE_DB_PATH", "LIBSQL_URL"];
const SHADOW_KEYS: &[&str] = &[
    "SHADOW_DATABASE_URL",
    "POSTGRES_SHADOW_URL",
    "SQLITE_SHADOW_DB_PATH",
    "SHADOW_SQLITE_DB_PATH",
    "LIBSQL_SHADOW_DB_PATH",
];

impl EnvVarsProvider {
    pub fn new(vars: HashMap<String, String>) -> EnvVarsProvider {
        EnvVarsProvider { vars }
    }

    /// Snapshot the process environment.
    pub fn from_env() -> EnvVarsProvider {
        EnvVarsProvider {
            vars: std::env::vars().collect(),
        }
    }

    fn first_of(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .find_map(|k| self.vars.get(*k))
            .filter(|v| !v.is_empty())
            .cloned()
    }
}

impl ConfigProvider for EnvVarsProvider {
    fn resolve_environment(
        &self,
        name: Option<&str>,
    ) -> Result<ResolvedEnvironment, ConnectorError> {
        let name = name.unwrap_or("default").to_string();

        let database_url = self
            .first_of(TARGET_KEYS)
            .ok_or_else(|| ConnectorError::EnvironmentNotFound(name.clone()))?;

        if classify_url(&database_url).is_none() {
            // A full URL should at least parse as one.
            if url::Url::parse(&database_url).is_err() {
                return Err(ConnectorError::UnsupportedDialect(format!(
                    "DATABASE_URL is not a recognized connection string: {database_url}"
                )));
            }
        }

        Ok(ResolvedEnvironment {
            name,
            database_url,
            shadow_database_url: self.first_of(SHADOW_KEYS),
            shadow_schema: self.first_of(&["SHADOW_SCHEMA"]),
            schema_path: self.first_of(&["SCHEMA_PATH"]),
            auth_token: self.first_of(&["LIBSQL_AUTH_TOKEN"]),
        })
    }
}

impl ResolvedEnvironment {
    /// The shadow URL, or the error the executor surfaces when a command
    /// needs one and none is configured.
    pub fn require_shadow(&self) -> Result<&str, ConnectorError> {
        self.shadow_database_url
            .as_deref()
            .ok_or_else(|| ConnectorError::ShadowNotConfigured(self.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(pairs: &[(&str, &str)]) -> EnvVarsProvider {
        EnvVarsProvider::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn database_url_wins_over_aliases() {
        let p = provider(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("SQLITE_DB_PATH", "app.db"),
        ]);
        let env = p.resolve_environment(Some("dev")).unwrap();
        assert_eq!(env.database_url, "postgres://localhost/app");
        assert_eq!(env.name, "dev");
    }

    #[test]
    fn shadow_alias_is_recognized() {
        let p = provider(&[
            ("SQLITE_DB_PATH", "app.db"),
            ("SHADOW_SQLITE_DB_PATH", "shadow.db"),
        ]);
        let env = p.resolve_environment(None).unwrap();
        assert_eq!(env.shadow_database_url.as_deref(), Some("shadow.db"));
        assert_eq!(env.require_shadow().unwrap(), "shadow.db");
    }

    #[test]
    fn missing_target_is_environment_not_found() {
        let p = provider(&[("SHADOW_SCHEMA", "lockplane_shadow")]);
        let err = p.resolve_environment(Some("ci")).unwrap_err();
        assert!(matches!(err, ConnectorError::EnvironmentNotFound(name) if name == "ci"));
    }

    #[test]
    fn missing_shadow_is_reported_on_demand() {
        let p = provider(&[("DATABASE_URL", "postgres://localhost/app")]);
        let env = p.resolve_environment(None).unwrap();
        assert!(matches!(
            env.require_shadow(),
            Err(ConnectorError::ShadowNotConfigured(_))
        ));
    }
}
