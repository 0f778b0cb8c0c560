//! Dialect tags and the dialect-independent type system.
//!
//! Every column carries both the raw type string it was declared or
//! introspected with and a [`TypeMetadata`] derived from it. Schema
//! comparison only ever looks at the metadata, so `INT4`, `INTEGER` and
//! SQLite's `INTEGER` all compare equal.

use serde::{Deserialize, Serialize};

/// The database family a schema or type was sourced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    Sqlite,
    /// libSQL speaks the SQLite dialect. It is carried separately so a
    /// schema remembers where it came from.
    Libsql,
    #[default]
    Unknown,
}

impl Dialect {
    /// The namespace tables land in when none is given.
    pub fn default_namespace(self) -> &'static str {
        match self {
            Dialect::Postgres => "public",
            Dialect::Sqlite | Dialect::Libsql | Dialect::Unknown => "",
        }
    }

    /// libSQL parses, normalizes and plans exactly as SQLite.
    pub fn is_sqlite_family(self) -> bool {
        matches!(self, Dialect::Sqlite | Dialect::Libsql)
    }

    pub fn supports_schemas(self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Best-effort dialect from a schema file extension.
    pub fn from_extension(ext: &str) -> Dialect {
        match ext {
            "db" | "sqlite" | "sqlite3" => Dialect::Sqlite,
            _ => Dialect::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
            Dialect::Libsql => "libsql",
            Dialect::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Canonical scalar type, independent of how the source spelled it.
///
/// Arrays are represented by [`TypeMetadata::is_array`] on top of the
/// element's logical type rather than by nesting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    SmallInt,
    Integer,
    BigInt,
    SmallSerial,
    Serial,
    BigSerial,
    Boolean,
    Real,
    Double,
    Numeric,
    Char,
    Varchar,
    Text,
    Uuid,
    Json,
    Jsonb,
    Bytea,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    Interval,
    /// Anything we do not normalize. Compares by the stored uppercased name.
    Unknown(String),
}

/// Normalized description of a column type.
///
/// Defaults to the unknown type; loaders re-derive metadata from the raw
/// type string when a JSON model omits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeMetadata {
    pub logical: LogicalType,
    /// The type as written in the source. Not part of comparison.
    pub raw: String,
    #[serde(default)]
    pub dialect: Dialect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_array: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_dims: Option<u32>,
}

impl Default for TypeMetadata {
    fn default() -> TypeMetadata {
        TypeMetadata {
            logical: LogicalType::Unknown(String::new()),
            raw: String::new(),
            dialect: Dialect::Unknown,
            length: None,
            precision: None,
            scale: None,
            is_array: false,
            array_dims: None,
        }
    }
}

impl TypeMetadata {
    /// Parse and normalize a raw type string.
    ///
    /// Handles parenthesized length/precision arguments, `[]` array
    /// suffixes and the alias table from the dialects we support
    /// (`INT4` == `INTEGER`, `BOOL` == `BOOLEAN`, bare `CHAR` == `CHAR(1)`,
    /// `DECIMAL(p,s)` == `NUMERIC(p,s)`, ...).
    pub fn parse(raw: &str, dialect: Dialect) -> TypeMetadata {
        let trimmed = raw.trim();
        let mut body = trimmed.to_string();

        // Strip array suffixes, counting dimensions.
        let mut array_dims = 0u32;
        loop {
            let stripped = body.trim_end();
            if let Some(rest) = stripped.strip_suffix("[]") {
                array_dims += 1;
                body = rest.trim_end().to_string();
            } else {
                break;
            }
        }

        // Split off `(args)` if present.
        let (base, args) = match body.find('(') {
            Some(open) => {
                let close = body.rfind(')').unwrap_or(body.len());
                let args: Vec<Option<u32>> = body[open + 1..close]
                    .split(',')
                    .map(|a| a.trim().parse::<u32>().ok())
                    .collect();
                (body[..open].trim().to_string(), args)
            }
            None => (body.clone(), Vec::new()),
        };

        let upper = base.to_uppercase();
        let upper = upper.split_whitespace().collect::<Vec<_>>().join(" ");

        let mut length = None;
        let mut precision = None;
        let mut scale = None;

        let logical = match upper.as_str() {
            "INT2" | "SMALLINT" => LogicalType::SmallInt,
            "INT4" | "INTEGER" | "INT" => LogicalType::Integer,
            "INT8" | "BIGINT" => LogicalType::BigInt,
            "SERIAL2" | "SMALLSERIAL" => LogicalType::SmallSerial,
            "SERIAL4" | "SERIAL" => LogicalType::Serial,
            "SERIAL8" | "BIGSERIAL" => LogicalType::BigSerial,
            "BOOL" | "BOOLEAN" => LogicalType::Boolean,
            "FLOAT4" | "REAL" => LogicalType::Real,
            "FLOAT8" | "DOUBLE PRECISION" | "DOUBLE" => LogicalType::Double,
            "DECIMAL" | "NUMERIC" => {
                precision = args.first().copied().flatten();
                scale = args.get(1).copied().flatten();
                LogicalType::Numeric
            }
            "CHARACTER VARYING" | "VARCHAR" => {
                length = args.first().copied().flatten();
                LogicalType::Varchar
            }
            "CHARACTER" | "CHAR" | "BPCHAR" => {
                // A bare CHAR means CHAR(1).
                length = Some(args.first().copied().flatten().unwrap_or(1));
                LogicalType::Char
            }
            "TEXT" | "CLOB" => LogicalType::Text,
            "UUID" => LogicalType::Uuid,
            "JSON" => LogicalType::Json,
            "JSONB" => LogicalType::Jsonb,
            "BYTEA" | "BLOB" => LogicalType::Bytea,
            "DATE" => LogicalType::Date,
            "TIME" | "TIME WITHOUT TIME ZONE" => LogicalType::Time,
            "TIMETZ" | "TIME WITH TIME ZONE" => LogicalType::TimeTz,
            "TIMESTAMP" | "TIMESTAMP WITHOUT TIME ZONE" | "DATETIME" => LogicalType::Timestamp,
            "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE" => LogicalType::TimestampTz,
            "INTERVAL" => LogicalType::Interval,
            _ => LogicalType::Unknown(upper.clone()),
        };

        TypeMetadata {
            logical,
            raw: trimmed.to_string(),
            dialect,
            length,
            precision,
            scale,
            is_array: array_dims > 0,
            array_dims: (array_dims > 0).then_some(array_dims),
        }
    }

    /// Equality for diffing: logical type plus length/precision/scale and
    /// array shape. The raw spelling and source dialect do not participate.
    pub fn semantic_eq(&self, other: &TypeMetadata) -> bool {
        self.logical == other.logical
            && self.length == other.length
            && self.precision == other.precision
            && self.scale == other.scale
            && self.is_array == other.is_array
            && self.array_dims == other.array_dims
    }

    /// The canonical spelling, used for SQL emission and hashing.
    pub fn canonical_name(&self) -> String {
        let base = match &self.logical {
            LogicalType::SmallInt => "smallint".to_string(),
            LogicalType::Integer => "integer".to_string(),
            LogicalType::BigInt => "bigint".to_string(),
            LogicalType::SmallSerial => "smallserial".to_string(),
            LogicalType::Serial => "serial".to_string(),
            LogicalType::BigSerial => "bigserial".to_string(),
            LogicalType::Boolean => "boolean".to_string(),
            LogicalType::Real => "real".to_string(),
            LogicalType::Double => "double precision".to_string(),
            LogicalType::Numeric => match (self.precision, self.scale) {
                (Some(p), Some(s)) => format!("numeric({p},{s})"),
                (Some(p), None) => format!("numeric({p})"),
                _ => "numeric".to_string(),
            },
            LogicalType::Char => match self.length {
                Some(l) => format!("char({l})"),
                None => "char(1)".to_string(),
            },
            LogicalType::Varchar => match self.length {
                Some(l) => format!("varchar({l})"),
                None => "varchar".to_string(),
            },
            LogicalType::Text => "text".to_string(),
            LogicalType::Uuid => "uuid".to_string(),
            LogicalType::Json => "json".to_string(),
            LogicalType::Jsonb => "jsonb".to_string(),
            LogicalType::Bytea => "bytea".to_string(),
            LogicalType::Date => "date".to_string(),
            LogicalType::Time => "time".to_string(),
            LogicalType::TimeTz => "time with time zone".to_string(),
            LogicalType::Timestamp => "timestamp".to_string(),
            LogicalType::TimestampTz => "timestamp with time zone".to_string(),
            LogicalType::Interval => "interval".to_string(),
            LogicalType::Unknown(raw) => raw.to_lowercase(),
        };

        match self.array_dims {
            Some(dims) => format!("{base}{}", "[]".repeat(dims as usize)),
            None => base,
        }
    }
}

/// Default expressions the parsers recognize and preserve verbatim.
pub const CANONICAL_DEFAULT_EXPRS: &[&str] = &[
    "CURRENT_TIMESTAMP",
    "NOW()",
    "CURRENT_DATE",
    "CURRENT_TIME",
    "LOCALTIME",
    "LOCALTIMESTAMP",
    "CURRENT_USER",
    "SESSION_USER",
];

pub fn is_canonical_default_expr(expr: &str) -> bool {
    let upper = expr.trim().to_uppercase();
    CANONICAL_DEFAULT_EXPRS.contains(&upper.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_aliases_normalize_to_integer() {
        for raw in ["INT4", "integer", "Int", "INTEGER"] {
            let meta = TypeMetadata::parse(raw, Dialect::Postgres);
            assert_eq!(meta.logical, LogicalType::Integer, "{raw}");
        }
    }

    #[test]
    fn sqlite_integer_matches_postgres_integer() {
        let sqlite = TypeMetadata::parse("INTEGER", Dialect::Sqlite);
        let postgres = TypeMetadata::parse("int4", Dialect::Postgres);
        assert!(sqlite.semantic_eq(&postgres));
    }

    #[test]
    fn bare_char_means_char_1() {
        let bare = TypeMetadata::parse("CHAR", Dialect::Postgres);
        let one = TypeMetadata::parse("CHAR(1)", Dialect::Postgres);
        assert!(bare.semantic_eq(&one));
        assert_eq!(bare.canonical_name(), "char(1)");
    }

    #[test]
    fn decimal_keeps_precision_and_scale() {
        let meta = TypeMetadata::parse("DECIMAL(10, 2)", Dialect::Postgres);
        assert_eq!(meta.logical, LogicalType::Numeric);
        assert_eq!(meta.precision, Some(10));
        assert_eq!(meta.scale, Some(2));
        assert!(meta.semantic_eq(&TypeMetadata::parse("numeric(10,2)", Dialect::Postgres)));
        assert!(!meta.semantic_eq(&TypeMetadata::parse("numeric(12,2)", Dialect::Postgres)));
    }

    #[test]
    fn timestamptz_aliases() {
        let short = TypeMetadata::parse("TIMESTAMPTZ", Dialect::Postgres);
        let long = TypeMetadata::parse("timestamp with time zone", Dialect::Postgres);
        assert!(short.semantic_eq(&long));
        assert_eq!(long.canonical_name(), "timestamp with time zone");
    }

    #[test]
    fn arrays_preserve_element_normalization_and_dims() {
        let meta = TypeMetadata::parse("INT4[][]", Dialect::Postgres);
        assert_eq!(meta.logical, LogicalType::Integer);
        assert!(meta.is_array);
        assert_eq!(meta.array_dims, Some(2));
        assert_eq!(meta.canonical_name(), "integer[][]");
        assert!(!meta.semantic_eq(&TypeMetadata::parse("INT4[]", Dialect::Postgres)));
    }

    #[test]
    fn unknown_types_compare_by_uppercased_name() {
        let a = TypeMetadata::parse("tsvector", Dialect::Postgres);
        let b = TypeMetadata::parse("TSVECTOR", Dialect::Postgres);
        assert!(a.semantic_eq(&b));
    }
}
