//! DDL parsing for declarative schema files.
//!
//! The entry points here never fail fast: a source is split into
//! statements, every statement is parsed, and all diagnostics come back
//! together so a directory of schema files produces one complete report.

mod diagnostics;
mod lexer;
mod parser;
mod splitter;

pub use diagnostics::{
    Diagnostic, Diagnostics, DiagnosticsReport, DiagnosticsSummary, Severity,
};
pub use splitter::{split_statements, RawStatement};

use schema_model::{Column, Dialect, ForeignKey, Index, Table, TypeMetadata};

/// One parsed DDL statement, already lifted into the schema model.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedStatement {
    /// `CREATE TABLE`, with inline and table-level constraints folded into
    /// the table's columns, indexes and foreign keys.
    CreateTable { table: Table },
    /// `CREATE [UNIQUE] INDEX ... ON table (...)`.
    CreateIndex {
        table_schema: Option<String>,
        table: String,
        index: Index,
    },
    /// `ALTER TABLE` with one or more actions.
    AlterTable {
        table_schema: Option<String>,
        table: String,
        actions: Vec<AlterAction>,
    },
    /// `COMMENT ON TABLE|COLUMN ... IS ...`.
    CommentOn(CommentTarget),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlterAction {
    AddColumn {
        column: Column,
        /// Foreign keys from an inline REFERENCES clause.
        foreign_keys: Vec<ForeignKey>,
    },
    DropColumn {
        column: String,
    },
    SetNotNull {
        column: String,
    },
    DropNotNull {
        column: String,
    },
    SetDefault {
        column: String,
        default: String,
    },
    DropDefault {
        column: String,
    },
    SetType {
        column: String,
        data_type: String,
        type_metadata: TypeMetadata,
    },
    AddForeignKey(ForeignKey),
    AddUniqueIndex(Index),
    AddPrimaryKey {
        constraint: Option<String>,
        columns: Vec<String>,
    },
    /// Check constraints are accepted but not part of the model.
    AddCheck {
        constraint: String,
    },
    EnableRowLevelSecurity,
    DisableRowLevelSecurity,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommentTarget {
    Table {
        schema: Option<String>,
        table: String,
        comment: Option<String>,
    },
    Column {
        schema: Option<String>,
        table: String,
        column: String,
        comment: Option<String>,
    },
}

/// Parse a whole source file. Statements that parse land in the result;
/// every statement that does not contributes a diagnostic. Statements that
/// are empty or comment-only are skipped.
pub fn parse_source(
    source: &str,
    file: Option<&str>,
    dialect: Dialect,
) -> (Vec<ParsedStatement>, Diagnostics) {
    let mut statements = Vec::new();
    let mut diagnostics = Diagnostics::new();

    for raw in split_statements(source) {
        if raw.is_effectively_empty() {
            continue;
        }
        match parser::parse_statement(&raw.sql, raw.line, raw.column, dialect) {
            Ok(statement) => statements.push(statement),
            Err(err) => diagnostics.push(
                Diagnostic::error("syntax", err.message).at(file, err.line, err.column),
            ),
        }
    }

    (statements, diagnostics)
}

/// Syntax pass only: parse and report, discarding the statements.
pub fn check_syntax(source: &str, file: Option<&str>, dialect: Dialect) -> Diagnostics {
    parse_source(source, file, dialect).1
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use schema_model::{ForeignKeyAction, LogicalType, SortOrder};

    fn parse_one(sql: &str) -> ParsedStatement {
        let (mut statements, diagnostics) = parse_source(sql, None, Dialect::Postgres);
        assert!(diagnostics.is_empty(), "unexpected diagnostics: {diagnostics:?}");
        assert_eq!(statements.len(), 1);
        statements.pop().unwrap()
    }

    #[test]
    fn create_table_with_inline_constraints() {
        let statement = parse_one(indoc! {r#"
            CREATE TABLE users (
                id integer PRIMARY KEY,
                email text NOT NULL UNIQUE,
                age INT4 DEFAULT 0,
                created_at timestamptz DEFAULT now()
            );
        "#});

        let ParsedStatement::CreateTable { table } = statement else {
            panic!("expected a CREATE TABLE");
        };
        assert_eq!(table.schema, "public");
        assert_eq!(table.name, "users");
        assert_eq!(table.columns.len(), 4);

        let id = table.column("id").unwrap();
        assert!(id.is_primary_key);
        assert!(!id.nullable);

        let email = table.column("email").unwrap();
        assert!(!email.nullable);
        assert!(email.is_unique);

        let age = table.column("age").unwrap();
        assert_eq!(age.type_metadata.logical, LogicalType::Integer);
        assert_eq!(age.default.as_deref(), Some("0"));

        let created = table.column("created_at").unwrap();
        assert_eq!(created.default.as_deref(), Some("now()"));
    }

    #[test]
    fn table_level_compound_primary_key_becomes_a_primary_index() {
        let statement = parse_one(
            "CREATE TABLE memberships (user_id int, org_id int, PRIMARY KEY (user_id, org_id));",
        );
        let ParsedStatement::CreateTable { table } = statement else {
            panic!("expected a CREATE TABLE");
        };
        assert!(table.columns.iter().all(|c| !c.nullable));
        assert!(table.columns.iter().all(|c| !c.is_primary_key));
        let pk = &table.indexes[0];
        assert!(pk.is_primary);
        assert_eq!(
            pk.columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            ["user_id", "org_id"]
        );
    }

    #[test]
    fn foreign_key_with_actions() {
        let statement = parse_one(indoc! {r#"
            CREATE TABLE posts (
                id integer PRIMARY KEY,
                author_id integer REFERENCES users (id) ON DELETE CASCADE ON UPDATE RESTRICT
            );
        "#});
        let ParsedStatement::CreateTable { table } = statement else {
            panic!("expected a CREATE TABLE");
        };
        let fk = &table.foreign_keys[0];
        assert_eq!(fk.name, "posts_author_id_fkey");
        assert_eq!(fk.referenced_table, "users");
        assert_eq!(fk.referenced_columns, vec!["id".to_string()]);
        assert_eq!(fk.on_delete, ForeignKeyAction::Cascade);
        assert_eq!(fk.on_update, ForeignKeyAction::Restrict);
    }

    #[test]
    fn generated_column_is_captured() {
        let statement = parse_one(
            "CREATE TABLE t (price numeric, tax numeric GENERATED ALWAYS AS (price * 0.2) STORED);",
        );
        let ParsedStatement::CreateTable { table } = statement else {
            panic!("expected a CREATE TABLE");
        };
        let tax = table.column("tax").unwrap();
        assert!(tax.is_generated);
        assert_eq!(tax.generation_expr.as_deref(), Some("price * 0.2"));
    }

    #[test]
    fn create_unique_index_with_order_and_predicate() {
        let statement = parse_one(
            "CREATE UNIQUE INDEX CONCURRENTLY users_email_idx ON users USING btree (email DESC NULLS LAST) WHERE deleted_at IS NULL;",
        );
        let ParsedStatement::CreateIndex { table, index, .. } = statement else {
            panic!("expected a CREATE INDEX");
        };
        assert_eq!(table, "users");
        assert!(index.is_unique);
        assert_eq!(index.method.as_deref(), Some("btree"));
        assert_eq!(index.columns[0].direction, SortOrder::Desc);
        assert_eq!(index.predicate.as_deref(), Some("deleted_at IS NULL"));
    }

    #[test]
    fn alter_table_actions() {
        let statement = parse_one(
            "ALTER TABLE users ADD COLUMN nickname varchar(40), ALTER COLUMN email SET NOT NULL, DROP COLUMN legacy;",
        );
        let ParsedStatement::AlterTable { actions, .. } = statement else {
            panic!("expected an ALTER TABLE");
        };
        assert_eq!(actions.len(), 3);
        assert!(matches!(&actions[0], AlterAction::AddColumn { column, .. } if column.name == "nickname"));
        assert!(matches!(&actions[1], AlterAction::SetNotNull { column } if column == "email"));
        assert!(matches!(&actions[2], AlterAction::DropColumn { column } if column == "legacy"));
    }

    #[test]
    fn alter_table_rls_toggle() {
        let statement = parse_one("ALTER TABLE accounts ENABLE ROW LEVEL SECURITY;");
        let ParsedStatement::AlterTable { actions, .. } = statement else {
            panic!("expected an ALTER TABLE");
        };
        assert_eq!(actions, vec![AlterAction::EnableRowLevelSecurity]);
    }

    #[test]
    fn comment_on_column() {
        let statement = parse_one("COMMENT ON COLUMN users.email IS 'primary contact';");
        assert_eq!(
            statement,
            ParsedStatement::CommentOn(CommentTarget::Column {
                schema: None,
                table: "users".into(),
                column: "email".into(),
                comment: Some("primary contact".into()),
            })
        );
    }

    #[test]
    fn trailing_comma_diagnostic_points_at_the_comma() {
        let diagnostics = check_syntax("CREATE TABLE t(id int,);", Some("schema.sql"), Dialect::Postgres);
        let diagnostic = diagnostics.iter().next().unwrap();
        assert_eq!(diagnostic.severity, Severity::Error);
        assert_eq!(diagnostic.message, "trailing comma not allowed here");
        assert_eq!(diagnostic.file.as_deref(), Some("schema.sql"));
        assert_eq!(diagnostic.line, Some(1));
        assert_eq!(diagnostic.column, Some(22));
    }

    #[test]
    fn errors_in_multiple_statements_are_all_reported() {
        let source = indoc! {r#"
            CREATE TABLE ok (id int);
            CREATE TABLE broken (id int,);
            NONSENSE HERE;
        "#};
        let (statements, diagnostics) = parse_source(source, Some("x.sql"), Dialect::Postgres);
        assert_eq!(statements.len(), 1);
        assert_eq!(diagnostics.error_count(), 2);
    }

    #[test]
    fn quoted_identifiers_keep_their_case() {
        let statement = parse_one(r#"CREATE TABLE "Users" ("Id" int PRIMARY KEY);"#);
        let ParsedStatement::CreateTable { table } = statement else {
            panic!("expected a CREATE TABLE");
        };
        assert_eq!(table.name, "Users");
        assert_eq!(table.columns[0].name, "Id");
    }

    #[test]
    fn sqlite_dialect_uses_empty_namespace() {
        let (statements, _) = parse_source("CREATE TABLE t(id integer);", None, Dialect::Sqlite);
        let ParsedStatement::CreateTable { table } = &statements[0] else {
            panic!("expected a CREATE TABLE");
        };
        assert_eq!(table.schema, "");
    }
}
