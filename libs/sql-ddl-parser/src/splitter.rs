//! Semicolon statement splitter.
//!
//! Splits a source file into statements while respecting single- and
//! double-quoted literals and `--` line comments, tracking the 1-based
//! line/column where each statement starts so diagnostics can point into
//! the original file.

/// One raw statement plus its position in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct RawStatement {
    pub sql: String,
    pub line: u32,
    pub column: u32,
}

impl RawStatement {
    /// A statement that is empty or a lone comment carries no SQL to run.
    pub fn is_effectively_empty(&self) -> bool {
        self.sql
            .lines()
            .all(|l| l.trim().is_empty() || l.trim().starts_with("--"))
    }
}

pub fn split_statements(source: &str) -> Vec<RawStatement> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut start: Option<(u32, u32)> = None;

    let mut line = 1u32;
    let mut column = 1u32;

    let mut chars = source.chars().peekable();
    let mut in_single = false;
    let mut in_double = false;
    let mut in_comment = false;

    while let Some(c) = chars.next() {
        let at = (line, column);

        match c {
            '\n' => {
                line += 1;
                column = 1;
                in_comment = false;
            }
            _ => column += 1,
        }

        if in_comment {
            // Comments before a statement starts are not part of any
            // statement; inside one they are preserved verbatim.
            if start.is_some() {
                current.push(c);
            }
            continue;
        }

        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '-' if !in_single && !in_double && chars.peek() == Some(&'-') => {
                in_comment = true;
                if start.is_some() {
                    current.push(c);
                }
                continue;
            }
            ';' if !in_single && !in_double => {
                if let Some((l, col)) = start.take() {
                    statements.push(RawStatement {
                        sql: current.trim().to_string(),
                        line: l,
                        column: col,
                    });
                }
                current.clear();
                continue;
            }
            _ => {}
        }

        if start.is_none() {
            if c.is_whitespace() {
                continue;
            }
            start = Some(at);
        }
        current.push(c);
    }

    if let Some((l, col)) = start {
        let sql = current.trim().to_string();
        if !sql.is_empty() {
            statements.push(RawStatement {
                sql,
                line: l,
                column: col,
            });
        }
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_semicolons() {
        let parts = split_statements("CREATE TABLE a(id int);\nCREATE TABLE b(id int);");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].line, 1);
        assert_eq!(parts[1].line, 2);
        assert_eq!(parts[1].column, 1);
    }

    #[test]
    fn semicolon_inside_string_literal_does_not_split() {
        let parts = split_statements("CREATE TABLE t(x text DEFAULT 'a;b');");
        assert_eq!(parts.len(), 1);
        assert!(parts[0].sql.contains("a;b"));
    }

    #[test]
    fn semicolon_inside_quoted_identifier_does_not_split() {
        let parts = split_statements(r#"CREATE TABLE "odd;name"(id int);"#);
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn line_comments_swallow_semicolons() {
        let parts = split_statements("CREATE TABLE t( -- not the end;\n  id int\n);");
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn statement_position_skips_leading_whitespace() {
        let parts = split_statements("\n\n   CREATE TABLE t(id int);");
        assert_eq!(parts[0].line, 3);
        assert_eq!(parts[0].column, 4);
    }

    #[test]
    fn trailing_statement_without_semicolon_is_kept() {
        let parts = split_statements("CREATE TABLE t(id int)");
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn comment_only_statement_is_effectively_empty() {
        let parts = split_statements("-- just a note\n;");
        assert!(parts.is_empty() || parts[0].is_effectively_empty());
    }
}
