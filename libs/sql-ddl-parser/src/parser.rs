//! Recursive-descent parser for the supported DDL subset.
//!
//! Produces `schema-model` values directly. Unquoted identifiers are folded
//! to lowercase, quoted identifiers are taken verbatim. Expressions the
//! model keeps as opaque strings (defaults, check predicates, generation
//! expressions, index predicates) are sliced out of the source verbatim.

use crate::lexer::{tokenize, LexError, Token, TokenKind};
use crate::{AlterAction, CommentTarget, ParsedStatement};
use schema_model::{
    Column, Dialect, ForeignKey, ForeignKeyAction, Index, IndexColumn, NullsOrder, SortOrder,
    Table, TypeMetadata,
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParseError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> ParseError {
        ParseError {
            message: err.message,
            line: err.line,
            column: err.column,
        }
    }
}

pub(crate) fn parse_statement(
    sql: &str,
    line: u32,
    column: u32,
    dialect: Dialect,
) -> Result<ParsedStatement, ParseError> {
    let tokens = tokenize(sql, line, column)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        source: sql,
        dialect,
        stmt_line: line,
        stmt_column: column,
    };
    let result = parser.parse();
    match result {
        Err(err) => Err(parser.refine_trailing_comma(err)),
        ok => ok,
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
    dialect: Dialect,
    stmt_line: u32,
    stmt_column: u32,
}

impl<'a> Parser<'a> {
    fn parse(&mut self) -> Result<ParsedStatement, ParseError> {
        if self.eat_keyword("CREATE") {
            if self.eat_keyword("TABLE") {
                return self.parse_create_table();
            }
            let unique = self.eat_keyword("UNIQUE");
            if self.eat_keyword("INDEX") {
                return self.parse_create_index(unique);
            }
            return Err(self.error_here("expected TABLE or INDEX after CREATE"));
        }
        if self.eat_keyword("ALTER") {
            self.expect_keyword("TABLE")?;
            return self.parse_alter_table();
        }
        if self.eat_keyword("COMMENT") {
            self.expect_keyword("ON")?;
            return self.parse_comment();
        }
        Err(self.error_here("unsupported statement"))
    }

    // ------------------------------------------------------------------
    // CREATE TABLE
    // ------------------------------------------------------------------

    fn parse_create_table(&mut self) -> Result<ParsedStatement, ParseError> {
        self.eat_if_not_exists();
        let (schema, name) = self.parse_qualified_name()?;
        let namespace =
            schema.unwrap_or_else(|| self.dialect.default_namespace().to_string());
        let mut table = Table::new(namespace, name);

        self.expect_symbol('(')?;
        loop {
            if self.at_table_constraint() {
                self.parse_table_constraint(&mut table)?;
            } else {
                self.parse_column_def(&mut table)?;
            }

            if self.eat_symbol(',') {
                if self.peek_symbol(')') {
                    // Reported at the comma, which is where the fix goes.
                    let comma = &self.tokens[self.pos - 1];
                    return Err(ParseError {
                        message: "trailing comma not allowed here".into(),
                        line: comma.line,
                        column: comma.column,
                    });
                }
                continue;
            }
            break;
        }
        self.expect_symbol(')')?;
        self.expect_end()?;

        Ok(ParsedStatement::CreateTable { table })
    }

    fn at_table_constraint(&self) -> bool {
        for kw in ["PRIMARY", "UNIQUE", "FOREIGN", "CHECK", "CONSTRAINT"] {
            if self.at_keyword(kw) {
                // UNIQUE as a column constraint never starts an item, so a
                // leading constraint keyword is unambiguous here.
                return true;
            }
        }
        false
    }

    fn parse_column_def(&mut self, table: &mut Table) -> Result<(), ParseError> {
        let name = self.parse_identifier("column name")?;
        let (raw_type, metadata) = self.parse_type()?;

        let mut column = Column {
            name,
            data_type: raw_type,
            type_metadata: metadata,
            nullable: true,
            default: None,
            is_primary_key: false,
            is_unique: false,
            is_generated: false,
            generation_expr: None,
            comment: None,
        };

        loop {
            let constraint_name = if self.eat_keyword("CONSTRAINT") {
                Some(self.parse_identifier("constraint name")?)
            } else {
                None
            };

            if self.eat_keyword("PRIMARY") {
                self.expect_keyword("KEY")?;
                column.is_primary_key = true;
                column.nullable = false;
            } else if self.eat_keyword("NOT") {
                self.expect_keyword("NULL")?;
                column.nullable = false;
            } else if self.eat_keyword("NULL") {
                column.nullable = true;
            } else if self.eat_keyword("UNIQUE") {
                column.is_unique = true;
            } else if self.eat_keyword("DEFAULT") {
                column.default = Some(self.parse_expression()?);
            } else if self.eat_keyword("CHECK") {
                // Check constraints are accepted but not modeled.
                self.parse_parenthesized_raw()?;
            } else if self.eat_keyword("REFERENCES") {
                let fk = self.parse_references(table, &[column.name.clone()], constraint_name)?;
                table.foreign_keys.push(fk);
            } else if self.eat_keyword("GENERATED") {
                self.expect_keyword("ALWAYS")?;
                self.expect_keyword("AS")?;
                column.is_generated = true;
                column.generation_expr = Some(self.parse_parenthesized_raw()?);
                self.expect_keyword("STORED")?;
            } else if constraint_name.is_some() {
                return Err(self.error_here("expected a constraint after CONSTRAINT name"));
            } else {
                break;
            }
        }

        table.columns.push(column);
        Ok(())
    }

    fn parse_table_constraint(&mut self, table: &mut Table) -> Result<(), ParseError> {
        let constraint_name = if self.eat_keyword("CONSTRAINT") {
            Some(self.parse_identifier("constraint name")?)
        } else {
            None
        };

        if self.eat_keyword("PRIMARY") {
            self.expect_keyword("KEY")?;
            let columns = self.parse_identifier_list()?;
            for col_name in &columns {
                if let Some(column) = table.columns.iter_mut().find(|c| &c.name == col_name) {
                    column.nullable = false;
                    if columns.len() == 1 {
                        column.is_primary_key = true;
                    }
                }
            }
            if columns.len() > 1 {
                table.indexes.push(Index {
                    name: constraint_name.unwrap_or_else(|| format!("{}_pkey", table.name)),
                    columns: columns.into_iter().map(IndexColumn::new).collect(),
                    is_unique: true,
                    is_primary: true,
                    method: None,
                    predicate: None,
                });
            }
            return Ok(());
        }

        if self.eat_keyword("UNIQUE") {
            let columns = self.parse_identifier_list()?;
            if columns.len() == 1 {
                if let Some(column) = table.columns.iter_mut().find(|c| c.name == columns[0]) {
                    column.is_unique = true;
                    return Ok(());
                }
            }
            let name = constraint_name
                .unwrap_or_else(|| format!("{}_{}_key", table.name, columns.join("_")));
            table.indexes.push(Index {
                name,
                columns: columns.into_iter().map(IndexColumn::new).collect(),
                is_unique: true,
                is_primary: false,
                method: None,
                predicate: None,
            });
            return Ok(());
        }

        if self.eat_keyword("FOREIGN") {
            self.expect_keyword("KEY")?;
            let columns = self.parse_identifier_list()?;
            self.expect_keyword("REFERENCES")?;
            let fk = self.parse_references(table, &columns, constraint_name)?;
            table.foreign_keys.push(fk);
            return Ok(());
        }

        if self.eat_keyword("CHECK") {
            self.parse_parenthesized_raw()?;
            return Ok(());
        }

        Err(self.error_here("expected a table constraint"))
    }

    /// The tail of a REFERENCES clause; the keyword itself is consumed.
    fn parse_references(
        &mut self,
        table: &Table,
        columns: &[String],
        constraint_name: Option<String>,
    ) -> Result<ForeignKey, ParseError> {
        let (ref_schema, ref_table) = self.parse_qualified_name()?;
        let referenced_columns = if self.peek_symbol('(') {
            self.parse_identifier_list()?
        } else {
            // Resolved to the referenced table's primary key by the loader.
            Vec::new()
        };

        let mut on_update = ForeignKeyAction::NoAction;
        let mut on_delete = ForeignKeyAction::NoAction;
        while self.eat_keyword("ON") {
            if self.eat_keyword("DELETE") {
                on_delete = self.parse_fk_action()?;
            } else if self.eat_keyword("UPDATE") {
                on_update = self.parse_fk_action()?;
            } else {
                return Err(self.error_here("expected DELETE or UPDATE after ON"));
            }
        }

        Ok(ForeignKey {
            name: constraint_name
                .unwrap_or_else(|| format!("{}_{}_fkey", table.name, columns.join("_"))),
            columns: columns.to_vec(),
            referenced_schema: ref_schema
                .unwrap_or_else(|| self.dialect.default_namespace().to_string()),
            referenced_table: ref_table,
            referenced_columns,
            on_update,
            on_delete,
        })
    }

    fn parse_fk_action(&mut self) -> Result<ForeignKeyAction, ParseError> {
        if self.eat_keyword("NO") {
            self.expect_keyword("ACTION")?;
            return Ok(ForeignKeyAction::NoAction);
        }
        if self.eat_keyword("RESTRICT") {
            return Ok(ForeignKeyAction::Restrict);
        }
        if self.eat_keyword("CASCADE") {
            return Ok(ForeignKeyAction::Cascade);
        }
        if self.eat_keyword("SET") {
            if self.eat_keyword("NULL") {
                return Ok(ForeignKeyAction::SetNull);
            }
            if self.eat_keyword("DEFAULT") {
                return Ok(ForeignKeyAction::SetDefault);
            }
        }
        Err(self.error_here("expected a referential action"))
    }

    // ------------------------------------------------------------------
    // CREATE INDEX
    // ------------------------------------------------------------------

    fn parse_create_index(&mut self, unique: bool) -> Result<ParsedStatement, ParseError> {
        // CONCURRENTLY changes locking, not the resulting schema.
        self.eat_keyword("CONCURRENTLY");
        self.eat_if_not_exists();

        let name = self.parse_identifier("index name")?;
        self.expect_keyword("ON")?;
        let (table_schema, table) = self.parse_qualified_name()?;

        let method = if self.eat_keyword("USING") {
            Some(self.parse_identifier("index method")?)
        } else {
            None
        };

        self.expect_symbol('(')?;
        let mut columns = Vec::new();
        loop {
            let column = self.parse_identifier("index column")?;
            let direction = if self.eat_keyword("DESC") {
                SortOrder::Desc
            } else {
                self.eat_keyword("ASC");
                SortOrder::Asc
            };
            let nulls = if self.eat_keyword("NULLS") {
                if self.eat_keyword("FIRST") {
                    Some(NullsOrder::First)
                } else {
                    self.expect_keyword("LAST")?;
                    Some(NullsOrder::Last)
                }
            } else {
                None
            };
            columns.push(IndexColumn {
                name: column,
                direction,
                nulls,
            });

            if self.eat_symbol(',') {
                if self.peek_symbol(')') {
                    let comma = &self.tokens[self.pos - 1];
                    return Err(ParseError {
                        message: "trailing comma not allowed here".into(),
                        line: comma.line,
                        column: comma.column,
                    });
                }
                continue;
            }
            break;
        }
        self.expect_symbol(')')?;

        let predicate = if self.eat_keyword("WHERE") {
            Some(self.capture_rest()?)
        } else {
            None
        };
        self.expect_end()?;

        Ok(ParsedStatement::CreateIndex {
            table_schema,
            table,
            index: Index {
                name,
                columns,
                is_unique: unique,
                is_primary: false,
                method,
                predicate,
            },
        })
    }

    // ------------------------------------------------------------------
    // ALTER TABLE
    // ------------------------------------------------------------------

    fn parse_alter_table(&mut self) -> Result<ParsedStatement, ParseError> {
        if self.eat_keyword("IF") {
            self.expect_keyword("EXISTS")?;
        }
        let (table_schema, table) = self.parse_qualified_name()?;
        let mut actions = Vec::new();

        loop {
            actions.push(self.parse_alter_action(&table)?);
            if !self.eat_symbol(',') {
                break;
            }
        }
        self.expect_end()?;

        Ok(ParsedStatement::AlterTable {
            table_schema,
            table,
            actions,
        })
    }

    fn parse_alter_action(&mut self, table_name: &str) -> Result<AlterAction, ParseError> {
        if self.eat_keyword("ADD") {
            if self.eat_keyword("CONSTRAINT") {
                let name = self.parse_identifier("constraint name")?;
                return self.parse_add_constraint(table_name, name);
            }
            self.eat_keyword("COLUMN");
            // Reuse the column-def machinery via a scratch table.
            let mut scratch = Table::new(String::new(), table_name.to_string());
            self.parse_column_def(&mut scratch)?;
            let column = scratch.columns.pop().ok_or_else(|| {
                self.error_here("expected a column definition after ADD COLUMN")
            })?;
            return Ok(AlterAction::AddColumn {
                column,
                foreign_keys: scratch.foreign_keys,
            });
        }

        if self.eat_keyword("DROP") {
            self.eat_keyword("COLUMN");
            if self.eat_keyword("IF") {
                self.expect_keyword("EXISTS")?;
            }
            let column = self.parse_identifier("column name")?;
            return Ok(AlterAction::DropColumn { column });
        }

        if self.eat_keyword("ALTER") {
            self.eat_keyword("COLUMN");
            let column = self.parse_identifier("column name")?;
            if self.eat_keyword("SET") {
                if self.eat_keyword("NOT") {
                    self.expect_keyword("NULL")?;
                    return Ok(AlterAction::SetNotNull { column });
                }
                if self.eat_keyword("DEFAULT") {
                    let default = self.parse_expression()?;
                    return Ok(AlterAction::SetDefault { column, default });
                }
                if self.eat_keyword("DATA") {
                    self.expect_keyword("TYPE")?;
                    let (raw, metadata) = self.parse_type()?;
                    return Ok(AlterAction::SetType {
                        column,
                        data_type: raw,
                        type_metadata: metadata,
                    });
                }
                return Err(self.error_here("expected NOT NULL, DEFAULT or DATA TYPE"));
            }
            if self.eat_keyword("DROP") {
                if self.eat_keyword("NOT") {
                    self.expect_keyword("NULL")?;
                    return Ok(AlterAction::DropNotNull { column });
                }
                if self.eat_keyword("DEFAULT") {
                    return Ok(AlterAction::DropDefault { column });
                }
                return Err(self.error_here("expected NOT NULL or DEFAULT"));
            }
            if self.eat_keyword("TYPE") {
                let (raw, metadata) = self.parse_type()?;
                return Ok(AlterAction::SetType {
                    column,
                    data_type: raw,
                    type_metadata: metadata,
                });
            }
            return Err(self.error_here("expected SET, DROP or TYPE"));
        }

        if self.eat_keyword("ENABLE") {
            self.expect_row_level_security()?;
            return Ok(AlterAction::EnableRowLevelSecurity);
        }
        if self.eat_keyword("DISABLE") {
            self.expect_row_level_security()?;
            return Ok(AlterAction::DisableRowLevelSecurity);
        }

        Err(self.error_here("unsupported ALTER TABLE action"))
    }

    fn parse_add_constraint(
        &mut self,
        table_name: &str,
        name: String,
    ) -> Result<AlterAction, ParseError> {
        if self.eat_keyword("PRIMARY") {
            self.expect_keyword("KEY")?;
            let columns = self.parse_identifier_list()?;
            return Ok(AlterAction::AddPrimaryKey {
                constraint: Some(name),
                columns,
            });
        }
        if self.eat_keyword("UNIQUE") {
            let columns = self.parse_identifier_list()?;
            return Ok(AlterAction::AddUniqueIndex(Index {
                name,
                columns: columns.into_iter().map(IndexColumn::new).collect(),
                is_unique: true,
                is_primary: false,
                method: None,
                predicate: None,
            }));
        }
        if self.eat_keyword("FOREIGN") {
            self.expect_keyword("KEY")?;
            let columns = self.parse_identifier_list()?;
            self.expect_keyword("REFERENCES")?;
            let scratch = Table::new(String::new(), table_name.to_string());
            let fk = self.parse_references(&scratch, &columns, Some(name))?;
            return Ok(AlterAction::AddForeignKey(fk));
        }
        if self.eat_keyword("CHECK") {
            self.parse_parenthesized_raw()?;
            return Ok(AlterAction::AddCheck { constraint: name });
        }
        Err(self.error_here("unsupported constraint in ADD CONSTRAINT"))
    }

    fn expect_row_level_security(&mut self) -> Result<(), ParseError> {
        self.expect_keyword("ROW")?;
        self.expect_keyword("LEVEL")?;
        self.expect_keyword("SECURITY")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // COMMENT ON
    // ------------------------------------------------------------------

    fn parse_comment(&mut self) -> Result<ParsedStatement, ParseError> {
        let on_column = if self.eat_keyword("TABLE") {
            false
        } else if self.eat_keyword("COLUMN") {
            true
        } else {
            return Err(self.error_here("expected TABLE or COLUMN after COMMENT ON"));
        };

        let mut parts = vec![self.parse_identifier("name")?];
        while self.eat_symbol('.') {
            parts.push(self.parse_identifier("name")?);
        }

        self.expect_keyword("IS")?;
        let comment = if self.eat_keyword("NULL") {
            None
        } else {
            match self.bump() {
                Some(Token {
                    kind: TokenKind::StringLit(text),
                    ..
                }) => Some(text),
                _ => return Err(self.error_here("expected a string literal or NULL")),
            }
        };
        self.expect_end()?;

        let target = if on_column {
            let (schema, table, column) = match parts.len() {
                2 => (None, parts[0].clone(), parts[1].clone()),
                3 => (Some(parts[0].clone()), parts[1].clone(), parts[2].clone()),
                _ => return Err(self.error_here("expected table.column")),
            };
            CommentTarget::Column {
                schema,
                table,
                column,
                comment,
            }
        } else {
            let (schema, table) = match parts.len() {
                1 => (None, parts[0].clone()),
                2 => (Some(parts[0].clone()), parts[1].clone()),
                _ => return Err(self.error_here("expected a table name")),
            };
            CommentTarget::Table {
                schema,
                table,
                comment,
            }
        };

        Ok(ParsedStatement::CommentOn(target))
    }

    // ------------------------------------------------------------------
    // Types and expressions
    // ------------------------------------------------------------------

    fn parse_type(&mut self) -> Result<(String, TypeMetadata), ParseError> {
        let start = match self.peek() {
            Some(token) => token.start,
            None => return Err(self.error_here("expected a type name")),
        };
        let first = self.parse_identifier("type name")?;
        let mut end = self.tokens[self.pos - 1].end;

        // Multi-word type names.
        let upper = first.to_uppercase();
        match upper.as_str() {
            "DOUBLE" => {
                if self.eat_keyword("PRECISION") {
                    end = self.tokens[self.pos - 1].end;
                }
            }
            "CHARACTER" => {
                if self.eat_keyword("VARYING") {
                    end = self.tokens[self.pos - 1].end;
                }
            }
            "TIME" | "TIMESTAMP" => {
                if self.eat_keyword("WITH") || self.eat_keyword("WITHOUT") {
                    self.expect_keyword("TIME")?;
                    self.expect_keyword("ZONE")?;
                    end = self.tokens[self.pos - 1].end;
                }
            }
            _ => {}
        }

        if self.eat_symbol('(') {
            loop {
                match self.bump() {
                    Some(token) => {
                        if token.is_symbol(')') {
                            end = token.end;
                            break;
                        }
                    }
                    None => return Err(self.error_here("unterminated type arguments")),
                }
            }
        }

        while self.peek_symbol('[') {
            self.bump();
            let close = self.expect_symbol(']')?;
            end = close.end;
        }

        let raw = self.source[start..end].to_string();
        let metadata = TypeMetadata::parse(&raw, self.dialect);
        Ok((raw, metadata))
    }

    /// Capture a default-style expression verbatim: from the current token
    /// until a comma or closing paren at depth zero, or a constraint
    /// keyword once at least one token was consumed.
    fn parse_expression(&mut self) -> Result<String, ParseError> {
        const TERMINATORS: &[&str] = &[
            "NOT", "PRIMARY", "UNIQUE", "CHECK", "REFERENCES", "GENERATED", "CONSTRAINT",
        ];

        let start = match self.peek() {
            Some(token) => token.start,
            None => return Err(self.error_here("expected an expression")),
        };
        let mut end = start;
        let mut depth = 0u32;
        let mut consumed = 0usize;

        while let Some(token) = self.peek() {
            if depth == 0 {
                if token.is_symbol(',') || token.is_symbol(')') {
                    break;
                }
                if consumed > 0 && TERMINATORS.iter().any(|kw| token.is_keyword(kw)) {
                    break;
                }
            }
            if token.is_symbol('(') {
                depth += 1;
            } else if token.is_symbol(')') {
                depth = depth.saturating_sub(1);
            }
            end = token.end;
            self.pos += 1;
            consumed += 1;
        }

        if consumed == 0 {
            return Err(self.error_here("expected an expression"));
        }
        Ok(self.source[start..end].trim().to_string())
    }

    /// `( ... )` with balanced nesting, returning the inner text verbatim.
    fn parse_parenthesized_raw(&mut self) -> Result<String, ParseError> {
        let open = self.expect_symbol('(')?;
        let mut depth = 1u32;
        let mut end = open.end;
        while depth > 0 {
            match self.bump() {
                Some(token) => {
                    if token.is_symbol('(') {
                        depth += 1;
                    } else if token.is_symbol(')') {
                        depth -= 1;
                        if depth == 0 {
                            end = token.start;
                            break;
                        }
                    }
                    end = token.end;
                }
                None => return Err(self.error_here("unterminated parenthesized expression")),
            }
        }
        Ok(self.source[open.end..end].trim().to_string())
    }

    /// Everything to the end of the statement, verbatim.
    fn capture_rest(&mut self) -> Result<String, ParseError> {
        let start = match self.peek() {
            Some(token) => token.start,
            None => return Err(self.error_here("expected an expression")),
        };
        let end = self.tokens.last().map(|t| t.end).unwrap_or(start);
        self.pos = self.tokens.len();
        Ok(self.source[start..end].trim().to_string())
    }

    fn parse_identifier_list(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect_symbol('(')?;
        let mut names = Vec::new();
        loop {
            names.push(self.parse_identifier("column name")?);
            if self.eat_symbol(',') {
                if self.peek_symbol(')') {
                    let comma = &self.tokens[self.pos - 1];
                    return Err(ParseError {
                        message: "trailing comma not allowed here".into(),
                        line: comma.line,
                        column: comma.column,
                    });
                }
                continue;
            }
            break;
        }
        self.expect_symbol(')')?;
        Ok(names)
    }

    fn parse_qualified_name(&mut self) -> Result<(Option<String>, String), ParseError> {
        let first = self.parse_identifier("name")?;
        if self.eat_symbol('.') {
            let second = self.parse_identifier("name")?;
            Ok((Some(first), second))
        } else {
            Ok((None, first))
        }
    }

    fn parse_identifier(&mut self, what: &str) -> Result<String, ParseError> {
        match self.bump() {
            Some(Token {
                kind: TokenKind::Ident(word),
                ..
            }) => Ok(word.to_lowercase()),
            Some(Token {
                kind: TokenKind::QuotedIdent(word),
                ..
            }) => Ok(word),
            Some(token) => Err(ParseError {
                message: format!("expected {what}, found {}", token.describe()),
                line: token.line,
                column: token.column,
            }),
            None => Err(self.error_here(&format!("expected {what}"))),
        }
    }

    fn eat_if_not_exists(&mut self) {
        if self.at_keyword("IF") {
            let checkpoint = self.pos;
            self.pos += 1;
            if self.eat_keyword("NOT") && self.eat_keyword("EXISTS") {
                return;
            }
            self.pos = checkpoint;
        }
    }

    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_keyword(&self, kw: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(kw))
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.at_keyword(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), ParseError> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.error_here(&format!("expected {kw}")))
        }
    }

    fn peek_symbol(&self, s: char) -> bool {
        self.peek().is_some_and(|t| t.is_symbol(s))
    }

    fn eat_symbol(&mut self, s: char) -> bool {
        if self.peek_symbol(s) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, s: char) -> Result<Token, ParseError> {
        match self.bump() {
            Some(token) if token.is_symbol(s) => Ok(token),
            Some(token) => Err(ParseError {
                message: format!("expected `{s}`, found {}", token.describe()),
                line: token.line,
                column: token.column,
            }),
            None => Err(self.error_here(&format!("expected `{s}`"))),
        }
    }

    fn expect_end(&mut self) -> Result<(), ParseError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(ParseError {
                message: format!("unexpected {} after statement", token.describe()),
                line: token.line,
                column: token.column,
            }),
        }
    }

    fn error_here(&self, message: &str) -> ParseError {
        match self.peek() {
            Some(token) => ParseError {
                message: format!("{message}, found {}", token.describe()),
                line: token.line,
                column: token.column,
            },
            None => {
                let (line, column) = self
                    .tokens
                    .last()
                    .map(|t| (t.line, t.column + (t.end - t.start) as u32))
                    .unwrap_or((self.stmt_line, self.stmt_column));
                ParseError {
                    message: message.to_string(),
                    line,
                    column,
                }
            }
        }
    }

    /// When a syntax error points at a closing token and the token before
    /// it is a comma, the real problem is the comma.
    fn refine_trailing_comma(&self, err: ParseError) -> ParseError {
        let failing = self
            .tokens
            .iter()
            .position(|t| t.line == err.line && t.column == err.column);
        if let Some(idx) = failing {
            let closes = matches!(
                self.tokens[idx].kind,
                TokenKind::Symbol(')') | TokenKind::Symbol(']') | TokenKind::Symbol('}')
            );
            if closes && idx > 0 {
                if let TokenKind::Symbol(',') = self.tokens[idx - 1].kind {
                    return ParseError {
                        message: "trailing comma not allowed here".into(),
                        line: self.tokens[idx - 1].line,
                        column: self.tokens[idx - 1].column,
                    };
                }
            }
        }
        err
    }
}
