//! Position-tracking tokenizer for the DDL subset.

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    /// Unquoted identifier or keyword, as written.
    Ident(String),
    /// `"quoted"` identifier, unescaped.
    QuotedIdent(String),
    /// `'string'` literal, unescaped.
    StringLit(String),
    Number(String),
    Symbol(char),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub column: u32,
    /// Byte offsets into the statement source, for verbatim slices.
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn is_keyword(&self, kw: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(word) if word.eq_ignore_ascii_case(kw))
    }

    pub fn is_symbol(&self, s: char) -> bool {
        matches!(self.kind, TokenKind::Symbol(c) if c == s)
    }

    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Ident(w) => format!("`{w}`"),
            TokenKind::QuotedIdent(w) => format!("`\"{w}\"`"),
            TokenKind::StringLit(_) => "string literal".to_string(),
            TokenKind::Number(n) => format!("`{n}`"),
            TokenKind::Symbol(c) => format!("`{c}`"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LexError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

struct Scanner {
    chars: Vec<(usize, char)>,
    source_len: usize,
    pos: usize,
    line: u32,
    column: u32,
}

impl Scanner {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|(o, _)| *o)
            .unwrap_or(self.source_len)
    }

    fn bump(&mut self) -> Option<char> {
        let (_, c) = *self.chars.get(self.pos)?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }
}

/// Tokenize one statement. `line`/`column` give the statement's position in
/// its file so token positions land in file coordinates.
pub(crate) fn tokenize(source: &str, line: u32, column: u32) -> Result<Vec<Token>, LexError> {
    let mut scanner = Scanner {
        chars: source.char_indices().collect(),
        source_len: source.len(),
        pos: 0,
        line,
        column,
    };
    let mut tokens = Vec::new();

    while let Some(c) = scanner.peek() {
        let tok_line = scanner.line;
        let tok_col = scanner.column;
        let tok_start = scanner.offset();

        if c.is_whitespace() {
            scanner.bump();
            continue;
        }

        // -- line comment
        if c == '-' && scanner.peek_next() == Some('-') {
            while let Some(c) = scanner.peek() {
                if c == '\n' {
                    break;
                }
                scanner.bump();
            }
            continue;
        }

        if c == '\'' || c == '"' {
            let quote = c;
            scanner.bump();
            let mut value = String::new();
            loop {
                match scanner.peek() {
                    None => {
                        let what = if quote == '\'' {
                            "unterminated string literal"
                        } else {
                            "unterminated quoted identifier"
                        };
                        return Err(LexError {
                            message: what.into(),
                            line: tok_line,
                            column: tok_col,
                        });
                    }
                    Some(c) if c == quote => {
                        scanner.bump();
                        // A doubled quote is an escape.
                        if scanner.peek() == Some(quote) {
                            value.push(quote);
                            scanner.bump();
                            continue;
                        }
                        break;
                    }
                    Some(c) => {
                        value.push(c);
                        scanner.bump();
                    }
                }
            }
            let kind = if quote == '\'' {
                TokenKind::StringLit(value)
            } else {
                TokenKind::QuotedIdent(value)
            };
            tokens.push(Token {
                kind,
                line: tok_line,
                column: tok_col,
                start: tok_start,
                end: scanner.offset(),
            });
            continue;
        }

        if c.is_ascii_digit() {
            let mut value = String::new();
            while let Some(c) = scanner.peek() {
                if c.is_ascii_digit() || c == '.' {
                    value.push(c);
                    scanner.bump();
                } else {
                    break;
                }
            }
            tokens.push(Token {
                kind: TokenKind::Number(value),
                line: tok_line,
                column: tok_col,
                start: tok_start,
                end: scanner.offset(),
            });
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let mut value = String::new();
            while let Some(c) = scanner.peek() {
                if c.is_alphanumeric() || c == '_' || c == '$' {
                    value.push(c);
                    scanner.bump();
                } else {
                    break;
                }
            }
            tokens.push(Token {
                kind: TokenKind::Ident(value),
                line: tok_line,
                column: tok_col,
                start: tok_start,
                end: scanner.offset(),
            });
            continue;
        }

        // Everything else is a single-character symbol.
        scanner.bump();
        tokens.push(Token {
            kind: TokenKind::Symbol(c),
            line: tok_line,
            column: tok_col,
            start: tok_start,
            end: scanner.offset(),
        });
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_file_coordinates() {
        let tokens = tokenize("CREATE TABLE t(id int,)", 1, 1).unwrap();
        let comma = tokens.iter().find(|t| t.is_symbol(',')).unwrap();
        assert_eq!(comma.line, 1);
        assert_eq!(comma.column, 22);
    }

    #[test]
    fn string_escapes_unfold() {
        let tokens = tokenize("'it''s'", 1, 1).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::StringLit("it's".into()));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = tokenize("DEFAULT 'oops", 1, 1).unwrap_err();
        assert!(err.message.contains("unterminated"));
        assert_eq!(err.column, 9);
    }

    #[test]
    fn statement_offset_shifts_positions() {
        let tokens = tokenize("id int", 3, 5).unwrap();
        assert_eq!(tokens[0].line, 3);
        assert_eq!(tokens[0].column, 5);
        assert_eq!(tokens[1].column, 8);
    }

    #[test]
    fn line_comment_is_skipped() {
        let tokens = tokenize("id -- the key\n int", 1, 1).unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].line, 2);
    }
}
