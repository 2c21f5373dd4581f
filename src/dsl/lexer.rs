use std::fmt;

use super::ast::Position;
use super::error::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    /// Raw string body between the quotes, escapes still in place.
    String(String),
    Null,
    True,
    False,

    /// Identifiers and numbers alike; the classifier tells them apart.
    Name(String),

    // Keywords
    Val,
    Var,
    Fun,
    Native,
    Alias,
    If,
    Else,
    Not,
    And,
    Or,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semicolon,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Gt,
    Le,   // <=
    Ge,   // >=
    EqEq, // ==
    Ne,   // !=
    Eq,   // =

    // Special
    Newline,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Token::String(s) => return write!(f, "\"{s}\""),
            Token::Name(n) => return write!(f, "{n}"),
            Token::Null => "null",
            Token::True => "true",
            Token::False => "false",
            Token::Val => "val",
            Token::Var => "var",
            Token::Fun => "fun",
            Token::Native => "native",
            Token::Alias => "alias",
            Token::If => "if",
            Token::Else => "else",
            Token::Not => "not",
            Token::And => "and",
            Token::Or => "or",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Comma => ",",
            Token::Semicolon => ";",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Le => "<=",
            Token::Ge => ">=",
            Token::EqEq => "==",
            Token::Ne => "!=",
            Token::Eq => "=",
            Token::Newline => "\\n",
            Token::Eof => "<EOF>",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub position: Position,
}

pub fn lex(source: &str) -> Result<Vec<SpannedToken>, SyntaxError> {
    let mut lexer = Lexer::new(source);
    lexer.tokenize()
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    line_start: usize,
    tokens: Vec<SpannedToken>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            line_start: 0,
            tokens: Vec::new(),
        }
    }

    fn tokenize(&mut self) -> Result<Vec<SpannedToken>, SyntaxError> {
        while self.pos < self.bytes.len() {
            self.skip_whitespace_and_comments();
            if self.pos >= self.bytes.len() {
                break;
            }

            let start = self.pos;
            let position = self.position_of(start);
            let ch = self.bytes[self.pos];

            match ch {
                b'\n' | b'\r' => {
                    // Collapse multiple newlines
                    while self.pos < self.bytes.len()
                        && (self.bytes[self.pos] == b'\n' || self.bytes[self.pos] == b'\r')
                    {
                        if self.bytes[self.pos] == b'\n' {
                            self.line += 1;
                            self.line_start = self.pos + 1;
                        }
                        self.pos += 1;
                        self.skip_whitespace_and_comments();
                    }
                    // Suppress newline after tokens that indicate a continuation
                    if let Some(last) = self.tokens.last() {
                        if !Self::continues_expression(&last.token) {
                            self.push(Token::Newline, position);
                        }
                    }
                }
                b'(' => { self.pos += 1; self.push(Token::LParen, position); }
                b')' => { self.pos += 1; self.push(Token::RParen, position); }
                b'{' => { self.pos += 1; self.push(Token::LBrace, position); }
                b'}' => { self.pos += 1; self.push(Token::RBrace, position); }
                b',' => { self.pos += 1; self.push(Token::Comma, position); }
                b';' => { self.pos += 1; self.push(Token::Semicolon, position); }
                b'+' => { self.pos += 1; self.push(Token::Plus, position); }
                b'-' => { self.pos += 1; self.push(Token::Minus, position); }
                b'*' => { self.pos += 1; self.push(Token::Star, position); }
                b'/' => { self.pos += 1; self.push(Token::Slash, position); }
                b'%' => { self.pos += 1; self.push(Token::Percent, position); }
                b'<' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        self.push(Token::Le, position);
                    } else {
                        self.push(Token::Lt, position);
                    }
                }
                b'>' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        self.push(Token::Ge, position);
                    } else {
                        self.push(Token::Gt, position);
                    }
                }
                b'=' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        self.push(Token::EqEq, position);
                    } else {
                        self.push(Token::Eq, position);
                    }
                }
                b'!' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        self.push(Token::Ne, position);
                    } else {
                        return Err(self.recognition_error(start, position));
                    }
                }
                b'"' => {
                    self.pos += 1;
                    self.lex_string(start, position)?;
                }
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' => {
                    self.lex_word(start, position);
                }
                _ => return Err(self.recognition_error(start, position)),
            }
        }

        // Remove trailing newline
        if let Some(last) = self.tokens.last() {
            if matches!(last.token, Token::Newline) {
                self.tokens.pop();
            }
        }

        let eof = self.position_of(self.pos);
        self.tokens.push(SpannedToken {
            token: Token::Eof,
            position: eof,
        });

        Ok(std::mem::take(&mut self.tokens))
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn position_of(&self, offset: usize) -> Position {
        let column = self
            .source
            .get(self.line_start..offset)
            .map_or(0, |s| s.chars().count());
        Position::new(self.line, column)
    }

    fn recognition_error(&self, start: usize, position: Position) -> SyntaxError {
        let text: String = self.source.get(start..).unwrap_or("").chars().take(1).collect();
        SyntaxError::new(
            position.line,
            to_signed(position.column),
            format!("token recognition error at: '{text}'"),
        )
    }

    fn push(&mut self, token: Token, position: Position) {
        // An infix operator at the start of a line continues the previous
        // expression:
        //   val x = a
        //       + b
        if Self::continues_from_previous(&token) {
            if let Some(last) = self.tokens.last() {
                if matches!(last.token, Token::Newline) {
                    self.tokens.pop();
                }
            }
        }
        self.tokens.push(SpannedToken { token, position });
    }

    /// Returns true if a newline after this token should be suppressed,
    /// because the token indicates an expression continues on the next line.
    fn continues_expression(token: &Token) -> bool {
        matches!(
            token,
            Token::Plus
                | Token::Minus
                | Token::Star
                | Token::Slash
                | Token::Percent
                | Token::Lt
                | Token::Gt
                | Token::Le
                | Token::Ge
                | Token::EqEq
                | Token::Ne
                | Token::And
                | Token::Or
                | Token::Not
                | Token::Eq
                | Token::Comma
                | Token::LParen
                | Token::LBrace
                | Token::Semicolon
                | Token::Newline
        )
    }

    /// Returns true if this token at the START of a new line means the
    /// previous statement continues. `-` is excluded because it is also a
    /// valid unary operator at the start of a statement.
    fn continues_from_previous(token: &Token) -> bool {
        matches!(
            token,
            Token::Plus
                | Token::Star
                | Token::Slash
                | Token::Percent
                | Token::Lt
                | Token::Gt
                | Token::Le
                | Token::Ge
                | Token::EqEq
                | Token::Ne
                | Token::And
                | Token::Or
                | Token::Else
        )
    }

    fn skip_whitespace_and_comments(&mut self) {
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b' ' | b'\t' => self.pos += 1,
                b'/' if self.bytes.get(self.pos + 1) == Some(&b'/') => {
                    // Line comment (// style): skip to end of line
                    while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                b'-' if self.bytes.get(self.pos + 1) == Some(&b'-') => {
                    // Line comment (-- style): skip to end of line
                    while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_string(&mut self, start: usize, position: Position) -> Result<(), SyntaxError> {
        let body_start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos] != b'"' && self.bytes[self.pos] != b'\n' {
            if self.bytes[self.pos] == b'\\' && self.bytes.get(self.pos + 1).is_some_and(|&b| b != b'\n') {
                self.pos += 1;
            }
            self.pos += 1;
        }
        if self.pos >= self.bytes.len() || self.bytes[self.pos] != b'"' {
            let text = self.source.get(start..self.pos).unwrap_or("");
            return Err(SyntaxError::new(
                position.line,
                to_signed(position.column),
                format!("token recognition error at: '{text}'"),
            ));
        }
        let body = self.source.get(body_start..self.pos).unwrap_or("").to_string();
        self.pos += 1;
        self.push(Token::String(body), position);
        Ok(())
    }

    fn lex_word(&mut self, start: usize, position: Position) {
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_alphanumeric()
                || self.bytes[self.pos] == b'_'
                || self.bytes[self.pos] == b'.')
        {
            self.pos += 1;
        }
        let word = &self.source[start..self.pos];
        let token = match word {
            "val" => Token::Val,
            "var" => Token::Var,
            "fun" => Token::Fun,
            "native" => Token::Native,
            "alias" => Token::Alias,
            "if" => Token::If,
            "else" => Token::Else,
            "not" => Token::Not,
            "and" => Token::And,
            "or" => Token::Or,
            "null" => Token::Null,
            "true" => Token::True,
            "false" => Token::False,
            _ => Token::Name(word.to_string()),
        };
        self.push(token, position);
    }
}

pub(crate) fn to_signed(column: usize) -> isize {
    isize::try_from(column).unwrap_or(isize::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tok(s: &str) -> Vec<Token> {
        lex(s).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn simple_tokens() {
        let tokens = tok("1 + 2.5");
        assert_eq!(
            tokens,
            vec![
                Token::Name("1".into()),
                Token::Plus,
                Token::Name("2.5".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn keywords() {
        let tokens = tok("val var fun native alias if else not and or null true false");
        assert_eq!(tokens, vec![
            Token::Val, Token::Var, Token::Fun, Token::Native, Token::Alias,
            Token::If, Token::Else, Token::Not, Token::And, Token::Or,
            Token::Null, Token::True, Token::False, Token::Eof,
        ]);
    }

    #[test]
    fn operators() {
        let tokens = tok("+ - * / % < > <= >= == != =");
        assert_eq!(tokens, vec![
            Token::Plus, Token::Minus, Token::Star, Token::Slash, Token::Percent,
            Token::Lt, Token::Gt, Token::Le, Token::Ge, Token::EqEq, Token::Ne,
            Token::Eq, Token::Eof,
        ]);
    }

    #[test]
    fn digit_separators_stay_in_one_word() {
        assert_eq!(tok("1_000"), vec![Token::Name("1_000".into()), Token::Eof]);
    }

    #[test]
    fn string_literal_keeps_escapes() {
        let tokens = tok(r#""a\"b""#);
        assert_eq!(tokens, vec![Token::String(r#"a\"b"#.into()), Token::Eof]);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = lex("val s = \"abc").unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 8);
        assert!(err.message.starts_with("token recognition error"));
    }

    #[test]
    fn unknown_character_reports_position() {
        let err = lex("val x = 1\nval y = $").unwrap_err();
        assert_eq!((err.line, err.column), (2, 8));
        assert_eq!(err.message, "token recognition error at: '$'");
    }

    #[test]
    fn positions_track_lines_and_columns() {
        let tokens = lex("val x = 1\n  x").unwrap();
        let last_name = tokens.iter().rfind(|t| t.token == Token::Name("x".into())).unwrap();
        assert_eq!(last_name.position, Position::new(2, 2));
    }

    #[test]
    fn newlines_collapse_and_continue() {
        let tokens = tok("1 +\n2\n\n\n3");
        assert_eq!(tokens, vec![
            Token::Name("1".into()), Token::Plus, Token::Name("2".into()),
            Token::Newline, Token::Name("3".into()), Token::Eof,
        ]);
    }

    #[test]
    fn leading_operator_continues_previous_line() {
        let tokens = tok("a\n+ b");
        assert_eq!(tokens, vec![
            Token::Name("a".into()), Token::Plus, Token::Name("b".into()), Token::Eof,
        ]);
    }

    #[test]
    fn comments_skipped() {
        let tokens = tok("1 // note\n-- another\n2");
        assert_eq!(tokens, vec![
            Token::Name("1".into()), Token::Newline, Token::Name("2".into()), Token::Eof,
        ]);
    }
}
