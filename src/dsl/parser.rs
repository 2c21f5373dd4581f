use super::ast::{ParseNode, Position, Rule};
use super::error::SyntaxError;
use super::lexer::{lex, to_signed, SpannedToken, Token};

/// Receives syntax errors as `(line, column, message)` triples.
pub trait ErrorListener {
    fn syntax_error(&mut self, line: usize, column: isize, message: &str);
}

/// Default listener: logs each syntax error to stderr.
pub struct ConsoleErrorListener;

impl ErrorListener for ConsoleErrorListener {
    fn syntax_error(&mut self, line: usize, column: isize, message: &str) {
        eprintln!("[stackscript] line {line}:{column} {message}");
    }
}

/// Keeps the first reported syntax error.
#[derive(Debug, Default)]
pub struct FirstErrorListener {
    pub error: Option<SyntaxError>,
}

impl ErrorListener for FirstErrorListener {
    fn syntax_error(&mut self, line: usize, column: isize, message: &str) {
        if self.error.is_none() {
            self.error = Some(SyntaxError::new(line, column, message));
        }
    }
}

/// Parse with the default console listener.
pub fn parse(source: &str) -> Option<ParseNode> {
    parse_with_listener(source, &mut ConsoleErrorListener)
}

/// Parse `source`, reporting syntax errors to `listener` instead of the
/// console. Parsing stops at the first error.
pub fn parse_with_listener(source: &str, listener: &mut dyn ErrorListener) -> Option<ParseNode> {
    let result = lex(source).and_then(|tokens| Parser::new(tokens).parse_program());
    match result {
        Ok(tree) => Some(tree),
        Err(e) => {
            listener.syntax_error(e.line, e.column, &e.message);
            None
        }
    }
}

type ParseResult = Result<ParseNode, SyntaxError>;

const STATEMENT_END: &str = "{<EOF>, ';', NEWLINE}";
const BLOCK_STATEMENT_END: &str = "{';', NEWLINE, '}'}";

/// Maximum number of nested expressions (parentheses, blocks, branches,
/// call arguments, unary operators) before parsing gives up.
pub const MAX_NESTING_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<SpannedToken>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn parse_program(&mut self) -> ParseResult {
        let start = self.position();
        let mut statements = Vec::new();

        self.skip_terminators();
        while !self.at_eof() {
            statements.push(self.parse_statement()?);
            if !self.at_terminator() && !self.at_eof() {
                return Err(self.extraneous(STATEMENT_END));
            }
            self.skip_terminators();
        }

        Ok(ParseNode::with_children(Rule::Program, start, statements))
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> &Token {
        self.tokens.get(self.pos + n).map_or(&Token::Eof, |t| &t.token)
    }

    fn position(&self) -> Position {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or_else(Position::default, |t| t.position)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn at_terminator(&self) -> bool {
        matches!(self.peek(), Token::Semicolon | Token::Newline)
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn skip_terminators(&mut self) {
        while self.at_terminator() {
            self.advance();
        }
    }

    /// Mismatched and extraneous input are reported one column left of the
    /// offending token.
    fn shifted_error(&self, class: &str, expected: &str) -> SyntaxError {
        let at = self.position();
        SyntaxError::new(
            at.line,
            to_signed(at.column) - 1,
            format!("{class} input '{}' expecting {expected}", self.peek()),
        )
    }

    fn mismatched(&self, expected: &str) -> SyntaxError {
        self.shifted_error("mismatched", expected)
    }

    fn extraneous(&self, expected: &str) -> SyntaxError {
        self.shifted_error("extraneous", expected)
    }

    fn no_viable_alternative(&self) -> SyntaxError {
        let at = self.position();
        SyntaxError::new(
            at.line,
            to_signed(at.column),
            format!("no viable alternative at input '{}'", self.peek()),
        )
    }

    /// Run `parse` one nesting level deeper, failing once the limit is hit.
    fn nested(&mut self, parse: fn(&mut Self) -> ParseResult) -> ParseResult {
        if self.depth >= MAX_NESTING_DEPTH {
            let at = self.position();
            return Err(SyntaxError::new(
                at.line,
                to_signed(at.column),
                format!(
                    "maximum nesting depth ({MAX_NESTING_DEPTH}) exceeded at input '{}'",
                    self.peek()
                ),
            ));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn expect(&mut self, expected: &Token) -> Result<Position, SyntaxError> {
        if self.peek() == expected {
            let at = self.position();
            self.advance();
            Ok(at)
        } else {
            Err(self.mismatched(&format!("'{expected}'")))
        }
    }

    fn expect_name(&mut self) -> Result<(String, Position), SyntaxError> {
        if let Token::Name(name) = self.peek() {
            let name = name.clone();
            let at = self.position();
            self.advance();
            Ok((name, at))
        } else {
            Err(self.mismatched("NAME"))
        }
    }

    // ── Statements ─────────────────────────────────────────────────

    fn parse_statement(&mut self) -> ParseResult {
        match self.peek() {
            Token::Val => self.parse_binding(true),
            Token::Var => self.parse_binding(false),
            Token::Alias => self.parse_alias(),
            Token::Fun => self.parse_fun(),
            Token::Native => self.parse_native(),
            Token::Name(_) if matches!(self.peek_nth(1), Token::Eq) => self.parse_assignment(),
            _ => self.parse_expr(),
        }
    }

    /// `val name = expr` / `var name = expr`
    fn parse_binding(&mut self, immutable: bool) -> ParseResult {
        let start = self.position();
        self.advance();
        let (name, _) = self.expect_name()?;
        self.expect(&Token::Eq)?;
        let value = self.parse_expr()?;
        let rule = if immutable {
            Rule::ValDeclaration { name }
        } else {
            Rule::VarDeclaration { name }
        };
        Ok(ParseNode::with_children(rule, start, vec![value]))
    }

    fn parse_assignment(&mut self) -> ParseResult {
        let (name, start) = self.expect_name()?;
        self.expect(&Token::Eq)?;
        let value = self.parse_expr()?;
        Ok(ParseNode::with_children(Rule::Assignment { name }, start, vec![value]))
    }

    fn parse_alias(&mut self) -> ParseResult {
        let start = self.position();
        self.advance();
        let (name, _) = self.expect_name()?;
        self.expect(&Token::Eq)?;
        let (target, _) = self.expect_name()?;
        Ok(ParseNode::new(Rule::AliasDeclaration { name, target }, start))
    }

    /// `fun name(a, b) = body`
    fn parse_fun(&mut self) -> ParseResult {
        let start = self.position();
        self.advance();
        let (name, _) = self.expect_name()?;
        let header = self.parse_header()?;
        self.expect(&Token::Eq)?;
        let body = self.parse_expr()?;
        Ok(ParseNode::with_children(
            Rule::FunDeclaration { name },
            start,
            vec![header, body],
        ))
    }

    /// `native name(a, b)`
    fn parse_native(&mut self) -> ParseResult {
        let start = self.position();
        self.advance();
        let (name, _) = self.expect_name()?;
        let header = self.parse_header()?;
        Ok(ParseNode::with_children(
            Rule::NativeDeclaration { name },
            start,
            vec![header],
        ))
    }

    fn parse_header(&mut self) -> ParseResult {
        let start = self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        if !matches!(self.peek(), Token::RParen) {
            loop {
                let (name, at) = self.expect_name()?;
                params.push(ParseNode::new(Rule::Parameter { name }, at));
                if matches!(self.peek(), Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        Ok(ParseNode::with_children(Rule::FunctionHeader, start, params))
    }

    // ── Expressions ────────────────────────────────────────────────

    fn parse_expr(&mut self) -> ParseResult {
        self.nested(Self::parse_or)
    }

    /// One left-associative binary precedence level.
    fn parse_binary(
        &mut self,
        ops: &[Token],
        rule: fn(Token) -> Rule,
        operand: fn(&mut Self) -> ParseResult,
    ) -> ParseResult {
        let mut left = operand(self)?;
        while ops.contains(self.peek()) {
            let op = self.peek().clone();
            self.advance();
            let right = operand(self)?;
            let start = left.start;
            left = ParseNode::with_children(rule(op), start, vec![left, right]);
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> ParseResult {
        self.parse_binary(&[Token::Or], |op| Rule::Logical { op }, Self::parse_and)
    }

    fn parse_and(&mut self) -> ParseResult {
        self.parse_binary(&[Token::And], |op| Rule::Logical { op }, Self::parse_equality)
    }

    fn parse_equality(&mut self) -> ParseResult {
        self.parse_binary(
            &[Token::EqEq, Token::Ne],
            |op| Rule::Equality { op },
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> ParseResult {
        self.parse_binary(
            &[Token::Lt, Token::Le, Token::Gt, Token::Ge],
            |op| Rule::Relational { op },
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> ParseResult {
        self.parse_binary(
            &[Token::Plus, Token::Minus],
            |op| Rule::Additive { op },
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> ParseResult {
        self.parse_binary(
            &[Token::Star, Token::Slash, Token::Percent],
            |op| Rule::Multiplicative { op },
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> ParseResult {
        if matches!(self.peek(), Token::Minus | Token::Not) {
            let start = self.position();
            let op = self.peek().clone();
            self.advance();
            let operand = self.nested(Self::parse_unary)?;
            return Ok(ParseNode::with_children(Rule::Unary { op }, start, vec![operand]));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ParseResult {
        let start = self.position();
        match self.peek().clone() {
            token @ (Token::Null | Token::True | Token::False | Token::String(_)) => {
                self.advance();
                Ok(ParseNode::new(Rule::Literal(token), start))
            }
            Token::Name(name) if matches!(self.peek_nth(1), Token::LParen) => {
                self.advance();
                self.advance();
                let args = self.parse_args()?;
                Ok(ParseNode::with_children(Rule::Call { name }, start, args))
            }
            Token::Name(name) => {
                self.advance();
                Ok(ParseNode::new(Rule::Name(name), start))
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::LBrace => self.parse_compound(),
            Token::If => self.parse_if(),
            _ => Err(self.no_viable_alternative()),
        }
    }

    /// Arguments after the opening parenthesis, through the closing one.
    fn parse_args(&mut self) -> Result<Vec<ParseNode>, SyntaxError> {
        let mut args = Vec::new();
        if !matches!(self.peek(), Token::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if matches!(self.peek(), Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }

    /// `{ statements }`
    fn parse_compound(&mut self) -> ParseResult {
        let start = self.expect(&Token::LBrace)?;
        let mut statements = Vec::new();

        self.skip_terminators();
        while !matches!(self.peek(), Token::RBrace) {
            if self.at_eof() {
                return Err(self.mismatched("'}'"));
            }
            statements.push(self.parse_statement()?);
            if !self.at_terminator() && !matches!(self.peek(), Token::RBrace) {
                return Err(self.mismatched(BLOCK_STATEMENT_END));
            }
            self.skip_terminators();
        }
        self.advance();

        Ok(ParseNode::with_children(Rule::Compound, start, statements))
    }

    /// `if cond { … } else { … }`, where the else branch may be another `if`.
    fn parse_if(&mut self) -> ParseResult {
        let start = self.position();
        self.advance();
        let condition = self.parse_expr()?;
        let then_body = self.parse_compound()?;

        let mut children = vec![
            ParseNode::with_children(Rule::Condition, condition.start, vec![condition]),
            ParseNode::with_children(Rule::Then, then_body.start, vec![then_body]),
        ];

        if matches!(self.peek(), Token::Else) {
            let else_start = self.position();
            self.advance();
            let else_body = if matches!(self.peek(), Token::If) {
                self.parse_if()?
            } else {
                self.parse_compound()?
            };
            children.push(ParseNode::with_children(Rule::Else, else_start, vec![else_body]));
        }

        Ok(ParseNode::with_children(Rule::If, start, children))
    }
}
