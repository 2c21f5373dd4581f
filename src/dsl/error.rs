//! Compilation errors and the source-pointing diagnostic formatter.
//!
//! Every failure surfaces as one [`CompileError`] whose `Display` output is
//! the fully formatted diagnostic:
//!
//! ```text
//! error in main.ss, line 1: mismatched input '='.
//!     val = 3
//!     ----^--
//! ```

use std::fmt;

use serde::Serialize;

use super::ast::Position;
use super::lexer::to_signed;

/// Rendered in place of the source line when there is nothing to point at.
pub const EMPTY_SOURCE_PLACEHOLDER: &str = "<no source>";

/// Parser messages carrying these markers report their column one character
/// to the left of the offending token.
const SHIFTED_MARKERS: [&str; 2] = ["extraneous input", "mismatched input"];

/// A raw syntax error as reported by the lexer or parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub line: usize,
    pub column: isize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: usize, column: isize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Syntax,
    DuplicateDeclaration,
    UndefinedIdentifier,
    UnexpectedExpression,
    DuplicateParameter,
    ParameterShadowsDeclaration,
    ImmutableAssignment,
    ArgumentCount,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Syntax => "syntax error",
            ErrorKind::DuplicateDeclaration => "duplicate declaration",
            ErrorKind::UndefinedIdentifier => "undefined identifier",
            ErrorKind::UnexpectedExpression => "unexpected expression",
            ErrorKind::DuplicateParameter => "duplicate parameter",
            ErrorKind::ParameterShadowsDeclaration => "parameter shadows declaration",
            ErrorKind::ImmutableAssignment => "immutable assignment",
            ErrorKind::ArgumentCount => "argument count mismatch",
            ErrorKind::Internal => "internal compiler error",
        })
    }
}

/// A compilation failure with its pre-formatted diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct CompileError {
    pub kind: ErrorKind,
    /// The raw message before formatting.
    pub message: String,
    pub line: usize,
    pub column: isize,
    /// The formatted, source-pointing diagnostic.
    pub diagnostic: String,
}

impl CompileError {
    pub fn new(
        kind: ErrorKind,
        message: impl Into<String>,
        line: usize,
        column: isize,
        source: &str,
        origin: &str,
    ) -> Self {
        let message = message.into();
        let diagnostic = format_diagnostic(&message, line, column, source, origin);
        Self {
            kind,
            message,
            line,
            column,
            diagnostic,
        }
    }

    /// Error anchored at a rule's start token.
    pub fn at(
        kind: ErrorKind,
        message: impl Into<String>,
        position: Position,
        source: &str,
        origin: &str,
    ) -> Self {
        Self::new(kind, message, position.line, to_signed(position.column), source, origin)
    }

    pub fn syntax(error: &SyntaxError, source: &str, origin: &str) -> Self {
        Self::new(
            ErrorKind::Syntax,
            error.message.clone(),
            error.line,
            error.column,
            source,
            origin,
        )
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.diagnostic)
    }
}

impl std::error::Error for CompileError {}

/// Render a diagnostic: a header line, the trimmed source line and a pointer
/// line of dashes with a caret under the reported column.
///
/// `line` is 1-based, `column` is a 0-based character column into the
/// untrimmed source line.
pub fn format_diagnostic(
    message: &str,
    line: usize,
    column: isize,
    source: &str,
    origin: &str,
) -> String {
    let header = format!("error in {origin}, line {line}: {}", normalize_message(message));

    let raw_line = line
        .checked_sub(1)
        .and_then(|idx| source.lines().nth(idx))
        .unwrap_or("");
    let trimmed = raw_line.trim();
    let stripped = raw_line.chars().count() - raw_line.trim_start().chars().count();

    let mut column = column;
    if SHIFTED_MARKERS.iter().any(|marker| message.contains(marker)) {
        column += 1;
    }

    let (text, pointer) = if trimmed.is_empty() || column < 0 {
        (EMPTY_SOURCE_PLACEHOLDER.to_string(), "^".to_string())
    } else {
        let len = trimmed.chars().count();
        let caret = usize::try_from(column - to_signed(stripped))
            .unwrap_or(0)
            .min(len);
        (trimmed.to_string(), pointer_line(len, caret))
    };

    format!("{header}\n    {text}\n    {pointer}")
}

/// Lower-case the first letter, drop the parser's " expecting …" suffix and
/// terminate with a period.
fn normalize_message(message: &str) -> String {
    let message = message
        .find(" expecting")
        .map_or(message, |idx| &message[..idx])
        .trim();

    let mut chars = message.chars();
    let mut out: String = match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    };
    if !out.ends_with('.') {
        out.push('.');
    }
    out
}

fn pointer_line(len: usize, caret: usize) -> String {
    let mut pointer: String = (0..len).map(|i| if i == caret { '^' } else { '-' }).collect();
    if caret >= len {
        pointer.push('^');
    }
    pointer
}
