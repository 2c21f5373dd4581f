//! Textual stack-machine assembly: the instruction model, its line format and
//! jump-label generation.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Minimum width of the `"<label>: "` column.
pub const LABEL_WIDTH: usize = 16;
/// Minimum width of the operation column when a comment follows.
pub const OPERATION_WIDTH: usize = 40;

// LCG constants (same as used in glibc)
const LCG_MULTIPLIER: u64 = 6_364_136_223_846_793_005;
const LCG_INCREMENT: u64 = 1_442_695_040_888_963_407;

/// Where an instruction came from in the source.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DebugInfo {
    /// 1-based.
    pub line: usize,
    /// 0-based.
    pub column: usize,
    pub origin: String,
}

/// One emitted line of assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instruction {
    pub label: Option<String>,
    /// Mnemonic plus operands, e.g. `push 3` or `pop x`.
    pub operation: Option<String>,
    /// Comment text without the leading `;`.
    pub comment: Option<String>,
    pub debug: DebugInfo,
}

impl Instruction {
    pub fn op(operation: impl Into<String>, debug: DebugInfo) -> Self {
        Self {
            label: None,
            operation: Some(operation.into()),
            comment: None,
            debug,
        }
    }

    pub fn label(label: impl Into<String>, debug: DebugInfo) -> Self {
        Self {
            label: Some(label.into()),
            operation: None,
            comment: None,
            debug,
        }
    }

    pub fn comment(text: impl Into<String>, debug: DebugInfo) -> Self {
        Self {
            label: None,
            operation: None,
            comment: Some(text.into()),
            debug,
        }
    }

    pub fn with_comment(mut self, text: impl Into<String>) -> Self {
        self.comment = Some(text.into());
        self
    }

    /// Render as one assembly line. With `include_debug`, the operation gets a
    /// `@<line>,<column>,"<origin>"` suffix.
    pub fn to_text(&self, include_debug: bool) -> String {
        let mut line = match &self.label {
            Some(label) => format!("{:<LABEL_WIDTH$}", format!("{label}: ")),
            None => " ".repeat(LABEL_WIDTH),
        };

        if let Some(operation) = &self.operation {
            let operation = if include_debug {
                format!(
                    "{operation} @{},{},\"{}\"",
                    self.debug.line, self.debug.column, self.debug.origin
                )
            } else {
                operation.clone()
            };
            line.push_str(&format!("{operation:<OPERATION_WIDTH$}"));
        }

        match &self.comment {
            Some(comment) => {
                line.push_str("; ");
                line.push_str(comment);
            }
            None => line.truncate(line.trim_end().len()),
        }
        line
    }

    /// Parse a line produced by `to_text(false)` back into its label,
    /// operation and comment. A `;` inside a double-quoted operand does not
    /// start a comment. Debug info is left at its default.
    pub fn parse_text(line: &str) -> Self {
        let (label, rest) = if line.starts_with(char::is_whitespace) || line.is_empty() {
            (None, line)
        } else {
            match line.split_once(':') {
                Some((label, rest)) => (Some(label.to_string()), rest),
                None => (None, line),
            }
        };

        let (operation, comment) = match comment_start(rest) {
            Some(idx) => {
                let comment = &rest[idx + 1..];
                let comment = comment.strip_prefix(' ').unwrap_or(comment);
                (&rest[..idx], Some(comment.to_string()))
            }
            None => (rest, None),
        };
        let operation = operation.trim();

        Self {
            label,
            operation: (!operation.is_empty()).then(|| operation.to_string()),
            comment,
            debug: DebugInfo::default(),
        }
    }
}

/// Byte index of the first `;` outside a double-quoted string.
fn comment_start(text: &str) -> Option<usize> {
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in text.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            ';' if !in_string => return Some(idx),
            _ => {}
        }
    }
    None
}

/// Produces jump-target names `L<base>-<counter>`. The base is picked once
/// per generator; the counter starts at zero.
#[derive(Debug, Clone)]
pub struct LabelGenerator {
    base: u32,
    counter: u64,
}

impl Default for LabelGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelGenerator {
    pub fn new() -> Self {
        Self::with_base(random_base())
    }

    pub fn with_base(base: u32) -> Self {
        Self { base, counter: 0 }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn next_label(&mut self) -> String {
        let label = format!("L{}-{}", self.base, self.counter);
        self.counter += 1;
        label
    }
}

/// One LCG step over the clock; only needs to differ between runs.
#[allow(clippy::cast_possible_truncation)]
fn random_base() -> u32 {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    let state = seed.wrapping_mul(LCG_MULTIPLIER).wrapping_add(LCG_INCREMENT);
    ((state >> 33) % 1_000_000) as u32
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dbg(line: usize, column: usize) -> DebugInfo {
        DebugInfo {
            line,
            column,
            origin: "main.ss".into(),
        }
    }

    #[test]
    fn plain_operation() {
        let text = Instruction::op("push 3", dbg(1, 0)).to_text(false);
        assert_eq!(text, format!("{}push 3", " ".repeat(LABEL_WIDTH)));
    }

    #[test]
    fn debug_suffix_follows_operation() {
        let text = Instruction::op("add", dbg(2, 4)).to_text(true);
        assert!(text.ends_with("add @2,4,\"main.ss\""));
    }

    #[test]
    fn label_is_padded() {
        let text = Instruction::label("L7-0", dbg(1, 0)).to_text(true);
        assert_eq!(text, "L7-0:");
        let text = Instruction::op("ret", dbg(1, 0)).to_text(false);
        let labelled = Instruction {
            label: Some("L7-1".into()),
            ..Instruction::op("ret", dbg(1, 0))
        }
        .to_text(false);
        assert_eq!(labelled.find("ret"), text.find("ret"));
    }

    #[test]
    fn comment_only_line_has_no_operation_column() {
        let text = Instruction::comment("hello", dbg(1, 0)).to_text(true);
        assert_eq!(text, format!("{}; hello", " ".repeat(LABEL_WIDTH)));
    }

    #[test]
    fn comment_after_padded_operation() {
        let text = Instruction::op("jmp L1-1", dbg(1, 0)).with_comment("skip").to_text(false);
        let op_end = LABEL_WIDTH + OPERATION_WIDTH;
        assert_eq!(&text[op_end..], "; skip");
    }

    #[test]
    fn parse_back_recovers_fields() {
        let original = Instruction {
            label: Some("L42-3".into()),
            operation: Some("push \"a; b\"".into()),
            comment: Some("tricky".into()),
            debug: dbg(9, 9),
        };
        let parsed = Instruction::parse_text(&original.to_text(false));
        assert_eq!(parsed.label, original.label);
        assert_eq!(parsed.operation, original.operation);
        assert_eq!(parsed.comment, original.comment);
    }

    #[test]
    fn parse_back_comment_and_bare_op() {
        let comment = Instruction::comment("stackscript 0.1.0", dbg(1, 0));
        let parsed = Instruction::parse_text(&comment.to_text(false));
        assert_eq!(parsed.label, None);
        assert_eq!(parsed.operation, None);
        assert_eq!(parsed.comment.as_deref(), Some("stackscript 0.1.0"));

        let parsed = Instruction::parse_text(&Instruction::op("exit", dbg(1, 0)).to_text(false));
        assert_eq!(parsed.operation.as_deref(), Some("exit"));
        assert_eq!(parsed.comment, None);
    }

    #[test]
    fn labels_count_from_zero_with_fixed_base() {
        let mut labels = LabelGenerator::with_base(17);
        assert_eq!(labels.next_label(), "L17-0");
        assert_eq!(labels.next_label(), "L17-1");
        assert_eq!(labels.next_label(), "L17-2");
    }

    #[test]
    fn random_base_labels_are_unique_within_instance() {
        let mut labels = LabelGenerator::new();
        let a = labels.next_label();
        let b = labels.next_label();
        assert_ne!(a, b);
        assert!(a.starts_with(&format!("L{}-", labels.base())));
    }
}
