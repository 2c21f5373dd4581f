//! Decides what a raw word denotes in the current scope.

use super::scope::{DeclarationKind, Scope};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Num,
    Var,
    Val,
    Als,
    Fun,
    Nat,
    /// A legal fresh identifier.
    Undef,
}

impl From<DeclarationKind> for ClassKind {
    fn from(kind: DeclarationKind) -> Self {
        match kind {
            DeclarationKind::Var => ClassKind::Var,
            DeclarationKind::Val => ClassKind::Val,
            DeclarationKind::Fun => ClassKind::Fun,
            DeclarationKind::Als => ClassKind::Als,
            DeclarationKind::Nat => ClassKind::Nat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: ClassKind,
    /// The word itself, or for numbers the text without digit separators.
    pub text: String,
}

/// Classify `word` against `scope`. Declarations win over numbers.
pub fn classify(word: &str, scope: &Scope) -> Classification {
    if let Some(decl) = scope.get_declaration(word) {
        return Classification {
            kind: decl.kind().into(),
            text: word.to_string(),
        };
    }

    let digits: String = word.chars().filter(|&c| c != '_').collect();
    if is_number(&digits) {
        return Classification {
            kind: ClassKind::Num,
            text: digits,
        };
    }

    Classification {
        kind: ClassKind::Undef,
        text: word.to_string(),
    }
}

fn is_number(text: &str) -> bool {
    // f64 parsing also accepts words like "inf" and "NaN"
    let numeric_start = text
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || c == '.');
    numeric_start && (text.parse::<i64>().is_ok() || text.parse::<f64>().is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::scope::{Declaration, ScopeTable};

    fn kind(word: &str, scope: &Scope) -> ClassKind {
        classify(word, scope).kind
    }

    #[test]
    fn numbers() {
        let table = ScopeTable::new();
        assert_eq!(kind("123", table.global()), ClassKind::Num);
        assert_eq!(kind("1_000", table.global()), ClassKind::Num);
        assert_eq!(kind("3.14", table.global()), ClassKind::Num);
        assert_eq!(kind(".5", table.global()), ClassKind::Num);
        assert_eq!(classify("1_000", table.global()).text, "1000");
    }

    #[test]
    fn huge_integers_fall_back_to_float() {
        let table = ScopeTable::new();
        assert_eq!(kind("99999999999999999999", table.global()), ClassKind::Num);
    }

    #[test]
    fn float_keywords_are_identifiers() {
        let table = ScopeTable::new();
        assert_eq!(kind("inf", table.global()), ClassKind::Undef);
        assert_eq!(kind("NaN", table.global()), ClassKind::Undef);
        assert_eq!(kind("_", table.global()), ClassKind::Undef);
    }

    #[test]
    fn declarations_by_kind() {
        let mut table = ScopeTable::new();
        let g = ScopeTable::GLOBAL;
        table.add_declaration(g, Declaration::Val { name: "x".into() });
        table.add_declaration(g, Declaration::Var { name: "v".into() });
        table.add_declaration(g, Declaration::Native { name: "n".into(), params: vec![] });
        table.add_declaration(
            g,
            Declaration::Fun { name: "f".into(), params: vec![], label: "L1-0".into() },
        );
        table.add_declaration(g, Declaration::Alias { name: "a".into(), target: "f".into() });
        assert_eq!(kind("x", table.global()), ClassKind::Val);
        assert_eq!(kind("v", table.global()), ClassKind::Var);
        assert_eq!(kind("n", table.global()), ClassKind::Nat);
        assert_eq!(kind("f", table.global()), ClassKind::Fun);
        assert_eq!(kind("a", table.global()), ClassKind::Als);
    }

    #[test]
    fn unbound_name_is_undefined() {
        let table = ScopeTable::new();
        let result = classify("score", table.global());
        assert_eq!(result.kind, ClassKind::Undef);
        assert_eq!(result.text, "score");
    }
}
