//! Parse tree for the stackscript grammar and the listener walk over it.
//!
//! The parser materializes the whole tree before any code is generated. Code
//! generation never inspects the tree directly; it reacts to the ordered
//! `enter`/`exit` callbacks produced by [`walk`].

use serde::Serialize;

use super::lexer::Token;

/// Source position of a token: 1-based line, 0-based character column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// One grammar rule of interest. Operator rules keep the operator token so the
/// listener can decide the emitted mnemonic from the token that is present.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Program,
    /// `val name = expr`
    ValDeclaration { name: String },
    /// `var name = expr`
    VarDeclaration { name: String },
    /// `name = expr`
    Assignment { name: String },
    /// `alias name = target`
    AliasDeclaration { name: String, target: String },
    /// `fun name(params) = body`
    FunDeclaration { name: String },
    /// `native name(params)`
    NativeDeclaration { name: String },
    /// The parenthesized parameter list of a `fun`/`native` declaration.
    FunctionHeader,
    Parameter { name: String },
    /// `{ statements }`
    Compound,
    /// `if cond { … } else { … }`
    If,
    Condition,
    Then,
    Else,
    Unary { op: Token },
    Logical { op: Token },
    Equality { op: Token },
    Relational { op: Token },
    Additive { op: Token },
    Multiplicative { op: Token },
    /// `null`, `true`, `false` or a string literal.
    Literal(Token),
    /// A bare word: a number or a reference to a declaration.
    Name(String),
    /// `name(args)`
    Call { name: String },
}

/// A node of the materialized parse tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseNode {
    pub rule: Rule,
    /// Position of the rule's start token.
    pub start: Position,
    pub children: Vec<ParseNode>,
}

impl ParseNode {
    pub fn new(rule: Rule, start: Position) -> Self {
        Self {
            rule,
            start,
            children: Vec::new(),
        }
    }

    pub fn with_children(rule: Rule, start: Position, children: Vec<ParseNode>) -> Self {
        Self {
            rule,
            start,
            children,
        }
    }
}

impl Drop for ParseNode {
    // Long operator chains build trees as deep as the chain is long; tear
    // them down iteratively.
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// Receives rule callbacks during a tree walk. Returning an error abandons
/// the walk immediately.
pub trait TreeListener {
    type Error;

    fn enter(&mut self, _node: &ParseNode) -> Result<(), Self::Error> {
        Ok(())
    }

    fn exit(&mut self, _node: &ParseNode) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Depth-first walk: `enter` before the children, `exit` after all of them.
/// Uses an explicit stack, so tree depth is not bounded by the call stack.
pub fn walk<L: TreeListener>(node: &ParseNode, listener: &mut L) -> Result<(), L::Error> {
    listener.enter(node)?;
    let mut stack = vec![(node, 0usize)];
    while let Some(top) = stack.last_mut() {
        let (current, index) = *top;
        match current.children.get(index) {
            Some(child) => {
                top.1 += 1;
                listener.enter(child)?;
                stack.push((child, 0));
            }
            None => {
                listener.exit(current)?;
                stack.pop();
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        fail_on_exit_of: Option<&'static str>,
    }

    fn label(node: &ParseNode) -> String {
        match &node.rule {
            Rule::Name(n) => n.clone(),
            Rule::Additive { .. } => "add".into(),
            other => format!("{other:?}"),
        }
    }

    impl TreeListener for Recorder {
        type Error = String;

        fn enter(&mut self, node: &ParseNode) -> Result<(), String> {
            self.events.push(format!("enter {}", label(node)));
            Ok(())
        }

        fn exit(&mut self, node: &ParseNode) -> Result<(), String> {
            let l = label(node);
            self.events.push(format!("exit {l}"));
            if self.fail_on_exit_of == Some(l.as_str()) {
                return Err(l);
            }
            Ok(())
        }
    }

    fn sum_tree() -> ParseNode {
        ParseNode::with_children(
            Rule::Additive { op: Token::Plus },
            Position::new(1, 0),
            vec![
                ParseNode::new(Rule::Name("a".into()), Position::new(1, 0)),
                ParseNode::new(Rule::Name("b".into()), Position::new(1, 4)),
            ],
        )
    }

    #[test]
    fn walk_is_pre_order_enter_post_order_exit() {
        let mut rec = Recorder::default();
        walk(&sum_tree(), &mut rec).unwrap();
        assert_eq!(
            rec.events,
            vec!["enter add", "enter a", "exit a", "enter b", "exit b", "exit add"]
        );
    }

    #[test]
    fn walk_handles_very_deep_trees() {
        struct Counter(usize);
        impl TreeListener for Counter {
            type Error = ();
            fn exit(&mut self, _node: &ParseNode) -> Result<(), ()> {
                self.0 += 1;
                Ok(())
            }
        }

        let leaf = || ParseNode::new(Rule::Name("1".into()), Position::new(1, 0));
        let mut tree = leaf();
        for _ in 0..200_000 {
            tree = ParseNode::with_children(
                Rule::Additive { op: Token::Plus },
                Position::new(1, 0),
                vec![tree, leaf()],
            );
        }
        let mut counter = Counter(0);
        walk(&tree, &mut counter).unwrap();
        assert_eq!(counter.0, 400_001);
    }

    #[test]
    fn walk_stops_at_first_error() {
        let mut rec = Recorder {
            fail_on_exit_of: Some("a"),
            ..Recorder::default()
        };
        let err = walk(&sum_tree(), &mut rec).unwrap_err();
        assert_eq!(err, "a");
        assert_eq!(rec.events.last().map(String::as_str), Some("exit a"));
        assert!(!rec.events.iter().any(|e| e == "enter b"));
    }
}
