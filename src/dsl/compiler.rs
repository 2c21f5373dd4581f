use std::mem;

use serde::Serialize;

use super::asm::{DebugInfo, Instruction, LabelGenerator};
use super::ast::{walk, ParseNode, Position, Rule, TreeListener};
use super::classify::{classify, ClassKind, Classification};
use super::error::{CompileError, ErrorKind};
use super::lexer::Token;
use super::scope::{Declaration, Scope, ScopeId, ScopeTable};
use crate::util::iso_timestamp;

pub const GENERATOR_NAME: &str = env!("CARGO_PKG_NAME");
pub const GENERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A compiled program: instructions in execution order plus every scope
/// created while compiling them.
#[derive(Debug, Clone, Serialize)]
pub struct Module {
    pub instructions: Vec<Instruction>,
    pub scopes: ScopeTable,
}

impl Module {
    pub fn global_scope(&self) -> &Scope {
        self.scopes.global()
    }

    /// Serialize every instruction, one per line.
    pub fn to_text(&self, include_debug: bool) -> String {
        self.instructions
            .iter()
            .map(|i| i.to_text(include_debug))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Serialized assembly handed to the assembler, tagged with its source unit.
#[derive(Debug, Clone, Serialize)]
pub struct Executable {
    pub origin: String,
    pub text: String,
}

/// Generate a module from a parsed program.
pub fn generate(tree: &ParseNode, source: &str, origin: &str) -> Result<Module, CompileError> {
    let mut generator = CodeGenerator::new(source, origin);
    walk(tree, &mut generator)?;
    generator.module()
}

struct PendingFunction {
    name: String,
    label: String,
}

struct Branch {
    else_label: String,
    end_label: String,
}

/// Single-pass code generator driven by parse-tree callbacks. One instance
/// per compilation unit.
pub struct CodeGenerator<'a> {
    source: &'a str,
    origin: &'a str,
    scopes: ScopeTable,
    current: ScopeId,
    /// Parameter names of the `fun`/`native` header being walked.
    parameters: Vec<String>,
    instructions: Vec<Instruction>,
    labels: LabelGenerator,
    /// Set between entering a `fun` declaration and leaving its header.
    pending_function: Option<PendingFunction>,
    /// Skip labels of the function bodies being walked, innermost last.
    function_exits: Vec<String>,
    branches: Vec<Branch>,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(source: &'a str, origin: &'a str) -> Self {
        Self::with_labels(source, origin, LabelGenerator::new())
    }

    pub fn with_labels(source: &'a str, origin: &'a str, labels: LabelGenerator) -> Self {
        Self {
            source,
            origin,
            scopes: ScopeTable::new(),
            current: ScopeTable::GLOBAL,
            parameters: Vec::new(),
            instructions: Vec::new(),
            labels,
            pending_function: None,
            function_exits: Vec::new(),
            branches: Vec::new(),
        }
    }

    pub fn current_scope(&self) -> &Scope {
        self.scopes.get(self.current)
    }

    /// Finish the walk. The scope cursor must be back at the global scope.
    pub fn module(self) -> Result<Module, CompileError> {
        if !self.current_scope().is_global() {
            return Err(self.error(
                ErrorKind::Internal,
                Position::default(),
                "Scope cursor is not at the global scope after the walk",
            ));
        }
        Ok(Module {
            instructions: self.instructions,
            scopes: self.scopes,
        })
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn classify(&self, word: &str) -> Classification {
        classify(word, self.current_scope())
    }

    fn debug(&self, at: Position) -> DebugInfo {
        DebugInfo {
            line: at.line,
            column: at.column,
            origin: self.origin.to_string(),
        }
    }

    fn emit(&mut self, at: Position, operation: impl Into<String>) {
        let instruction = Instruction::op(operation, self.debug(at));
        self.instructions.push(instruction);
    }

    fn emit_label(&mut self, at: Position, label: String) {
        let instruction = Instruction::label(label, self.debug(at));
        self.instructions.push(instruction);
    }

    fn error(&self, kind: ErrorKind, at: Position, message: impl Into<String>) -> CompileError {
        CompileError::at(kind, message, at, self.source, self.origin)
    }

    fn push_scope(&mut self) {
        self.current = self.scopes.create_child(self.current);
    }

    fn pop_scope(&mut self, at: Position) -> Result<(), CompileError> {
        match self.current_scope().parent() {
            Some(parent) => {
                self.current = parent;
                Ok(())
            }
            None => Err(self.error(ErrorKind::Internal, at, "Cannot exit the global scope")),
        }
    }

    /// A binding site needs a fresh name: numbers and existing declarations
    /// are rejected.
    fn require_fresh(&self, name: &str, at: Position, duplicate: &str) -> Result<(), CompileError> {
        match self.classify(name).kind {
            ClassKind::Undef => Ok(()),
            ClassKind::Num => Err(self.error(
                ErrorKind::UnexpectedExpression,
                at,
                format!("Expected an identifier but found number '{name}'"),
            )),
            _ => Err(self.error(ErrorKind::DuplicateDeclaration, at, duplicate)),
        }
    }

    // ── Rules ──────────────────────────────────────────────────────

    fn exit_literal(&mut self, token: &Token, at: Position) -> Result<(), CompileError> {
        let operand = match token {
            Token::Null => "null".to_string(),
            Token::True => "1".to_string(),
            Token::False => "0".to_string(),
            Token::String(raw) => quote(&unescape(raw)),
            other => {
                return Err(self.error(
                    ErrorKind::Internal,
                    at,
                    format!("Unexpected literal token '{other}'"),
                ))
            }
        };
        self.emit(at, format!("push {operand}"));
        Ok(())
    }

    fn exit_name(&mut self, word: &str, at: Position) -> Result<(), CompileError> {
        let class = self.classify(word);
        match class.kind {
            ClassKind::Val | ClassKind::Var | ClassKind::Num => {
                self.emit(at, format!("push {}", class.text));
                Ok(())
            }
            ClassKind::Undef => Err(self.error(
                ErrorKind::UndefinedIdentifier,
                at,
                format!("Undefined identifier '{word}'"),
            )),
            _ => Err(self.error(
                ErrorKind::UndefinedIdentifier,
                at,
                format!("'{word}' cannot be used as a value"),
            )),
        }
    }

    fn exit_binding(&mut self, declaration: Declaration, at: Position) -> Result<(), CompileError> {
        let name = declaration.name().to_string();
        self.require_fresh(&name, at, &format!("Duplicate declaration of '{name}'"))?;
        self.emit(at, format!("pop {name}"));
        self.scopes.add_declaration(self.current, declaration);
        Ok(())
    }

    fn exit_assignment(&mut self, name: &str, at: Position) -> Result<(), CompileError> {
        match self.classify(name).kind {
            ClassKind::Var => {
                self.emit(at, format!("pop {name}"));
                Ok(())
            }
            ClassKind::Val => Err(self.error(
                ErrorKind::ImmutableAssignment,
                at,
                format!("Cannot assign to value '{name}'"),
            )),
            ClassKind::Num => Err(self.error(
                ErrorKind::UnexpectedExpression,
                at,
                format!("Cannot assign to number '{name}'"),
            )),
            _ => Err(self.error(
                ErrorKind::UndefinedIdentifier,
                at,
                format!("Assignment to undefined variable '{name}'"),
            )),
        }
    }

    fn exit_alias(&mut self, name: &str, target: &str, at: Position) -> Result<(), CompileError> {
        self.require_fresh(name, at, &format!("Duplicate declaration of '{name}'"))?;
        if self.classify(target).kind == ClassKind::Num {
            return Err(self.error(
                ErrorKind::UnexpectedExpression,
                at,
                format!("Alias target must be a name but found number '{target}'"),
            ));
        }
        let resolved = match self.current_scope().get_declaration(target) {
            Some(Declaration::Alias { target: inner, .. }) => inner.clone(),
            Some(_) => target.to_string(),
            None => {
                return Err(self.error(
                    ErrorKind::UndefinedIdentifier,
                    at,
                    format!("Alias target '{target}' is not declared"),
                ))
            }
        };
        self.scopes.add_declaration(
            self.current,
            Declaration::Alias {
                name: name.to_string(),
                target: resolved,
            },
        );
        Ok(())
    }

    fn exit_parameter(&mut self, name: &str, at: Position) -> Result<(), CompileError> {
        let names_function = self
            .pending_function
            .as_ref()
            .is_some_and(|f| f.name == name);
        match self.classify(name).kind {
            ClassKind::Undef if names_function => Err(self.error(
                ErrorKind::ParameterShadowsDeclaration,
                at,
                format!("Parameter '{name}' shadows the function it belongs to"),
            )),
            ClassKind::Undef if self.parameters.iter().any(|p| p == name) => Err(self.error(
                ErrorKind::DuplicateParameter,
                at,
                format!("Duplicate parameter name '{name}'"),
            )),
            ClassKind::Undef => {
                self.parameters.push(name.to_string());
                Ok(())
            }
            ClassKind::Num => Err(self.error(
                ErrorKind::UnexpectedExpression,
                at,
                format!("Expected a parameter name but found number '{name}'"),
            )),
            _ => Err(self.error(
                ErrorKind::ParameterShadowsDeclaration,
                at,
                format!("Parameter '{name}' shadows an existing declaration"),
            )),
        }
    }

    /// `jmp` over the body, then the entry label. The body gets its own scope.
    fn enter_function(&mut self, name: &str, at: Position) -> Result<(), CompileError> {
        self.require_fresh(name, at, &format!("Duplicate declaration of '{name}'"))?;
        let entry = self.labels.next_label();
        let skip = self.labels.next_label();
        self.emit(at, format!("jmp {skip}"));
        let label = Instruction::label(entry.clone(), self.debug(at)).with_comment(format!("fun {name}"));
        self.instructions.push(label);
        self.function_exits.push(skip);
        self.pending_function = Some(PendingFunction {
            name: name.to_string(),
            label: entry,
        });
        self.push_scope();
        Ok(())
    }

    /// For a `fun` header: declare the function in the enclosing scope and in
    /// the body scope (so recursive calls resolve), bind the parameters as
    /// values and pop the arguments into them.
    fn exit_header(&mut self, at: Position) -> Result<(), CompileError> {
        let Some(pending) = self.pending_function.take() else {
            return Ok(());
        };
        let parent = self.current_scope().parent().ok_or_else(|| {
            self.error(ErrorKind::Internal, at, "Function body has no enclosing scope")
        })?;
        let params = self.parameters.clone();
        let declaration = Declaration::Fun {
            name: pending.name,
            params: params.clone(),
            label: pending.label,
        };
        self.scopes.add_declaration(parent, declaration.clone());
        self.scopes.add_declaration(self.current, declaration);
        for param in &params {
            self.scopes
                .add_declaration(self.current, Declaration::Val { name: param.clone() });
        }
        for param in params.iter().rev() {
            self.emit(at, format!("pop {param}"));
        }
        Ok(())
    }

    fn exit_function(&mut self, at: Position) -> Result<(), CompileError> {
        self.emit(at, "ret");
        let skip = self
            .function_exits
            .pop()
            .ok_or_else(|| self.error(ErrorKind::Internal, at, "Function exit without entry"))?;
        self.emit_label(at, skip);
        self.pop_scope(at)
    }

    fn exit_native(&mut self, name: &str, at: Position) -> Result<(), CompileError> {
        self.require_fresh(name, at, &format!("Non-unique native function name '{name}'"))?;
        let params = mem::take(&mut self.parameters);
        self.scopes.add_declaration(
            self.current,
            Declaration::Native {
                name: name.to_string(),
                params,
            },
        );
        Ok(())
    }

    fn exit_call(&mut self, name: &str, argc: usize, at: Position) -> Result<(), CompileError> {
        let scope = self.current_scope();
        let declaration = match scope.get_declaration(name) {
            Some(Declaration::Alias { target, .. }) => scope.get_declaration(target),
            other => other,
        };
        let (operation, arity) = match declaration {
            Some(Declaration::Fun { label, params, .. }) => (format!("call {label}"), params.len()),
            Some(Declaration::Native { name, params }) => (format!("invoke {name}"), params.len()),
            _ => {
                return Err(self.error(
                    ErrorKind::UndefinedIdentifier,
                    at,
                    format!("Call to undefined function '{name}'"),
                ))
            }
        };
        if arity != argc {
            return Err(self.error(
                ErrorKind::ArgumentCount,
                at,
                format!("Function '{name}' expects {arity} argument(s) but got {argc}"),
            ));
        }
        self.emit(at, operation);
        Ok(())
    }

    fn exit_condition(&mut self, at: Position) {
        let branch = Branch {
            else_label: self.labels.next_label(),
            end_label: self.labels.next_label(),
        };
        self.emit(at, format!("jz {}", branch.else_label));
        self.branches.push(branch);
    }

    fn exit_then(&mut self, at: Position) -> Result<(), CompileError> {
        let (else_label, end_label) = match self.branches.last() {
            Some(b) => (b.else_label.clone(), b.end_label.clone()),
            None => return Err(self.error(ErrorKind::Internal, at, "Branch without condition")),
        };
        self.emit(at, format!("jmp {end_label}"));
        self.emit_label(at, else_label);
        Ok(())
    }

    fn exit_if(&mut self, at: Position) -> Result<(), CompileError> {
        let branch = self
            .branches
            .pop()
            .ok_or_else(|| self.error(ErrorKind::Internal, at, "Branch without condition"))?;
        self.emit_label(at, branch.end_label);
        Ok(())
    }
}

impl TreeListener for CodeGenerator<'_> {
    type Error = CompileError;

    fn enter(&mut self, node: &ParseNode) -> Result<(), CompileError> {
        match &node.rule {
            Rule::Program => {
                let header = format!("{GENERATOR_NAME} {GENERATOR_VERSION} compiled {}", iso_timestamp());
                let comment = Instruction::comment(header, self.debug(node.start));
                self.instructions.push(comment);
            }
            Rule::Compound => self.push_scope(),
            Rule::FunctionHeader => self.parameters.clear(),
            Rule::FunDeclaration { name } => self.enter_function(name, node.start)?,
            _ => {}
        }
        Ok(())
    }

    fn exit(&mut self, node: &ParseNode) -> Result<(), CompileError> {
        let at = node.start;
        match &node.rule {
            Rule::Program => self.emit(at, "exit"),
            Rule::Compound => self.pop_scope(at)?,
            Rule::Unary { op } => {
                self.emit(at, if matches!(op, Token::Minus) { "neg" } else { "not" });
            }
            Rule::Logical { op } => {
                self.emit(at, if matches!(op, Token::And) { "and" } else { "or" });
            }
            Rule::Equality { op } => {
                self.emit(at, if matches!(op, Token::EqEq) { "eq" } else { "neq" });
            }
            Rule::Relational { op } => {
                let operation = if matches!(op, Token::Lt) {
                    "lt"
                } else if matches!(op, Token::Le) {
                    "lte"
                } else if matches!(op, Token::Gt) {
                    "gt"
                } else {
                    "gte"
                };
                self.emit(at, operation);
            }
            Rule::Additive { op } => {
                self.emit(at, if matches!(op, Token::Plus) { "add" } else { "sub" });
            }
            Rule::Multiplicative { op } => {
                let operation = if matches!(op, Token::Percent) {
                    "mod"
                } else if matches!(op, Token::Star) {
                    "mul"
                } else {
                    "div"
                };
                self.emit(at, operation);
            }
            Rule::Literal(token) => self.exit_literal(token, at)?,
            Rule::Name(word) => self.exit_name(word, at)?,
            Rule::ValDeclaration { name } => {
                self.exit_binding(Declaration::Val { name: name.clone() }, at)?;
            }
            Rule::VarDeclaration { name } => {
                self.exit_binding(Declaration::Var { name: name.clone() }, at)?;
            }
            Rule::Assignment { name } => self.exit_assignment(name, at)?,
            Rule::AliasDeclaration { name, target } => self.exit_alias(name, target, at)?,
            Rule::Parameter { name } => self.exit_parameter(name, at)?,
            Rule::FunctionHeader => self.exit_header(at)?,
            Rule::FunDeclaration { .. } => self.exit_function(at)?,
            Rule::NativeDeclaration { name } => self.exit_native(name, at)?,
            Rule::Call { name } => self.exit_call(name, node.children.len(), at)?,
            Rule::Condition => self.exit_condition(at),
            Rule::Then => self.exit_then(at)?,
            Rule::If => self.exit_if(at)?,
            Rule::Else => {}
        }
        Ok(())
    }
}

/// Resolve backslash escapes in a string literal body.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Embed a string value as a single-line double-quoted operand.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}
