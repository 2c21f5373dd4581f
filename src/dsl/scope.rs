//! Hierarchical symbol table with copy-on-branch scopes.
//!
//! A child scope starts as a snapshot copy of its parent's declarations.
//! After creation the two maps diverge: later additions to either side are
//! invisible to the other. Lookups never walk the parent chain.

use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeclarationKind {
    Var,
    Val,
    Fun,
    Als,
    Nat,
}

/// A named binding owned by exactly one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum Declaration {
    Var { name: String },
    Val { name: String },
    Fun {
        name: String,
        params: Vec<String>,
        /// Entry label of the function body.
        label: String,
    },
    Alias {
        name: String,
        /// Name of the aliased declaration.
        target: String,
    },
    Native { name: String, params: Vec<String> },
}

impl Declaration {
    pub fn name(&self) -> &str {
        match self {
            Declaration::Var { name }
            | Declaration::Val { name }
            | Declaration::Fun { name, .. }
            | Declaration::Alias { name, .. }
            | Declaration::Native { name, .. } => name,
        }
    }

    pub fn kind(&self) -> DeclarationKind {
        match self {
            Declaration::Var { .. } => DeclarationKind::Var,
            Declaration::Val { .. } => DeclarationKind::Val,
            Declaration::Fun { .. } => DeclarationKind::Fun,
            Declaration::Alias { .. } => DeclarationKind::Als,
            Declaration::Native { .. } => DeclarationKind::Nat,
        }
    }

    /// Declaration-site parameter names; empty for non-callables.
    pub fn params(&self) -> &[String] {
        match self {
            Declaration::Fun { params, .. } | Declaration::Native { params, .. } => params,
            _ => &[],
        }
    }
}

/// Index of a scope inside its [`ScopeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ScopeId(usize);

#[derive(Debug, Clone, Default, Serialize)]
pub struct Scope {
    parent: Option<ScopeId>,
    declarations: IndexMap<String, Declaration>,
    children: Vec<ScopeId>,
}

impl Scope {
    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    pub fn is_global(&self) -> bool {
        self.parent.is_none()
    }

    pub fn has_declaration(&self, name: &str) -> bool {
        self.declarations.contains_key(name)
    }

    pub fn get_declaration(&self, name: &str) -> Option<&Declaration> {
        self.declarations.get(name)
    }

    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.values()
    }

    pub fn children(&self) -> &[ScopeId] {
        &self.children
    }
}

/// Arena of all scopes created during one compilation. Slot 0 is the global
/// scope; scopes are never removed.
#[derive(Debug, Clone, Serialize)]
pub struct ScopeTable {
    scopes: Vec<Scope>,
}

impl Default for ScopeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTable {
    pub const GLOBAL: ScopeId = ScopeId(0);

    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    pub fn global(&self) -> &Scope {
        self.get(Self::GLOBAL)
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Insert into `id`'s own map, silently replacing a previous binding of
    /// the same name. Duplicate checks are the caller's job.
    pub fn add_declaration(&mut self, id: ScopeId, declaration: Declaration) {
        self.scopes[id.0]
            .declarations
            .insert(declaration.name().to_string(), declaration);
    }

    /// Create a child of `id` whose map is a snapshot copy of `id`'s map.
    pub fn create_child(&mut self, id: ScopeId) -> ScopeId {
        let child = ScopeId(self.scopes.len());
        let declarations = self.scopes[id.0].declarations.clone();
        self.scopes.push(Scope {
            parent: Some(id),
            declarations,
            children: Vec::new(),
        });
        self.scopes[id.0].children.push(child);
        child
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn val(name: &str) -> Declaration {
        Declaration::Val { name: name.into() }
    }

    #[test]
    fn global_scope_has_no_parent() {
        let table = ScopeTable::new();
        assert!(table.global().is_global());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn child_inherits_snapshot() {
        let mut table = ScopeTable::new();
        table.add_declaration(ScopeTable::GLOBAL, val("x"));
        let child = table.create_child(ScopeTable::GLOBAL);
        assert!(table.get(child).has_declaration("x"));
        assert!(!table.get(child).is_global());
        assert_eq!(table.get(child).parent(), Some(ScopeTable::GLOBAL));
        assert_eq!(table.global().children(), &[child]);
    }

    #[test]
    fn parent_additions_after_branch_are_invisible_to_child() {
        let mut table = ScopeTable::new();
        let s = table.create_child(ScopeTable::GLOBAL);
        let c = table.create_child(s);
        table.add_declaration(s, val("y"));
        assert!(table.get(s).has_declaration("y"));
        assert!(!table.get(c).has_declaration("y"));
    }

    #[test]
    fn child_additions_are_invisible_to_parent() {
        let mut table = ScopeTable::new();
        let c = table.create_child(ScopeTable::GLOBAL);
        table.add_declaration(c, val("z"));
        assert!(!table.global().has_declaration("z"));
    }

    #[test]
    fn add_declaration_overwrites_silently() {
        let mut table = ScopeTable::new();
        table.add_declaration(ScopeTable::GLOBAL, val("x"));
        table.add_declaration(ScopeTable::GLOBAL, Declaration::Var { name: "x".into() });
        let decl = table.global().get_declaration("x").unwrap();
        assert_eq!(decl.kind(), DeclarationKind::Var);
        assert_eq!(table.global().declarations().count(), 1);
    }

    #[test]
    fn callable_params_are_exposed() {
        let native = Declaration::Native {
            name: "draw".into(),
            params: vec!["x".into(), "y".into()],
        };
        assert_eq!(native.params(), ["x".to_string(), "y".to_string()]);
        assert!(val("v").params().is_empty());
    }
}
