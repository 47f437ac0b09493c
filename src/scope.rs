//! Nested variable and rule lookup (`BindingEnv` in the original Ninja
//! sources).
//!
//! A [`Scope`] holds the bindings and rules introduced at one nesting
//! level -- the top-level manifest, or a `subninja`'s private scope --
//! plus a reference to its parent. Lookups walk the parent chain.
//! Scopes form a tree: children borrow their parent via [`Rc`] and
//! outlive none of them, so no weak references are needed.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::eval::{EvalString, Env};

/// The rule-binding keys Ninja understands; anything else on a `rule`
/// block is a parse error.
pub const RESERVED_BINDINGS: &[&str] = &[
    "command",
    "depfile",
    "dyndep",
    "description",
    "deps",
    "generator",
    "pool",
    "restat",
    "rspfile",
    "rspfile_content",
    "msvc_deps_prefix",
    "symlink_outputs",
];

pub fn is_reserved_binding(name: &str) -> bool {
    RESERVED_BINDINGS.contains(&name)
}

/// The name of the ever-present, scope-less `phony` rule.
pub const PHONY: &str = "phony";

/// A reusable command template: a name plus a set of reserved bindings.
/// Immutable once added to a scope.
#[derive(Debug)]
pub struct Rule {
    pub name: String,
    bindings: FxHashMap<String, EvalString>,
}

impl Rule {
    pub fn new(name: impl Into<String>) -> Self {
        Rule {
            name: name.into(),
            bindings: FxHashMap::default(),
        }
    }

    pub fn add_binding(&mut self, key: impl Into<String>, value: EvalString) {
        self.bindings.insert(key.into(), value);
    }

    pub fn get_binding(&self, key: &str) -> Option<&EvalString> {
        self.bindings.get(key)
    }

    /// The built-in rule used to group targets with no command.
    pub fn phony() -> Self {
        Rule::new(PHONY)
    }
}

/// A nested lookup context for variables and rules.
#[derive(Debug)]
pub struct Scope {
    parent: Option<Rc<Scope>>,
    bindings: std::cell::RefCell<FxHashMap<String, String>>,
    rules: std::cell::RefCell<FxHashMap<String, Rc<Rule>>>,
}

impl Scope {
    /// Construct the root scope, seeded with the global `phony` rule.
    /// `phony` is not owned by any *user* scope -- it lives here,
    /// at the root, and is excluded from the duplicate-rule check that
    /// applies to rules a manifest defines itself.
    pub fn root() -> Rc<Scope> {
        let scope = Rc::new(Scope {
            parent: None,
            bindings: std::cell::RefCell::new(FxHashMap::default()),
            rules: std::cell::RefCell::new(FxHashMap::default()),
        });
        scope
            .rules
            .borrow_mut()
            .insert(PHONY.to_string(), Rc::new(Rule::phony()));
        scope
    }

    /// Construct a child scope (used for `subninja` and edge-local scopes).
    pub fn child(parent: Rc<Scope>) -> Rc<Scope> {
        Rc::new(Scope {
            parent: Some(parent),
            bindings: std::cell::RefCell::new(FxHashMap::default()),
            rules: std::cell::RefCell::new(FxHashMap::default()),
        })
    }

    pub fn add_binding(&self, key: impl Into<String>, value: String) {
        self.bindings.borrow_mut().insert(key.into(), value);
    }

    /// Look up a variable, falling through to the parent scope. Missing
    /// variables resolve to the empty string.
    pub fn lookup_variable(&self, key: &str) -> String {
        if let Some(v) = self.bindings.borrow().get(key) {
            return v.clone();
        }
        match &self.parent {
            Some(p) => p.lookup_variable(key),
            None => String::new(),
        }
    }

    /// Add a rule to this scope's own rule table. Fails if a rule by this
    /// name already exists *in this scope* (shadowing an outer scope's
    /// rule of the same name is fine).
    pub fn add_rule(&self, rule: Rule) -> Result<(), String> {
        if self.lookup_rule_current_scope(&rule.name).is_some() {
            return Err(format!("duplicate rule '{}'", rule.name));
        }
        self.rules
            .borrow_mut()
            .insert(rule.name.clone(), Rc::new(rule));
        Ok(())
    }

    pub fn lookup_rule_current_scope(&self, name: &str) -> Option<Rc<Rule>> {
        self.rules.borrow().get(name).cloned()
    }

    /// Look up a rule, walking the parent chain.
    pub fn lookup_rule(&self, name: &str) -> Option<Rc<Rule>> {
        if let Some(r) = self.rules.borrow().get(name) {
            return Some(r.clone());
        }
        match &self.parent {
            Some(p) => p.lookup_rule(name),
            None => None,
        }
    }

    /// Edge-binding lookup: edge-local scope first, then the rule's
    /// binding (evaluated in the edge's own scope, so `$out`-style
    /// edge-local variables apply to it too), then the enclosing scope.
    pub fn lookup_with_fallback(&self, var: &str, eval: Option<&EvalString>, env: &dyn Env) -> String {
        if let Some(v) = self.bindings.borrow().get(var) {
            return v.clone();
        }
        if let Some(eval) = eval {
            return eval.evaluate(&[env]);
        }
        match &self.parent {
            Some(p) => p.lookup_variable(var),
            None => String::new(),
        }
    }
}

impl Env for Scope {
    fn get_var(&self, name: &str) -> Option<String> {
        Some(self.lookup_variable(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_parent_chain() {
        let root = Scope::root();
        root.add_binding("a", "1".to_string());
        let child = Scope::child(root.clone());
        assert_eq!(child.lookup_variable("a"), "1");
        assert_eq!(child.lookup_variable("missing"), "");
    }

    #[test]
    fn child_shadows_without_mutating_parent() {
        let root = Scope::root();
        root.add_binding("a", "1".to_string());
        let child = Scope::child(root.clone());
        child.add_binding("a", "2".to_string());
        assert_eq!(child.lookup_variable("a"), "2");
        assert_eq!(root.lookup_variable("a"), "1");
    }

    #[test]
    fn phony_exists_at_root_and_is_not_owned_elsewhere() {
        let root = Scope::root();
        assert!(root.lookup_rule(PHONY).is_some());
        let child = Scope::child(root.clone());
        // Visible through the parent chain, but not re-inserted into child.
        assert!(child.lookup_rule(PHONY).is_some());
        assert!(child.lookup_rule_current_scope(PHONY).is_none());
    }

    #[test]
    fn duplicate_rule_in_same_scope_fails() {
        let root = Scope::root();
        root.add_rule(Rule::new("cc")).unwrap();
        let err = root.add_rule(Rule::new("cc")).unwrap_err();
        assert!(err.contains("duplicate rule"));
    }

    #[test]
    fn rule_can_be_redefined_in_child_scope() {
        let root = Scope::root();
        root.add_rule(Rule::new("cc")).unwrap();
        let child = Scope::child(root.clone());
        // Shadowing in a child scope is allowed.
        assert!(child.add_rule(Rule::new("cc")).is_ok());
    }

    #[test]
    fn edge_binding_fallback_order() {
        // rule r { command = echo $x; x = rule }
        // build o: r i { x = edge }
        // Evaluating "command" on the edge should yield "echo edge".
        let root = Scope::root();
        let mut rule = Rule::new("r");
        let mut command = EvalString::new();
        command.add_text("echo ");
        command.add_special("x");
        rule.add_binding("command", command);
        let mut rule_x = EvalString::new();
        rule_x.add_text("rule");
        rule.add_binding("x", rule_x);
        root.add_rule(rule).unwrap();

        let rule = root.lookup_rule("r").unwrap();
        let edge_scope = Scope::child(root.clone());
        edge_scope.add_binding("x", "edge".to_string());

        let command_eval = rule.get_binding("command").unwrap();
        let resolved = edge_scope.lookup_with_fallback(
            "command",
            Some(command_eval),
            &*edge_scope,
        );
        assert_eq!(resolved, "echo edge");
    }
}
