//! The build graph: `State`, `Edge`, `Node`, and `Pool`.
//!
//! These are nominally external collaborators the Interpreter only
//! consumes (the downstream scheduler owns their full lifecycle), but
//! a standalone crate needs *some* concrete implementation to populate
//! and to let its own tests observe the result of a parse. This is a
//! deliberately thin, single-threaded model: no concurrent access, no
//! mtimes or hashes (those belong to the build log/scheduler this
//! crate doesn't implement), just the fields and operations the
//! Interpreter's `BUILD`/`POOL`/`DEFAULT` handling actually needs.
//!
//! Grounded on the shape of `n2::graph::{Graph, File, Build}` (ids
//! indexing dense storage, a file's producing build tracked on the
//! node itself) but without `n2`'s `Arc`/`Mutex`/`ConcurrentLinkedList`
//! machinery, none of which is needed once there's only one thread.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::scope::{Rule, Scope};

pub type NodeId = usize;
pub type EdgeId = usize;

/// A file referenced as an input or output somewhere in the graph.
#[derive(Debug)]
pub struct Node {
    pub path: String,
    /// The edge that produces this file, if any (`None` for a source file).
    pub producer: Option<EdgeId>,
}

/// A named, bounded-concurrency slot referenced by edges via the
/// reserved `pool` rule/edge binding.
#[derive(Debug, Clone)]
pub struct Pool {
    pub name: String,
    pub depth: i32,
}

/// One `build` statement: a rule application binding inputs to outputs.
pub struct Edge {
    pub rule: Rc<Rule>,
    /// The edge-local scope, seeded with this build's own `key = value`
    /// bindings (already evaluated -- see `Interpreter::interpret_build`).
    pub env: Rc<Scope>,
    /// Outputs: `[0..explicit_outs)` explicit, the rest implicit.
    pub outputs: Vec<NodeId>,
    pub explicit_outs: usize,
    /// Inputs: `[0..explicit_ins)` explicit, then `implicit_ins` implicit,
    /// then the remainder order-only.
    pub inputs: Vec<NodeId>,
    pub explicit_ins: usize,
    pub implicit_ins: usize,
    pub order_only_ins: usize,
    pub validations: Vec<NodeId>,
    pub pool: Option<String>,
    pub dyndep: Option<NodeId>,
}

impl Edge {
    /// Resolves `key` with the edge-binding fallback order: edge-local
    /// scope, then the rule's own `EvalString` for `key` evaluated in
    /// this edge's scope, then the enclosing scope.
    pub fn get_binding(&self, key: &str) -> String {
        self.env
            .lookup_with_fallback(key, self.rule.get_binding(key), self.env.as_ref())
    }

    /// The `dyndep` binding, or `None` if absent/empty.
    pub fn get_unescaped_dyndep(&self) -> Option<String> {
        let v = self.get_binding("dyndep");
        if v.is_empty() {
            None
        } else {
            Some(v)
        }
    }

    /// Whether this edge is structurally eligible for the phony
    /// self-cycle filter: a `phony` rule with exactly one output.
    pub fn maybe_phonycycle_diagnostic(&self) -> bool {
        self.rule.name == crate::scope::PHONY && self.outputs.len() == 1
    }
}

pub struct State {
    /// The root (top-level manifest) scope.
    pub bindings: Rc<Scope>,
    pub nodes: Vec<Node>,
    node_index: FxHashMap<String, NodeId>,
    pub edges: Vec<Edge>,
    pools: FxHashMap<String, Pool>,
    pub defaults: Vec<NodeId>,
}

impl State {
    pub fn new() -> State {
        State {
            bindings: Scope::root(),
            nodes: Vec::new(),
            node_index: FxHashMap::default(),
            edges: Vec::new(),
            pools: FxHashMap::default(),
            defaults: Vec::new(),
        }
    }

    /// Returns the node for `path`, creating it (as a sourceless node)
    /// if this is the first time it's been referenced.
    pub fn get_node(&mut self, path: &str) -> NodeId {
        if let Some(&id) = self.node_index.get(path) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            path: path.to_string(),
            producer: None,
        });
        self.node_index.insert(path.to_string(), id);
        id
    }

    /// The edge that already produces `node`, if any -- used by the
    /// Interpreter to detect a duplicate output before committing a new
    /// edge.
    pub fn node_producer(&self, node: NodeId) -> Option<EdgeId> {
        self.nodes[node].producer
    }

    pub fn lookup_pool(&self, name: &str) -> Option<&Pool> {
        self.pools.get(name)
    }

    pub fn add_pool(&mut self, pool: Pool) -> Result<(), String> {
        if self.pools.contains_key(&pool.name) {
            return Err(format!("duplicate pool '{}'", pool.name));
        }
        self.pools.insert(pool.name.clone(), pool);
        Ok(())
    }

    pub fn add_default(&mut self, node: NodeId) {
        self.defaults.push(node);
    }

    /// Commits a fully-resolved build statement to the graph: wires each
    /// output's `producer` to the new edge and appends it. Callers are
    /// expected to have already applied duplicate-output and
    /// phony-self-cycle filtering -- an edge with zero surviving outputs
    /// should never reach here (the Interpreter discards it instead).
    #[allow(clippy::too_many_arguments)]
    pub fn add_build(
        &mut self,
        rule: Rc<Rule>,
        env: Rc<Scope>,
        outputs: Vec<NodeId>,
        explicit_outs: usize,
        inputs: Vec<NodeId>,
        explicit_ins: usize,
        implicit_ins: usize,
        order_only_ins: usize,
        validations: Vec<NodeId>,
        pool: Option<String>,
        dyndep: Option<NodeId>,
    ) -> EdgeId {
        let edge_id = self.edges.len();
        for &out in &outputs {
            self.nodes[out].producer = Some(edge_id);
        }
        self.edges.push(Edge {
            rule,
            env,
            outputs,
            explicit_outs,
            inputs,
            explicit_ins,
            implicit_ins,
            order_only_ins,
            validations,
            pool,
            dyndep,
        });
        edge_id
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Rule;

    #[test]
    fn get_node_is_idempotent() {
        let mut state = State::new();
        let a = state.get_node("foo.c");
        let b = state.get_node("foo.c");
        assert_eq!(a, b);
        assert_eq!(state.nodes.len(), 1);
    }

    #[test]
    fn add_build_wires_producer() {
        let mut state = State::new();
        let out = state.get_node("foo.o");
        let inp = state.get_node("foo.c");
        let rule = Rc::new(Rule::new("cc"));
        let env = Scope::child(state.bindings.clone());
        assert!(state.node_producer(out).is_none());
        let edge_id = state.add_build(rule, env, vec![out], 1, vec![inp], 1, 0, 0, vec![], None, None);
        assert_eq!(state.node_producer(out), Some(edge_id));
        assert!(state.node_producer(inp).is_none());
    }

    #[test]
    fn duplicate_pool_rejected() {
        let mut state = State::new();
        state
            .add_pool(Pool {
                name: "link".to_string(),
                depth: 2,
            })
            .unwrap();
        let err = state
            .add_pool(Pool {
                name: "link".to_string(),
                depth: 4,
            })
            .unwrap_err();
        assert!(err.contains("duplicate pool"));
    }
}
