//! Module dependency graph.
//!
//! Authoritative record of source modules and their import edges.
//! Pure data structure + traversal, no I/O.
//!
//! # Invariants
//! - Forward and reverse edges are always consistent:
//!   `B ∈ A.dependencies ⇔ A ∈ B.dependents`
//! - Cycles are permitted; traversal carries a visited set
//! - Registering a dependency id that has no node yet creates a placeholder
//!   node, so dependency/dependent registration order never matters

pub mod classify;

use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use classify::{Classification, classify, order_boundary};

// =============================================================================
// Identifiers and node metadata
// =============================================================================

/// Stable module identifier, normally the resolved module path.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// What kind of source module a node represents.
///
/// Placeholder nodes created for forward references default to `Module`
/// until their own registration arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Component,
    Store,
    Style,
    Asset,
    #[default]
    Module,
}

/// Hot-update acceptance declared by a module.
///
/// Stored as an explicit tagged variant per node; declaring nothing means
/// updates to or through the module always propagate upward.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Accept {
    /// No declaration: propagate.
    #[default]
    None,
    /// Module can hot-swap itself without propagating.
    SelfAccept,
    /// Module re-imports these dependencies itself when they change.
    Deps(FxHashSet<ModuleId>),
}

impl Accept {
    /// Whether the module accepts an update arriving over the edge from `dep`.
    pub fn accepts_dep(&self, dep: &ModuleId) -> bool {
        match self {
            Accept::Deps(ids) => ids.contains(dep),
            _ => false,
        }
    }

    pub fn accepts_self(&self) -> bool {
        matches!(self, Accept::SelfAccept)
    }
}

/// A module node with its import edges.
#[derive(Debug, Clone)]
pub struct ModuleNode {
    pub id: ModuleId,
    pub path: PathBuf,
    pub kind: ModuleKind,
    /// Module ids this module imports.
    pub dependencies: FxHashSet<ModuleId>,
    /// Module ids that import this module (inverse edge, kept in sync).
    pub dependents: FxHashSet<ModuleId>,
    pub accept: Accept,
    /// Flush tick of the last update walk that touched this node.
    pub last_invalidated: u64,
    /// False for placeholder nodes whose own registration has not arrived.
    pub registered: bool,
    /// Monotonic insertion index, used to break ordering ties.
    reg_index: u64,
}

impl ModuleNode {
    fn placeholder(id: ModuleId, reg_index: u64) -> Self {
        let path = PathBuf::from(id.as_str());
        Self {
            id,
            path,
            kind: ModuleKind::Module,
            dependencies: FxHashSet::default(),
            dependents: FxHashSet::default(),
            accept: Accept::None,
            last_invalidated: 0,
            registered: false,
            reg_index,
        }
    }

    pub fn reg_index(&self) -> u64 {
        self.reg_index
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Graph-level failures surfaced at the engine boundary.
///
/// These indicate corrupted internal state, not user error; the engine
/// never lets them escape to the file-watch caller.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("dangling edge: {from} -> {to} (node missing)")]
    DanglingEdge { from: ModuleId, to: ModuleId },
}

// =============================================================================
// Graph
// =============================================================================

/// In-memory directed graph of module nodes and import edges.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    nodes: FxHashMap<ModuleId, ModuleNode>,
    /// Resolved file path → module id, for routing watcher events.
    by_path: FxHashMap<PathBuf, ModuleId>,
    next_index: u64,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a module, rewiring its dependency edges to match
    /// `dependency_ids` exactly. Idempotent.
    ///
    /// Unknown dependency ids get placeholder nodes rather than failing,
    /// so registration order between importer and imported never matters.
    pub fn register_module(
        &mut self,
        id: ModuleId,
        path: impl Into<PathBuf>,
        kind: ModuleKind,
        dependency_ids: impl IntoIterator<Item = ModuleId>,
    ) {
        let path = path.into();
        let new_deps: FxHashSet<ModuleId> = dependency_ids
            .into_iter()
            .filter(|dep| *dep != id)
            .collect();

        // Upgrade placeholder or insert fresh node
        let node = self.ensure_node(id.clone());
        node.kind = kind;
        node.registered = true;
        let old_path = std::mem::replace(&mut node.path, path.clone());
        let old_deps = std::mem::take(&mut node.dependencies);

        if old_path != path {
            self.by_path.remove(&old_path);
        }
        self.by_path.insert(path, id.clone());

        // Remove stale reverse edges
        for dep in old_deps.difference(&new_deps) {
            if let Some(dep_node) = self.nodes.get_mut(dep) {
                dep_node.dependents.remove(&id);
            }
        }

        // Add new reverse edges (creating placeholders as needed)
        for dep in &new_deps {
            if !old_deps.contains(dep) {
                self.ensure_node(dep.clone()).dependents.insert(id.clone());
            }
        }

        if let Some(node) = self.nodes.get_mut(&id) {
            node.dependencies = new_deps;
        }
    }

    /// Record that `id` declared hot-update acceptance.
    ///
    /// Creates a placeholder if the module has not been registered yet:
    /// accept declarations may arrive before the import graph does.
    pub fn accept_hmr(&mut self, id: ModuleId, accept: Accept) {
        self.ensure_node(id).accept = accept;
    }

    /// Remove the node and all incident edges.
    ///
    /// Used when a module is permanently deleted from the source tree;
    /// update cycles never remove nodes implicitly.
    pub fn unregister(&mut self, id: &ModuleId) -> Option<ModuleNode> {
        let node = self.nodes.remove(id)?;
        self.by_path.remove(&node.path);

        for dep in &node.dependencies {
            if let Some(dep_node) = self.nodes.get_mut(dep) {
                dep_node.dependents.remove(id);
            }
        }
        for dependent in &node.dependents {
            if let Some(dep_node) = self.nodes.get_mut(dependent) {
                dep_node.dependencies.remove(id);
            }
        }
        Some(node)
    }

    /// Classify the effect of a change to `changed_id`.
    ///
    /// Exposed on the graph for introspection and testing; the engine goes
    /// through the same classifier during a flush.
    pub fn get_affected_modules(&self, changed_id: &ModuleId) -> Result<Classification, GraphError> {
        classify::classify(self, changed_id)
    }

    pub fn get(&self, id: &ModuleId) -> Option<&ModuleNode> {
        self.nodes.get(id)
    }

    /// Look up a module by its resolved file path.
    pub fn id_for_path(&self, path: &Path) -> Option<&ModuleId> {
        self.by_path.get(path)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleNode> {
        self.nodes.values()
    }

    /// Stamp the flush tick on a node touched by an update walk.
    pub(crate) fn touch(&mut self, id: &ModuleId, tick: u64) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.last_invalidated = tick;
        }
    }

    fn ensure_node(&mut self, id: ModuleId) -> &mut ModuleNode {
        let next_index = &mut self.next_index;
        self.nodes.entry(id.clone()).or_insert_with(|| {
            let node = ModuleNode::placeholder(id, *next_index);
            *next_index += 1;
            node
        })
    }

    /// Corrupt an edge for error-path testing.
    #[cfg(test)]
    pub(crate) fn insert_dangling_dependent(&mut self, id: &ModuleId, ghost: ModuleId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.dependents.insert(ghost);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ModuleId {
        ModuleId::from(s)
    }

    fn register(graph: &mut ModuleGraph, name: &str, deps: &[&str]) {
        graph.register_module(
            id(name),
            format!("/src/{name}"),
            ModuleKind::Module,
            deps.iter().map(|d| id(d)),
        );
    }

    #[test]
    fn new_graph_is_empty() {
        let graph = ModuleGraph::new();
        assert!(graph.is_empty());
        assert!(graph.get(&id("a.js")).is_none());
    }

    #[test]
    fn edges_are_bidirectional() {
        let mut graph = ModuleGraph::new();
        register(&mut graph, "app.jsx", &["util.js"]);

        let app = graph.get(&id("app.jsx")).unwrap();
        assert!(app.dependencies.contains(&id("util.js")));

        let util = graph.get(&id("util.js")).unwrap();
        assert!(util.dependents.contains(&id("app.jsx")));
    }

    #[test]
    fn unknown_dependency_creates_placeholder() {
        let mut graph = ModuleGraph::new();
        register(&mut graph, "app.jsx", &["not-yet.js"]);

        let placeholder = graph.get(&id("not-yet.js")).unwrap();
        assert!(!placeholder.registered);
        assert_eq!(placeholder.kind, ModuleKind::Module);

        // Late registration upgrades the placeholder in place
        register(&mut graph, "not-yet.js", &[]);
        let node = graph.get(&id("not-yet.js")).unwrap();
        assert!(node.registered);
        assert!(node.dependents.contains(&id("app.jsx")));
    }

    #[test]
    fn reregistration_rewires_edges_exactly() {
        let mut graph = ModuleGraph::new();
        register(&mut graph, "app.jsx", &["old.js", "kept.js"]);
        register(&mut graph, "app.jsx", &["kept.js", "new.js"]);

        let app = graph.get(&id("app.jsx")).unwrap();
        assert_eq!(app.dependencies.len(), 2);
        assert!(app.dependencies.contains(&id("kept.js")));
        assert!(app.dependencies.contains(&id("new.js")));

        // Stale reverse edge removed, new one added
        assert!(!graph.get(&id("old.js")).unwrap().dependents.contains(&id("app.jsx")));
        assert!(graph.get(&id("new.js")).unwrap().dependents.contains(&id("app.jsx")));
    }

    #[test]
    fn registration_is_idempotent() {
        let mut graph = ModuleGraph::new();
        register(&mut graph, "app.jsx", &["util.js"]);
        register(&mut graph, "app.jsx", &["util.js"]);

        assert_eq!(graph.len(), 2);
        let util = graph.get(&id("util.js")).unwrap();
        assert_eq!(util.dependents.len(), 1);
    }

    #[test]
    fn self_import_is_excluded() {
        let mut graph = ModuleGraph::new();
        register(&mut graph, "app.jsx", &["app.jsx", "util.js"]);

        let app = graph.get(&id("app.jsx")).unwrap();
        assert!(!app.dependencies.contains(&id("app.jsx")));
        assert_eq!(app.dependencies.len(), 1);
    }

    #[test]
    fn accept_before_registration() {
        let mut graph = ModuleGraph::new();
        graph.accept_hmr(id("counter.jsx"), Accept::SelfAccept);
        register(&mut graph, "counter.jsx", &[]);

        let node = graph.get(&id("counter.jsx")).unwrap();
        assert!(node.accept.accepts_self());
        assert!(node.registered);
    }

    #[test]
    fn unregister_removes_incident_edges() {
        let mut graph = ModuleGraph::new();
        register(&mut graph, "app.jsx", &["shared.js"]);
        register(&mut graph, "shared.js", &["leaf.js"]);

        graph.unregister(&id("shared.js"));

        assert!(graph.get(&id("shared.js")).is_none());
        assert!(!graph.get(&id("app.jsx")).unwrap().dependencies.contains(&id("shared.js")));
        assert!(!graph.get(&id("leaf.js")).unwrap().dependents.contains(&id("shared.js")));
    }

    #[test]
    fn path_lookup_follows_reregistration() {
        let mut graph = ModuleGraph::new();
        graph.register_module(id("app"), "/src/app.jsx", ModuleKind::Component, []);
        assert_eq!(graph.id_for_path(Path::new("/src/app.jsx")), Some(&id("app")));

        graph.register_module(id("app"), "/src/moved/app.jsx", ModuleKind::Component, []);
        assert!(graph.id_for_path(Path::new("/src/app.jsx")).is_none());
        assert_eq!(
            graph.id_for_path(Path::new("/src/moved/app.jsx")),
            Some(&id("app"))
        );
    }

    #[test]
    fn registration_order_is_monotonic() {
        let mut graph = ModuleGraph::new();
        register(&mut graph, "first.js", &[]);
        register(&mut graph, "second.js", &[]);

        let first = graph.get(&id("first.js")).unwrap().reg_index();
        let second = graph.get(&id("second.js")).unwrap().reg_index();
        assert!(first < second);
    }
}
