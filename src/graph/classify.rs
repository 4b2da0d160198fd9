//! Update classification.
//!
//! Pure functions over the module graph: given a changed module id, decide
//! whether the update can be applied surgically at a set of boundary
//! modules or must fall back to a full reload. No I/O, no side effects.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use super::{GraphError, ModuleGraph, ModuleId};

// =============================================================================
// Classification result
// =============================================================================

/// Boundary modules plus the interior nodes the walk climbed through.
///
/// The interior is needed later: boundary emission order is a topological
/// sort over dependency paths that avoid the affected interior.
#[derive(Debug, Default)]
pub struct BoundarySet {
    pub modules: FxHashSet<ModuleId>,
    pub interior: FxHashSet<ModuleId>,
}

impl BoundarySet {
    /// Union another boundary set into this one (batch coalescing).
    pub fn merge(&mut self, other: BoundarySet) {
        self.modules.extend(other.modules);
        self.interior.extend(other.interior);
    }
}

/// Outcome of classifying a single changed module.
#[derive(Debug)]
pub enum Classification {
    /// The module declared self-acceptance; the boundary is exactly itself.
    SelfUpdate(ModuleId),
    /// Propagation stopped at these accepting modules.
    Boundary(BoundarySet),
    /// No safe surgical update exists; the client must reload.
    FullReload,
}

impl Classification {
    pub fn is_full_reload(&self) -> bool {
        matches!(self, Classification::FullReload)
    }
}

// =============================================================================
// Invalidation walk
// =============================================================================

/// Classify a change to `changed`.
///
/// Breadth-first walk over *dependents* (the modules affected by the
/// change): a dependent that declared acceptance for the edge it was
/// reached through becomes a boundary and is not expanded; a dependent
/// with no dependents of its own is an entry module and collapses the
/// whole classification to a full reload.
///
/// Acceptance is checked per edge, before the visited-set check: a module
/// may be a boundary for one incoming edge and interior for another.
pub fn classify(graph: &ModuleGraph, changed: &ModuleId) -> Result<Classification, GraphError> {
    let Some(origin) = graph.get(changed) else {
        // Unknown module: nothing to invalidate safely
        return Ok(Classification::FullReload);
    };

    if origin.accept.accepts_self() {
        return Ok(Classification::SelfUpdate(changed.clone()));
    }

    if origin.dependents.is_empty() {
        // The changed module is itself an entry module
        return Ok(Classification::FullReload);
    }

    let mut boundary = FxHashSet::default();
    let mut interior = FxHashSet::default();
    let mut visited = FxHashSet::default();
    let mut queue: VecDeque<(ModuleId, ModuleId)> = VecDeque::new();

    interior.insert(changed.clone());
    visited.insert(changed.clone());
    for dependent in &origin.dependents {
        queue.push_back((changed.clone(), dependent.clone()));
    }

    while let Some((source, current)) = queue.pop_front() {
        let node = graph.get(&current).ok_or_else(|| GraphError::DanglingEdge {
            from: source.clone(),
            to: current.clone(),
        })?;

        if node.accept.accepts_dep(&source) {
            // Boundary: this module re-imports `source` itself
            boundary.insert(current);
            continue;
        }

        if !visited.insert(current.clone()) {
            continue;
        }

        if node.dependents.is_empty() {
            // Reached a root without acceptance: no partial update is safe
            return Ok(Classification::FullReload);
        }

        interior.insert(current.clone());
        for dependent in &node.dependents {
            queue.push_back((current.clone(), dependent.clone()));
        }
    }

    if boundary.is_empty() {
        // Possible with cycles that never reach a root or an acceptor
        return Ok(Classification::FullReload);
    }

    Ok(Classification::Boundary(BoundarySet {
        modules: boundary,
        interior,
    }))
}

// =============================================================================
// Boundary ordering
// =============================================================================

/// Order boundary modules dependency-before-dependent.
///
/// Topological sort restricted to the boundary set, following dependency
/// paths through the unaffected part of the graph (interior nodes are
/// skipped). Ties and cycles fall back to registration order, so output is
/// deterministic for any input.
pub fn order_boundary(
    graph: &ModuleGraph,
    modules: &FxHashSet<ModuleId>,
    interior: &FxHashSet<ModuleId>,
) -> Vec<ModuleId> {
    // prerequisites[b] = boundary modules b transitively depends on,
    // reachable without passing through the affected interior
    let mut prerequisites: Vec<(ModuleId, FxHashSet<ModuleId>)> = Vec::with_capacity(modules.len());

    for module in modules {
        let mut prereqs = FxHashSet::default();
        let mut seen = FxHashSet::default();
        let mut stack: Vec<ModuleId> = graph
            .get(module)
            .map(|n| n.dependencies.iter().cloned().collect())
            .unwrap_or_default();

        while let Some(dep) = stack.pop() {
            if dep == *module || !seen.insert(dep.clone()) {
                continue;
            }
            if modules.contains(&dep) {
                // Stop at the first boundary module; its own prerequisites
                // are collected in its own pass
                prereqs.insert(dep);
                continue;
            }
            if interior.contains(&dep) {
                continue;
            }
            if let Some(node) = graph.get(&dep) {
                stack.extend(node.dependencies.iter().cloned());
            }
        }
        prerequisites.push((module.clone(), prereqs));
    }

    // Kahn's algorithm; ready set drained in registration order
    let mut ordered = Vec::with_capacity(modules.len());
    let mut remaining = prerequisites;

    while !remaining.is_empty() {
        let mut ready: Vec<ModuleId> = remaining
            .iter()
            .filter(|(_, prereqs)| prereqs.is_empty())
            .map(|(id, _)| id.clone())
            .collect();

        if ready.is_empty() {
            // Dependency cycle among boundary modules: emit the rest in
            // registration order rather than stalling
            let mut rest: Vec<ModuleId> = remaining.iter().map(|(id, _)| id.clone()).collect();
            rest.sort_by_key(|id| reg_index(graph, id));
            ordered.extend(rest);
            break;
        }

        ready.sort_by_key(|id| reg_index(graph, id));
        let emitted: FxHashSet<ModuleId> = ready.iter().cloned().collect();
        ordered.extend(ready);

        remaining.retain_mut(|(id, prereqs)| {
            if emitted.contains(id) {
                return false;
            }
            prereqs.retain(|p| !emitted.contains(p));
            true
        });
    }

    ordered
}

fn reg_index(graph: &ModuleGraph, id: &ModuleId) -> u64 {
    graph.get(id).map_or(u64::MAX, |n| n.reg_index())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Accept, ModuleKind};

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

    fn accepts_deps(graph: &mut ModuleGraph, name: &str, deps: &[&str]) {
        graph.accept_hmr(id(name), Accept::Deps(deps.iter().map(|d| id(d)).collect()));
    }

    fn boundary_ids(classification: Classification) -> FxHashSet<ModuleId> {
        match classification {
            Classification::Boundary(set) => set.modules,
            other => panic!("expected boundary, got {other:?}"),
        }
    }

    #[test]
    fn unknown_module_is_full_reload() {
        let graph = ModuleGraph::new();
        let result = classify(&graph, &id("ghost.js")).unwrap();
        assert!(result.is_full_reload());
    }

    #[test]
    fn self_accepting_module_is_its_own_boundary() {
        let mut graph = ModuleGraph::new();
        register(&mut graph, "counter.jsx", &[]);
        register(&mut graph, "app.jsx", &["counter.jsx"]);
        graph.accept_hmr(id("counter.jsx"), Accept::SelfAccept);

        match classify(&graph, &id("counter.jsx")).unwrap() {
            Classification::SelfUpdate(m) => assert_eq!(m, id("counter.jsx")),
            other => panic!("expected self update, got {other:?}"),
        }
    }

    #[test]
    fn accepted_dependency_stops_at_dependent() {
        // B depends on A and declared acceptance for A
        let mut graph = ModuleGraph::new();
        register(&mut graph, "a.js", &[]);
        register(&mut graph, "b.jsx", &["a.js"]);
        accepts_deps(&mut graph, "b.jsx", &["a.js"]);

        let boundary = boundary_ids(classify(&graph, &id("a.js")).unwrap());
        assert_eq!(boundary.len(), 1);
        assert!(boundary.contains(&id("b.jsx")));
    }

    #[test]
    fn unaccepted_change_reaching_root_is_full_reload() {
        // Same shape, but B never declared acceptance and has no dependents
        let mut graph = ModuleGraph::new();
        register(&mut graph, "a.js", &[]);
        register(&mut graph, "b.jsx", &["a.js"]);

        assert!(classify(&graph, &id("a.js")).unwrap().is_full_reload());
    }

    #[test]
    fn changed_entry_module_is_full_reload() {
        let mut graph = ModuleGraph::new();
        register(&mut graph, "util.js", &[]);
        register(&mut graph, "entry.jsx", &["util.js"]);

        assert!(classify(&graph, &id("entry.jsx")).unwrap().is_full_reload());
    }

    #[test]
    fn propagation_climbs_until_acceptance() {
        // leaf <- mid <- top, top accepts mid
        let mut graph = ModuleGraph::new();
        register(&mut graph, "leaf.js", &[]);
        register(&mut graph, "mid.js", &["leaf.js"]);
        register(&mut graph, "top.jsx", &["mid.js"]);
        accepts_deps(&mut graph, "top.jsx", &["mid.js"]);

        let boundary = boundary_ids(classify(&graph, &id("leaf.js")).unwrap());
        assert_eq!(boundary.len(), 1);
        assert!(boundary.contains(&id("top.jsx")));
    }

    #[test]
    fn cycle_terminates_and_visits_each_node_once() {
        // a <-> b, with c importing both and accepting both
        let mut graph = ModuleGraph::new();
        register(&mut graph, "a.js", &["b.js"]);
        register(&mut graph, "b.js", &["a.js"]);
        register(&mut graph, "c.jsx", &["a.js", "b.js"]);
        accepts_deps(&mut graph, "c.jsx", &["a.js", "b.js"]);

        let boundary = boundary_ids(classify(&graph, &id("a.js")).unwrap());
        assert_eq!(boundary.len(), 1);
        assert!(boundary.contains(&id("c.jsx")));
    }

    #[test]
    fn cycle_without_acceptor_is_full_reload() {
        let mut graph = ModuleGraph::new();
        register(&mut graph, "a.js", &["b.js"]);
        register(&mut graph, "b.js", &["a.js"]);

        assert!(classify(&graph, &id("a.js")).unwrap().is_full_reload());
    }

    #[test]
    fn acceptance_is_per_edge() {
        // d imports both a and b but accepts only a; a change to b must
        // climb past d even though d accepts something
        let mut graph = ModuleGraph::new();
        register(&mut graph, "a.js", &[]);
        register(&mut graph, "b.js", &[]);
        register(&mut graph, "d.jsx", &["a.js", "b.js"]);
        register(&mut graph, "root.jsx", &["d.jsx"]);
        accepts_deps(&mut graph, "d.jsx", &["a.js"]);
        accepts_deps(&mut graph, "root.jsx", &["d.jsx"]);

        let boundary = boundary_ids(classify(&graph, &id("a.js")).unwrap());
        assert!(boundary.contains(&id("d.jsx")));

        let boundary = boundary_ids(classify(&graph, &id("b.js")).unwrap());
        assert!(!boundary.contains(&id("d.jsx")));
        assert!(boundary.contains(&id("root.jsx")));
    }

    #[test]
    fn dangling_edge_is_an_error() {
        let mut graph = ModuleGraph::new();
        register(&mut graph, "a.js", &[]);
        register(&mut graph, "b.jsx", &["a.js"]);
        accepts_deps(&mut graph, "b.jsx", &["a.js"]);
        graph.insert_dangling_dependent(&id("a.js"), id("ghost.js"));

        let err = classify(&graph, &id("a.js")).unwrap_err();
        assert!(matches!(err, GraphError::DanglingEdge { .. }));
    }

    #[test]
    fn boundary_order_lists_dependency_first() {
        // widget depends on theme through unaffected shared.js; both are
        // boundaries for a change to tokens.js
        let mut graph = ModuleGraph::new();
        register(&mut graph, "tokens.js", &[]);
        register(&mut graph, "theme.jsx", &["tokens.js"]);
        register(&mut graph, "shared.js", &["theme.jsx"]);
        register(&mut graph, "widget.jsx", &["tokens.js", "shared.js"]);
        register(&mut graph, "root.jsx", &["theme.jsx", "widget.jsx"]);
        accepts_deps(&mut graph, "theme.jsx", &["tokens.js"]);
        accepts_deps(&mut graph, "widget.jsx", &["tokens.js"]);

        let set = match classify(&graph, &id("tokens.js")).unwrap() {
            Classification::Boundary(set) => set,
            other => panic!("expected boundary, got {other:?}"),
        };
        let ordered = order_boundary(&graph, &set.modules, &set.interior);

        let theme_pos = ordered.iter().position(|m| *m == id("theme.jsx")).unwrap();
        let widget_pos = ordered.iter().position(|m| *m == id("widget.jsx")).unwrap();
        assert!(theme_pos < widget_pos, "dependency must be listed first");
    }

    #[test]
    fn boundary_order_ties_break_by_registration() {
        let mut graph = ModuleGraph::new();
        register(&mut graph, "shared.js", &[]);
        register(&mut graph, "alpha.jsx", &["shared.js"]);
        register(&mut graph, "beta.jsx", &["shared.js"]);
        accepts_deps(&mut graph, "alpha.jsx", &["shared.js"]);
        accepts_deps(&mut graph, "beta.jsx", &["shared.js"]);

        let set = match classify(&graph, &id("shared.js")).unwrap() {
            Classification::Boundary(set) => set,
            other => panic!("expected boundary, got {other:?}"),
        };
        let ordered = order_boundary(&graph, &set.modules, &set.interior);
        assert_eq!(ordered, vec![id("alpha.jsx"), id("beta.jsx")]);
    }
}
