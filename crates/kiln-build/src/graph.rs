//! Target dependency graph, cycle detection and incremental topological order
//!
//! Targets are stored in an arena and addressed by [`NodeId`]; names are only
//! used at the edges of the API. An edge `u -> v` means "`u` depends on `v`",
//! so `v` has to be built first.

use crate::error::{BuildError, BuildResult};
use crate::target::Target;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt::Write as _;
use std::ops::Deref;

/// Stable index of a target in a [`DependencyGraph`]
pub type NodeId = usize;

/// A dependency cycle, in edge order, with the first node repeated at the end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    pub path: Vec<String>,
}

impl Cycle {
    /// Distinct targets taking part in the cycle
    pub fn members(&self) -> BTreeSet<&str> {
        self.path.iter().map(String::as_str).collect()
    }
}

impl std::fmt::Display for Cycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path.join(" → "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Directed graph over target names
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    names: Vec<String>,
    index: HashMap<String, NodeId>,
    /// `dependencies[u]` lists every `v` with an edge `u -> v`
    dependencies: Vec<Vec<NodeId>>,
    /// Reverse adjacency: `dependents[v]` lists every `u` with `u -> v`
    dependents: Vec<Vec<NodeId>>,
}

impl DependencyGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a target list.
    ///
    /// All targets are added first, so declaration order does not matter;
    /// a dependency on an undeclared target is an error.
    pub fn from_targets(targets: &[Target]) -> BuildResult<Self> {
        let mut graph = Self::new();
        for target in targets {
            graph.add_target(&target.name)?;
        }
        for target in targets {
            for dep in &target.dependencies {
                graph.add_edge(&target.name, dep)?;
            }
        }
        Ok(graph)
    }

    /// Add a target node
    pub fn add_target(&mut self, name: &str) -> BuildResult<NodeId> {
        if self.index.contains_key(name) {
            return Err(BuildError::DuplicateTarget {
                target: name.to_string(),
            });
        }
        Ok(self.push_node(name))
    }

    fn push_node(&mut self, name: &str) -> NodeId {
        let id = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), id);
        self.dependencies.push(Vec::new());
        self.dependents.push(Vec::new());
        id
    }

    fn link(&mut self, from: NodeId, to: NodeId) {
        if !self.dependencies[from].contains(&to) {
            self.dependencies[from].push(to);
            self.dependents[to].push(from);
        }
    }

    /// Record that `from` depends on `to`.
    ///
    /// Both targets must already exist. Repeated edges are ignored.
    pub fn add_edge(&mut self, from: &str, to: &str) -> BuildResult<()> {
        let from_id = self
            .node_id(from)
            .ok_or_else(|| BuildError::target_not_found(from))?;
        let to_id = self
            .node_id(to)
            .ok_or_else(|| BuildError::unknown_dependency(from, to))?;

        self.link(from_id, to_id);
        Ok(())
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).copied()
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.names[id]
    }

    /// Target names in insertion order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Targets `id` depends on
    pub fn dependencies(&self, id: NodeId) -> &[NodeId] {
        &self.dependencies[id]
    }

    /// Targets that depend on `id`
    pub fn dependents(&self, id: NodeId) -> &[NodeId] {
        &self.dependents[id]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.dependencies.iter().map(Vec::len).sum()
    }

    /// Find a dependency cycle, if any.
    ///
    /// Depth-first search with three marks. Reaching a node that is still in
    /// progress closes a cycle; reaching a finished node (as in a diamond)
    /// does not.
    pub fn detect_cycle(&self) -> Option<Cycle> {
        let mut marks = vec![Mark::Unvisited; self.len()];

        for root in 0..self.len() {
            if marks[root] == Mark::Unvisited {
                if let Some(cycle) = self.dfs_find_cycle(root, &mut marks) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    /// Iterative DFS from `root`. Each frame is a node and the index of the
    /// next dependency edge to follow, so the frames double as the path.
    fn dfs_find_cycle(&self, root: NodeId, marks: &mut [Mark]) -> Option<Cycle> {
        let mut frames: Vec<(NodeId, usize)> = vec![(root, 0)];
        marks[root] = Mark::InProgress;

        while let Some(frame) = frames.last_mut() {
            let (id, next) = *frame;
            let Some(&dep) = self.dependencies[id].get(next) else {
                marks[id] = Mark::Done;
                frames.pop();
                continue;
            };
            frame.1 += 1;

            match marks[dep] {
                Mark::InProgress => {
                    let start = frames.iter().position(|&(n, _)| n == dep).unwrap_or(0);
                    let mut path: Vec<String> = frames[start..]
                        .iter()
                        .map(|&(n, _)| self.names[n].clone())
                        .collect();
                    path.push(self.names[dep].clone());
                    return Some(Cycle { path });
                }
                Mark::Unvisited => {
                    marks[dep] = Mark::InProgress;
                    frames.push((dep, 0));
                }
                Mark::Done => {}
            }
        }
        None
    }

    /// Certify the graph as acyclic so it can be scheduled
    pub fn check(self) -> BuildResult<CheckedGraph> {
        if let Some(cycle) = self.detect_cycle() {
            return Err(BuildError::CircularDependency(cycle.to_string()));
        }
        Ok(CheckedGraph(self))
    }

    /// Group targets into levels that can be built concurrently.
    ///
    /// Level `n` holds every target whose dependencies all sit in earlier
    /// levels. Names inside a level are sorted.
    pub fn topological_batches(&self) -> BuildResult<Vec<Vec<String>>> {
        let mut tracker = InDegreeTracker::new(self);
        let mut batches = Vec::new();
        let mut level = tracker.take_ready();
        let mut placed = 0;

        while !level.is_empty() {
            placed += level.len();
            let mut next = Vec::new();
            for &id in &level {
                next.extend(tracker.complete(self, id));
            }
            let mut names: Vec<String> = level.iter().map(|&id| self.names[id].clone()).collect();
            names.sort();
            batches.push(names);
            level = next;
        }

        if placed != self.len() {
            let cycle = self
                .detect_cycle()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown cycle".to_string());
            return Err(BuildError::CircularDependency(cycle));
        }
        Ok(batches)
    }

    /// Every target that transitively depends on one of `seeds`, seeds
    /// excluded unless reachable from another seed.
    pub fn transitive_dependents(&self, seeds: &[NodeId]) -> Vec<NodeId> {
        self.walk(seeds, &self.dependents)
    }

    /// Every target that one of `roots` transitively depends on, plus the
    /// roots themselves.
    pub fn dependency_closure(&self, roots: &[NodeId]) -> Vec<NodeId> {
        let mut closure = self.walk(roots, &self.dependencies);
        for &root in roots {
            if !closure.contains(&root) {
                closure.push(root);
            }
        }
        closure.sort_unstable();
        closure
    }

    fn walk(&self, starts: &[NodeId], edges: &[Vec<NodeId>]) -> Vec<NodeId> {
        let mut seen = vec![false; self.len()];
        let mut queue: VecDeque<NodeId> = starts.iter().copied().collect();
        let mut reached = Vec::new();

        while let Some(id) = queue.pop_front() {
            for &next in &edges[id] {
                if !seen[next] {
                    seen[next] = true;
                    reached.push(next);
                    queue.push_back(next);
                }
            }
        }
        reached
    }

    /// Graph over `ids` only, keeping the edges between them. Node ids are
    /// renumbered in the order given.
    pub fn subgraph(&self, ids: &[NodeId]) -> DependencyGraph {
        let mut mapped: Vec<Option<NodeId>> = vec![None; self.len()];
        let mut sub = Self::new();
        for &id in ids {
            if mapped[id].is_none() {
                mapped[id] = Some(sub.push_node(&self.names[id]));
            }
        }
        for &id in ids {
            let Some(from) = mapped[id] else { continue };
            for &dep in &self.dependencies[id] {
                if let Some(to) = mapped[dep] {
                    sub.link(from, to);
                }
            }
        }
        sub
    }

    /// Render the graph in Graphviz DOT format
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph kiln {\n    rankdir=LR;\n");
        for name in &self.names {
            let _ = writeln!(out, "    \"{}\";", escape_dot(name));
        }
        for (from, deps) in self.dependencies.iter().enumerate() {
            for &to in deps {
                let _ = writeln!(
                    out,
                    "    \"{}\" -> \"{}\";",
                    escape_dot(&self.names[from]),
                    escape_dot(&self.names[to])
                );
            }
        }
        out.push_str("}\n");
        out
    }
}

fn escape_dot(name: &str) -> String {
    name.replace('\\', "\\\\").replace('"', "\\\"")
}

/// A graph that has been checked to contain no cycles.
///
/// Only [`DependencyGraph::check`] creates one, so the scheduler can never
/// be handed an unchecked graph.
#[derive(Debug, Clone)]
pub struct CheckedGraph(DependencyGraph);

impl CheckedGraph {
    pub fn into_inner(self) -> DependencyGraph {
        self.0
    }

    /// Restrict to `ids`. Removing nodes cannot introduce a cycle.
    pub fn subgraph(&self, ids: &[NodeId]) -> CheckedGraph {
        CheckedGraph(self.0.subgraph(ids))
    }
}

impl Deref for CheckedGraph {
    type Target = DependencyGraph;

    fn deref(&self) -> &DependencyGraph {
        &self.0
    }
}

/// Live in-degree counters for Kahn's algorithm run incrementally.
///
/// A target becomes ready once every dependency has been reported complete.
#[derive(Debug, Clone)]
pub struct InDegreeTracker {
    remaining: Vec<usize>,
    released: Vec<bool>,
}

impl InDegreeTracker {
    pub fn new(graph: &DependencyGraph) -> Self {
        Self {
            remaining: graph.dependencies.iter().map(Vec::len).collect(),
            released: vec![false; graph.len()],
        }
    }

    /// Targets with no outstanding dependencies that have not been handed
    /// out yet.
    pub fn take_ready(&mut self) -> Vec<NodeId> {
        let mut ready = Vec::new();
        for (id, &count) in self.remaining.iter().enumerate() {
            if count == 0 && !self.released[id] {
                ready.push(id);
            }
        }
        for &id in &ready {
            self.released[id] = true;
        }
        ready
    }

    /// Report `id` complete and return the dependents that just became ready
    pub fn complete(&mut self, graph: &DependencyGraph, id: NodeId) -> Vec<NodeId> {
        let mut ready = Vec::new();
        for &dependent in graph.dependents(id) {
            let count = &mut self.remaining[dependent];
            *count = count.saturating_sub(1);
            if *count == 0 && !self.released[dependent] {
                self.released[dependent] = true;
                ready.push(dependent);
            }
        }
        ready
    }

    /// Dependencies of `id` not yet complete
    pub fn remaining(&self, id: NodeId) -> usize {
        self.remaining[id]
    }
}
