//! File dependency graph with cycle detection.
//!
//! The graph is derived state: nodes are file paths, and every edge comes
//! from some analysis's `dependencies` list. Edges point dep → dependent
//! ("depended upon by"), so dependents are outgoing neighbors and
//! dependencies are incoming neighbors. Edges are never hand-edited; a
//! file's edges are replaced wholesale when its analysis is upserted.
//!
//! Edge targets may be **pending**: a file can depend on a path that has no
//! analysis yet (not analyzed, or deleted). Pending targets get placeholder
//! nodes and resolve naturally when their analysis arrives.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::types::FileAnalysis;

/// Maximum BFS depth for traversals feeding impact and ranking.
///
/// Beyond this, transitive relationships are too dilute to be useful signal.
pub const MAX_TRAVERSAL_DEPTH: u32 = 3;

/// Sentinel depth for files unreachable from a BFS origin.
pub const UNREACHABLE_DEPTH: u32 = u32::MAX;

/// In-memory dependency graph over file analyses.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    analyses: HashMap<PathBuf, Arc<FileAnalysis>>,
    graph: DiGraph<PathBuf, ()>,
    node_ids: HashMap<PathBuf, NodeIndex>,
}

impl DependencyGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files with a known analysis.
    #[must_use]
    pub fn len(&self) -> usize {
        self.analyses.len()
    }

    /// Whether the graph holds no analyses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.analyses.is_empty()
    }

    /// The analysis for a file, if known.
    #[must_use]
    pub fn analysis(&self, path: &Path) -> Option<&Arc<FileAnalysis>> {
        self.analyses.get(path)
    }

    /// Iterate over all known analyses.
    pub fn analyses(&self) -> impl Iterator<Item = &Arc<FileAnalysis>> {
        self.analyses.values()
    }

    /// Paths of all known analyses, sorted for deterministic iteration.
    #[must_use]
    pub fn paths(&self) -> Vec<&Path> {
        let mut paths: Vec<&Path> = self.analyses.keys().map(PathBuf::as_path).collect();
        paths.sort_unstable();
        paths
    }

    /// Insert or replace the analysis for a file, replacing its dependency
    /// edges wholesale.
    pub fn upsert(&mut self, analysis: Arc<FileAnalysis>) {
        let path_idx = self.ensure_node(&analysis.path);

        // Drop the file's previous dependency edges (its incoming edges).
        while let Some(edge) = self.graph.first_edge(path_idx, Direction::Incoming) {
            self.graph.remove_edge(edge);
        }

        for dep in &analysis.dependencies {
            if *dep == analysis.path {
                // Self-dependencies carry no information.
                continue;
            }
            let dep_idx = self.ensure_node(dep);
            self.graph.update_edge(dep_idx, path_idx, ());
        }

        tracing::debug!(
            path = %analysis.path.display(),
            dependency_count = analysis.dependencies.len(),
            "graph upsert"
        );
        self.analyses.insert(analysis.path.clone(), analysis);
    }

    /// Remove a file's analysis.
    ///
    /// Its dependency edges are dropped. If other files still depend on the
    /// path, the node stays behind as a pending placeholder so their edges
    /// survive.
    pub fn remove(&mut self, path: &Path) {
        self.analyses.remove(path);
        let Some(&idx) = self.node_ids.get(path) else {
            return;
        };

        while let Some(edge) = self.graph.first_edge(idx, Direction::Incoming) {
            self.graph.remove_edge(edge);
        }

        let still_depended_upon = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .next()
            .is_some();
        if !still_depended_upon {
            self.node_ids.remove(path);
            self.graph.remove_node(idx);
            // remove_node swaps the last node into the freed index.
            if let Some(moved) = self.graph.node_weight(idx) {
                self.node_ids.insert(moved.clone(), idx);
            }
        }
    }

    /// Files that depend on `path` directly, sorted.
    #[must_use]
    pub fn dependents_of(&self, path: &Path) -> Vec<PathBuf> {
        self.neighbors_sorted(path, Direction::Outgoing)
    }

    /// Files that `path` depends on directly, sorted.
    #[must_use]
    pub fn dependencies_of(&self, path: &Path) -> Vec<PathBuf> {
        self.neighbors_sorted(path, Direction::Incoming)
    }

    fn neighbors_sorted(&self, path: &Path, direction: Direction) -> Vec<PathBuf> {
        let Some(&idx) = self.node_ids.get(path) else {
            return Vec::new();
        };
        let mut neighbors: Vec<PathBuf> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        neighbors.sort_unstable();
        neighbors
    }

    fn ensure_node(&mut self, path: &Path) -> NodeIndex {
        if let Some(&idx) = self.node_ids.get(path) {
            return idx;
        }
        let idx = self.graph.add_node(path.to_path_buf());
        self.node_ids.insert(path.to_path_buf(), idx);
        idx
    }

    // ========================================================================
    // Cycle Detection
    // ========================================================================

    /// Find all dependency cycles.
    ///
    /// Standard DFS cycle detection with a visited set and recursion stack:
    /// a back edge (an edge to a node still on the current DFS path) closes
    /// a cycle, reported as the path slice from the repeated node. Cycles
    /// are normalized (rotated so the lexicographically smallest path comes
    /// first) and deduplicated; self-loops are not reported.
    #[must_use]
    pub fn detect_cycles(&self) -> Vec<Vec<PathBuf>> {
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut rec_stack: HashSet<NodeIndex> = HashSet::new();
        let mut path: Vec<NodeIndex> = Vec::new();
        let mut cycles: Vec<Vec<NodeIndex>> = Vec::new();

        tracing::debug!(
            node_count = self.graph.node_count(),
            edge_count = self.graph.edge_count(),
            "starting cycle detection with DFS"
        );

        // Deterministic start order: node indices ascend with insertion.
        for start in self.graph.node_indices() {
            if !visited.contains(&start) {
                self.dfs_visit_for_cycles(
                    start,
                    &mut visited,
                    &mut rec_stack,
                    &mut path,
                    &mut cycles,
                );
            }
        }

        let raw_cycle_count = cycles.len();
        let unique = self.deduplicate_cycles(cycles);

        tracing::debug!(
            raw_cycles = raw_cycle_count,
            unique_cycles = unique.len(),
            "cycle detection complete"
        );
        unique
    }

    fn dfs_visit_for_cycles(
        &self,
        node: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        rec_stack: &mut HashSet<NodeIndex>,
        path: &mut Vec<NodeIndex>,
        cycles: &mut Vec<Vec<NodeIndex>>,
    ) {
        visited.insert(node);
        rec_stack.insert(node);
        path.push(node);

        for neighbor in self.graph.neighbors_directed(node, Direction::Outgoing) {
            if !visited.contains(&neighbor) {
                self.dfs_visit_for_cycles(neighbor, visited, rec_stack, path, cycles);
            } else if rec_stack.contains(&neighbor) {
                // Back edge: the cycle is the path slice from the repeat.
                if let Some(start_idx) = path.iter().position(|&n| n == neighbor) {
                    cycles.push(path[start_idx..].to_vec());
                }
            }
        }

        path.pop();
        rec_stack.remove(&node);
    }

    /// Normalize (rotate smallest-path first) and deduplicate cycles.
    ///
    /// Only the starting point is normalized, not direction: in a directed
    /// graph A→B→C→A and A→C→B→A are distinct cycles.
    fn deduplicate_cycles(&self, cycles: Vec<Vec<NodeIndex>>) -> Vec<Vec<PathBuf>> {
        let mut seen: HashSet<Vec<PathBuf>> = HashSet::new();
        let mut unique: Vec<Vec<PathBuf>> = Vec::new();

        for cycle in cycles {
            // Self-loops between a file and itself are not dependency cycles.
            if cycle.len() < 2 {
                continue;
            }
            let paths: Vec<PathBuf> = cycle.iter().map(|&n| self.graph[n].clone()).collect();
            let normalized = normalize_cycle(&paths);
            if seen.insert(normalized.clone()) {
                unique.push(normalized);
            }
        }

        unique
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// BFS depth of every file reachable from `origin` within
    /// [`MAX_TRAVERSAL_DEPTH`], following edges in both directions.
    ///
    /// The origin maps to depth 0. Files not in the result are unreachable
    /// within the cap; callers use [`UNREACHABLE_DEPTH`] as their sentinel.
    #[must_use]
    pub fn depth_from(&self, origin: &Path) -> HashMap<PathBuf, u32> {
        let mut depths: HashMap<PathBuf, u32> = HashMap::new();
        let Some(&origin_idx) = self.node_ids.get(origin) else {
            return depths;
        };

        let mut queue: VecDeque<(NodeIndex, u32)> = VecDeque::new();
        let mut seen: HashSet<NodeIndex> = HashSet::new();
        queue.push_back((origin_idx, 0));
        seen.insert(origin_idx);

        while let Some((node, depth)) = queue.pop_front() {
            depths.insert(self.graph[node].clone(), depth);
            if depth >= MAX_TRAVERSAL_DEPTH {
                continue;
            }
            for direction in [Direction::Outgoing, Direction::Incoming] {
                for neighbor in self.graph.neighbors_directed(node, direction) {
                    if seen.insert(neighbor) {
                        queue.push_back((neighbor, depth + 1));
                    }
                }
            }
        }

        depths
    }

    /// Dependents reachable from `path` beyond the direct ones, via BFS over
    /// dependents-of-dependents capped at `max_depth`. Excludes `path`
    /// itself and its direct dependents.
    #[must_use]
    pub fn transitive_dependents_of(&self, path: &Path, max_depth: u32) -> Vec<PathBuf> {
        let Some(&origin_idx) = self.node_ids.get(path) else {
            return Vec::new();
        };

        let mut seen: HashSet<NodeIndex> = HashSet::new();
        seen.insert(origin_idx);
        let mut queue: VecDeque<(NodeIndex, u32)> = VecDeque::new();

        // Direct dependents seed the BFS but are excluded from the result;
        // only nodes discovered past them are transitive.
        for neighbor in self.graph.neighbors_directed(origin_idx, Direction::Outgoing) {
            if seen.insert(neighbor) {
                queue.push_back((neighbor, 1));
            }
        }

        let mut transitive: Vec<PathBuf> = Vec::new();
        while let Some((node, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for neighbor in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if seen.insert(neighbor) {
                    transitive.push(self.graph[neighbor].clone());
                    queue.push_back((neighbor, depth + 1));
                }
            }
        }

        transitive.sort_unstable();
        transitive
    }
}

/// Rotate a cycle so the lexicographically smallest path comes first.
fn normalize_cycle(cycle: &[PathBuf]) -> Vec<PathBuf> {
    if cycle.is_empty() {
        return Vec::new();
    }
    let min_idx = cycle
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map_or(0, |(idx, _)| idx);

    let mut normalized = Vec::with_capacity(cycle.len());
    normalized.extend_from_slice(&cycle[min_idx..]);
    normalized.extend_from_slice(&cycle[..min_idx]);
    normalized
}
