//! Resource dependency graph, cycle detection and deployment ordering.
//!
//! Nodes are resource logical ids in declaration order. An edge `A -> B` means
//! `A` depends on `B`: one of `A`'s property expressions references `B` (via
//! `Ref`, `Fn::GetAtt` or an `Fn::Sub` placeholder, at any depth including both
//! branches of an `Fn::If`), or `A` lists `B` in `DependsOn`.
//!
//! Cycle detection is a three-colour depth-first search in declaration order.
//! Ordering uses Kahn's algorithm with the ready set keyed by declaration index,
//! so independent resources keep the order they were declared in.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use anyhow::{anyhow, Result};
use indexmap::{IndexMap, IndexSet};

use crate::app::cfn_resources::ResourceRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Dependency graph over the declared resources of one template.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Logical id -> indices of the resources it depends on, first-seen order.
    nodes: IndexMap<String, IndexSet<usize>>,
    /// Reverse adjacency, by node index.
    dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Build the graph from declared resources.
    ///
    /// References to ids that are not declared are dropped here; the resolver
    /// reports them.
    pub fn build(resources: &ResourceRegistry) -> Self {
        let mut nodes: IndexMap<String, IndexSet<usize>> = IndexMap::new();

        for decl in resources.resources() {
            let mut dependencies = IndexSet::new();
            for value in decl.expressions() {
                for target in value.referenced_resources() {
                    if let Some(index) = resources.resource_index(target) {
                        dependencies.insert(index);
                    }
                }
            }
            for target in &decl.depends_on {
                if let Some(index) = resources.resource_index(target) {
                    dependencies.insert(index);
                }
            }
            nodes.insert(decl.logical_id.clone(), dependencies);
        }

        Self::from_nodes(nodes)
    }

    /// Build the graph of conditions referring to other conditions, through
    /// `Condition` or the first argument of `Fn::If`.
    pub fn build_conditions(resources: &ResourceRegistry) -> Self {
        let nodes = resources
            .conditions()
            .map(|condition| {
                let dependencies = condition
                    .expression
                    .referenced_conditions()
                    .into_iter()
                    .filter_map(|name| resources.condition_index(name))
                    .collect();
                (condition.name.clone(), dependencies)
            })
            .collect();

        Self::from_nodes(nodes)
    }

    fn from_nodes(nodes: IndexMap<String, IndexSet<usize>>) -> Self {
        let mut dependents = vec![Vec::new(); nodes.len()];
        for (index, dependencies) in nodes.values().enumerate() {
            for &dependency in dependencies {
                dependents[dependency].push(index);
            }
        }

        let graph = Self { nodes, dependents };
        log_debug!(
            "Built dependency graph with {} nodes and {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        graph
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|deps| deps.len()).sum()
    }

    pub fn contains(&self, logical_id: &str) -> bool {
        self.nodes.contains_key(logical_id)
    }

    /// Logical ids in declaration order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|k| k.as_str())
    }

    /// Resources `logical_id` depends on, in the order they were first referenced.
    pub fn dependencies_of(&self, logical_id: &str) -> Vec<&str> {
        self.nodes
            .get(logical_id)
            .map(|deps| deps.iter().map(|&i| self.id_at(i)).collect())
            .unwrap_or_default()
    }

    /// Resources that depend on `logical_id`, in declaration order.
    pub fn dependents_of(&self, logical_id: &str) -> Vec<&str> {
        self.nodes
            .get_index_of(logical_id)
            .map(|index| self.dependents[index].iter().map(|&i| self.id_at(i)).collect())
            .unwrap_or_default()
    }

    fn id_at(&self, index: usize) -> &str {
        self.nodes
            .get_index(index)
            .map(|(id, _)| id.as_str())
            .unwrap_or_default()
    }

    pub fn has_cycle(&self) -> bool {
        !self.detect_cycles().is_empty()
    }

    /// Every distinct cycle found by the search.
    ///
    /// Each cycle lists its members in dependency order, rotated so the
    /// lexicographically smallest id comes first. A resource that depends on
    /// itself yields a single-element cycle.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let mut colors = vec![Color::White; self.nodes.len()];
        let mut stack = Vec::new();
        let mut seen = HashSet::new();
        let mut cycles = Vec::new();

        for start in 0..self.nodes.len() {
            if colors[start] == Color::White {
                self.visit(start, &mut colors, &mut stack, &mut seen, &mut cycles);
            }
        }

        cycles
    }

    fn visit(
        &self,
        node: usize,
        colors: &mut [Color],
        stack: &mut Vec<usize>,
        seen: &mut HashSet<Vec<String>>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        colors[node] = Color::Gray;
        stack.push(node);

        let dependencies = self.nodes.get_index(node).map(|(_, deps)| deps);
        for &next in dependencies.into_iter().flatten() {
            match colors[next] {
                Color::White => self.visit(next, colors, stack, seen, cycles),
                Color::Gray => {
                    // Back edge: the cycle is the stack suffix starting at `next`
                    if let Some(pos) = stack.iter().position(|&n| n == next) {
                        let cycle = self.normalize_cycle(&stack[pos..]);
                        if seen.insert(cycle.clone()) {
                            log_debug!("Found dependency cycle: {}", cycle.join(" -> "));
                            cycles.push(cycle);
                        }
                    }
                }
                Color::Black => {}
            }
        }

        stack.pop();
        colors[node] = Color::Black;
    }

    fn normalize_cycle(&self, members: &[usize]) -> Vec<String> {
        let mut cycle: Vec<String> = members.iter().map(|&i| self.id_at(i).to_string()).collect();
        if let Some(min_pos) = cycle
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.cmp(b.1))
            .map(|(pos, _)| pos)
        {
            cycle.rotate_left(min_pos);
        }
        cycle
    }

    /// Deployment order: every resource after everything it depends on, ties
    /// broken by declaration order.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut remaining: Vec<usize> = self.nodes.values().map(|deps| deps.len()).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = remaining
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(index, _)| Reverse(index))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(index)) = ready.pop() {
            order.push(self.id_at(index).to_string());
            for &dependent in &self.dependents[index] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(anyhow!(
                "Circular dependency detected - cannot determine deployment order"
            ));
        }

        Ok(order)
    }
}
