//! Measure dependency graph.
//!
//! Built from a [`ModelMetadata`] by scanning every measure's formula for
//! references. Nodes are measure names and table-qualified column names
//! (`Table[Column]`); edges point from a measure to what it references.
//!
//! Reference resolution:
//!
//! - `[X]` is a measure named `X` if one exists, else column `X` of the
//!   measure's own table, else column `X` of the first table that has one
//! - `T[X]` is column `X` of table `T` if it exists, else a measure named `X`
//! - names that resolve to nothing are ignored
//! - a measure never depends on itself
//!
//! Circular references are reported in [`DependencyGraph::cycles`] and
//! logged; they do not fail the build.

pub mod cycles;
pub mod tokenizer;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use petgraph::Direction;
use serde::Serialize;
use tracing::{debug, warn};

use crate::model::{Measure, ModelMetadata};

pub use cycles::find_cycles;
pub use tokenizer::{references, Reference};

/// Node label for a column.
pub fn column_key(table: &str, column: &str) -> String {
    format!("{table}[{column}]")
}

/// Directed reference graph over measures and columns.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyGraph {
    /// Measure name → names it references. Every measure has an entry.
    edges: BTreeMap<String, BTreeSet<String>>,
    /// Participant sets of circular references.
    cycles: Vec<BTreeSet<String>>,
    #[serde(skip)]
    graph: DiGraph<String, ()>,
    #[serde(skip)]
    index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Scan every measure of `model`.
    pub fn build(model: &ModelMetadata) -> Self {
        let resolver = Resolver::new(model);

        let mut edges = BTreeMap::new();
        for measure in model.measures() {
            let targets = resolver.dependencies(measure);
            debug!(measure = %measure.name, count = targets.len(), "measure references");
            edges
                .entry(measure.name.clone())
                .or_insert_with(BTreeSet::new)
                .extend(targets);
        }

        Self::from_edges(edges)
    }

    /// Build from a precomputed adjacency map.
    pub fn from_edges(edges: BTreeMap<String, BTreeSet<String>>) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        let mut node = |graph: &mut DiGraph<String, ()>, name: &str| {
            *index
                .entry(name.to_string())
                .or_insert_with(|| graph.add_node(name.to_string()))
        };
        for (from, targets) in &edges {
            let from_idx = node(&mut graph, from);
            for to in targets {
                let to_idx = node(&mut graph, to);
                graph.add_edge(from_idx, to_idx, ());
            }
        }

        let cycles = find_cycles(&edges);
        for cycle in &cycles {
            let members: Vec<&str> = cycle.iter().map(String::as_str).collect();
            warn!(members = ?members, "circular measure reference");
        }

        Self {
            edges,
            cycles,
            graph,
            index,
        }
    }

    /// Adjacency map: measure → referenced names.
    pub fn edges(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.edges
    }

    pub fn cycles(&self) -> &[BTreeSet<String>] {
        &self.cycles
    }

    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }

    /// Direct references of a measure.
    pub fn dependencies_of(&self, measure: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(measure)
    }

    /// Measures that reference `name` directly.
    pub fn dependents_of(&self, name: &str) -> BTreeSet<String> {
        let Some(&idx) = self.index.get(name) else {
            return BTreeSet::new();
        };
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .map(|n| self.graph[n].clone())
            .collect()
    }

    /// Everything `name` reaches, directly or through other measures.
    pub fn transitive_dependencies(&self, name: &str) -> BTreeSet<String> {
        let Some(&start) = self.index.get(name) else {
            return BTreeSet::new();
        };
        let mut reached = BTreeSet::new();
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(idx) = dfs.next(&self.graph) {
            if idx != start {
                reached.insert(self.graph[idx].clone());
            }
        }
        reached
    }

    /// Every measure affected by a change to `name`.
    pub fn transitive_dependents(&self, name: &str) -> BTreeSet<String> {
        let Some(&start) = self.index.get(name) else {
            return BTreeSet::new();
        };
        let reversed = Reversed(&self.graph);
        let mut reached = BTreeSet::new();
        let mut dfs = Dfs::new(reversed, start);
        while let Some(idx) = dfs.next(reversed) {
            if idx != start {
                reached.insert(self.graph[idx].clone());
            }
        }
        reached
    }
}

/// Name lookups for resolving references against one model.
struct Resolver<'a> {
    measures: BTreeSet<&'a str>,
    /// Table → its column names.
    columns: HashMap<&'a str, BTreeSet<&'a str>>,
    /// Tables in model order, for unqualified column fallback.
    table_order: Vec<&'a str>,
}

impl<'a> Resolver<'a> {
    fn new(model: &'a ModelMetadata) -> Self {
        Self {
            measures: model.measures().iter().map(|m| m.name.as_str()).collect(),
            columns: model
                .tables()
                .iter()
                .map(|t| {
                    let names = t.columns.iter().map(|c| c.name.as_str()).collect();
                    (t.name.as_str(), names)
                })
                .collect(),
            table_order: model.tables().iter().map(|t| t.name.as_str()).collect(),
        }
    }

    fn has_column(&self, table: &str, column: &str) -> bool {
        self.columns
            .get(table)
            .is_some_and(|cols| cols.contains(column))
    }

    fn resolve(&self, measure: &Measure, reference: &Reference) -> Option<String> {
        let name = reference.name.as_str();
        match &reference.table {
            Some(table) if self.has_column(table, name) => Some(column_key(table, name)),
            Some(_) => self.measures.contains(name).then(|| name.to_string()),
            None if self.measures.contains(name) => Some(name.to_string()),
            None if self.has_column(&measure.table, name) => Some(column_key(&measure.table, name)),
            None => self
                .table_order
                .iter()
                .find(|table| self.has_column(table, name))
                .map(|table| column_key(table, name)),
        }
    }

    fn dependencies(&self, measure: &Measure) -> BTreeSet<String> {
        references(&measure.expression)
            .iter()
            .filter_map(|r| self.resolve(measure, r))
            .filter(|target| *target != measure.name)
            .collect()
    }
}
