//! Reference Dependency Graph
//!
//! A petgraph view of a reference table: one node per definition, one edge
//! per `$ref` from a definition to another. Strongly connected components
//! find the recursive definitions; the rest are ordered dependencies first.
//!
//! Shared by code generation (emission order, which definitions need
//! `suspend`) and the `order` CLI command.

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, trace};

use crate::representation::References;

/// Definitions split by whether they take part in a cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologicalSort {
    /// Dependencies before dependents
    pub non_recursives: Vec<String>,
    /// Members of a cycle (including self references), in table order
    pub recursives: Vec<String>,
}

impl TopologicalSort {
    pub fn is_recursive(&self, name: &str) -> bool {
        self.recursives.iter().any(|r| r == name)
    }
}

pub struct ReferenceGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl ReferenceGraph {
    pub fn from_references(references: &References) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for name in references.keys() {
            index.insert(name.clone(), graph.add_node(name.clone()));
        }
        for (name, rep) in references {
            let from = index[name];
            for target in rep.references() {
                match index.get(&target) {
                    Some(&to) => {
                        graph.add_edge(from, to, ());
                    }
                    None => trace!(from = %name, to = %target, "reference outside the table, skipping edge"),
                }
            }
        }
        Self { graph, index }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Direct dependencies of `name`
    pub fn refs_out(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Definitions that reference `name`
    pub fn refs_in(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<&str> {
        let Some(&idx) = self.index.get(name) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = self
            .graph
            .neighbors_directed(idx, direction)
            .filter_map(|n| self.graph.node_weight(n).map(String::as_str))
            .collect();
        out.sort_by_key(|n| self.index[*n].index());
        out.dedup();
        out
    }

    /// Cycles: SCCs with more than one member, or a member referencing itself
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = kosaraju_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1
                    || self
                        .graph
                        .edges_directed(scc[0], Direction::Outgoing)
                        .any(|e| e.target() == scc[0])
            })
            .map(|mut scc| {
                scc.sort_by_key(|idx| idx.index());
                scc.into_iter().map(|idx| self.graph[idx].clone()).collect()
            })
            .collect();
        cycles.sort_by_key(|members| self.index[&members[0]].index());
        cycles
    }

    /// Kahn's algorithm over the acyclic part, ties broken by table order
    pub fn topological_sort(&self) -> TopologicalSort {
        let recursive: HashSet<NodeIndex> = self
            .cycles()
            .iter()
            .flatten()
            .map(|name| self.index[name])
            .collect();

        let mut pending: HashMap<NodeIndex, usize> = HashMap::new();
        for idx in self.graph.node_indices().filter(|idx| !recursive.contains(idx)) {
            let dependencies: HashSet<NodeIndex> = self
                .graph
                .neighbors_directed(idx, Direction::Outgoing)
                .filter(|dep| !recursive.contains(dep) && *dep != idx)
                .collect();
            pending.insert(idx, dependencies.len());
        }

        let mut ready: BTreeSet<usize> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(idx, _)| idx.index())
            .collect();
        let mut non_recursives = Vec::with_capacity(pending.len());
        while let Some(next) = ready.pop_first() {
            let idx = NodeIndex::new(next);
            non_recursives.push(self.graph[idx].clone());
            let dependents: HashSet<NodeIndex> = self.graph.neighbors_directed(idx, Direction::Incoming).collect();
            for dependent in dependents {
                if let Some(count) = pending.get_mut(&dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent.index());
                    }
                }
            }
        }

        let mut recursives: Vec<NodeIndex> = recursive.into_iter().collect();
        recursives.sort_by_key(|idx| idx.index());
        let sort = TopologicalSort {
            non_recursives,
            recursives: recursives.into_iter().map(|idx| self.graph[idx].clone()).collect(),
        };
        debug!(
            non_recursives = sort.non_recursives.len(),
            recursives = sort.recursives.len(),
            "sorted reference graph"
        );
        sort
    }

    /// GraphViz DOT, recursive definitions highlighted
    pub fn to_dot(&self) -> String {
        let recursive: HashSet<String> = self.cycles().into_iter().flatten().collect();
        let mut output = String::new();
        output.push_str("digraph References {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box, style=\"filled,rounded\", fontname=\"Helvetica\", fontsize=10];\n");
        output.push('\n');
        for name in self.graph.node_weights() {
            let color = if recursive.contains(name) { "#FF9800" } else { "#E0E0E0" };
            output.push_str(&format!("  \"{}\" [fillcolor=\"{}\"];\n", name, color));
        }
        output.push('\n');
        for edge in self.graph.edge_references() {
            output.push_str(&format!(
                "  \"{}\" -> \"{}\";\n",
                self.graph[edge.source()],
                self.graph[edge.target()]
            ));
        }
        output.push_str("}\n");
        output
    }
}

/// Order a reference table for emission
pub fn topological_sort(references: &References) -> TopologicalSort {
    ReferenceGraph::from_references(references).topological_sort()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::representation::{PropertySignature, Representation, RepresentationKind};
    use crate::value::PropertyKey;

    fn refs_to(targets: &[&str]) -> Representation {
        Representation::new(RepresentationKind::TypeLiteral {
            property_signatures: targets
                .iter()
                .map(|t| PropertySignature {
                    name: PropertyKey::from(*t),
                    ty: Representation::reference(*t),
                    is_optional: false,
                    is_mutable: false,
                    key_annotations: Default::default(),
                })
                .collect(),
            index_signatures: Vec::new(),
        })
    }

    fn table(entries: &[(&str, &[&str])]) -> References {
        entries
            .iter()
            .map(|(name, targets)| (name.to_string(), refs_to(targets)))
            .collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let references = table(&[("C", &["B"]), ("B", &["A"]), ("A", &[]), ("D", &[])]);
        let sort = topological_sort(&references);
        assert_eq!(sort.non_recursives, vec!["A", "B", "C", "D"]);
        assert!(sort.recursives.is_empty());
    }

    #[test]
    fn test_cycles_are_recursive() {
        let references = table(&[
            ("Tree", &["Forest"]),
            ("Forest", &["Tree"]),
            ("List", &["List"]),
            ("Leaf", &[]),
            ("Root", &["Tree", "Leaf"]),
        ]);
        let graph = ReferenceGraph::from_references(&references);
        assert_eq!(
            graph.cycles(),
            vec![vec!["Tree".to_string(), "Forest".to_string()], vec!["List".to_string()]]
        );
        let sort = graph.topological_sort();
        assert_eq!(sort.non_recursives, vec!["Leaf", "Root"]);
        assert_eq!(sort.recursives, vec!["Tree", "Forest", "List"]);
        assert!(sort.is_recursive("List"));
        assert_eq!(graph.refs_in("Tree"), vec!["Forest", "Root"]);
    }

    #[test]
    fn test_dot_lists_edges() {
        let references = table(&[("A", &["B"]), ("B", &[])]);
        let dot = ReferenceGraph::from_references(&references).to_dot();
        assert!(dot.contains("\"A\" -> \"B\";"));
    }
}
