//! Citation graph representation
//!
//! Directed, simple graph keyed by canonical paper id. Nodes and edges keep
//! insertion order so snapshots list them in discovery order. Nodes whose
//! record carries a DOI can also be looked up by that DOI.

use indexmap::{IndexMap, IndexSet};
use refnet_common::models::{Paper, PaperId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// In-memory citation graph
#[derive(Debug, Default)]
pub struct CitationGraph {
    /// All nodes in admission order
    nodes: IndexMap<PaperId, Arc<Paper>>,

    /// Adjacency list: paper_id -> papers it cites
    outgoing: HashMap<PaperId, IndexSet<PaperId>>,

    /// Reverse adjacency: paper_id -> papers citing it
    incoming: HashMap<PaperId, IndexSet<PaperId>>,

    /// (citing, cited) pairs in insertion order
    edges: IndexSet<(PaperId, PaperId)>,

    /// Lowercased DOI URL -> node key
    dois: HashMap<String, PaperId>,
}

fn doi_key(id: &PaperId) -> String {
    id.as_str().to_lowercase()
}

impl CitationGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node keyed by the paper's own id; false if already present
    pub fn insert_node(&mut self, paper: Arc<Paper>) -> bool {
        if self.nodes.contains_key(&paper.id) {
            return false;
        }
        if let Some(doi) = paper.doi_id() {
            self.dois.insert(doi_key(&doi), paper.id.clone());
        }
        self.nodes.insert(paper.id.clone(), paper);
        true
    }

    /// Node key of the paper carrying this DOI
    pub fn resolve_doi(&self, doi: &PaperId) -> Option<&PaperId> {
        self.dois.get(&doi_key(doi))
    }

    /// Add a citing -> cited edge
    ///
    /// Both endpoints must already be nodes. Self-loops and repeated pairs
    /// are refused.
    pub fn add_edge(&mut self, citing: &PaperId, cited: &PaperId) -> bool {
        if citing == cited || !self.nodes.contains_key(citing) || !self.nodes.contains_key(cited) {
            return false;
        }
        if !self.edges.insert((citing.clone(), cited.clone())) {
            return false;
        }

        self.outgoing.entry(citing.clone()).or_default().insert(cited.clone());
        self.incoming.entry(cited.clone()).or_default().insert(citing.clone());
        true
    }

    /// Remove a node with all incident edges
    ///
    /// Returns the paper and the number of edges dropped.
    pub fn remove_node(&mut self, id: &PaperId) -> Option<(Arc<Paper>, usize)> {
        let paper = self.nodes.shift_remove(id)?;
        if let Some(doi) = paper.doi_id() {
            self.dois.remove(&doi_key(&doi));
        }
        let mut removed = 0;

        for cited in self.outgoing.remove(id).unwrap_or_default() {
            if let Some(citers) = self.incoming.get_mut(&cited) {
                citers.shift_remove(id);
            }
            self.edges.shift_remove(&(id.clone(), cited));
            removed += 1;
        }
        for citing in self.incoming.remove(id).unwrap_or_default() {
            if let Some(refs) = self.outgoing.get_mut(&citing) {
                refs.shift_remove(id);
            }
            self.edges.shift_remove(&(citing, id.clone()));
            removed += 1;
        }

        Some((paper, removed))
    }

    pub fn contains(&self, id: &PaperId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &PaperId) -> Option<&Arc<Paper>> {
        self.nodes.get(id)
    }

    /// Get papers cited by this paper
    pub fn get_references(&self, id: &PaperId) -> impl Iterator<Item = &PaperId> {
        self.outgoing.get(id).into_iter().flatten()
    }

    /// Get papers citing this paper
    pub fn get_citations(&self, id: &PaperId) -> impl Iterator<Item = &PaperId> {
        self.incoming.get(id).into_iter().flatten()
    }

    pub fn in_degree(&self, id: &PaperId) -> usize {
        self.incoming.get(id).map_or(0, IndexSet::len)
    }

    pub fn out_degree(&self, id: &PaperId) -> usize {
        self.outgoing.get(id).map_or(0, IndexSet::len)
    }

    pub fn degree(&self, id: &PaperId) -> usize {
        self.in_degree(id) + self.out_degree(id)
    }

    /// Nodes in admission order
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<Paper>> {
        self.nodes.values()
    }

    /// Edges in insertion order as (citing, cited)
    pub fn edges(&self) -> impl Iterator<Item = &(PaperId, PaperId)> {
        self.edges.iter()
    }

    /// Position of a node in admission order
    pub fn node_index(&self, id: &PaperId) -> Option<usize> {
        self.nodes.get_index_of(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes with neither incoming nor outgoing edges
    pub fn isolated_nodes(&self) -> Vec<PaperId> {
        self.nodes
            .keys()
            .filter(|id| self.degree(id) == 0)
            .cloned()
            .collect()
    }

    /// Number of weakly connected components
    pub fn weak_component_count(&self) -> usize {
        let mut visited: HashSet<&PaperId> = HashSet::with_capacity(self.nodes.len());
        let mut components = 0;

        for start in self.nodes.keys() {
            if !visited.insert(start) {
                continue;
            }
            components += 1;

            let mut queue = VecDeque::from([start]);
            while let Some(current) = queue.pop_front() {
                for neighbor in self.get_references(current).chain(self.get_citations(current)) {
                    if visited.insert(neighbor) {
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        components
    }

    /// Weak connectivity; an empty graph is not connected
    pub fn is_weakly_connected(&self) -> bool {
        !self.is_empty() && self.weak_component_count() == 1
    }

    /// e / (n(n-1)), zero for fewer than two nodes
    pub fn density(&self) -> f64 {
        let n = self.nodes.len();
        if n <= 1 {
            return 0.0;
        }
        self.edges.len() as f64 / (n as f64 * (n as f64 - 1.0))
    }

    /// Drop everything, returning the number of nodes removed
    pub fn clear(&mut self) -> usize {
        let count = self.nodes.len();
        self.nodes.clear();
        self.outgoing.clear();
        self.incoming.clear();
        self.edges.clear();
        self.dois.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(graph: &mut CitationGraph, key: &str) -> PaperId {
        let paper = Paper::from_record(&json!({"id": key})).unwrap();
        let id = paper.id.clone();
        graph.insert_node(Arc::new(paper));
        id
    }

    #[test]
    fn test_graph_construction() {
        let mut graph = CitationGraph::new();
        let a = node(&mut graph, "W1");
        let b = node(&mut graph, "W2");
        let c = node(&mut graph, "W3");

        // A cites B, B cites C
        assert!(graph.add_edge(&a, &b));
        assert!(graph.add_edge(&b, &c));

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.get_references(&a).collect::<Vec<_>>(), vec![&b]);
        assert_eq!(graph.get_citations(&b).collect::<Vec<_>>(), vec![&a]);
        assert_eq!(graph.degree(&b), 2);
    }

    #[test]
    fn test_no_self_loops_or_duplicates() {
        let mut graph = CitationGraph::new();
        let a = node(&mut graph, "W1");
        let b = node(&mut graph, "W2");
        let ghost = PaperId::parse("W9").unwrap();

        assert!(!graph.add_edge(&a, &a));
        assert!(graph.add_edge(&a, &b));
        assert!(!graph.add_edge(&a, &b));
        assert!(!graph.add_edge(&a, &ghost));
        assert!(graph.add_edge(&b, &a));
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_remove_node_drops_incident_edges() {
        let mut graph = CitationGraph::new();
        let a = node(&mut graph, "W1");
        let b = node(&mut graph, "W2");
        let c = node(&mut graph, "W3");
        graph.add_edge(&a, &b);
        graph.add_edge(&b, &c);
        graph.add_edge(&a, &c);

        let (_, removed) = graph.remove_node(&b).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.out_degree(&a), 1);
        assert_eq!(graph.in_degree(&c), 1);
        assert!(graph.remove_node(&b).is_none());
        assert!(graph.edges().all(|(s, t)| graph.contains(s) && graph.contains(t)));
    }

    #[test]
    fn test_doi_index_follows_nodes() {
        let mut graph = CitationGraph::new();
        let paper = Paper::from_record(&json!({"id": "W5", "doi": "https://doi.org/10.5/AbC"})).unwrap();
        graph.insert_node(Arc::new(paper));
        let w5 = PaperId::parse("W5").unwrap();

        let doi = PaperId::parse("10.5/abc").unwrap();
        assert_eq!(graph.resolve_doi(&doi), Some(&w5));
        assert!(graph.resolve_doi(&PaperId::parse("10.5/other").unwrap()).is_none());

        graph.remove_node(&w5);
        assert!(graph.resolve_doi(&doi).is_none());
    }

    #[test]
    fn test_components_and_density() {
        let mut graph = CitationGraph::new();
        assert!(!graph.is_weakly_connected());
        assert_eq!(graph.density(), 0.0);

        let a = node(&mut graph, "W1");
        assert!(graph.is_weakly_connected());
        assert_eq!(graph.density(), 0.0);

        let b = node(&mut graph, "W2");
        let c = node(&mut graph, "W3");
        node(&mut graph, "W4");
        graph.add_edge(&a, &b);
        graph.add_edge(&c, &b);

        assert_eq!(graph.weak_component_count(), 2);
        assert!(!graph.is_weakly_connected());
        assert!((graph.density() - 2.0 / 12.0).abs() < 1e-12);
        assert_eq!(graph.isolated_nodes(), vec![PaperId::parse("W4").unwrap()]);
    }
}
