//! Render-friendly views of the citation graph
//!
//! Snapshots carry every node with layout coordinates and degrees, every
//! edge, and aggregate metadata. Statistics are computed from the same graph
//! without running the layout.

use crate::graph::CitationGraph;
use crate::layout::{spring_layout, LayoutParams};
use chrono::{DateTime, Utc};
use refnet_common::models::{Paper, PaperId};
use serde::Serialize;

/// Number of papers listed in [`GraphStatistics::top_papers`]
pub const TOP_PAPERS: usize = 10;

/// Paper plus layout position and degrees
#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    #[serde(flatten)]
    pub paper: Paper,
    pub x: f64,
    pub y: f64,
    pub degree: usize,
    pub in_degree: usize,
    pub out_degree: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Citation,
}

/// Directed citing -> cited edge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub source: PaperId,
    pub target: PaperId,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphMetadata {
    pub total_papers: usize,
    /// Number of citation edges in the graph
    pub total_citations: usize,
    pub generated_at: DateTime<Utc>,
    #[serde(rename = "graph_density")]
    pub density: f64,
    pub is_connected: bool,
    pub average_degree: f64,
    pub max_degree: usize,
    pub components: usize,
}

/// Full graph view
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub metadata: GraphMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopPaper {
    pub id: PaperId,
    pub title: String,
    pub citations: u64,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphStatistics {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub density: f64,
    pub is_connected: bool,
    pub components: usize,
    pub average_degree: f64,
    pub max_degree: usize,
    pub top_papers: Vec<TopPaper>,
}

/// Compact paper view used in neighbor listings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaperSummary {
    pub id: PaperId,
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub citations: u64,
}

impl From<&Paper> for PaperSummary {
    fn from(paper: &Paper) -> Self {
        Self {
            id: paper.id.clone(),
            title: paper.title.clone(),
            authors: paper.authors.clone(),
            year: paper.year,
            citations: paper.citations,
        }
    }
}

/// Immediate in-graph neighborhood of one paper
#[derive(Debug, Clone, Serialize)]
pub struct Neighbors {
    pub paper_id: PaperId,
    /// Predecessors: papers citing this one
    pub citing_papers: Vec<PaperSummary>,
    /// Successors: papers this one cites
    pub referenced_papers: Vec<PaperSummary>,
    pub total_citing: usize,
    pub total_referenced: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeInfo {
    pub paper: Paper,
    pub neighbors: Neighbors,
    pub degree: usize,
    pub in_degree: usize,
    pub out_degree: usize,
}

/// Build a snapshot with fresh layout coordinates
pub fn build_snapshot(graph: &CitationGraph, params: &LayoutParams) -> GraphSnapshot {
    let index_edges: Vec<(usize, usize)> = graph
        .edges()
        .filter_map(|(s, t)| Some((graph.node_index(s)?, graph.node_index(t)?)))
        .collect();
    let positions = spring_layout(graph.node_count(), &index_edges, params);

    let nodes = graph
        .nodes()
        .zip(positions)
        .map(|(paper, (x, y))| GraphNode {
            paper: Paper::clone(paper),
            x,
            y,
            degree: graph.degree(&paper.id),
            in_degree: graph.in_degree(&paper.id),
            out_degree: graph.out_degree(&paper.id),
        })
        .collect();

    let edges = graph
        .edges()
        .map(|(source, target)| GraphEdge {
            source: source.clone(),
            target: target.clone(),
            kind: EdgeKind::Citation,
        })
        .collect();

    let stats = compute_statistics(graph);
    GraphSnapshot {
        nodes,
        edges,
        metadata: GraphMetadata {
            total_papers: stats.total_nodes,
            total_citations: stats.total_edges,
            generated_at: Utc::now(),
            density: stats.density,
            is_connected: stats.is_connected,
            average_degree: stats.average_degree,
            max_degree: stats.max_degree,
            components: stats.components,
        },
    }
}

/// Aggregate statistics; an empty graph yields zeros
pub fn compute_statistics(graph: &CitationGraph) -> GraphStatistics {
    let degrees: Vec<usize> = graph.nodes().map(|p| graph.degree(&p.id)).collect();
    let average_degree = if degrees.is_empty() {
        0.0
    } else {
        degrees.iter().sum::<usize>() as f64 / degrees.len() as f64
    };

    // Stable sort keeps admission order among equal counts
    let mut ranked: Vec<&Paper> = graph.nodes().map(|p| p.as_ref()).collect();
    ranked.sort_by(|a, b| b.citations.cmp(&a.citations));

    GraphStatistics {
        total_nodes: graph.node_count(),
        total_edges: graph.edge_count(),
        density: graph.density(),
        is_connected: graph.is_weakly_connected(),
        components: graph.weak_component_count(),
        average_degree,
        max_degree: degrees.iter().copied().max().unwrap_or(0),
        top_papers: ranked
            .into_iter()
            .take(TOP_PAPERS)
            .map(|p| TopPaper {
                id: p.id.clone(),
                title: p.title.clone(),
                citations: p.citations,
                year: p.year,
            })
            .collect(),
    }
}

/// Neighborhood of a node already known to be in the graph
pub fn neighbors_of(graph: &CitationGraph, id: &PaperId) -> Neighbors {
    let summarize = |ids: Vec<&PaperId>| -> Vec<PaperSummary> {
        ids.into_iter()
            .filter_map(|n| graph.get(n))
            .map(|p| PaperSummary::from(p.as_ref()))
            .collect()
    };

    let citing_papers = summarize(graph.get_citations(id).collect());
    let referenced_papers = summarize(graph.get_references(id).collect());

    Neighbors {
        paper_id: id.clone(),
        total_citing: citing_papers.len(),
        total_referenced: referenced_papers.len(),
        citing_papers,
        referenced_papers,
    }
}
