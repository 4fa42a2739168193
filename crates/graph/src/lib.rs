//! RefNet Graph Engine
//!
//! Builds a directed citation graph by breadth-first expansion from seed
//! papers, keeps it mutable in memory, and renders snapshots with layout
//! coordinates and statistics.

pub mod engine;
pub mod graph;
pub mod layout;
pub mod presenter;

pub use engine::{CitationGraphEngine, ExpansionLimits, ExpansionReport, RemovalReport, SourceNodeReport};
pub use graph::CitationGraph;
pub use layout::LayoutParams;
pub use presenter::{GraphEdge, GraphNode, GraphSnapshot, GraphStatistics, Neighbors, NodeInfo};
