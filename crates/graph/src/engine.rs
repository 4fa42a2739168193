//! Citation graph engine
//!
//! Owns the graph and the set of admitted paper ids, drives breadth-first
//! expansion over the source adapter and exposes node-level mutation and
//! query operations.
//!
//! Locking: every graph mutation happens under `state`. Expansions, removals
//! and clears also hold `expansion` for their whole duration, so a BFS round
//! never writes back into a graph that lost its frontier mid-fetch. Remote
//! fetches run without the state lock held.

use crate::graph::CitationGraph;
use crate::layout::LayoutParams;
use crate::presenter::{self, GraphSnapshot, GraphStatistics, Neighbors, NodeInfo};
use futures::stream::{self, StreamExt};
use refnet_common::adapter::SourceAdapter;
use refnet_common::cache::PaperCache;
use refnet_common::config::{AppConfig, GraphConfig};
use refnet_common::errors::{AppError, Result};
use refnet_common::metrics;
use refnet_common::models::{Paper, PaperId};
use refnet_common::source::create_source;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Per-call expansion bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionLimits {
    pub iterations: usize,
    pub cited_limit: usize,
    pub reference_limit: usize,
    /// Checked between rounds only
    pub deadline: Option<Instant>,
}

impl ExpansionLimits {
    pub fn new(iterations: usize, cited_limit: usize, reference_limit: usize) -> Self {
        Self {
            iterations,
            cited_limit,
            reference_limit,
            deadline: None,
        }
    }

    /// Configured defaults
    pub fn from_config(config: &GraphConfig) -> Self {
        Self::new(
            config.default_iterations,
            config.default_cited_limit,
            config.default_ref_limit,
        )
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Clamp into configured ranges and apply the configured timeout if no
    /// deadline was given
    fn clamped(self, config: &GraphConfig) -> Self {
        let (iterations, cited_limit, reference_limit) =
            config.clamp_limits(self.iterations, self.cited_limit, self.reference_limit);
        let deadline = self
            .deadline
            .or_else(|| config.expansion_timeout().map(|t| Instant::now() + t));
        Self {
            iterations,
            cited_limit,
            reference_limit,
            deadline,
        }
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Outcome of an incremental expansion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpansionReport {
    pub paper_id: PaperId,
    pub initial_papers: usize,
    pub final_papers: usize,
    pub new_papers_added: usize,
    pub rounds_completed: usize,
    pub deadline_reached: bool,
}

/// Outcome of a node removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    pub removed: PaperId,
    pub edges_removed: usize,
    pub orphans_removed: Vec<PaperId>,
    pub remaining_papers: usize,
}

/// Outcome of adding a new root to an existing graph
#[derive(Debug, Clone, Serialize)]
pub struct SourceNodeReport {
    pub paper_id: PaperId,
    pub title: String,
    pub expanded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expansion: Option<ExpansionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expansion_error: Option<String>,
    pub total_papers: usize,
}

#[derive(Debug, Default)]
struct GraphState {
    graph: CitationGraph,
    /// Node keys of every admitted paper
    added: HashSet<PaperId>,
}

#[derive(Debug, Default)]
struct BfsOutcome {
    rounds_completed: usize,
    admitted: usize,
    deadline_reached: bool,
}

/// Candidates fetched for one frontier paper
struct FrontierFetch {
    paper_id: PaperId,
    citing: Vec<Arc<Paper>>,
    references: Vec<Arc<Paper>>,
}

/// Citation graph engine
pub struct CitationGraphEngine {
    adapter: Arc<SourceAdapter>,
    cache: Arc<PaperCache>,
    config: GraphConfig,
    layout: LayoutParams,
    fetch_concurrency: usize,
    state: Mutex<GraphState>,
    expansion: Mutex<()>,
}

impl CitationGraphEngine {
    /// Create an engine over an adapter; the adapter's cache is shared
    pub fn new(adapter: Arc<SourceAdapter>, config: GraphConfig, fetch_concurrency: usize) -> Self {
        Self {
            cache: Arc::clone(adapter.cache()),
            adapter,
            layout: LayoutParams::from(&config),
            config,
            fetch_concurrency: fetch_concurrency.max(1),
            state: Mutex::new(GraphState::default()),
            expansion: Mutex::new(()),
        }
    }

    /// Wire source, cache and adapter from application configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let source = create_source(&config.source)?;
        let cache = Arc::new(PaperCache::new());
        let adapter = Arc::new(SourceAdapter::new(source, cache, &config.source));
        Ok(Self::new(adapter, config.graph.clone(), config.source.fetch_concurrency))
    }

    /// Source adapter shared with the engine, for lookups outside the graph
    pub fn adapter(&self) -> &Arc<SourceAdapter> {
        &self.adapter
    }

    pub fn default_limits(&self) -> ExpansionLimits {
        ExpansionLimits::from_config(&self.config)
    }

    /// Admit a single paper; false when rejected or already present
    pub async fn add_paper(&self, identifier: &str, is_root: bool) -> bool {
        let id = match PaperId::parse(identifier) {
            Ok(id) => id,
            Err(_) => {
                metrics::record_admission_rejection("invalid_identifier");
                return false;
            }
        };

        let id = {
            let state = self.state.lock().await;
            let id = self.resolve_key(&state, id);
            if state.added.contains(&id) {
                metrics::record_admission_rejection("duplicate");
                return false;
            }
            id
        };

        let Some(paper) = self.adapter.fetch_by_id(&id).await else {
            metrics::record_admission_rejection("not_found");
            debug!(id = %id, "Paper could not be resolved");
            return false;
        };

        let mut state = self.state.lock().await;
        self.admit(&mut state, paper, is_root)
    }

    /// Build a fresh graph from one or more roots
    pub async fn expand<S: AsRef<str>>(&self, roots: &[S], limits: ExpansionLimits) -> Result<GraphSnapshot> {
        let _expansion = self.expansion.lock().await;
        let limits = limits.clamped(&self.config);
        let started = Instant::now();
        let requested: Vec<String> = roots.iter().map(|r| r.as_ref().to_string()).collect();

        info!(
            roots = ?requested,
            iterations = limits.iterations,
            cited_limit = limits.cited_limit,
            reference_limit = limits.reference_limit,
            "Starting expansion"
        );

        self.reset().await;

        let mut admitted = Vec::with_capacity(requested.len());
        for root in &requested {
            match self.admit_root(root).await {
                Some(id) => admitted.push(id),
                None => warn!(root = %root, "Root paper rejected"),
            }
        }
        if admitted.is_empty() {
            return Err(AppError::RootUnresolvable { roots: requested });
        }

        for root in admitted {
            let outcome = self.run_bfs(root.clone(), &limits).await;
            debug!(root = %root, rounds = outcome.rounds_completed, admitted = outcome.admitted, "Root expanded");
            if outcome.deadline_reached {
                break;
            }
        }

        let snapshot = self.snapshot().await;
        metrics::record_expansion(started.elapsed().as_secs_f64(), "initial", snapshot.nodes.len());
        info!(
            nodes = snapshot.nodes.len(),
            edges = snapshot.edges.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Expansion complete"
        );
        Ok(snapshot)
    }

    /// Expand outward from a node already in the graph
    pub async fn expand_from_node(&self, identifier: &str, limits: ExpansionLimits) -> Result<ExpansionReport> {
        let _expansion = self.expansion.lock().await;
        let id = self.node_key(identifier).await?;
        self.expand_from_node_locked(id, limits.clamped(&self.config)).await
    }

    /// Add a new root to the existing graph, optionally expanding from it
    pub async fn add_source_node(
        &self,
        identifier: &str,
        expand: bool,
        limits: ExpansionLimits,
    ) -> Result<SourceNodeReport> {
        let _expansion = self.expansion.lock().await;
        let id = self.node_key(identifier).await?;

        if self.state.lock().await.added.contains(&id) {
            return Err(AppError::Duplicate {
                message: format!("paper {} is already in the graph", id),
            });
        }

        let paper = self.adapter.fetch_by_id(&id).await.ok_or_else(|| AppError::PaperNotFound {
            id: id.to_string(),
        })?;
        let key = paper.id.clone();
        let title = paper.title.clone();

        if !self.admit(&mut *self.state.lock().await, paper, true) {
            return Err(AppError::Duplicate {
                message: format!("paper {} is already in the graph", key),
            });
        }
        info!(id = %key, expand, "Source node added");

        let (expansion, expansion_error) = if expand {
            match self.expand_from_node_locked(key.clone(), limits.clamped(&self.config)).await {
                Ok(report) => (Some(report), None),
                Err(e) => {
                    warn!(id = %key, error = %e, "Expansion from new source node failed");
                    (None, Some(e.to_string()))
                }
            }
        } else {
            (None, None)
        };

        Ok(SourceNodeReport {
            paper_id: key,
            title,
            expanded: expansion.is_some(),
            expansion,
            expansion_error,
            total_papers: self.state.lock().await.graph.node_count(),
        })
    }

    /// Remove a node and optionally every node left without edges
    pub async fn remove_node(&self, identifier: &str, remove_orphaned: bool) -> Result<RemovalReport> {
        let parsed = PaperId::parse(identifier)?;
        let _expansion = self.expansion.lock().await;
        let mut state = self.state.lock().await;
        let id = self.resolve_key(&state, parsed);

        let (_, edges_removed) = state
            .graph
            .remove_node(&id)
            .ok_or_else(|| AppError::NodeNotFound { id: id.to_string() })?;
        state.added.remove(&id);

        let mut orphans_removed = Vec::new();
        if remove_orphaned {
            for orphan in state.graph.isolated_nodes() {
                state.graph.remove_node(&orphan);
                state.added.remove(&orphan);
                orphans_removed.push(orphan);
            }
        }

        info!(id = %id, edges_removed, orphans = orphans_removed.len(), "Node removed");
        Ok(RemovalReport {
            removed: id,
            edges_removed,
            orphans_removed,
            remaining_papers: state.graph.node_count(),
        })
    }

    /// In-graph citing and referenced papers of a node
    pub async fn neighbors(&self, identifier: &str) -> Result<Neighbors> {
        let parsed = PaperId::parse(identifier)?;
        let state = self.state.lock().await;
        let id = self.resolve_key(&state, parsed);
        if !state.graph.contains(&id) {
            return Err(AppError::NodeNotFound { id: id.to_string() });
        }
        Ok(presenter::neighbors_of(&state.graph, &id))
    }

    pub async fn node_info(&self, identifier: &str) -> Result<NodeInfo> {
        let parsed = PaperId::parse(identifier)?;
        let state = self.state.lock().await;
        let id = self.resolve_key(&state, parsed);
        let paper = state
            .graph
            .get(&id)
            .ok_or_else(|| AppError::NodeNotFound { id: id.to_string() })?;

        Ok(NodeInfo {
            paper: Paper::clone(paper),
            neighbors: presenter::neighbors_of(&state.graph, &id),
            degree: state.graph.degree(&id),
            in_degree: state.graph.in_degree(&id),
            out_degree: state.graph.out_degree(&id),
        })
    }

    pub async fn snapshot(&self) -> GraphSnapshot {
        let state = self.state.lock().await;
        presenter::build_snapshot(&state.graph, &self.layout)
    }

    pub async fn statistics(&self) -> GraphStatistics {
        let state = self.state.lock().await;
        presenter::compute_statistics(&state.graph)
    }

    /// Empty graph, admitted set and cache; returns papers removed
    pub async fn clear(&self) -> usize {
        let _expansion = self.expansion.lock().await;
        let removed = self.reset().await;
        info!(removed, "Graph cleared");
        removed
    }

    async fn reset(&self) -> usize {
        let mut state = self.state.lock().await;
        let removed = state.graph.clear();
        state.added.clear();
        self.cache.clear();
        removed
    }

    async fn expand_from_node_locked(&self, id: PaperId, limits: ExpansionLimits) -> Result<ExpansionReport> {
        let initial_papers = {
            let state = self.state.lock().await;
            if !state.graph.contains(&id) {
                return Err(AppError::NodeNotFound { id: id.to_string() });
            }
            state.graph.node_count()
        };

        let started = Instant::now();
        let outcome = self.run_bfs(id.clone(), &limits).await;
        let final_papers = self.state.lock().await.graph.node_count();
        metrics::record_expansion(started.elapsed().as_secs_f64(), "incremental", final_papers);

        info!(id = %id, new_papers = final_papers.saturating_sub(initial_papers), "Node expanded");
        Ok(ExpansionReport {
            paper_id: id,
            initial_papers,
            final_papers,
            new_papers_added: final_papers.saturating_sub(initial_papers),
            rounds_completed: outcome.rounds_completed,
            deadline_reached: outcome.deadline_reached,
        })
    }

    /// Resolve and admit a root, returning its node key
    async fn admit_root(&self, identifier: &str) -> Option<PaperId> {
        let id = PaperId::parse(identifier).ok()?;
        let paper = self.adapter.fetch_by_id(&id).await?;
        let key = paper.id.clone();
        let mut state = self.state.lock().await;
        self.admit(&mut state, paper, true).then_some(key)
    }

    fn admit(&self, state: &mut GraphState, paper: Arc<Paper>, is_root: bool) -> bool {
        if state.added.contains(&paper.id) {
            metrics::record_admission_rejection("duplicate");
            return false;
        }
        if self.config.strict_authors && !is_root && !paper.has_authors() {
            metrics::record_admission_rejection("no_authors");
            debug!(id = %paper.id, "Rejected paper without authors");
            return false;
        }

        state.added.insert(paper.id.clone());
        state.graph.insert_node(paper);
        metrics::record_admission();
        true
    }

    async fn node_key(&self, identifier: &str) -> Result<PaperId> {
        let parsed = PaperId::parse(identifier)?;
        let state = self.state.lock().await;
        Ok(self.resolve_key(&state, parsed))
    }

    /// Map a DOI to its node key: graph index first, then the cache alias
    /// for papers fetched by DOI but not in the graph
    fn resolve_key(&self, state: &GraphState, id: PaperId) -> PaperId {
        if !id.is_doi() {
            return id;
        }
        if let Some(key) = state.graph.resolve_doi(&id) {
            return key.clone();
        }
        match self.cache.get(&id) {
            Some(paper) => paper.id.clone(),
            None => id,
        }
    }

    async fn run_bfs(&self, seed: PaperId, limits: &ExpansionLimits) -> BfsOutcome {
        let mut outcome = BfsOutcome::default();
        let mut frontier = vec![seed];

        for round in 1..=limits.iterations {
            if limits.deadline_passed() {
                warn!(round, "Expansion deadline reached, stopping");
                outcome.deadline_reached = true;
                break;
            }

            let fetched: Vec<FrontierFetch> = stream::iter(frontier.iter())
                .map(|id| self.fetch_candidates(id, limits))
                .buffered(self.fetch_concurrency)
                .collect()
                .await;

            let mut next = Vec::new();
            {
                let mut state = self.state.lock().await;
                for fetch in fetched {
                    for citing in fetch.citing {
                        let key = citing.id.clone();
                        if self.admit(&mut state, citing, false) {
                            state.graph.add_edge(&key, &fetch.paper_id);
                            next.push(key);
                        }
                    }
                    for reference in fetch.references {
                        let key = reference.id.clone();
                        if self.admit(&mut state, reference, false) {
                            state.graph.add_edge(&fetch.paper_id, &key);
                            next.push(key);
                        }
                    }
                }
            }

            outcome.rounds_completed = round;
            outcome.admitted += next.len();
            debug!(round, frontier = frontier.len(), admitted = next.len(), "Round complete");

            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        outcome
    }

    async fn fetch_candidates(&self, id: &PaperId, limits: &ExpansionLimits) -> FrontierFetch {
        let (citing, references) = tokio::join!(
            self.adapter.fetch_citing_papers(id, limits.cited_limit),
            self.adapter.fetch_reference_papers(id, limits.reference_limit),
        );
        FrontierFetch {
            paper_id: id.clone(),
            citing,
            references,
        }
    }
}
