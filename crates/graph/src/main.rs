//! RefNet command-line entry point
//!
//! Usage:
//!   refnet expand <ROOT>... [--iterations N] [--cited N] [--refs N] [--stats]
//!   refnet paper <ID>
//!   refnet search <QUERY> [--page N] [--per-page N] [--sort KEY]
//!   refnet citing <ID> [--page N] [--per-page N]

use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use refnet_common::config::{AppConfig, ObservabilityConfig};
use refnet_common::metrics::{register_metrics, SOURCE_LATENCY_BUCKETS};
use refnet_common::models::{PageRequest, PaperId, SearchQuery, SearchSort, DEFAULT_PAGE_SIZE};
use refnet_common::VERSION;
use refnet_graph::{CitationGraphEngine, ExpansionLimits};
use serde::Serialize;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "refnet", version, about = "Citation graph builder over OpenAlex")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a citation graph from one or more root papers
    Expand {
        /// Root identifiers (OpenAlex id, DOI or URL)
        #[arg(required = true)]
        roots: Vec<String>,
        /// BFS rounds per root
        #[arg(short, long)]
        iterations: Option<usize>,
        /// Citing papers fetched per frontier paper
        #[arg(short, long)]
        cited: Option<usize>,
        /// Referenced papers fetched per frontier paper
        #[arg(short, long)]
        refs: Option<usize>,
        /// Wall-clock budget in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Print statistics instead of the full snapshot
        #[arg(long)]
        stats: bool,
    },
    /// Resolve and print a single paper
    Paper {
        /// Paper identifier
        id: String,
    },
    /// Full-text search over works
    Search {
        query: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        per_page: usize,
        /// cited_by_count, relevance_score or publication_date
        #[arg(long, default_value = "cited_by_count")]
        sort: String,
    },
    /// List papers citing a paper, most cited first
    Citing {
        id: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        per_page: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load()?;

    init_tracing(&config.observability);
    info!("Starting RefNet v{}", VERSION);

    if config.observability.metrics_port > 0 {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.observability.metrics_port))
            .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), SOURCE_LATENCY_BUCKETS)?
            .install()?;
        register_metrics();
        info!(port = config.observability.metrics_port, "Prometheus exporter listening");
    }

    let engine = CitationGraphEngine::from_config(&config).map_err(|e| {
        tracing::error!(error = %e, "Failed to initialize graph engine");
        e
    })?;

    match cli.command {
        Commands::Expand {
            roots,
            iterations,
            cited,
            refs,
            timeout,
            stats,
        } => {
            let defaults = engine.default_limits();
            let mut limits = ExpansionLimits::new(
                iterations.unwrap_or(defaults.iterations),
                cited.unwrap_or(defaults.cited_limit),
                refs.unwrap_or(defaults.reference_limit),
            );
            if let Some(secs) = timeout {
                limits = limits.with_timeout(Duration::from_secs(secs));
            }

            let snapshot = engine.expand(roots.as_slice(), limits).await?;
            if stats {
                print_json(&engine.statistics().await, cli.pretty)?;
            } else {
                print_json(&snapshot, cli.pretty)?;
            }
        }
        Commands::Paper { id } => {
            if !engine.add_paper(&id, true).await {
                return Err(format!("paper not found: {}", id).into());
            }
            print_json(&engine.node_info(&id).await?.paper, cli.pretty)?;
        }
        Commands::Search {
            query,
            page,
            per_page,
            sort,
        } => {
            let sort: SearchSort = sort.parse()?;
            let query = SearchQuery::new(&query, sort, PageRequest::new(page, per_page)?)?;
            print_json(&engine.adapter().search(&query).await?, cli.pretty)?;
        }
        Commands::Citing { id, page, per_page } => {
            let id = PaperId::parse(&id)?;
            let paging = PageRequest::new(page, per_page)?;
            print_json(&engine.adapter().citing_page(&id, paging).await?, cli.pretty)?;
        }
    }

    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> serde_json::Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", out);
    Ok(())
}
