//! mpa-spacing: CLI for replicate spacing analysis.
//!
//! Reads a base coastline graph, sketch and land feature collections and
//! an overlap table, runs the analysis, and prints the JSON report to
//! stdout. Log output (isolated nodes, per-class outcomes) goes to
//! stderr and is controlled by `RUST_LOG`.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin mpa-spacing -- \
//!     --graph graph.json --sketches sketches.json \
//!     --land land.json --overlaps overlaps.json --class kelp
//! ```
//!
//! Overlap tables are keyed by cluster id. To measure overlaps against
//! merged cluster outlines, list the clusters first:
//!
//! ```text
//! cargo run --release --bin mpa-spacing -- --sketches sketches.json --clusters-only
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use mpa_spacing::diagnostics::{Clock, analyze_with_diagnostics};
use mpa_spacing::sketch::{LandCollection, SketchCollection, land_from_features, sketches_from_features};
use mpa_spacing::{
    AnalysisInput, Graph, GraphPayload, HabitatClass, LandIndex, OverlapTable, SpacingConfig,
};
use serde::de::DeserializeOwned;
use tracing_subscriber::EnvFilter;

/// Replicate spacing analysis for marine protected area networks.
///
/// Augments a coastline visibility graph with sketch boundaries, clusters
/// contiguous sketches, selects replicates per habitat class, and checks
/// the water distance between neighboring replicates.
#[derive(Parser)]
#[command(name = "mpa-spacing", version)]
struct Cli {
    /// Base graph JSON (`{ "nodes": {...}, "edges": [...] }`).
    #[arg(long, required_unless_present = "clusters_only")]
    graph: Option<PathBuf>,

    /// Sketch feature collection (GeoJSON).
    #[arg(long)]
    sketches: PathBuf,

    /// Land feature collection (GeoJSON). Without it nothing is occluded.
    #[arg(long)]
    land: Option<PathBuf>,

    /// Habitat overlap table JSON.
    #[arg(long)]
    overlaps: Option<PathBuf>,

    /// Habitat class to analyze (repeatable; default: all).
    #[arg(long = "class", value_enum)]
    classes: Vec<Class>,

    /// How coordinates are measured.
    #[arg(long, value_enum, default_value_t = Metric::Haversine)]
    metric: Metric,

    /// Connection search radius in miles.
    #[arg(long, default_value_t = SpacingConfig::DEFAULT_SEARCH_RADIUS)]
    search_radius: f64,

    /// Distance in miles below which nodes connect regardless of land.
    #[arg(long, default_value_t = SpacingConfig::DEFAULT_MIN_CONNECT_DISTANCE)]
    min_connect_distance: f64,

    /// Spacing guideline in miles.
    #[arg(long, default_value_t = SpacingConfig::DEFAULT_SPACING_THRESHOLD)]
    spacing_threshold: f64,

    /// Minimum cluster area in square miles.
    #[arg(long, default_value_t = SpacingConfig::DEFAULT_MIN_CLUSTER_AREA)]
    min_cluster_area: f64,

    /// Lowest protection level included in clustering.
    #[arg(long, value_enum, default_value_t = Protection::ModerateHigh)]
    min_protection: Protection,

    /// Full spacing config as a JSON string.
    ///
    /// When provided, all other config flags are ignored. Missing fields
    /// take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Print the clusters (ids, members, merged outlines) and exit
    /// without running the analysis.
    #[arg(long)]
    clusters_only: bool,

    /// Write the augmented graph to this file.
    #[arg(long)]
    graph_out: Option<PathBuf>,

    /// Print per-stage diagnostics to stderr.
    #[arg(long)]
    diagnostics: bool,

    /// Exit with status 2 when any class fails or any path exceeds the
    /// guideline.
    #[arg(long)]
    strict: bool,
}

/// Habitat class selection.
#[derive(Clone, Copy, ValueEnum)]
enum Class {
    Beaches,
    RockyShores,
    Kelp,
    Eelgrass,
    Estuaries,
    #[value(name = "hard-substrate-0-30m")]
    HardSubstrate,
    #[value(name = "soft-substrate-0-30m")]
    SoftSubstrate,
}

impl From<Class> for HabitatClass {
    fn from(class: Class) -> Self {
        match class {
            Class::Beaches => Self::Beaches,
            Class::RockyShores => Self::RockyShores,
            Class::Kelp => Self::Kelp,
            Class::Eelgrass => Self::Eelgrass,
            Class::Estuaries => Self::Estuaries,
            Class::HardSubstrate => Self::HardSubstrate0To30m,
            Class::SoftSubstrate => Self::SoftSubstrate0To30m,
        }
    }
}

/// Distance metric selection.
#[derive(Clone, Copy, ValueEnum)]
enum Metric {
    /// Coordinates already projected into miles.
    Planar,
    /// Longitude/latitude degrees, great-circle miles.
    Haversine,
}

/// Protection floor selection.
#[derive(Clone, Copy, ValueEnum)]
enum Protection {
    Low,
    ModerateLow,
    Moderate,
    ModerateHigh,
    High,
    VeryHigh,
}

/// Build a [`SpacingConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual config flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<SpacingConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(SpacingConfig {
        metric: match cli.metric {
            Metric::Planar => mpa_spacing::DistanceMetric::Planar,
            Metric::Haversine => mpa_spacing::DistanceMetric::Haversine,
        },
        search_radius: cli.search_radius,
        min_connect_distance: cli.min_connect_distance,
        spacing_threshold: cli.spacing_threshold,
        min_cluster_area: cli.min_cluster_area,
        min_protection: match cli.min_protection {
            Protection::Low => mpa_spacing::ProtectionLevel::Low,
            Protection::ModerateLow => mpa_spacing::ProtectionLevel::ModerateLow,
            Protection::Moderate => mpa_spacing::ProtectionLevel::Moderate,
            Protection::ModerateHigh => mpa_spacing::ProtectionLevel::ModerateHigh,
            Protection::High => mpa_spacing::ProtectionLevel::High,
            Protection::VeryHigh => mpa_spacing::ProtectionLevel::VeryHigh,
        },
        ..SpacingConfig::default()
    })
}

/// Read and parse a JSON file.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("Error parsing {}: {e}", path.display()))
}

/// Everything loaded from disk.
struct Inputs {
    graph: Graph,
    sketches: Vec<mpa_spacing::Sketch>,
    land: LandIndex,
    overlaps: OverlapTable,
}

fn load_sketches(cli: &Cli) -> Result<Vec<mpa_spacing::Sketch>, String> {
    let collection: SketchCollection = read_json(&cli.sketches)?;
    sketches_from_features(&collection).map_err(|e| e.to_string())
}

fn load_inputs(cli: &Cli) -> Result<Inputs, String> {
    let path = cli.graph.as_deref().ok_or("--graph is required")?;
    let payload: GraphPayload = read_json(path)?;
    let graph = Graph::from_payload(&payload).map_err(|e| e.to_string())?;

    let sketches = load_sketches(cli)?;

    let land = match cli.land {
        Some(ref path) => {
            let collection: LandCollection = read_json(path)?;
            LandIndex::new(land_from_features(&collection).map_err(|e| e.to_string())?)
        }
        None => LandIndex::default(),
    };

    let overlaps = match cli.overlaps {
        Some(ref path) => read_json(path)?,
        None => OverlapTable::default(),
    };

    tracing::info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        sketches = sketches.len(),
        land = land.len(),
        "inputs loaded",
    );

    Ok(Inputs {
        graph,
        sketches,
        land,
        overlaps,
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mpa_spacing=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    if cli.clusters_only {
        return print_clusters(&cli, &config);
    }

    let Inputs {
        mut graph,
        sketches,
        land,
        overlaps,
    } = match load_inputs(&cli) {
        Ok(inputs) => inputs,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let classes: Vec<HabitatClass> = if cli.classes.is_empty() {
        HabitatClass::ALL.to_vec()
    } else {
        cli.classes.iter().copied().map(Into::into).collect()
    };

    let input = AnalysisInput {
        sketches: &sketches,
        land: &land,
        overlaps: &overlaps,
        classes: &classes,
    };

    let (report, diagnostics) =
        match analyze_with_diagnostics(&mut graph, &input, &config, &StdClock) {
            Ok(result) => result,
            Err(e) => {
                eprintln!("Analysis error: {e}");
                return ExitCode::FAILURE;
            }
        };

    if cli.diagnostics {
        eprintln!("{}", diagnostics.report());
    }

    if let Some(ref path) = cli.graph_out {
        let written = serde_json::to_string(&graph.to_payload())
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
        if let Err(e) = written {
            eprintln!("Error writing graph to {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    }

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error serializing report: {e}");
            return ExitCode::FAILURE;
        }
    }

    let violated = report.has_failures()
        || report
            .classes
            .iter()
            .flat_map(|c| c.outcome.paths())
            .any(|p| p.status == mpa_spacing::PathStatus::Fail);
    if cli.strict && violated {
        return ExitCode::from(2);
    }
    ExitCode::SUCCESS
}

/// Cluster the sketches and print the summaries as JSON.
fn print_clusters(cli: &Cli, config: &SpacingConfig) -> ExitCode {
    let clusters = load_sketches(cli).and_then(|sketches| {
        mpa_spacing::cluster_network(&sketches, config).map_err(|e| e.to_string())
    });
    let json = clusters.and_then(|c| serde_json::to_string_pretty(&c).map_err(|e| e.to_string()));
    match json {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}
