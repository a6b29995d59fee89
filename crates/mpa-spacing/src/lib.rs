//! mpa-spacing: replicate spacing analysis for marine protected area
//! networks (sans-IO).
//!
//! Given candidate protected areas ("sketches"), a precomputed coastline
//! visibility graph and land polygons, decides per habitat class whether
//! replicates are close enough together along the coast:
//!
//! base graph -> augment with sketch vertices -> cluster contiguous
//! sketches -> select replicates per class -> MST over replicates ->
//! shortest water path per tree edge -> pass/fail.
//!
//! This crate has **no I/O dependencies**: it operates on in-memory
//! values and returns structured data. File handling and logging setup
//! live in `mpa-spacing-cli`.

pub mod augment;
pub mod cluster;
pub mod diagnostics;
pub mod graph;
pub mod replicate;
pub mod report;
pub mod sketch;
pub mod spacing;
pub mod types;
pub mod visibility;

use rayon::prelude::*;

pub use augment::{Augmentation, IsolatedNodeWarning, SketchNodeIndex};
pub use cluster::Cluster;
pub use graph::{Graph, GraphPayload};
pub use replicate::{HabitatClass, OverlapSource, OverlapTable, ReplicateSet};
pub use report::{AnalysisReport, ClassOutcome, ClassReport, ClusterSummary};
pub use sketch::{Designation, ProtectionLevel, Sketch};
pub use spacing::{PathStatus, SpacingPath};
pub use types::{AnalysisError, DistanceMetric, SpacingConfig, SpacingError};
pub use visibility::{LandIndex, VisibilityOracle};

/// Everything an analysis run reads besides the graph.
#[derive(Clone, Copy)]
pub struct AnalysisInput<'a> {
    /// Every sketch, in input order.
    pub sketches: &'a [Sketch],
    /// Land features for occlusion tests.
    pub land: &'a LandIndex,
    /// Externally computed habitat overlaps.
    pub overlaps: &'a dyn OverlapSource,
    /// Classes to analyze, in report order.
    pub classes: &'a [HabitatClass],
}

/// Run the full spacing analysis.
///
/// `graph` is augmented in place with sketch nodes and edges and is only
/// read afterwards. Per-class failures (for example an unreachable
/// replicate) are reported in the returned [`AnalysisReport`] and do not
/// abort the run. Stages are listed on
/// [`analyze_with_diagnostics`](diagnostics::analyze_with_diagnostics).
///
/// # Errors
///
/// Returns [`AnalysisError::Config`] for an out-of-range configuration
/// and [`AnalysisError::Graph`] if augmentation finds the graph
/// inconsistent.
pub fn analyze(
    graph: &mut Graph,
    input: &AnalysisInput<'_>,
    config: &SpacingConfig,
) -> Result<AnalysisReport, AnalysisError> {
    diagnostics::analyze_with_diagnostics(graph, input, config, &diagnostics::NoClock)
        .map(|(report, _)| report)
}

/// Filter by protection level and cluster, without touching a graph.
///
/// Returns the clusters [`analyze`] would form from the same inputs, so
/// overlaps can be measured against merged outlines before a run.
///
/// # Errors
///
/// Returns [`AnalysisError::Config`] for an out-of-range configuration.
pub fn cluster_network(
    sketches: &[Sketch],
    config: &SpacingConfig,
) -> Result<Vec<ClusterSummary>, AnalysisError> {
    config.validate()?;
    let (_, clusters) = cluster_protected(sketches, config);
    Ok(clusters.iter().map(Into::into).collect())
}

/// Protection filter followed by clustering. Also returns the number of
/// sketches that passed the filter.
pub(crate) fn cluster_protected(
    sketches: &[Sketch],
    config: &SpacingConfig,
) -> (usize, Vec<Cluster>) {
    let protected = sketch::filter_by_protection(sketches, config.min_protection);
    let clusters = cluster::cluster_sketches(&protected, config);
    tracing::debug!(
        sketches = sketches.len(),
        protected = protected.len(),
        clusters = clusters.len(),
        "sketches clustered",
    );
    (protected.len(), clusters)
}

/// Replicate selection and spacing for every requested class.
pub(crate) fn class_reports(
    graph: &Graph,
    node_index: &SketchNodeIndex,
    clusters: &[Cluster],
    input: &AnalysisInput<'_>,
    config: &SpacingConfig,
) -> Vec<ClassReport> {
    input
        .classes
        .par_iter()
        .map(|&class| {
            let replicates = replicate::select_replicates(class, clusters, input.overlaps, config);
            let members: Vec<&Cluster> = clusters
                .iter()
                .filter(|c| replicates.cluster_ids.contains(&c.id))
                .collect();
            let result = spacing::analyze_spacing(class, graph, node_index, &members, config);
            match &result {
                Ok(paths) => tracing::info!(
                    class = %class,
                    replicates = members.len(),
                    paths = paths.len(),
                    failing = paths.iter().filter(|p| p.status == PathStatus::Fail).count(),
                    "class analyzed",
                ),
                Err(e) => tracing::warn!(class = %class, error = %e, "class analysis failed"),
            }
            ClassReport::new(class, replicates, result)
        })
        .collect()
}
