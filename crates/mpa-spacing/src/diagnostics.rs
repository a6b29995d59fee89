//! Run diagnostics: timing and counts for each analysis stage.
//!
//! Every call to [`analyze_with_diagnostics`] collects these alongside
//! the [`AnalysisReport`]. Timestamps come from an injected [`Clock`] so
//! the library itself never reads the system time.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::graph::Graph;
use crate::report::AnalysisReport;
use crate::types::{AnalysisError, SpacingConfig};
use crate::{AnalysisInput, augment, class_reports, cluster_protected};

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Clock that never advances; used when only the report is wanted.
pub(crate) struct NoClock;

impl Clock for NoClock {
    type Instant = ();

    fn now(&self) {}

    fn elapsed(&self, _since: &()) -> Duration {
        Duration::ZERO
    }
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisDiagnostics {
    /// Stage 1: graph augmentation.
    pub augment: StageDiagnostics,
    /// Stage 2: protection filter and clustering.
    pub cluster: StageDiagnostics,
    /// Stage 3: replicate selection and spacing for every class.
    pub spacing: StageDiagnostics,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: AnalysisSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Graph augmentation metrics.
    Augment {
        /// Sketch nodes added to the graph.
        nodes_added: usize,
        /// Edges added to the graph.
        edges_added: usize,
        /// Node pairs within the search radius.
        candidate_pairs: usize,
        /// Candidate pairs rejected for crossing land.
        occluded_pairs: usize,
        /// Sketch nodes with no neighbor in range.
        isolated_nodes: usize,
    },
    /// Clustering metrics.
    Cluster {
        /// Sketches supplied.
        sketches: usize,
        /// Sketches at or above the protection floor.
        protected_sketches: usize,
        /// Clusters formed.
        clusters: usize,
        /// Clusters with more than one member.
        merged_clusters: usize,
    },
    /// Replicate selection and spacing metrics.
    Spacing {
        /// Classes analyzed.
        classes: usize,
        /// Replicates across all classes.
        replicates: usize,
        /// Paths measured across all classes.
        paths: usize,
        /// Paths at or beyond the threshold.
        failing_paths: usize,
        /// Classes that could not be analyzed.
        failed_classes: usize,
    },
}

/// High-level summary counts for the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    /// Graph nodes before augmentation.
    pub base_nodes: usize,
    /// Graph edges before augmentation.
    pub base_edges: usize,
    /// Graph nodes after augmentation.
    pub final_nodes: usize,
    /// Graph edges after augmentation.
    pub final_edges: usize,
}

impl AnalysisDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Spacing Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Graph: {} nodes / {} edges -> {} nodes / {} edges",
            self.summary.base_nodes,
            self.summary.base_edges,
            self.summary.final_nodes,
            self.summary.final_edges,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let stages = [
            ("Augment", &self.augment),
            ("Cluster", &self.cluster),
            ("Spacing", &self.spacing),
        ];

        for (name, diag) in &stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Augment {
            nodes_added,
            edges_added,
            candidate_pairs,
            occluded_pairs,
            isolated_nodes,
        } => format!(
            "+{nodes_added} nodes +{edges_added} edges, {occluded_pairs}/{candidate_pairs} occluded, {isolated_nodes} isolated",
        ),
        StageMetrics::Cluster {
            sketches,
            protected_sketches,
            clusters,
            merged_clusters,
        } => format!(
            "{protected_sketches}/{sketches} sketches -> {clusters} clusters ({merged_clusters} merged)",
        ),
        StageMetrics::Spacing {
            classes,
            replicates,
            paths,
            failing_paths,
            failed_classes,
        } => format!(
            "{classes} classes, {replicates} replicates, {paths} paths ({failing_paths} fail), {failed_classes} classes failed",
        ),
    }
}

/// Run the full analysis and collect per-stage diagnostics.
///
/// [`analyze`](crate::analyze) is this function with the diagnostics
/// dropped.
///
/// # Steps
///
/// 1. Augment the graph with sketch perimeter vertices
/// 2. Filter sketches by protection level and cluster contiguous ones
/// 3. Per class, in parallel: select replicates, build the MST, measure
///    shortest water paths
///
/// # Errors
///
/// See [`analyze`](crate::analyze).
pub fn analyze_with_diagnostics<C: Clock>(
    graph: &mut Graph,
    input: &AnalysisInput<'_>,
    config: &SpacingConfig,
    clock: &C,
) -> Result<(AnalysisReport, AnalysisDiagnostics), AnalysisError> {
    config.validate()?;
    let run_start = clock.now();
    let base_nodes = graph.node_count();
    let base_edges = graph.edge_count();

    // 1. Augment.
    let start = clock.now();
    let augmentation = augment::augment(graph, input.land, input.sketches, config)?;
    let augment_diag = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Augment {
            nodes_added: augmentation.nodes_added,
            edges_added: augmentation.edges_added,
            candidate_pairs: augmentation.candidate_pairs,
            occluded_pairs: augmentation.occluded_pairs,
            isolated_nodes: augmentation.isolated.len(),
        },
    };

    // 2. Cluster.
    let start = clock.now();
    let (protected_sketches, clusters) = cluster_protected(input.sketches, config);
    let cluster_diag = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Cluster {
            sketches: input.sketches.len(),
            protected_sketches,
            clusters: clusters.len(),
            merged_clusters: clusters.iter().filter(|c| c.is_merged()).count(),
        },
    };

    // 3. Select and measure.
    let start = clock.now();
    let graph: &Graph = graph;
    let classes = class_reports(graph, &augmentation.node_index, &clusters, input, config);
    let spacing_diag = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Spacing {
            classes: classes.len(),
            replicates: classes.iter().map(|c| c.replicates.len()).sum(),
            paths: classes.iter().map(|c| c.outcome.paths().len()).sum(),
            failing_paths: classes
                .iter()
                .flat_map(|c| c.outcome.paths())
                .filter(|p| p.status == crate::spacing::PathStatus::Fail)
                .count(),
            failed_classes: classes.iter().filter(|c| c.outcome.is_failed()).count(),
        },
    };

    let diagnostics = AnalysisDiagnostics {
        augment: augment_diag,
        cluster: cluster_diag,
        spacing: spacing_diag,
        total_duration: clock.elapsed(&run_start),
        summary: AnalysisSummary {
            base_nodes,
            base_edges,
            final_nodes: graph.node_count(),
            final_edges: graph.edge_count(),
        },
    };

    let report = AnalysisReport {
        classes,
        clusters: clusters.iter().map(Into::into).collect(),
        isolated_nodes: augmentation.isolated,
    };
    Ok((report, diagnostics))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::replicate::{HabitatClass, OverlapTable};
    use crate::visibility::LandIndex;

    /// Clock that advances one millisecond per reading.
    struct TickClock(Cell<u64>);

    impl Clock for TickClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.0.get() + 1;
            self.0.set(t);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.now() - since)
        }
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let d = Duration::from_millis(1234);
        assert!((duration_ms(d) - 1234.0).abs() < 0.01);
    }

    #[test]
    fn empty_run_collects_every_stage() {
        let mut graph = Graph::new();
        let land = LandIndex::default();
        let overlaps = OverlapTable::default();
        let input = AnalysisInput {
            sketches: &[],
            land: &land,
            overlaps: &overlaps,
            classes: &[HabitatClass::Kelp],
        };
        let (report, diag) = analyze_with_diagnostics(
            &mut graph,
            &input,
            &SpacingConfig::default(),
            &TickClock(Cell::new(0)),
        )
        .unwrap();

        assert_eq!(report.classes.len(), 1);
        assert!(diag.total_duration >= diag.augment.duration);
        assert!(matches!(
            diag.cluster.metrics,
            StageMetrics::Cluster { clusters: 0, .. }
        ));

        let text = diag.report();
        assert!(text.contains("Spacing Diagnostics Report"));
        assert!(text.contains("Augment"));
        assert!(text.contains("1 classes"));
    }

    #[test]
    fn untimed_analysis_matches_timed_report() {
        let sketch = |id: &str, x: f64| {
            crate::Sketch::new(
                id,
                id,
                crate::ProtectionLevel::High,
                crate::Designation::MarineReserve,
                geo::MultiPolygon::new(vec![geo::Polygon::new(
                    geo::LineString::from(vec![(x, 0.0), (x + 4.0, 0.0), (x + 4.0, 4.0), (x, 4.0)]),
                    vec![],
                )]),
            )
        };
        let sketches = [sketch("a", 0.0), sketch("b", 20.0)];
        let land = LandIndex::default();
        let mut overlaps = OverlapTable::default();
        overlaps.overlaps.insert(
            HabitatClass::Kelp,
            [("a".to_string(), 2.0), ("b".to_string(), 2.0)].into(),
        );
        let input = AnalysisInput {
            sketches: &sketches,
            land: &land,
            overlaps: &overlaps,
            classes: &[HabitatClass::Kelp, HabitatClass::Beaches],
        };
        let config = SpacingConfig {
            metric: crate::DistanceMetric::Planar,
            ..SpacingConfig::default()
        };

        let plain = crate::analyze(&mut Graph::new(), &input, &config).unwrap();
        let (timed, diag) =
            analyze_with_diagnostics(&mut Graph::new(), &input, &config, &TickClock(Cell::new(0)))
                .unwrap();
        assert_eq!(plain, timed);
        assert_eq!(plain.class(HabitatClass::Kelp).unwrap().outcome.paths().len(), 1);
        assert_eq!(diag.summary.final_nodes, 8);
    }

    #[test]
    fn no_clock_reports_zero_durations() {
        let mut graph = Graph::new();
        let land = LandIndex::default();
        let overlaps = OverlapTable::default();
        let input = AnalysisInput {
            sketches: &[],
            land: &land,
            overlaps: &overlaps,
            classes: &[],
        };
        let (_, diag) =
            analyze_with_diagnostics(&mut graph, &input, &SpacingConfig::default(), &NoClock)
                .unwrap();
        assert_eq!(diag.total_duration, Duration::ZERO);
    }

    #[test]
    fn diagnostics_serialize_durations_as_seconds() {
        let stage = StageDiagnostics {
            duration: Duration::from_millis(1500),
            metrics: StageMetrics::Cluster {
                sketches: 3,
                protected_sketches: 2,
                clusters: 1,
                merged_clusters: 1,
            },
        };
        let json = serde_json::to_value(&stage).unwrap();
        assert_eq!(json["duration"], 1.5);
        let back: StageDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back.duration, Duration::from_millis(1500));
    }
}
