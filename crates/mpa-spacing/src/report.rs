//! Analysis output: one entry per habitat class plus run-wide context.
//!
//! A class either completes with its full path set or fails with an
//! explicit reason; one failing class never hides the others.

use serde::Serialize;

use crate::augment::IsolatedNodeWarning;
use crate::cluster::Cluster;
use crate::replicate::{HabitatClass, ReplicateSet};
use crate::sketch::PolygonalGeometry;
use crate::spacing::{PathStatus, SpacingPath};
use crate::types::SpacingError;

/// Result of a whole analysis run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    /// Per-class results, in request order.
    pub classes: Vec<ClassReport>,
    /// Clusters formed from the protected sketches.
    pub clusters: Vec<ClusterSummary>,
    /// Sketch nodes left without edges during augmentation.
    pub isolated_nodes: Vec<IsolatedNodeWarning>,
}

impl AnalysisReport {
    /// The report for `class`, if it was requested.
    #[must_use]
    pub fn class(&self, class: HabitatClass) -> Option<&ClassReport> {
        self.classes.iter().find(|c| c.class == class)
    }

    /// Returns `true` if any class failed outright.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.classes.iter().any(|c| c.outcome.is_failed())
    }
}

/// Cluster identity, size and merged outline.
///
/// Overlap tables are keyed by `id`; for a merged cluster the overlap
/// should be measured against `geometry`, not the seed sketch alone.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    /// Representative id.
    pub id: String,
    /// Composite display name.
    pub name: String,
    /// Member sketch ids.
    pub sketch_ids: Vec<String>,
    /// Area in square miles.
    pub area_sq_miles: f64,
    /// Union of member geometries (GeoJSON).
    pub geometry: PolygonalGeometry,
}

impl From<&Cluster> for ClusterSummary {
    fn from(cluster: &Cluster) -> Self {
        Self {
            id: cluster.id.clone(),
            name: cluster.name.clone(),
            sketch_ids: cluster.sketch_ids.clone(),
            area_sq_miles: cluster.area_sq_miles,
            geometry: (&cluster.geometry).into(),
        }
    }
}

/// Spacing result for one habitat class.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassReport {
    /// Habitat class.
    pub class: HabitatClass,
    /// Clusters selected (and rejected) as replicates.
    pub replicates: ReplicateSet,
    /// Paths or failure reason.
    #[serde(flatten)]
    pub outcome: ClassOutcome,
}

impl ClassReport {
    /// Build a report from the spacing result for `class`.
    #[must_use]
    pub fn new(
        class: HabitatClass,
        replicates: ReplicateSet,
        result: Result<Vec<SpacingPath>, SpacingError>,
    ) -> Self {
        let outcome = match result {
            Ok(paths) => ClassOutcome::Complete {
                summary: SpacingSummary::from_paths(&paths),
                paths,
            },
            Err(e) => ClassOutcome::Failed {
                reason: e.to_string(),
            },
        };
        Self {
            class,
            replicates,
            outcome,
        }
    }
}

/// Outcome of a class analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ClassOutcome {
    /// Every tree edge was measured.
    Complete {
        /// One path per minimum-spanning-tree edge.
        paths: Vec<SpacingPath>,
        /// Aggregate over `paths`.
        summary: SpacingSummary,
    },
    /// The class could not be analyzed.
    Failed {
        /// Human-readable cause.
        reason: String,
    },
}

impl ClassOutcome {
    /// Returns `true` for [`Failed`](Self::Failed).
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Paths of a completed class; empty for a failed one.
    #[must_use]
    pub fn paths(&self) -> &[SpacingPath] {
        match self {
            Self::Complete { paths, .. } => paths,
            Self::Failed { .. } => &[],
        }
    }
}

/// Aggregate distances for one class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpacingSummary {
    /// Number of measured replicate pairs.
    pub path_count: usize,
    /// Pairs at or beyond the threshold.
    pub failing_paths: usize,
    /// Sum of path distances in miles.
    pub total_miles: f64,
    /// Longest path in miles (0 when there are no paths).
    pub max_miles: f64,
    /// Every pair passes.
    pub meets_guideline: bool,
}

impl SpacingSummary {
    /// Summarize a path set.
    #[must_use]
    pub fn from_paths(paths: &[SpacingPath]) -> Self {
        let failing_paths = paths
            .iter()
            .filter(|p| p.status == PathStatus::Fail)
            .count();
        Self {
            path_count: paths.len(),
            failing_paths,
            total_miles: paths.iter().map(|p| p.distance_miles).sum(),
            max_miles: paths.iter().map(|p| p.distance_miles).fold(0.0, f64::max),
            meets_guideline: failing_paths == 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn path(from: &str, to: &str, miles: f64, status: PathStatus) -> SpacingPath {
        SpacingPath {
            from: from.to_string(),
            to: to.to_string(),
            node_ids: vec![],
            coordinates: vec![[0.0, 0.0], [miles, 0.0]],
            distance_miles: miles,
            status,
        }
    }

    #[test]
    fn summary_aggregates_paths() {
        let summary = SpacingSummary::from_paths(&[
            path("a", "b", 40.0, PathStatus::Pass),
            path("b", "c", 70.0, PathStatus::Fail),
        ]);
        assert_eq!(summary.path_count, 2);
        assert_eq!(summary.failing_paths, 1);
        assert!((summary.total_miles - 110.0).abs() < 1e-12);
        assert!((summary.max_miles - 70.0).abs() < 1e-12);
        assert!(!summary.meets_guideline);
    }

    #[test]
    fn empty_path_set_meets_guideline() {
        let summary = SpacingSummary::from_paths(&[]);
        assert_eq!(summary.path_count, 0);
        assert!(summary.max_miles.abs() < f64::EPSILON);
        assert!(summary.meets_guideline);
    }

    #[test]
    fn cluster_summary_carries_merged_outline() {
        let square = |x: f64| {
            geo::Polygon::new(
                geo::LineString::from(vec![(x, 0.0), (x + 1.0, 0.0), (x + 1.0, 1.0), (x, 1.0)]),
                vec![],
            )
        };
        let cluster = Cluster {
            id: "a".to_string(),
            name: "a & b".to_string(),
            sketch_ids: vec!["a".to_string(), "b".to_string()],
            geometry: geo::MultiPolygon::new(vec![square(0.0), square(5.0)]),
            area_sq_miles: 2.0,
        };
        let json = serde_json::to_value(ClusterSummary::from(&cluster)).unwrap();
        assert_eq!(json["sketchIds"], serde_json::json!(["a", "b"]));
        assert_eq!(json["geometry"]["type"], "MultiPolygon");
        assert_eq!(json["geometry"]["coordinates"].as_array().unwrap().len(), 2);
        assert_eq!(json["geometry"]["coordinates"][1][0][0], serde_json::json!([5.0, 0.0]));
    }

    #[test]
    fn failed_class_carries_reason() {
        let report = ClassReport::new(
            HabitatClass::Kelp,
            ReplicateSet::default(),
            Err(SpacingError::NoPathFound {
                class: HabitatClass::Kelp,
                from: "a".to_string(),
                to: "b".to_string(),
            }),
        );
        assert!(report.outcome.is_failed());
        assert!(report.outcome.paths().is_empty());
        assert!(matches!(
            &report.outcome,
            ClassOutcome::Failed { reason } if reason.contains("`a`") && reason.contains("kelp")
        ));
    }

    #[test]
    fn class_report_json_shape() {
        let report = ClassReport::new(
            HabitatClass::Beaches,
            ReplicateSet {
                cluster_ids: vec!["a".to_string(), "b".to_string()],
                ..ReplicateSet::default()
            },
            Ok(vec![path("a", "b", 12.5, PathStatus::Pass)]),
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["class"], "beaches");
        assert_eq!(json["result"], "complete");
        assert_eq!(json["replicates"]["clusterIds"][1], "b");
        assert_eq!(json["paths"][0]["status"], "pass");
        assert_eq!(json["paths"][0]["distanceMiles"], 12.5);
        assert_eq!(json["summary"]["meetsGuideline"], true);
    }
}
