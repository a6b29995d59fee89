//! Replicate spacing: minimum spanning tree over replicate centroids,
//! then the shortest water path for every tree edge.
//!
//! The tree decides *which* replicate pairs are measured; the graph
//! decides *how far apart* they are. A pair passes when its path is
//! strictly shorter than the spacing threshold.
//!
//! # Determinism
//!
//! Replicates are sorted by id before the tree is built. Prim's
//! algorithm starts from the first replicate, and on equal weights the
//! vertex with the lower index joins first; a vertex keeps the first
//! tree vertex that reached it at its best weight as its parent.

use std::collections::HashSet;

use geo::{Centroid, Coord};
use petgraph::algo::astar;
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

use crate::augment::SketchNodeIndex;
use crate::cluster::Cluster;
use crate::graph::Graph;
use crate::replicate::HabitatClass;
use crate::types::{SpacingConfig, SpacingError};

/// Whether a replicate pair meets the spacing guideline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathStatus {
    /// Shorter than the threshold.
    Pass,
    /// At or beyond the threshold.
    Fail,
}

impl PathStatus {
    /// Classify a path distance against `threshold`.
    #[must_use]
    pub fn classify(distance_miles: f64, threshold: f64) -> Self {
        if distance_miles < threshold {
            Self::Pass
        } else {
            Self::Fail
        }
    }

    /// Map color used by the reporting layer.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Pass => "green",
            Self::Fail => "red",
        }
    }
}

/// Shortest water path between two replicates joined by a tree edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpacingPath {
    /// Source replicate (cluster) id.
    pub from: String,
    /// Target replicate (cluster) id.
    pub to: String,
    /// Graph node ids along the path.
    pub node_ids: Vec<String>,
    /// Coordinates along the path.
    pub coordinates: Vec<[f64; 2]>,
    /// Total path length in miles.
    pub distance_miles: f64,
    /// Pass/fail against the spacing threshold.
    pub status: PathStatus,
}

/// One edge of a minimum spanning tree over indexed points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MstEdge {
    /// Vertex already in the tree.
    pub from: usize,
    /// Vertex added by this edge.
    pub to: usize,
    /// Edge weight.
    pub weight: f64,
}

/// Prim's algorithm over the complete graph on `n` vertices.
///
/// Edges are returned in the order vertices join the tree. `O(n^2)`
/// time, which suits replicate counts in the tens.
pub fn minimum_spanning_tree(n: usize, weight: impl Fn(usize, usize) -> f64) -> Vec<MstEdge> {
    if n < 2 {
        return Vec::new();
    }

    let mut in_tree = vec![false; n];
    let mut best: Vec<(f64, usize)> = (0..n).map(|i| (weight(0, i), 0)).collect();
    in_tree[0] = true;
    let mut edges = Vec::with_capacity(n - 1);

    for _ in 1..n {
        let Some(next) = (0..n)
            .filter(|&i| !in_tree[i])
            .min_by(|&a, &b| best[a].0.total_cmp(&best[b].0).then(a.cmp(&b)))
        else {
            break;
        };
        in_tree[next] = true;
        let (w, parent) = best[next];
        edges.push(MstEdge {
            from: parent,
            to: next,
            weight: w,
        });

        for (i, slot) in best.iter_mut().enumerate() {
            if !in_tree[i] {
                let w = weight(next, i);
                if w < slot.0 {
                    *slot = (w, next);
                }
            }
        }
    }

    edges
}

/// Shortest path from any of `sources` to any of `targets`.
///
/// Runs a Dijkstra search (A\* with a zero heuristic and the whole target
/// set as goal) from every source and keeps the global minimum. When the
/// two sets share a node the distance is zero. Returns `None` if no
/// target is reachable.
#[must_use]
pub fn shortest_path(
    graph: &Graph,
    sources: &[NodeIndex],
    targets: &[NodeIndex],
) -> Option<(f64, Vec<NodeIndex>)> {
    let goal: HashSet<NodeIndex> = targets.iter().copied().collect();
    if let Some(&shared) = sources.iter().find(|s| goal.contains(s)) {
        return Some((0.0, vec![shared]));
    }

    let mut best: Option<(f64, Vec<NodeIndex>)> = None;
    for &source in sources {
        let found = astar(
            graph.inner(),
            source,
            |n| goal.contains(&n),
            |e| *e.weight(),
            |_| 0.0,
        );
        if let Some((cost, path)) = found
            && best.as_ref().is_none_or(|(b, _)| cost < *b)
        {
            best = Some((cost, path));
        }
    }
    best
}

/// Graph nodes on the perimeter of every sketch in `cluster`.
fn cluster_nodes(graph: &Graph, node_index: &SketchNodeIndex, cluster: &Cluster) -> Vec<NodeIndex> {
    let mut nodes: Vec<NodeIndex> = cluster
        .sketch_ids
        .iter()
        .filter_map(|id| node_index.nodes(id))
        .flatten()
        .filter_map(|id| graph.node_index(id))
        .collect();
    nodes.sort_unstable();
    nodes.dedup();
    nodes
}

/// Measure spacing between the `replicates` of one habitat class.
///
/// # Errors
///
/// Returns [`SpacingError::NoPathFound`] if two replicates joined by a
/// tree edge are not connected in `graph`, and
/// [`SpacingError::EmptyReplicate`] or
/// [`SpacingError::MissingSketchNodes`] if a replicate cannot be placed
/// on the graph.
pub fn analyze_spacing(
    class: HabitatClass,
    graph: &Graph,
    node_index: &SketchNodeIndex,
    replicates: &[&Cluster],
    config: &SpacingConfig,
) -> Result<Vec<SpacingPath>, SpacingError> {
    let mut replicates = replicates.to_vec();
    replicates.sort_by(|a, b| a.id.cmp(&b.id));
    if replicates.len() < 2 {
        return Ok(Vec::new());
    }

    let centroids = replicates
        .iter()
        .map(|c| {
            c.geometry
                .centroid()
                .map(|p| p.0)
                .ok_or_else(|| SpacingError::EmptyReplicate(c.id.clone()))
        })
        .collect::<Result<Vec<Coord<f64>>, _>>()?;

    let node_sets = replicates
        .iter()
        .map(|c| {
            let nodes = cluster_nodes(graph, node_index, c);
            if nodes.is_empty() {
                Err(SpacingError::MissingSketchNodes(c.id.clone()))
            } else {
                Ok(nodes)
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    let metric = config.metric;
    let tree = minimum_spanning_tree(replicates.len(), |a, b| {
        metric.distance(centroids[a], centroids[b])
    });

    tree.iter()
        .map(|edge| {
            let from = replicates[edge.from];
            let to = replicates[edge.to];
            let (distance, path) = shortest_path(graph, &node_sets[edge.from], &node_sets[edge.to])
                .ok_or_else(|| SpacingError::NoPathFound {
                    class,
                    from: from.id.clone(),
                    to: to.id.clone(),
                })?;

            let nodes: Vec<_> = path.iter().filter_map(|&n| graph.node(n)).collect();
            Ok(SpacingPath {
                from: from.id.clone(),
                to: to.id.clone(),
                node_ids: nodes.iter().map(|n| n.id.clone()).collect(),
                coordinates: nodes.iter().map(|n| [n.coord.x, n.coord.y]).collect(),
                distance_miles: distance,
                status: PathStatus::classify(distance, config.spacing_threshold),
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use geo::{LineString, MultiPolygon, Polygon};

    use super::*;
    use crate::graph::{EdgeRecord, GraphPayload};
    use crate::types::DistanceMetric;

    fn planar() -> SpacingConfig {
        SpacingConfig {
            metric: DistanceMetric::Planar,
            ..SpacingConfig::default()
        }
    }

    fn line_graph(coords: &[(&str, [f64; 2])]) -> Graph {
        let nodes = coords.iter().map(|(id, c)| ((*id).to_string(), *c)).collect();
        let edges = coords
            .windows(2)
            .map(|w| EdgeRecord {
                source: w[0].0.to_string(),
                target: w[1].0.to_string(),
                weight: DistanceMetric::Planar.distance(
                    Coord { x: w[0].1[0], y: w[0].1[1] },
                    Coord { x: w[1].1[0], y: w[1].1[1] },
                ),
            })
            .collect();
        Graph::from_payload(&GraphPayload { nodes, edges }).unwrap()
    }

    fn square_cluster(id: &str, x0: f64) -> Cluster {
        Cluster {
            id: id.to_string(),
            name: id.to_string(),
            sketch_ids: vec![id.to_string()],
            geometry: MultiPolygon::new(vec![Polygon::new(
                LineString::from(vec![(x0, 0.0), (x0 + 1.0, 0.0), (x0 + 1.0, 1.0), (x0, 1.0)]),
                vec![],
            )]),
            area_sq_miles: 1.0,
        }
    }

    fn node_index(entries: &[(&str, &[&str])]) -> SketchNodeIndex {
        entries
            .iter()
            .map(|(k, v)| {
                (
                    (*k).to_string(),
                    v.iter().map(|s| (*s).to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn threshold_is_strict() {
        assert_eq!(PathStatus::classify(62.0, 62.0), PathStatus::Fail);
        assert_eq!(PathStatus::classify(61.999, 62.0), PathStatus::Pass);
        assert_eq!(PathStatus::Pass.color(), "green");
        assert_eq!(PathStatus::Fail.color(), "red");
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&PathStatus::Pass).unwrap(), "\"pass\"");
        assert_eq!(serde_json::to_string(&PathStatus::Fail).unwrap(), "\"fail\"");
    }

    #[test]
    fn mst_on_collinear_points_chains_neighbors() {
        let xs = [0.0_f64, 10.0, 3.0, 7.0];
        let tree = minimum_spanning_tree(xs.len(), |a, b| (xs[a] - xs[b]).abs());
        let total: f64 = tree.iter().map(|e| e.weight).sum();
        assert_eq!(tree.len(), 3);
        assert!((total - 10.0).abs() < 1e-12);
        assert_eq!(tree[0], MstEdge { from: 0, to: 2, weight: 3.0 });
    }

    #[test]
    fn mst_ties_prefer_lower_index() {
        // Equilateral-ish: every edge has weight 1.
        let tree = minimum_spanning_tree(3, |_, _| 1.0);
        assert_eq!(tree[0].to, 1);
        assert_eq!(tree[1], MstEdge { from: 0, to: 2, weight: 1.0 });
    }

    #[test]
    fn mst_of_fewer_than_two_is_empty() {
        assert!(minimum_spanning_tree(0, |_, _| 0.0).is_empty());
        assert!(minimum_spanning_tree(1, |_, _| 0.0).is_empty());
    }

    #[test]
    fn shortest_path_takes_global_minimum_over_sources() {
        let g = line_graph(&[
            ("a", [0.0, 0.0]),
            ("b", [1.0, 0.0]),
            ("c", [5.0, 0.0]),
            ("d", [6.0, 0.0]),
        ]);
        let idx = |id| g.node_index(id).unwrap();
        let (cost, path) = shortest_path(&g, &[idx("a"), idx("b")], &[idx("c"), idx("d")]).unwrap();
        assert!((cost - 4.0).abs() < 1e-12);
        assert_eq!(path, vec![idx("b"), idx("c")]);
    }

    #[test]
    fn shared_node_is_zero_distance() {
        let g = line_graph(&[("a", [0.0, 0.0]), ("b", [1.0, 0.0])]);
        let idx = |id| g.node_index(id).unwrap();
        let (cost, path) = shortest_path(&g, &[idx("a"), idx("b")], &[idx("b")]).unwrap();
        assert!(cost.abs() < f64::EPSILON);
        assert_eq!(path, vec![idx("b")]);
    }

    #[test]
    fn disconnected_sets_have_no_path() {
        let nodes = [("a".to_string(), [0.0, 0.0]), ("b".to_string(), [1.0, 0.0])]
            .into_iter()
            .collect();
        let g = Graph::from_payload(&GraphPayload {
            nodes,
            edges: vec![],
        })
        .unwrap();
        let idx = |id| g.node_index(id).unwrap();
        assert!(shortest_path(&g, &[idx("a")], &[idx("b")]).is_none());
    }

    #[test]
    fn analyze_reports_pass_and_fail() {
        let g = line_graph(&[
            ("a0", [0.0, 0.0]),
            ("mid", [30.0, 0.0]),
            ("b0", [50.0, 0.0]),
            ("far", [100.0, 0.0]),
            ("c0", [120.0, 0.0]),
        ]);
        let clusters = [
            square_cluster("a", 0.0),
            square_cluster("b", 50.0),
            square_cluster("c", 120.0),
        ];
        let idx = node_index(&[("a", &["a0"]), ("b", &["b0"]), ("c", &["c0"])]);
        let refs: Vec<&Cluster> = clusters.iter().collect();

        let paths = analyze_spacing(HabitatClass::Kelp, &g, &idx, &refs, &planar()).unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!((paths[0].from.as_str(), paths[0].to.as_str()), ("a", "b"));
        assert!((paths[0].distance_miles - 50.0).abs() < 1e-9);
        assert_eq!(paths[0].status, PathStatus::Pass);
        assert_eq!(paths[0].node_ids, vec!["a0", "mid", "b0"]);
        assert_eq!(paths[0].coordinates[1], [30.0, 0.0]);
        assert_eq!((paths[1].from.as_str(), paths[1].to.as_str()), ("b", "c"));
        assert!((paths[1].distance_miles - 70.0).abs() < 1e-9);
        assert_eq!(paths[1].status, PathStatus::Fail);
    }

    #[test]
    fn replicate_order_does_not_change_result() {
        let g = line_graph(&[("a0", [0.0, 0.0]), ("b0", [50.0, 0.0]), ("c0", [120.0, 0.0])]);
        let clusters = [
            square_cluster("c", 120.0),
            square_cluster("a", 0.0),
            square_cluster("b", 50.0),
        ];
        let idx = node_index(&[("a", &["a0"]), ("b", &["b0"]), ("c", &["c0"])]);
        let forward: Vec<&Cluster> = clusters.iter().collect();
        let reversed: Vec<&Cluster> = clusters.iter().rev().collect();
        assert_eq!(
            analyze_spacing(HabitatClass::Kelp, &g, &idx, &forward, &planar()).unwrap(),
            analyze_spacing(HabitatClass::Kelp, &g, &idx, &reversed, &planar()).unwrap(),
        );
    }

    #[test]
    fn unreachable_replicate_is_no_path_found() {
        let g = Graph::from_payload(&GraphPayload {
            nodes: [("a0".to_string(), [0.0, 0.0]), ("b0".to_string(), [5.0, 0.0])]
                .into_iter()
                .collect(),
            edges: vec![],
        })
        .unwrap();
        let clusters = [square_cluster("a", 0.0), square_cluster("b", 5.0)];
        let idx = node_index(&[("a", &["a0"]), ("b", &["b0"])]);
        let refs: Vec<&Cluster> = clusters.iter().collect();
        let err = analyze_spacing(HabitatClass::Eelgrass, &g, &idx, &refs, &planar()).unwrap_err();
        assert_eq!(
            err,
            SpacingError::NoPathFound {
                class: HabitatClass::Eelgrass,
                from: "a".to_string(),
                to: "b".to_string(),
            }
        );
    }

    #[test]
    fn replicate_without_nodes_is_reported() {
        let g = line_graph(&[("a0", [0.0, 0.0]), ("b0", [5.0, 0.0])]);
        let clusters = [square_cluster("a", 0.0), square_cluster("b", 5.0)];
        let idx = node_index(&[("a", &["a0"])]);
        let refs: Vec<&Cluster> = clusters.iter().collect();
        let err = analyze_spacing(HabitatClass::Kelp, &g, &idx, &refs, &planar()).unwrap_err();
        assert_eq!(err, SpacingError::MissingSketchNodes("b".to_string()));
    }

    #[test]
    fn single_replicate_has_no_paths() {
        let g = Graph::new();
        let clusters = [square_cluster("a", 0.0)];
        let refs: Vec<&Cluster> = clusters.iter().collect();
        let paths = analyze_spacing(
            HabitatClass::Kelp,
            &g,
            &SketchNodeIndex::default(),
            &refs,
            &planar(),
        )
        .unwrap();
        assert!(paths.is_empty());
    }
}
