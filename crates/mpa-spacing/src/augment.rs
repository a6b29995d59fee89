//! Graph augmentation: inject sketch perimeter vertices into the base
//! coastline graph and wire them to nearby nodes across open water.
//!
//! # Phases
//!
//! 1. **Register (single writer):** walk sketches in input order. Each
//!    exterior-ring vertex becomes a node `sketch-{s}-{r}-{v}` and is
//!    inserted into the graph and spatial index before the next sketch
//!    is processed, so later sketches see earlier ones. A vertex that is
//!    bit-identical to an existing sketch node reuses that node instead;
//!    touching sketches therefore share node ids. After a sketch's nodes
//!    are registered, each new node queries the index for neighbors
//!    within the search radius. Nodes with no neighbors are reported as
//!    [`IsolatedNodeWarning`]s and left edgeless.
//! 2. **Test (parallel, read-only):** every candidate pair is checked
//!    against the land features near its sketch on the rayon pool.
//! 3. **Connect (single writer):** accepted pairs become undirected
//!    edges, applied in registration order.
//!
//! Holes in sketch polygons are ignored.

use std::collections::{BTreeMap, HashMap};

use geo::Coord;
use petgraph::graph::NodeIndex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::graph::Graph;
use crate::sketch::Sketch;
use crate::types::{MalformedGraphError, SpacingConfig};
use crate::visibility::{LandIndex, VisibilityOracle, expanded_bounds};

/// Bit-exact coordinate key for vertex dedup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CoordKey {
    x_bits: u64,
    y_bits: u64,
}

impl CoordKey {
    const fn from_coord(c: Coord<f64>) -> Self {
        Self {
            x_bits: c.x.to_bits(),
            y_bits: c.y.to_bits(),
        }
    }
}

/// Sketch id to the graph node ids on its perimeter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SketchNodeIndex(BTreeMap<String, Vec<String>>);

impl SketchNodeIndex {
    /// Node ids for `sketch_id`, if the sketch was augmented.
    #[must_use]
    pub fn nodes(&self, sketch_id: &str) -> Option<&[String]> {
        self.0.get(sketch_id).map(Vec::as_slice)
    }

    /// Number of sketches indexed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no sketch was indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(sketch_id, node_ids)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl FromIterator<(String, Vec<String>)> for SketchNodeIndex {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A sketch-derived node found nothing within the search radius.
///
/// Not an error: the node stays in the graph without edges and any path
/// that needs it later fails with
/// [`SpacingError::NoPathFound`](crate::types::SpacingError::NoPathFound).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsolatedNodeWarning {
    /// Sketch that produced the node.
    pub sketch_id: String,
    /// The isolated node.
    pub node_id: String,
    /// Its coordinate.
    pub coordinate: [f64; 2],
}

/// Result of augmenting a graph with a set of sketches.
#[derive(Debug, Clone, Default)]
pub struct Augmentation {
    /// Perimeter node ids per sketch.
    pub node_index: SketchNodeIndex,
    /// Nodes left without neighbors.
    pub isolated: Vec<IsolatedNodeWarning>,
    /// Nodes created (excluding reused coincident vertices).
    pub nodes_added: usize,
    /// Edges created.
    pub edges_added: usize,
    /// Candidate pairs examined.
    pub candidate_pairs: usize,
    /// Candidate pairs rejected because land was in the way.
    pub occluded_pairs: usize,
}

/// A candidate connection awaiting the visibility test.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    from: NodeIndex,
    to: NodeIndex,
    from_coord: Coord<f64>,
    to_coord: Coord<f64>,
    distance: f64,
}

/// Candidates produced by one sketch, tested against land near it.
struct SketchBatch {
    candidates: Vec<Candidate>,
    region: Option<geo::Rect<f64>>,
}

/// Exterior-ring vertices of every polygon, without the closing repeat.
fn perimeter_vertices(sketch: &Sketch) -> impl Iterator<Item = (usize, usize, Coord<f64>)> + '_ {
    sketch
        .geometry
        .iter()
        .enumerate()
        .flat_map(|(ring_idx, polygon)| {
            let coords = polygon.exterior().0.as_slice();
            let open = if coords.len() > 1 && coords.first() == coords.last() {
                &coords[..coords.len() - 1]
            } else {
                coords
            };
            open.iter()
                .enumerate()
                .map(move |(vertex_idx, c)| (ring_idx, vertex_idx, *c))
        })
}

/// Augment `graph` with the perimeter vertices of `sketches`.
///
/// # Errors
///
/// Returns [`MalformedGraphError::DuplicateNode`] if a generated node id
/// collides with an id already in the base graph, or
/// [`MalformedGraphError::InvalidCoordinate`] for a non-finite vertex.
pub fn augment(
    graph: &mut Graph,
    land: &LandIndex,
    sketches: &[Sketch],
    config: &SpacingConfig,
) -> Result<Augmentation, MalformedGraphError> {
    let metric = config.metric;
    let mut out = Augmentation::default();
    let mut sketch_nodes: HashMap<CoordKey, NodeIndex> = HashMap::new();
    let mut index = BTreeMap::new();
    let mut batches = Vec::with_capacity(sketches.len());

    // Phase 1: register nodes and gather candidates.
    for (sketch_idx, sketch) in sketches.iter().enumerate() {
        let mut ids: Vec<String> = Vec::new();
        let mut fresh: Vec<(NodeIndex, Coord<f64>)> = Vec::new();

        for (ring_idx, vertex_idx, coord) in perimeter_vertices(sketch) {
            let key = CoordKey::from_coord(coord);
            let node = if let Some(&existing) = sketch_nodes.get(&key) {
                existing
            } else {
                let id = format!("sketch-{sketch_idx}-{ring_idx}-{vertex_idx}");
                let node = graph.add_node(id, coord)?;
                sketch_nodes.insert(key, node);
                fresh.push((node, coord));
                out.nodes_added += 1;
                node
            };
            if let Some(n) = graph.node(node)
                && !ids.contains(&n.id)
            {
                ids.push(n.id.clone());
            }
        }

        let batch_position: HashMap<NodeIndex, usize> =
            fresh.iter().enumerate().map(|(i, &(n, _))| (n, i)).collect();
        let mut candidates = Vec::new();
        for (position, &(node, coord)) in fresh.iter().enumerate() {
            let neighbors: Vec<NodeIndex> = graph
                .spatial_index()
                .within_radius(coord, config.search_radius, metric)
                .into_iter()
                .filter(|&n| n != node)
                .collect();

            if neighbors.is_empty() {
                let node_id = graph.node(node).map(|n| n.id.clone()).unwrap_or_default();
                tracing::warn!(
                    sketch = %sketch.id,
                    node = %node_id,
                    radius = config.search_radius,
                    "isolated sketch node: no graph nodes within search radius",
                );
                out.isolated.push(IsolatedNodeWarning {
                    sketch_id: sketch.id.clone(),
                    node_id,
                    coordinate: [coord.x, coord.y],
                });
                continue;
            }

            for neighbor in neighbors {
                // Pairs within this batch are queued once, from the later node.
                if batch_position.get(&neighbor).is_some_and(|&p| p < position) {
                    continue;
                }
                let Some(to_coord) = graph.node(neighbor).map(|n| n.coord) else {
                    continue;
                };
                candidates.push(Candidate {
                    from: node,
                    to: neighbor,
                    from_coord: coord,
                    to_coord,
                    distance: metric.distance(coord, to_coord),
                });
            }
        }

        let fresh_coords: Vec<Coord<f64>> = fresh.iter().map(|&(_, c)| c).collect();
        let margin = fresh_coords
            .first()
            .map_or(0.0, |&c| metric.coordinate_radius(c, config.search_radius));
        out.candidate_pairs += candidates.len();
        batches.push(SketchBatch {
            candidates,
            region: expanded_bounds(&fresh_coords, margin),
        });
        index.insert(sketch.id.clone(), ids);
    }

    // Phase 2: visibility tests in parallel.
    let accepted: Vec<Vec<Candidate>> = batches
        .par_iter()
        .map(|batch| {
            let Some(region) = batch.region else {
                return Vec::new();
            };
            let oracle = land.oracle_for(region);
            batch
                .candidates
                .iter()
                .filter(|c| {
                    c.distance < config.min_connect_distance
                        || oracle.is_clear(c.from_coord, c.to_coord)
                })
                .copied()
                .collect()
        })
        .collect();

    // Phase 3: apply edges.
    let accepted_count: usize = accepted.iter().map(Vec::len).sum();
    out.occluded_pairs = out.candidate_pairs - accepted_count;
    for candidate in accepted.into_iter().flatten() {
        if graph.connect(candidate.from, candidate.to, candidate.distance) {
            out.edges_added += 1;
        }
    }

    tracing::debug!(
        sketches = sketches.len(),
        nodes_added = out.nodes_added,
        edges_added = out.edges_added,
        occluded = out.occluded_pairs,
        isolated = out.isolated.len(),
        "graph augmented",
    );

    out.node_index = SketchNodeIndex(index);
    Ok(out)
}
