//! The coastline visibility graph and its spatial index.
//!
//! [`Graph`] owns both the `petgraph` adjacency and an R\*-tree over node
//! coordinates, so a node can never exist in one without the other.
//! Structural mutation (`add_node`, `connect`) is crate-private and
//! takes `&mut self`: during augmentation the borrow checker guarantees a
//! single writer, and once augmentation returns the caller only holds
//! `&Graph` for path search.
//!
//! # Serialized form
//!
//! ```json
//! {
//!   "nodes": { "n1": [-122.5, 37.7], "n2": [-122.4, 37.8] },
//!   "edges": [ { "source": "n1", "target": "n2", "weight": 8.4 } ]
//! }
//! ```
//!
//! Edges are undirected. A pair may be listed in both directions as
//! long as the weights agree.

use std::collections::{BTreeMap, HashMap};

use geo::Coord;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use rstar::RTree;
use rstar::primitives::GeomWithData;
use serde::{Deserialize, Serialize};

use crate::types::{DistanceMetric, MalformedGraphError};

/// Two weights closer than this are the same weight.
const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Serialized graph payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphPayload {
    /// Node id to `[lon, lat]`.
    pub nodes: BTreeMap<String, [f64; 2]>,
    /// Undirected weighted edges.
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
}

/// One undirected edge in a [`GraphPayload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// One endpoint id.
    pub source: String,
    /// The other endpoint id.
    pub target: String,
    /// Distance between the endpoints in miles.
    pub weight: f64,
}

/// A graph node: its id and coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    /// Stable identifier.
    pub id: String,
    /// `x` = longitude, `y` = latitude (or projected miles).
    pub coord: Coord<f64>,
}

/// A node coordinate in the R\*-tree, tagged with its graph index.
type IndexedNode = GeomWithData<[f64; 2], NodeIndex>;

/// R\*-tree over node coordinates supporting radius queries.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    tree: RTree<IndexedNode>,
}

impl SpatialIndex {
    fn bulk_load(nodes: Vec<IndexedNode>) -> Self {
        Self {
            tree: RTree::bulk_load(nodes),
        }
    }

    fn insert(&mut self, coord: Coord<f64>, node: NodeIndex) {
        self.tree.insert(GeomWithData::new([coord.x, coord.y], node));
    }

    /// Number of indexed nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Returns `true` if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// All nodes within `radius` miles of `center`, in index order.
    ///
    /// The R\*-tree is queried with a coordinate-space circle that is
    /// guaranteed to contain the true radius, then each hit is checked
    /// with the exact metric.
    #[must_use]
    pub fn within_radius(
        &self,
        center: Coord<f64>,
        radius: f64,
        metric: DistanceMetric,
    ) -> Vec<NodeIndex> {
        let query_radius = metric.coordinate_radius(center, radius);
        let mut hits: Vec<NodeIndex> = self
            .tree
            .locate_within_distance([center.x, center.y], query_radius * query_radius)
            .filter(|entry| {
                let [x, y] = *entry.geom();
                metric.distance(center, Coord { x, y }) <= radius
            })
            .map(|entry| entry.data)
            .collect();
        hits.sort_unstable();
        hits
    }
}

/// Undirected weighted visibility graph keyed by string node ids.
#[derive(Debug, Clone)]
pub struct Graph {
    inner: UnGraph<GraphNode, f64>,
    ids: HashMap<String, NodeIndex>,
    index: SpatialIndex,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// An empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: UnGraph::new_undirected(),
            ids: HashMap::new(),
            index: SpatialIndex::bulk_load(Vec::new()),
        }
    }

    /// Deserialize a precomputed base graph and bulk-load its spatial
    /// index.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedGraphError`] if a coordinate is not finite, an
    /// edge references a missing node, an edge weight is negative or not
    /// finite, or one pair is listed twice with different weights.
    pub fn from_payload(payload: &GraphPayload) -> Result<Self, MalformedGraphError> {
        let mut inner =
            UnGraph::with_capacity(payload.nodes.len(), payload.edges.len());
        let mut ids = HashMap::with_capacity(payload.nodes.len());
        let mut points = Vec::with_capacity(payload.nodes.len());

        for (id, &[x, y]) in &payload.nodes {
            if !x.is_finite() || !y.is_finite() {
                return Err(MalformedGraphError::InvalidCoordinate(id.clone()));
            }
            let coord = Coord { x, y };
            let idx = inner.add_node(GraphNode {
                id: id.clone(),
                coord,
            });
            ids.insert(id.clone(), idx);
            points.push(GeomWithData::new([x, y], idx));
        }

        let mut graph = Self {
            inner,
            ids,
            index: SpatialIndex::bulk_load(points),
        };

        for edge in &payload.edges {
            let resolve = |id: &str| {
                graph
                    .ids
                    .get(id)
                    .copied()
                    .ok_or_else(|| MalformedGraphError::DanglingEdge {
                        source_id: edge.source.clone(),
                        target_id: edge.target.clone(),
                        missing: id.to_string(),
                    })
            };
            let a = resolve(&edge.source)?;
            let b = resolve(&edge.target)?;

            if !edge.weight.is_finite() || edge.weight < 0.0 {
                return Err(MalformedGraphError::InvalidWeight {
                    source_id: edge.source.clone(),
                    target_id: edge.target.clone(),
                    weight: edge.weight,
                });
            }

            if let Some(existing) = graph.inner.find_edge(a, b) {
                let first = graph.inner[existing];
                if (first - edge.weight).abs() > WEIGHT_TOLERANCE {
                    return Err(MalformedGraphError::ConflictingWeight {
                        source_id: edge.source.clone(),
                        target_id: edge.target.clone(),
                        first,
                        second: edge.weight,
                    });
                }
                continue;
            }
            graph.inner.add_edge(a, b, edge.weight);
        }

        Ok(graph)
    }

    /// Serialize back to the payload form.
    ///
    /// `Graph::from_payload(&g.to_payload())` reproduces every node,
    /// coordinate, edge and weight of `g`.
    #[must_use]
    pub fn to_payload(&self) -> GraphPayload {
        let nodes = self
            .inner
            .node_weights()
            .map(|n| (n.id.clone(), [n.coord.x, n.coord.y]))
            .collect();
        let edges = self
            .inner
            .edge_references()
            .map(|e| EdgeRecord {
                source: self.inner[e.source()].id.clone(),
                target: self.inner[e.target()].id.clone(),
                weight: *e.weight(),
            })
            .collect();
        GraphPayload { nodes, edges }
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Number of undirected edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node_index(&self, id: &str) -> Option<NodeIndex> {
        self.ids.get(id).copied()
    }

    /// The node at `idx`, if it exists.
    #[must_use]
    pub fn node(&self, idx: NodeIndex) -> Option<&GraphNode> {
        self.inner.node_weight(idx)
    }

    /// Weight of the edge between two node ids, if connected.
    #[must_use]
    pub fn weight(&self, a: &str, b: &str) -> Option<f64> {
        let a = self.node_index(a)?;
        let b = self.node_index(b)?;
        self.inner.find_edge(a, b).map(|e| self.inner[e])
    }

    /// Ids of the nodes adjacent to `id`.
    #[must_use]
    pub fn neighbors(&self, id: &str) -> Vec<&str> {
        self.node_index(id)
            .map(|idx| {
                self.inner
                    .neighbors(idx)
                    .map(|n| self.inner[n].id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The spatial index over every node.
    #[must_use]
    pub const fn spatial_index(&self) -> &SpatialIndex {
        &self.index
    }

    /// The underlying `petgraph` graph, for path search.
    pub(crate) const fn inner(&self) -> &UnGraph<GraphNode, f64> {
        &self.inner
    }

    /// Register a node in both the adjacency and the spatial index.
    pub(crate) fn add_node(
        &mut self,
        id: String,
        coord: Coord<f64>,
    ) -> Result<NodeIndex, MalformedGraphError> {
        if self.ids.contains_key(&id) {
            return Err(MalformedGraphError::DuplicateNode(id));
        }
        if !coord.x.is_finite() || !coord.y.is_finite() {
            return Err(MalformedGraphError::InvalidCoordinate(id));
        }
        let idx = self.inner.add_node(GraphNode {
            id: id.clone(),
            coord,
        });
        self.ids.insert(id, idx);
        self.index.insert(coord, idx);
        Ok(idx)
    }

    /// Add an undirected edge unless the pair is already connected.
    ///
    /// Returns `true` if a new edge was added.
    pub(crate) fn connect(&mut self, a: NodeIndex, b: NodeIndex, weight: f64) -> bool {
        if a == b || self.inner.find_edge(a, b).is_some() {
            return false;
        }
        self.inner.add_edge(a, b, weight);
        true
    }
}
