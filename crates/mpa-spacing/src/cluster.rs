//! Sketch clustering: merge spatially contiguous sketches so that
//! adjacent protected areas count as one replicate.
//!
//! Sketches are visited in input order. The first unassigned sketch seeds
//! a cluster; its geometry is simplified (Ramer-Douglas-Peucker) and
//! grown by a small buffer, and every later unassigned sketch that
//! intersects the grown seed joins. Simplification and buffering happen
//! in a local meter frame centered on the seed, so the margin is the
//! same width in every direction. Membership is tested against the seed
//! only: if `B` touches the seed `A` and `C` touches `B` but not `A`,
//! `C` starts its own cluster.

use geo::{BooleanOps, Buffer, Centroid, Coord, Intersects, LineString, MapCoords, MultiPolygon, Polygon};

use crate::sketch::Sketch;
use crate::types::{DistanceMetric, SpacingConfig};

/// A group of contiguous sketches analyzed as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Representative id (the seed sketch's id).
    pub id: String,
    /// Display name; member names joined with `" & "` for merged clusters.
    pub name: String,
    /// Member sketch ids, seed first, then input order.
    pub sketch_ids: Vec<String>,
    /// Union of member geometries.
    pub geometry: MultiPolygon<f64>,
    /// Area of `geometry` in square miles.
    pub area_sq_miles: f64,
}

impl Cluster {
    /// Returns `true` if more than one sketch was merged.
    #[must_use]
    pub fn is_merged(&self) -> bool {
        self.sketch_ids.len() > 1
    }

    /// Returns `true` if `sketch_id` is a member.
    #[must_use]
    pub fn contains(&self, sketch_id: &str) -> bool {
        self.sketch_ids.iter().any(|id| id == sketch_id)
    }
}

/// Group `sketches` into clusters. Every input sketch lands in exactly
/// one cluster and cluster order follows seed order.
#[must_use]
pub fn cluster_sketches(sketches: &[&Sketch], config: &SpacingConfig) -> Vec<Cluster> {
    let metric = config.metric;

    let mut assigned = vec![false; sketches.len()];
    let mut clusters = Vec::new();

    for (seed_idx, seed) in sketches.iter().enumerate() {
        if assigned[seed_idx] {
            continue;
        }
        assigned[seed_idx] = true;

        let zone = contiguity_zone(&seed.geometry, metric, config);
        let mut members = vec![*seed];
        for (idx, other) in sketches.iter().enumerate().skip(seed_idx + 1) {
            if !assigned[idx] && zone.intersects(&other.geometry) {
                assigned[idx] = true;
                members.push(*other);
            }
        }

        let geometry = members
            .iter()
            .skip(1)
            .fold(seed.geometry.clone(), |acc, m| acc.union(&m.geometry));
        let name = members
            .iter()
            .map(|m| m.name.as_str())
            .collect::<Vec<_>>()
            .join(" & ");

        if members.len() > 1 {
            tracing::debug!(seed = %seed.id, members = members.len(), "merged contiguous sketches");
        }

        clusters.push(Cluster {
            id: seed.id.clone(),
            name,
            sketch_ids: members.iter().map(|m| m.id.clone()).collect(),
            area_sq_miles: metric.area_sq_miles(&geometry),
            geometry,
        });
    }

    clusters
}

/// Simplified and buffered seed geometry used for the contiguity test,
/// in node coordinates.
fn contiguity_zone(
    geometry: &MultiPolygon<f64>,
    metric: DistanceMetric,
    config: &SpacingConfig,
) -> MultiPolygon<f64> {
    let Some(center) = geometry.centroid() else {
        return geometry.clone();
    };
    let frame = metric.local_frame(center.0);

    let local = geometry.map_coords(|c| frame.to_meters(c));
    let simplified = simplify_multi_polygon(&local, config.cluster_simplify_meters);
    let grown = if config.cluster_buffer_meters > 0.0 {
        let buffered = simplified.buffer(config.cluster_buffer_meters);
        if buffered.0.is_empty() { simplified } else { buffered }
    } else {
        simplified
    };
    grown.map_coords(|m| frame.to_coordinates(m))
}

// ---------------------------------------------------------------------------
// Ring simplification (Ramer-Douglas-Peucker)
// ---------------------------------------------------------------------------

fn simplify_multi_polygon(geometry: &MultiPolygon<f64>, tolerance: f64) -> MultiPolygon<f64> {
    MultiPolygon::new(
        geometry
            .iter()
            .map(|polygon| {
                Polygon::new(
                    simplify_ring(polygon.exterior(), tolerance),
                    polygon
                        .interiors()
                        .iter()
                        .map(|ring| simplify_ring(ring, tolerance))
                        .collect(),
                )
            })
            .collect(),
    )
}

/// Simplify a closed ring. A ring that would collapse below a triangle
/// is returned unchanged.
fn simplify_ring(ring: &LineString<f64>, tolerance: f64) -> LineString<f64> {
    let points = ring.0.as_slice();
    if points.len() < 5 || tolerance <= 0.0 {
        return ring.clone();
    }

    let mut kept = vec![false; points.len()];
    kept[0] = true;
    kept[points.len() - 1] = true;
    rdp_recurse(points, 0, points.len() - 1, tolerance, &mut kept);

    let simplified: Vec<Coord<f64>> = points
        .iter()
        .zip(&kept)
        .filter(|&(_, k)| *k)
        .map(|(&p, _)| p)
        .collect();

    if simplified.len() < 4 {
        ring.clone()
    } else {
        LineString::new(simplified)
    }
}

/// Keep the point farthest from the `start`-`end` chord when it lies
/// beyond `tolerance`, then recurse on both halves.
fn rdp_recurse(points: &[Coord<f64>], start: usize, end: usize, tolerance: f64, kept: &mut [bool]) {
    if end <= start + 1 {
        return;
    }

    let mut max_dist = 0.0;
    let mut max_idx = start;
    for i in (start + 1)..end {
        let d = perpendicular_distance(points[i], points[start], points[end]);
        if d > max_dist {
            max_dist = d;
            max_idx = i;
        }
    }

    if max_dist > tolerance {
        kept[max_idx] = true;
        rdp_recurse(points, start, max_idx, tolerance, kept);
        rdp_recurse(points, max_idx, end, tolerance, kept);
    }
}

/// Distance from `p` to the line through `a` and `b`; point distance
/// when `a == b` (the closing chord of a ring).
fn perpendicular_distance(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx.mul_add(dx, dy * dy);

    if length_sq == 0.0 {
        return (p.x - a.x).hypot(p.y - a.y);
    }

    let cross = dx.mul_add(a.y - p.y, -(dy * (a.x - p.x)));
    cross.abs() / length_sq.sqrt()
}
