//! Land occlusion: is the straight segment between two coordinates clear
//! of land?
//!
//! The exact test lives behind the [`VisibilityOracle`] trait. The oracle
//! itself does no spatial filtering; [`LandIndex::oracle_for`] narrows
//! the land features to those whose bounding boxes touch the query
//! region before any exact intersection test runs.

use geo::{BoundingRect, Coord, Intersects, Line, MultiPolygon, Rect};

/// Decides whether two coordinates can see each other across water.
///
/// Implementations are read-only and shared across worker threads.
pub trait VisibilityOracle: Sync {
    /// Returns `true` if the segment from `a` to `b` crosses no land.
    fn is_clear(&self, a: Coord<f64>, b: Coord<f64>) -> bool;
}

/// A land polygon with its precomputed bounding box.
#[derive(Debug, Clone)]
struct LandFeature {
    geometry: MultiPolygon<f64>,
    bbox: Option<Rect<f64>>,
}

/// All land features for a run, with bounding boxes for pre-filtering.
#[derive(Debug, Clone, Default)]
pub struct LandIndex {
    features: Vec<LandFeature>,
}

impl LandIndex {
    /// Index a set of land polygons.
    #[must_use]
    pub fn new(land: Vec<MultiPolygon<f64>>) -> Self {
        let features = land
            .into_iter()
            .map(|geometry| LandFeature {
                bbox: geometry.bounding_rect(),
                geometry,
            })
            .collect();
        Self { features }
    }

    /// Number of land features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns `true` if there is no land at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// An oracle restricted to the features whose bounding boxes
    /// intersect `region`.
    #[must_use]
    pub fn oracle_for(&self, region: Rect<f64>) -> LandOracle<'_> {
        let land = self
            .features
            .iter()
            .filter(|f| f.bbox.is_some_and(|b| b.intersects(&region)))
            .map(|f| &f.geometry)
            .collect();
        LandOracle { land }
    }
}

/// Exact land-crossing test over a pre-filtered feature set.
#[derive(Debug, Clone)]
pub struct LandOracle<'a> {
    land: Vec<&'a MultiPolygon<f64>>,
}

impl<'a> LandOracle<'a> {
    /// Wrap an already-filtered set of land features.
    #[must_use]
    pub const fn new(land: Vec<&'a MultiPolygon<f64>>) -> Self {
        Self { land }
    }

    /// Number of candidate features this oracle tests against.
    #[must_use]
    pub fn candidate_count(&self) -> usize {
        self.land.len()
    }
}

impl VisibilityOracle for LandOracle<'_> {
    fn is_clear(&self, a: Coord<f64>, b: Coord<f64>) -> bool {
        let line = Line::new(a, b);
        !self.land.iter().any(|feature| crosses_boundary(&line, feature))
    }
}

/// Does `line` touch any ring (exterior or hole) of `feature`?
fn crosses_boundary(line: &Line<f64>, feature: &MultiPolygon<f64>) -> bool {
    feature.iter().any(|polygon| {
        line.intersects(polygon.exterior())
            || polygon.interiors().iter().any(|ring| line.intersects(ring))
    })
}

/// Bounding rectangle of `coords`, grown by `margin` on every side.
///
/// Returns `None` for an empty slice.
#[must_use]
pub fn expanded_bounds(coords: &[Coord<f64>], margin: f64) -> Option<Rect<f64>> {
    let first = coords.first()?;
    let (mut min, mut max) = (*first, *first);
    for c in coords {
        min.x = min.x.min(c.x);
        min.y = min.y.min(c.y);
        max.x = max.x.max(c.x);
        max.y = max.y.max(c.y);
    }
    Some(Rect::new(
        Coord {
            x: min.x - margin,
            y: min.y - margin,
        },
        Coord {
            x: max.x + margin,
            y: max.y + margin,
        },
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use geo::{LineString, Polygon};

    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![Polygon::new(
            LineString::from(vec![
                (x0, y0),
                (x0 + size, y0),
                (x0 + size, y0 + size),
                (x0, y0 + size),
            ]),
            vec![],
        )])
    }

    const fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    #[test]
    fn segment_through_island_is_blocked() {
        let island = square(4.0, -1.0, 2.0);
        let oracle = LandOracle::new(vec![&island]);
        assert!(!oracle.is_clear(c(0.0, 0.0), c(10.0, 0.0)));
    }

    #[test]
    fn segment_beside_island_is_clear() {
        let island = square(4.0, -1.0, 2.0);
        let oracle = LandOracle::new(vec![&island]);
        assert!(oracle.is_clear(c(0.0, 5.0), c(10.0, 5.0)));
    }

    #[test]
    fn no_land_is_always_clear() {
        let oracle = LandOracle::new(Vec::new());
        assert!(oracle.is_clear(c(0.0, 0.0), c(100.0, 100.0)));
    }

    #[test]
    fn lake_boundary_blocks() {
        // Land square with a hole; a segment wholly inside the hole but
        // crossing into the land ring is blocked.
        let outer = LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        let hole = LineString::from(vec![(3.0, 3.0), (7.0, 3.0), (7.0, 7.0), (3.0, 7.0)]);
        let land = MultiPolygon::new(vec![Polygon::new(outer, vec![hole])]);
        let oracle = LandOracle::new(vec![&land]);
        assert!(!oracle.is_clear(c(5.0, 5.0), c(5.0, 8.0)));
        assert!(oracle.is_clear(c(4.0, 5.0), c(6.0, 5.0)));
    }

    #[test]
    fn prefilter_drops_distant_features() {
        let index = LandIndex::new(vec![square(0.0, 0.0, 1.0), square(100.0, 100.0, 1.0)]);
        let region = Rect::new(c(-5.0, -5.0), c(5.0, 5.0));
        assert_eq!(index.oracle_for(region).candidate_count(), 1);
    }

    #[test]
    fn expanded_bounds_grows_every_side() {
        let rect = expanded_bounds(&[c(1.0, 2.0), c(3.0, -1.0)], 0.5).unwrap();
        assert_eq!(rect.min(), c(0.5, -1.5));
        assert_eq!(rect.max(), c(3.5, 2.5));
        assert!(expanded_bounds(&[], 1.0).is_none());
    }
}
