//! Shared types for the spacing engine: configuration, the distance
//! metric, and the error taxonomy.

use std::collections::BTreeMap;

use geo::line_measures::Distance;
use geo::{Area, ChamberlainDuquetteArea, Coord, Haversine, MultiPolygon};
use serde::{Deserialize, Serialize};

use crate::replicate::HabitatClass;
use crate::sketch::ProtectionLevel;

/// Meters in one statute mile.
pub const METERS_PER_MILE: f64 = 1_609.344;

/// Square meters in one square statute mile.
const SQ_METERS_PER_SQ_MILE: f64 = METERS_PER_MILE * METERS_PER_MILE;

/// Meters spanned by one degree of latitude (mean).
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Lower bound on miles per degree of latitude. Using a slightly low
/// value makes degree-space search envelopes err on the large side.
const MILES_PER_DEGREE_LOWER_BOUND: f64 = 68.7;

/// How distances, radii and areas are measured over node coordinates.
///
/// Every linear quantity in the engine (edge weights, search radius,
/// spacing threshold) is expressed in statute miles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Coordinates are already projected into miles; distances are
    /// Euclidean.
    Planar,

    /// Coordinates are `[longitude, latitude]` degrees; distances are
    /// great-circle (haversine) miles.
    #[default]
    Haversine,
}

impl DistanceMetric {
    /// Distance between two coordinates in miles.
    #[must_use]
    pub fn distance(self, a: Coord<f64>, b: Coord<f64>) -> f64 {
        match self {
            Self::Planar => (a.x - b.x).hypot(a.y - b.y),
            Self::Haversine => {
                Haversine.distance(geo::Point::from(a), geo::Point::from(b)) / METERS_PER_MILE
            }
        }
    }

    /// A frame around `origin` in which coordinates are meters along
    /// each axis.
    ///
    /// For [`Haversine`](Self::Haversine) this is an equirectangular
    /// projection: longitude is scaled by the cosine of the origin's
    /// latitude, so a buffer of `d` meters is `d` meters wide in every
    /// direction near the origin.
    #[must_use]
    pub fn local_frame(self, origin: Coord<f64>) -> LocalFrame {
        match self {
            Self::Planar => LocalFrame {
                origin,
                x_scale: METERS_PER_MILE,
                y_scale: METERS_PER_MILE,
            },
            Self::Haversine => LocalFrame {
                origin,
                x_scale: METERS_PER_DEGREE * origin.y.clamp(-89.0, 89.0).to_radians().cos(),
                y_scale: METERS_PER_DEGREE,
            },
        }
    }

    /// Radius in coordinate units of a circle around `center` that
    /// contains every point within `miles` of it.
    #[must_use]
    pub fn coordinate_radius(self, center: Coord<f64>, miles: f64) -> f64 {
        match self {
            Self::Planar => miles,
            Self::Haversine => {
                let lat_span = miles / MILES_PER_DEGREE_LOWER_BOUND;
                let widest = (center.y.abs() + lat_span).min(89.0).to_radians();
                lat_span.max(miles / (MILES_PER_DEGREE_LOWER_BOUND * widest.cos()))
            }
        }
    }

    /// Unsigned area of a geometry in square miles.
    #[must_use]
    pub fn area_sq_miles(self, geometry: &MultiPolygon<f64>) -> f64 {
        match self {
            Self::Planar => geometry.unsigned_area(),
            Self::Haversine => {
                geometry.chamberlain_duquette_unsigned_area() / SQ_METERS_PER_SQ_MILE
            }
        }
    }
}

/// Affine map between node coordinates and local meters; see
/// [`DistanceMetric::local_frame`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    origin: Coord<f64>,
    x_scale: f64,
    y_scale: f64,
}

impl LocalFrame {
    /// Node coordinates to meters from the origin.
    #[must_use]
    pub fn to_meters(&self, c: Coord<f64>) -> Coord<f64> {
        Coord {
            x: (c.x - self.origin.x) * self.x_scale,
            y: (c.y - self.origin.y) * self.y_scale,
        }
    }

    /// Meters from the origin back to node coordinates.
    #[must_use]
    pub fn to_coordinates(&self, m: Coord<f64>) -> Coord<f64> {
        Coord {
            x: m.x / self.x_scale + self.origin.x,
            y: m.y / self.y_scale + self.origin.y,
        }
    }
}

/// Configuration for a spacing analysis run.
///
/// All parameters have defaults matching the planning guideline; any
/// subset may be supplied as JSON and the rest fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpacingConfig {
    /// How node coordinates are measured.
    pub metric: DistanceMetric,

    /// Radius (miles) searched around each sketch-derived node for
    /// connection candidates.
    pub search_radius: f64,

    /// Nodes closer than this (miles) are connected even when the
    /// visibility test reports land in between.
    pub min_connect_distance: f64,

    /// Margin (meters) added around a cluster seed before testing other
    /// sketches for contiguity.
    pub cluster_buffer_meters: f64,

    /// Ramer-Douglas-Peucker tolerance (meters) applied to a cluster
    /// seed before buffering.
    pub cluster_simplify_meters: f64,

    /// Clusters smaller than this (square miles) are not replicates for
    /// any class that enforces a minimum size.
    pub min_cluster_area: f64,

    /// Paths strictly shorter than this (miles) pass.
    pub spacing_threshold: f64,

    /// Lowest protection level that participates in clustering.
    pub min_protection: ProtectionLevel,

    /// Per-class overrides of the replicate threshold.
    pub replicate_thresholds: BTreeMap<HabitatClass, f64>,
}

impl SpacingConfig {
    /// Default connection search radius in miles.
    pub const DEFAULT_SEARCH_RADIUS: f64 = 75.0;

    /// Default always-connect distance in miles.
    pub const DEFAULT_MIN_CONNECT_DISTANCE: f64 = 0.5;

    /// Default cluster buffer in meters.
    pub const DEFAULT_CLUSTER_BUFFER_METERS: f64 = 100.0;

    /// Default cluster simplification tolerance in meters.
    pub const DEFAULT_CLUSTER_SIMPLIFY_METERS: f64 = 10.0;

    /// Default minimum cluster area in square miles.
    pub const DEFAULT_MIN_CLUSTER_AREA: f64 = 9.0;

    /// Default spacing guideline in miles.
    pub const DEFAULT_SPACING_THRESHOLD: f64 = 62.0;

    /// Default minimum protection level for clustering.
    pub const DEFAULT_MIN_PROTECTION: ProtectionLevel = ProtectionLevel::ModerateHigh;

    /// Replicate threshold for `class`, honoring overrides.
    #[must_use]
    pub fn replicate_threshold(&self, class: HabitatClass) -> f64 {
        self.replicate_thresholds
            .get(&class)
            .copied()
            .unwrap_or_else(|| class.default_threshold())
    }

    /// Check that every numeric parameter is finite and in range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first offending parameter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("search_radius", self.search_radius, false),
            ("min_connect_distance", self.min_connect_distance, true),
            ("cluster_buffer_meters", self.cluster_buffer_meters, true),
            ("cluster_simplify_meters", self.cluster_simplify_meters, true),
            ("min_cluster_area", self.min_cluster_area, true),
            ("spacing_threshold", self.spacing_threshold, false),
        ];
        for (name, value, zero_ok) in checks {
            let in_range = if zero_ok { value >= 0.0 } else { value > 0.0 };
            if !value.is_finite() || !in_range {
                return Err(ConfigError { name, value });
            }
        }
        for (class, value) in &self.replicate_thresholds {
            if !value.is_finite() || *value < 0.0 {
                return Err(ConfigError {
                    name: class.as_str(),
                    value: *value,
                });
            }
        }
        Ok(())
    }
}

impl Default for SpacingConfig {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::default(),
            search_radius: Self::DEFAULT_SEARCH_RADIUS,
            min_connect_distance: Self::DEFAULT_MIN_CONNECT_DISTANCE,
            cluster_buffer_meters: Self::DEFAULT_CLUSTER_BUFFER_METERS,
            cluster_simplify_meters: Self::DEFAULT_CLUSTER_SIMPLIFY_METERS,
            min_cluster_area: Self::DEFAULT_MIN_CLUSTER_AREA,
            spacing_threshold: Self::DEFAULT_SPACING_THRESHOLD,
            min_protection: Self::DEFAULT_MIN_PROTECTION,
            replicate_thresholds: BTreeMap::new(),
        }
    }
}

/// A configuration parameter is out of range.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid configuration: `{name}` = {value}")]
pub struct ConfigError {
    /// Parameter name.
    pub name: &'static str,
    /// Rejected value.
    pub value: f64,
}

/// Structural inconsistency in a serialized or augmented graph.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedGraphError {
    /// An edge references a node id that is not in the node table.
    #[error("malformed graph: edge {source_id} -> {target_id} references missing node `{missing}`")]
    DanglingEdge {
        /// Edge source id.
        source_id: String,
        /// Edge target id.
        target_id: String,
        /// The id that could not be resolved.
        missing: String,
    },

    /// The same undirected pair appears twice with different weights.
    #[error(
        "malformed graph: edge {source_id} <-> {target_id} has conflicting weights {first} and {second}"
    )]
    ConflictingWeight {
        /// Edge source id.
        source_id: String,
        /// Edge target id.
        target_id: String,
        /// Weight seen first.
        first: f64,
        /// Weight seen second.
        second: f64,
    },

    /// An edge weight is negative or not finite.
    #[error("malformed graph: edge {source_id} -> {target_id} has invalid weight {weight}")]
    InvalidWeight {
        /// Edge source id.
        source_id: String,
        /// Edge target id.
        target_id: String,
        /// The rejected weight.
        weight: f64,
    },

    /// A node coordinate is not finite.
    #[error("malformed graph: node `{0}` has a non-finite coordinate")]
    InvalidCoordinate(String),

    /// A node id was registered twice.
    #[error("malformed graph: duplicate node id `{0}`")]
    DuplicateNode(String),
}

/// A sketch is missing a required attribute or carries an invalid one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidSketchAttributeError {
    /// A required property is absent.
    #[error("sketch {feature}: missing required attribute `{attribute}`")]
    Missing {
        /// Sketch id, or `#<index>` when the id itself is missing.
        feature: String,
        /// Property name.
        attribute: &'static str,
    },

    /// A property has a value outside its vocabulary.
    #[error("sketch {feature}: invalid value {value:?} for attribute `{attribute}`")]
    Invalid {
        /// Sketch id.
        feature: String,
        /// Property name.
        attribute: &'static str,
        /// The rejected value.
        value: String,
    },

    /// The geometry is absent or not a usable polygon.
    #[error("sketch {feature}: invalid geometry: {reason}")]
    Geometry {
        /// Sketch id.
        feature: String,
        /// What was wrong.
        reason: String,
    },

    /// Two sketches share an id.
    #[error("duplicate sketch id `{0}`")]
    DuplicateId(String),
}

/// A land feature geometry could not be converted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("land feature #{index}: invalid geometry: {reason}")]
pub struct InvalidLandError {
    /// Position of the feature in its collection.
    pub index: usize,
    /// What was wrong.
    pub reason: String,
}

/// Failure of the spacing analysis for one habitat class.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpacingError {
    /// No graph path connects two replicates joined by an MST edge.
    #[error("no path found between replicates `{from}` and `{to}` for {class}")]
    NoPathFound {
        /// Habitat class being analyzed.
        class: HabitatClass,
        /// Source replicate id.
        from: String,
        /// Target replicate id.
        to: String,
    },

    /// A replicate geometry has no centroid (empty geometry).
    #[error("replicate `{0}` has an empty geometry")]
    EmptyReplicate(String),

    /// None of a replicate's sketches contributed graph nodes.
    #[error("replicate `{0}` has no graph nodes")]
    MissingSketchNodes(String),
}

/// Fatal errors that abort a whole analysis run.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Graph inconsistency.
    #[error(transparent)]
    Graph(#[from] MalformedGraphError),

    /// Invalid sketch input.
    #[error(transparent)]
    Sketch(#[from] InvalidSketchAttributeError),

    /// Invalid land input.
    #[error(transparent)]
    Land(#[from] InvalidLandError),
}
