//! Habitat classes and replicate selection.
//!
//! A cluster is a *replicate* of a habitat class when the externally
//! computed overlap between the cluster and that habitat exceeds the
//! class threshold. Overlap computation is out of scope for this crate;
//! values arrive through the [`OverlapSource`] trait.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cluster::Cluster;
use crate::types::SpacingConfig;

/// Habitat classes with a replicate spacing guideline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HabitatClass {
    /// Sandy beaches (linear miles of shoreline).
    Beaches,
    /// Rocky intertidal shoreline (linear miles).
    RockyShores,
    /// Kelp forest (linear miles of coverage along shore).
    Kelp,
    /// Eelgrass beds (square miles).
    Eelgrass,
    /// Estuarine habitat (square miles).
    Estuaries,
    /// Hard-bottom substrate between 0 and 30 m depth (square miles).
    #[serde(rename = "hard_substrate_0_30m")]
    HardSubstrate0To30m,
    /// Soft-bottom substrate between 0 and 30 m depth (square miles).
    #[serde(rename = "soft_substrate_0_30m")]
    SoftSubstrate0To30m,
}

/// Unit of a habitat overlap metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Length of shoreline in miles.
    LinearMiles,
    /// Area in square miles.
    SquareMiles,
}

impl HabitatClass {
    /// Every class, in report order.
    pub const ALL: [Self; 7] = [
        Self::Beaches,
        Self::RockyShores,
        Self::Kelp,
        Self::Eelgrass,
        Self::Estuaries,
        Self::HardSubstrate0To30m,
        Self::SoftSubstrate0To30m,
    ];

    /// Stable snake_case identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Beaches => "beaches",
            Self::RockyShores => "rocky_shores",
            Self::Kelp => "kelp",
            Self::Eelgrass => "eelgrass",
            Self::Estuaries => "estuaries",
            Self::HardSubstrate0To30m => "hard_substrate_0_30m",
            Self::SoftSubstrate0To30m => "soft_substrate_0_30m",
        }
    }

    /// Unit of the overlap metric for this class.
    #[must_use]
    pub const fn metric_kind(self) -> MetricKind {
        match self {
            Self::Beaches | Self::RockyShores | Self::Kelp => MetricKind::LinearMiles,
            Self::Eelgrass
            | Self::Estuaries
            | Self::HardSubstrate0To30m
            | Self::SoftSubstrate0To30m => MetricKind::SquareMiles,
        }
    }

    /// Overlap a cluster must exceed to count as a replicate.
    #[must_use]
    pub const fn default_threshold(self) -> f64 {
        match self {
            Self::Beaches | Self::Kelp => 1.1,
            Self::RockyShores => 0.55,
            Self::Eelgrass => 0.04,
            Self::Estuaries => 0.12,
            Self::HardSubstrate0To30m => 0.2,
            Self::SoftSubstrate0To30m => 7.0,
        }
    }

    /// Whether replicates must also span the 0 to 30 m depth band.
    #[must_use]
    pub const fn depth_gated(self) -> bool {
        matches!(self, Self::HardSubstrate0To30m | Self::SoftSubstrate0To30m)
    }

    /// Whether small clusters still qualify.
    #[must_use]
    pub const fn exempt_from_min_area(self) -> bool {
        matches!(self, Self::Estuaries)
    }
}

impl fmt::Display for HabitatClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HabitatClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown habitat class: {s}"))
    }
}

/// Depth range of a cluster in meters (negative below sea level).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthStats {
    /// Deepest point.
    pub min: f64,
    /// Shallowest point.
    pub max: f64,
}

impl DepthStats {
    /// Deepest edge of the gated band.
    pub const BAND_FLOOR: f64 = -30.0;

    /// Shoreline edge of the gated band.
    pub const BAND_CEILING: f64 = 0.0;

    /// Returns `true` if the range spans the whole 0 to 30 m band.
    #[must_use]
    pub fn covers_band(&self) -> bool {
        self.min <= Self::BAND_FLOOR && self.max >= Self::BAND_CEILING
    }
}

/// Externally computed habitat overlap and depth statistics.
pub trait OverlapSource: Sync {
    /// Overlap of cluster `cluster_id` with `class`, in the class's
    /// [`MetricKind`] unit.
    fn overlap(&self, class: HabitatClass, cluster_id: &str) -> Option<f64>;

    /// Depth range of cluster `cluster_id`.
    fn depth(&self, cluster_id: &str) -> Option<DepthStats>;
}

/// In-memory [`OverlapSource`], deserializable from JSON.
///
/// Keys are cluster ids, which are the seed sketch ids. A merged
/// cluster is looked up only by its seed id, so its value must cover
/// the merged geometry; `mpa-spacing --clusters-only` lists clusters
/// with their outlines for that purpose.
///
/// ```json
/// {
///   "overlaps": { "kelp": { "c1": 2.4 } },
///   "depths": { "c1": { "min": -42.0, "max": 1.5 } }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlapTable {
    /// Class to cluster id to overlap.
    pub overlaps: BTreeMap<HabitatClass, BTreeMap<String, f64>>,
    /// Cluster id to depth range.
    pub depths: BTreeMap<String, DepthStats>,
}

impl OverlapSource for OverlapTable {
    fn overlap(&self, class: HabitatClass, cluster_id: &str) -> Option<f64> {
        self.overlaps.get(&class)?.get(cluster_id).copied()
    }

    fn depth(&self, cluster_id: &str) -> Option<DepthStats> {
        self.depths.get(cluster_id).copied()
    }
}

/// Why a cluster was not selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exclusion {
    /// Cluster area is below the minimum for this class.
    BelowMinArea,
    /// No overlap value was supplied.
    NoOverlap,
    /// Overlap does not exceed the class threshold.
    BelowThreshold,
    /// Depth range missing or does not span the gated band.
    OutsideDepthBand,
}

/// Clusters selected as replicates for one class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicateSet {
    /// Selected cluster ids, in cluster order.
    pub cluster_ids: Vec<String>,
    /// Rejected cluster ids with the first failing check.
    pub excluded: BTreeMap<String, Exclusion>,
}

impl ReplicateSet {
    /// Number of replicates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cluster_ids.len()
    }

    /// Returns `true` if no cluster qualified.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cluster_ids.is_empty()
    }
}

/// Decide which `clusters` are replicates of `class`.
#[must_use]
pub fn select_replicates(
    class: HabitatClass,
    clusters: &[Cluster],
    overlaps: &dyn OverlapSource,
    config: &SpacingConfig,
) -> ReplicateSet {
    let threshold = config.replicate_threshold(class);
    let mut set = ReplicateSet::default();

    for cluster in clusters {
        match check(class, cluster, overlaps, threshold, config.min_cluster_area) {
            Ok(()) => set.cluster_ids.push(cluster.id.clone()),
            Err(reason) => {
                set.excluded.insert(cluster.id.clone(), reason);
            }
        }
    }

    tracing::debug!(
        class = %class,
        selected = set.len(),
        excluded = set.excluded.len(),
        threshold,
        "replicates selected",
    );
    set
}

fn check(
    class: HabitatClass,
    cluster: &Cluster,
    overlaps: &dyn OverlapSource,
    threshold: f64,
    min_area: f64,
) -> Result<(), Exclusion> {
    if !class.exempt_from_min_area() && cluster.area_sq_miles < min_area {
        return Err(Exclusion::BelowMinArea);
    }
    if class.depth_gated()
        && !overlaps
            .depth(&cluster.id)
            .is_some_and(|d| d.covers_band())
    {
        return Err(Exclusion::OutsideDepthBand);
    }
    let value = overlaps.overlap(class, &cluster.id).ok_or(Exclusion::NoOverlap)?;
    if value > threshold {
        Ok(())
    } else {
        Err(Exclusion::BelowThreshold)
    }
}
