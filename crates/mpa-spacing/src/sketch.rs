//! Sketch ingestion: GeoJSON-shaped feature input, typed attribute
//! validation, and the protection-level pre-filter used before
//! clustering.
//!
//! Attributes are parsed into enums once, at the boundary. Everything
//! downstream works with [`Sketch`] values and never looks at raw
//! property strings again.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};

use crate::types::{InvalidLandError, InvalidSketchAttributeError};

/// Level of protection a sketch affords, ordered from weakest to
/// strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionLevel {
    /// Low protection.
    Low,
    /// Moderate-low protection.
    ModerateLow,
    /// Moderate protection.
    Moderate,
    /// Moderate-high protection.
    ModerateHigh,
    /// High protection.
    High,
    /// Very high protection (no-take).
    VeryHigh,
}

impl FromStr for ProtectionLevel {
    type Err = ();

    /// Accepts any spelling that reduces to the same letters, so
    /// `"Moderate-High"`, `"moderate_high"` and `"moderateHigh"` are all
    /// [`ModerateHigh`](Self::ModerateHigh).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "low" => Ok(Self::Low),
            "moderatelow" => Ok(Self::ModerateLow),
            "moderate" => Ok(Self::Moderate),
            "moderatehigh" => Ok(Self::ModerateHigh),
            "high" => Ok(Self::High),
            "veryhigh" => Ok(Self::VeryHigh),
            _ => Err(()),
        }
    }
}

/// Regulatory designation of a sketch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Designation {
    /// State marine reserve.
    MarineReserve,
    /// State marine conservation area.
    ConservationArea,
    /// No-take state marine conservation area.
    NoTakeConservationArea,
    /// State marine park.
    MarinePark,
    /// State marine recreational management area.
    RecreationalManagementArea,
    /// Special closure.
    SpecialClosure,
}

impl FromStr for Designation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "smr" | "marinereserve" => Ok(Self::MarineReserve),
            "smca" | "conservationarea" => Ok(Self::ConservationArea),
            "smcanotake" | "notakeconservationarea" => Ok(Self::NoTakeConservationArea),
            "smp" | "marinepark" => Ok(Self::MarinePark),
            "smrma" | "recreationalmanagementarea" => Ok(Self::RecreationalManagementArea),
            "special" | "specialclosure" => Ok(Self::SpecialClosure),
            _ => Err(()),
        }
    }
}

/// Lowercase and strip everything but ASCII letters and digits.
fn normalize(s: &str) -> String {
    s.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// A validated candidate protected area.
#[derive(Debug, Clone, PartialEq)]
pub struct Sketch {
    /// Stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Protection level.
    pub protection: ProtectionLevel,
    /// Regulatory designation.
    pub designation: Designation,
    /// Footprint. Single polygons are stored as one-member multipolygons.
    pub geometry: MultiPolygon<f64>,
}

impl Sketch {
    /// Build a sketch from already-typed parts.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        protection: ProtectionLevel,
        designation: Designation,
        geometry: MultiPolygon<f64>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            protection,
            designation,
            geometry,
        }
    }
}

/// Keep only sketches protected at least as strongly as `min`.
///
/// Input order is preserved; clustering depends on it.
#[must_use]
pub fn filter_by_protection(sketches: &[Sketch], min: ProtectionLevel) -> Vec<&Sketch> {
    sketches.iter().filter(|s| s.protection >= min).collect()
}

// ---------------------------------------------------------------------------
// GeoJSON-shaped input
// ---------------------------------------------------------------------------

/// A feature collection. Only `features` is read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "P: Deserialize<'de> + Default"))]
pub struct FeatureCollection<P> {
    /// Member features.
    pub features: Vec<Feature<P>>,
}

/// A GeoJSON feature identifier (string or number).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureId {
    /// String id.
    Text(String),
    /// Numeric id.
    Number(i64),
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// A single feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "P: Deserialize<'de> + Default"))]
pub struct Feature<P> {
    /// Optional top-level identifier.
    #[serde(default)]
    pub id: Option<FeatureId>,
    /// Feature properties.
    #[serde(default)]
    pub properties: P,
    /// Polygonal geometry.
    #[serde(default)]
    pub geometry: Option<PolygonalGeometry>,
}

/// Polygon or multipolygon coordinates, tagged the GeoJSON way.
///
/// Positions are `[lon, lat]` or `[lon, lat, alt]`; extra ordinates are
/// ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum PolygonalGeometry {
    /// A single polygon: exterior ring followed by holes.
    Polygon(Vec<Vec<Vec<f64>>>),
    /// Several polygons.
    MultiPolygon(Vec<Vec<Vec<Vec<f64>>>>),
}

impl PolygonalGeometry {
    /// Convert to a `geo` multipolygon.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when a position has fewer
    /// than two ordinates or a non-finite value, a ring has fewer than
    /// three positions, or the geometry has no polygons.
    pub fn to_multi_polygon(&self) -> Result<MultiPolygon<f64>, String> {
        let polygons = match self {
            Self::Polygon(rings) => vec![polygon_from_rings(rings)?],
            Self::MultiPolygon(polys) => polys
                .iter()
                .map(|rings| polygon_from_rings(rings))
                .collect::<Result<Vec<_>, _>>()?,
        };
        if polygons.is_empty() {
            return Err("geometry has no polygons".to_string());
        }
        Ok(MultiPolygon::new(polygons))
    }
}

impl From<&MultiPolygon<f64>> for PolygonalGeometry {
    fn from(geometry: &MultiPolygon<f64>) -> Self {
        let ring = |ring: &LineString<f64>| -> Vec<Vec<f64>> {
            ring.coords().map(|c| vec![c.x, c.y]).collect()
        };
        Self::MultiPolygon(
            geometry
                .iter()
                .map(|polygon| {
                    std::iter::once(polygon.exterior())
                        .chain(polygon.interiors())
                        .map(ring)
                        .collect()
                })
                .collect(),
        )
    }
}

fn polygon_from_rings(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>, String> {
    let mut converted = rings.iter().map(|ring| ring_from_positions(ring));
    let exterior = converted
        .next()
        .ok_or_else(|| "polygon has no exterior ring".to_string())??;
    let interiors = converted.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn ring_from_positions(positions: &[Vec<f64>]) -> Result<LineString<f64>, String> {
    if positions.len() < 3 {
        return Err(format!(
            "ring has {} positions, need at least 3",
            positions.len()
        ));
    }
    let coords = positions
        .iter()
        .map(|p| match p.as_slice() {
            [x, y, ..] if x.is_finite() && y.is_finite() => Ok(Coord { x: *x, y: *y }),
            [_, _, ..] => Err("position has a non-finite ordinate".to_string()),
            _ => Err(format!("position has {} ordinates, need 2", p.len())),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(LineString::new(coords))
}

/// Raw sketch properties as they arrive. Every field is optional here;
/// [`sketches_from_features`] enforces which are required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SketchProperties {
    /// Stable identifier (falls back to the feature id).
    #[serde(default)]
    pub id: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Protection level code.
    #[serde(default)]
    pub protection_level: Option<String>,
    /// Designation code.
    #[serde(default)]
    pub designation: Option<String>,
}

/// Sketch input as deserialized from a feature collection.
pub type SketchCollection = FeatureCollection<Option<SketchProperties>>;

/// Land input; properties are ignored.
pub type LandCollection = FeatureCollection<serde::de::IgnoredAny>;

/// Validate a sketch feature collection into typed [`Sketch`] values.
///
/// # Errors
///
/// Returns [`InvalidSketchAttributeError`] for the first feature that
/// lacks an id, name, protection level or designation, carries an
/// unrecognized code, has unusable geometry, or repeats an id.
pub fn sketches_from_features(
    collection: &SketchCollection,
) -> Result<Vec<Sketch>, InvalidSketchAttributeError> {
    let mut seen = HashSet::new();
    let mut sketches = Vec::with_capacity(collection.features.len());

    for (index, feature) in collection.features.iter().enumerate() {
        let props = feature.properties.clone().unwrap_or_default();

        let id = props
            .id
            .or_else(|| feature.id.as_ref().map(ToString::to_string))
            .ok_or_else(|| InvalidSketchAttributeError::Missing {
                feature: format!("#{index}"),
                attribute: "id",
            })?;

        let name = props
            .name
            .ok_or_else(|| InvalidSketchAttributeError::Missing {
                feature: id.clone(),
                attribute: "name",
            })?;

        let protection = parse_attribute(&id, "protectionLevel", props.protection_level)?;
        let designation = parse_attribute(&id, "designation", props.designation)?;

        let geometry = feature
            .geometry
            .as_ref()
            .ok_or_else(|| "feature has no geometry".to_string())
            .and_then(PolygonalGeometry::to_multi_polygon)
            .map_err(|reason| InvalidSketchAttributeError::Geometry {
                feature: id.clone(),
                reason,
            })?;

        if !seen.insert(id.clone()) {
            return Err(InvalidSketchAttributeError::DuplicateId(id));
        }

        sketches.push(Sketch {
            id,
            name,
            protection,
            designation,
            geometry,
        });
    }

    Ok(sketches)
}

fn parse_attribute<T: FromStr>(
    id: &str,
    attribute: &'static str,
    raw: Option<String>,
) -> Result<T, InvalidSketchAttributeError> {
    let value = raw.ok_or_else(|| InvalidSketchAttributeError::Missing {
        feature: id.to_string(),
        attribute,
    })?;
    value
        .parse()
        .map_err(|_| InvalidSketchAttributeError::Invalid {
            feature: id.to_string(),
            attribute,
            value,
        })
}

/// Convert land features into multipolygons.
///
/// Features without geometry are skipped.
///
/// # Errors
///
/// Returns [`InvalidLandError`] for the first unusable geometry.
pub fn land_from_features(
    collection: &LandCollection,
) -> Result<Vec<MultiPolygon<f64>>, InvalidLandError> {
    collection
        .features
        .iter()
        .enumerate()
        .filter_map(|(index, f)| f.geometry.as_ref().map(|g| (index, g)))
        .map(|(index, g)| {
            g.to_multi_polygon()
                .map_err(|reason| InvalidLandError { index, reason })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SQUARE: &str = r#"{ "type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]] }"#;

    fn collection(features: &[String]) -> SketchCollection {
        let json = format!(r#"{{ "type": "FeatureCollection", "features": [{}] }}"#, features.join(","));
        serde_json::from_str(&json).unwrap()
    }

    fn feature(props: &str) -> String {
        format!(r#"{{ "type": "Feature", "properties": {props}, "geometry": {SQUARE} }}"#)
    }

    #[test]
    fn protection_level_spellings() {
        assert_eq!("Moderate-High".parse(), Ok(ProtectionLevel::ModerateHigh));
        assert_eq!("very_high".parse(), Ok(ProtectionLevel::VeryHigh));
        assert_eq!("moderateLow".parse(), Ok(ProtectionLevel::ModerateLow));
        assert!("extreme".parse::<ProtectionLevel>().is_err());
    }

    #[test]
    fn protection_levels_are_ordered() {
        assert!(ProtectionLevel::VeryHigh > ProtectionLevel::High);
        assert!(ProtectionLevel::ModerateHigh > ProtectionLevel::Moderate);
        assert!(ProtectionLevel::Low < ProtectionLevel::ModerateLow);
    }

    #[test]
    fn designation_codes() {
        assert_eq!("SMR".parse(), Ok(Designation::MarineReserve));
        assert_eq!("SMCA (No-Take)".parse(), Ok(Designation::NoTakeConservationArea));
        assert_eq!("smrma".parse(), Ok(Designation::RecreationalManagementArea));
    }

    #[test]
    fn valid_feature_becomes_sketch() {
        let c = collection(&[feature(
            r#"{ "id": "a", "name": "Point A", "protectionLevel": "High", "designation": "SMR" }"#,
        )]);
        let sketches = sketches_from_features(&c).unwrap();
        assert_eq!(sketches.len(), 1);
        assert_eq!(sketches[0].id, "a");
        assert_eq!(sketches[0].protection, ProtectionLevel::High);
        assert_eq!(sketches[0].geometry.0.len(), 1);
    }

    #[test]
    fn feature_id_is_used_when_property_id_missing() {
        let json = format!(
            r#"{{ "features": [{{ "id": 42, "properties": {{ "name": "n", "protectionLevel": "low", "designation": "smp" }}, "geometry": {SQUARE} }}] }}"#
        );
        let c: SketchCollection = serde_json::from_str(&json).unwrap();
        let sketches = sketches_from_features(&c).unwrap();
        assert_eq!(sketches[0].id, "42");
    }

    #[test]
    fn missing_protection_level_is_rejected() {
        let c = collection(&[feature(r#"{ "id": "a", "name": "A", "designation": "SMR" }"#)]);
        let err = sketches_from_features(&c).unwrap_err();
        assert_eq!(
            err,
            InvalidSketchAttributeError::Missing {
                feature: "a".to_string(),
                attribute: "protectionLevel",
            }
        );
    }

    #[test]
    fn unknown_designation_is_rejected() {
        let c = collection(&[feature(
            r#"{ "id": "a", "name": "A", "protectionLevel": "high", "designation": "lighthouse" }"#,
        )]);
        assert!(matches!(
            sketches_from_features(&c),
            Err(InvalidSketchAttributeError::Invalid {
                attribute: "designation",
                ..
            })
        ));
    }

    #[test]
    fn null_properties_report_missing_id() {
        let c = collection(&[format!(r#"{{ "properties": null, "geometry": {SQUARE} }}"#)]);
        assert!(matches!(
            sketches_from_features(&c),
            Err(InvalidSketchAttributeError::Missing { attribute: "id", .. })
        ));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let props = r#"{ "id": "a", "name": "A", "protectionLevel": "high", "designation": "smr" }"#;
        let c = collection(&[feature(props), feature(props)]);
        assert_eq!(
            sketches_from_features(&c),
            Err(InvalidSketchAttributeError::DuplicateId("a".to_string()))
        );
    }

    #[test]
    fn short_ring_is_invalid_geometry() {
        let geometry = PolygonalGeometry::Polygon(vec![vec![vec![0.0, 0.0], vec![1.0, 0.0]]]);
        assert!(geometry.to_multi_polygon().is_err());
    }

    #[test]
    fn altitude_ordinate_is_ignored() {
        let geometry = PolygonalGeometry::Polygon(vec![vec![
            vec![0.0, 0.0, 5.0],
            vec![1.0, 0.0, 5.0],
            vec![1.0, 1.0, 5.0],
        ]]);
        let mp = geometry.to_multi_polygon().unwrap();
        assert_eq!(mp.0[0].exterior().0[1], Coord { x: 1.0, y: 0.0 });
    }

    #[test]
    fn filter_keeps_order_and_threshold() {
        let geometry = PolygonalGeometry::Polygon(vec![vec![
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
        ]])
        .to_multi_polygon()
        .unwrap();
        let make = |id: &str, level| {
            Sketch::new(id, id, level, Designation::MarineReserve, geometry.clone())
        };
        let sketches = vec![
            make("a", ProtectionLevel::VeryHigh),
            make("b", ProtectionLevel::Moderate),
            make("c", ProtectionLevel::ModerateHigh),
        ];
        let kept: Vec<&str> = filter_by_protection(&sketches, ProtectionLevel::ModerateHigh)
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(kept, vec!["a", "c"]);
    }

    #[test]
    fn land_features_without_geometry_are_skipped() {
        let json = format!(
            r#"{{ "features": [{{ "properties": {{ "name": "island" }}, "geometry": {SQUARE} }}, {{ "properties": null, "geometry": null }}] }}"#
        );
        let c: LandCollection = serde_json::from_str(&json).unwrap();
        assert_eq!(land_from_features(&c).unwrap().len(), 1);
    }

    #[test]
    fn features_may_omit_properties() {
        let json = format!(r#"{{ "features": [{{ "id": 7, "geometry": {SQUARE} }}] }}"#);
        let land: LandCollection = serde_json::from_str(&json).unwrap();
        assert_eq!(land_from_features(&land).unwrap().len(), 1);

        let sketches: SketchCollection = serde_json::from_str(&json).unwrap();
        assert!(sketches.features[0].properties.is_none());
        assert_eq!(sketches.features[0].id, Some(FeatureId::Number(7)));
    }

    #[test]
    fn multipolygon_converts_back_to_geojson() {
        let geometry: PolygonalGeometry = serde_json::from_str(SQUARE).unwrap();
        let mp = geometry.to_multi_polygon().unwrap();
        let back = PolygonalGeometry::from(&mp);
        let json = serde_json::to_value(&back).unwrap();
        assert_eq!(json["type"], "MultiPolygon");
        assert_eq!(json["coordinates"][0][0].as_array().unwrap().len(), 5);
        assert_eq!(back.to_multi_polygon().unwrap(), mp);
    }
}
