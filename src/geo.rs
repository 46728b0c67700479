//! Province polygons from a GeoJSON FeatureCollection.

use crate::error::{ReportError, Result};
use crate::province::Province;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

/// Outer rings of one province feature, as `(lon, lat)` points.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvinceShape {
    /// Name as written in the feature properties.
    pub name: String,
    pub province: Province,
    pub rings: Vec<Vec<(f64, f64)>>,
}

impl ProvinceShape {
    /// `(min_lon, max_lon, min_lat, max_lat)` over all rings.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        bounds_of(self.rings.iter().flatten())
    }
}

fn bounds_of<'a>(points: impl Iterator<Item = &'a (f64, f64)>) -> Option<(f64, f64, f64, f64)> {
    points.fold(None, |acc, &(x, y)| match acc {
        None => Some((x, x, y, y)),
        Some((x0, x1, y0, y1)) => Some((x0.min(x), x1.max(x), y0.min(y), y1.max(y))),
    })
}

/// Bounding box of a whole map.
pub fn map_bounds(shapes: &[ProvinceShape]) -> Option<(f64, f64, f64, f64)> {
    shapes
        .iter()
        .filter_map(ProvinceShape::bounds)
        .reduce(|a, b| (a.0.min(b.0), a.1.max(b.1), a.2.min(b.2), a.3.max(b.3)))
}

fn geo_err(path: &Path, msg: impl std::fmt::Display) -> ReportError {
    ReportError::Geo(format!("{}: {}", path.display(), msg))
}

fn ring(value: &Value) -> Option<Vec<(f64, f64)>> {
    value
        .as_array()?
        .iter()
        .map(|p| {
            let p = p.as_array()?;
            Some((p.first()?.as_f64()?, p.get(1)?.as_f64()?))
        })
        .collect()
}

/// Outer ring of every polygon in a Polygon / MultiPolygon geometry.
fn outer_rings(geometry: &Value) -> Option<Vec<Vec<(f64, f64)>>> {
    let coords = geometry.get("coordinates")?;
    match geometry.get("type")?.as_str()? {
        "Polygon" => Some(vec![ring(coords.as_array()?.first()?)?]),
        "MultiPolygon" => coords
            .as_array()?
            .iter()
            .map(|poly| ring(poly.as_array()?.first()?))
            .collect(),
        _ => None,
    }
}

/// Parse a FeatureCollection. Features without a usable name or geometry are
/// skipped with a warning.
pub fn parse_provinces(path: &Path, content: &str, name_property: &str) -> Result<Vec<ProvinceShape>> {
    let doc: Value = serde_json::from_str(content).map_err(|e| geo_err(path, e))?;
    let features = doc
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| geo_err(path, "not a FeatureCollection"))?;

    let mut shapes = Vec::with_capacity(features.len());
    for (i, feature) in features.iter().enumerate() {
        let name = feature
            .get("properties")
            .and_then(|p| p.get(name_property))
            .and_then(Value::as_str)
            .map(str::to_string);
        let rings = feature.get("geometry").and_then(outer_rings);
        match (name, rings) {
            (Some(name), Some(rings)) if !rings.is_empty() => {
                let province = Province::from_feature_name(&name);
                debug!("feature {} '{}' -> {}", i, name, province);
                shapes.push(ProvinceShape {
                    name,
                    province,
                    rings,
                });
            }
            _ => warn!("skipping feature {} in {}: no '{}' or polygon", i, path.display(), name_property),
        }
    }
    if shapes.is_empty() {
        return Err(geo_err(path, "no usable province features"));
    }
    Ok(shapes)
}

/// Read the province polygons. `Ok(None)` when the file does not exist.
pub fn load_provinces(path: &Path, name_property: &str) -> Result<Option<Vec<ProvinceShape>>> {
    if !path.exists() {
        warn!("geo data {} not found", path.display());
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    parse_provinces(path, &content, name_property).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
      "type": "FeatureCollection",
      "features": [
        {"type": "Feature", "properties": {"name": "Tehran"},
         "geometry": {"type": "Polygon", "coordinates": [[[51,35],[52,35],[52,36],[51,35]]]}},
        {"type": "Feature", "properties": {"name": "فارس"},
         "geometry": {"type": "MultiPolygon", "coordinates": [
            [[[52,28],[54,28],[54,30],[52,28]]],
            [[[53,27],[53.5,27],[53.5,27.5],[53,27]]]
         ]}},
        {"type": "Feature", "properties": {}, "geometry": null}
      ]
    }"#;

    #[test]
    fn test_parse_feature_collection() {
        let shapes = parse_provinces(Path::new("t.geojson"), DOC, "name").unwrap();
        assert_eq!(shapes.len(), 2);
        assert_eq!(shapes[0].province, Province::Known("تهران"));
        assert_eq!(shapes[1].province, Province::Known("فارس"));
        assert_eq!(shapes[1].rings.len(), 2);
        assert_eq!(shapes[0].bounds(), Some((51.0, 52.0, 35.0, 36.0)));
        assert_eq!(map_bounds(&shapes), Some((51.0, 54.0, 27.0, 36.0)));
    }

    #[test]
    fn test_malformed_and_missing() {
        assert!(matches!(
            parse_provinces(Path::new("t.geojson"), "{not json", "name"),
            Err(ReportError::Geo(_))
        ));
        assert!(matches!(
            parse_provinces(Path::new("t.geojson"), r#"{"type":"Point"}"#, "name"),
            Err(ReportError::Geo(_))
        ));
        let dir = tempfile::tempdir().unwrap();
        assert!(load_provinces(&dir.path().join("none.geojson"), "name")
            .unwrap()
            .is_none());
    }
}
