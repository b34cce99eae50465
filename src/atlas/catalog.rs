//! Catalog file parsing
//!
//! Two layouts are understood:
//!
//! - `gpkg`: `{"<tile_id>": {"filename", "minx", "miny", "maxx", "maxy", "transform"?}}`
//! - `lidar`: `{"<x>": {"<y>": {"filename", "width", "height"}}}` where the tile
//!   covers `(x, y, x + width, y + height)`
//!
//! Any malformed entry fails the whole catalog.

use serde_json::{Map, Value};

use crate::config::DatasetKind;
use crate::error::AtlasError;
use crate::models::{BoundingBox, TileRecord};

/// Parse a catalog document into tile records (unsorted)
pub fn parse_catalog(
    dataset_id: &str,
    kind: DatasetKind,
    json: &str,
) -> Result<Vec<TileRecord>, AtlasError> {
    let root: Value =
        serde_json::from_str(json).map_err(|e| AtlasError::Malformed(e.to_string()))?;
    let entries = as_object(&root, "catalog root")?;

    match kind {
        DatasetKind::Gpkg => parse_gpkg(dataset_id, entries),
        DatasetKind::Lidar => parse_lidar(dataset_id, entries),
    }
}

fn parse_gpkg(
    dataset_id: &str,
    entries: &Map<String, Value>,
) -> Result<Vec<TileRecord>, AtlasError> {
    let mut records = Vec::with_capacity(entries.len());

    for (tile_id, info) in entries {
        let info = as_object(info, tile_id)?;
        let bbox = BoundingBox::new(
            number(info, "minx", tile_id)?,
            number(info, "miny", tile_id)?,
            number(info, "maxx", tile_id)?,
            number(info, "maxy", tile_id)?,
        );
        let transform = match info.get("transform") {
            None | Some(Value::Null) => None,
            Some(value) => Some(transform(value, tile_id)?),
        };

        records.push(TileRecord {
            dataset_id: dataset_id.to_string(),
            filename: filename(info, tile_id)?,
            bbox,
            transform,
        });
    }

    Ok(records)
}

fn parse_lidar(
    dataset_id: &str,
    columns: &Map<String, Value>,
) -> Result<Vec<TileRecord>, AtlasError> {
    let mut records = Vec::new();

    for (x_key, column) in columns {
        let x = coordinate_key(x_key)?;
        for (y_key, info) in as_object(column, x_key)? {
            let y = coordinate_key(y_key)?;
            let tile_id = format!("{}/{}", x_key, y_key);
            let info = as_object(info, &tile_id)?;
            let width = number(info, "width", &tile_id)?;
            let height = number(info, "height", &tile_id)?;

            records.push(TileRecord {
                dataset_id: dataset_id.to_string(),
                filename: filename(info, &tile_id)?,
                bbox: BoundingBox::new(x, y, x + width, y + height),
                transform: None,
            });
        }
    }

    Ok(records)
}

fn as_object<'a>(value: &'a Value, context: &str) -> Result<&'a Map<String, Value>, AtlasError> {
    value
        .as_object()
        .ok_or_else(|| AtlasError::Malformed(format!("{}: expected an object", context)))
}

fn coordinate_key(key: &str) -> Result<f64, AtlasError> {
    key.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| AtlasError::Malformed(format!("non-numeric coordinate key {:?}", key)))
}

/// Numbers may be stored as JSON numbers or numeric strings
fn number(info: &Map<String, Value>, field: &str, tile_id: &str) -> Result<f64, AtlasError> {
    let parsed = match info.get(field) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        AtlasError::Malformed(format!("{}: missing or invalid {}", tile_id, field))
    })
}

fn filename(info: &Map<String, Value>, tile_id: &str) -> Result<String, AtlasError> {
    match info.get("filename") {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        _ => Err(AtlasError::Malformed(format!(
            "{}: missing or invalid filename",
            tile_id
        ))),
    }
}

fn transform(value: &Value, tile_id: &str) -> Result<[f64; 6], AtlasError> {
    let invalid = || AtlasError::Malformed(format!("{}: transform must be six numbers", tile_id));
    let items = value.as_array().ok_or_else(invalid)?;
    if items.len() != 6 {
        return Err(invalid());
    }
    let mut coefficients = [0.0; 6];
    for (slot, item) in coefficients.iter_mut().zip(items) {
        *slot = item.as_f64().ok_or_else(invalid)?;
    }
    Ok(coefficients)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gpkg_catalog() {
        let json = r#"{
            "tile_0": {"filename": "a.gpkg", "minx": 0, "miny": 0, "maxx": 10, "maxy": 10},
            "tile_1": {"filename": "b.gpkg", "minx": "10.5", "miny": 0, "maxx": 20, "maxy": 10,
                       "transform": [1.0, 0.0, 10.5, 0.0, -1.0, 10.0]}
        }"#;

        let mut records = parse_catalog("gpkg", DatasetKind::Gpkg, json).unwrap();
        records.sort_by(|a, b| a.filename.cmp(&b.filename));

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].dataset_id, "gpkg");
        assert_eq!(records[0].bbox, BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        assert!(records[0].transform.is_none());
        assert_eq!(records[1].bbox.minx, 10.5);
        assert_eq!(records[1].transform, Some([1.0, 0.0, 10.5, 0.0, -1.0, 10.0]));
    }

    #[test]
    fn test_parse_lidar_catalog() {
        let json = r#"{
            "270000": {
                "6475000": {"filename": "270000_6475000.laz", "width": 2000, "height": 2000},
                "6477000": {"filename": "270000_6477000.laz", "width": 2000, "height": 2000}
            }
        }"#;

        let records = parse_catalog("lidar", DatasetKind::Lidar, json).unwrap();
        assert_eq!(records.len(), 2);
        let first = records
            .iter()
            .find(|r| r.filename == "270000_6475000.laz")
            .unwrap();
        assert_eq!(
            first.bbox,
            BoundingBox::new(270000.0, 6475000.0, 272000.0, 6477000.0)
        );
    }

    #[test]
    fn test_gpkg_missing_field_fails_whole_load() {
        let json = r#"{
            "ok": {"filename": "a.gpkg", "minx": 0, "miny": 0, "maxx": 10, "maxy": 10},
            "bad": {"filename": "b.gpkg", "minx": 0, "miny": 0, "maxx": 10}
        }"#;
        match parse_catalog("gpkg", DatasetKind::Gpkg, json) {
            Err(AtlasError::Malformed(msg)) => assert!(msg.contains("maxy")),
            other => panic!("Expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_lidar_non_numeric_key_fails() {
        let json = r#"{"east": {"0": {"filename": "a.laz", "width": 1, "height": 1}}}"#;
        assert!(matches!(
            parse_catalog("lidar", DatasetKind::Lidar, json),
            Err(AtlasError::Malformed(_))
        ));
    }

    #[test]
    fn test_invalid_json_fails() {
        assert!(matches!(
            parse_catalog("gpkg", DatasetKind::Gpkg, "{not json"),
            Err(AtlasError::Malformed(_))
        ));
        assert!(matches!(
            parse_catalog("gpkg", DatasetKind::Gpkg, "[]"),
            Err(AtlasError::Malformed(_))
        ));
    }

    #[test]
    fn test_bad_transform_fails() {
        let json = r#"{"t": {"filename": "a.gpkg", "minx": 0, "miny": 0, "maxx": 1, "maxy": 1,
                             "transform": [1, 2, 3]}}"#;
        assert!(matches!(
            parse_catalog("gpkg", DatasetKind::Gpkg, json),
            Err(AtlasError::Malformed(_))
        ));
    }
}
