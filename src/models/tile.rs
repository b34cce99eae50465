//! Tile-related domain models
//!
//! Bounding boxes, atlas records, and the tile query request/response bodies.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in the dataset's projected coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

impl BoundingBox {
    pub fn new(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Self {
        Self {
            minx,
            miny,
            maxx,
            maxy,
        }
    }

    /// Finite coordinates with `minx <= maxx` and `miny <= maxy`
    pub fn is_well_formed(&self) -> bool {
        [self.minx, self.miny, self.maxx, self.maxy]
            .iter()
            .all(|v| v.is_finite())
            && self.minx <= self.maxx
            && self.miny <= self.maxy
    }

    /// Half-open rectangle overlap; boxes that only touch do not intersect
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.minx < other.maxx
            && self.maxx > other.minx
            && self.miny < other.maxy
            && self.maxy > other.miny
    }

    /// Grow the box by `buffer` on every side
    pub fn expand(&self, buffer: f64) -> BoundingBox {
        BoundingBox {
            minx: self.minx - buffer,
            miny: self.miny - buffer,
            maxx: self.maxx + buffer,
            maxy: self.maxy + buffer,
        }
    }
}

/// One tile in an atlas
///
/// Immutable once loaded; atlas reloads build a fresh set of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileRecord {
    /// Dataset the tile belongs to
    pub dataset_id: String,

    /// File name relative to the dataset's data directory
    pub filename: String,

    /// Tile extent
    pub bbox: BoundingBox,

    /// Affine geotransform coefficients, when the catalog provides them
    pub transform: Option<[f64; 6]>,
}

/// Body of `POST /{dataset}/tiles`
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TileQuery {
    #[serde(alias = "xmin")]
    pub minx: f64,

    #[serde(alias = "ymin")]
    pub miny: f64,

    #[serde(alias = "xmax")]
    pub maxx: f64,

    #[serde(alias = "ymax")]
    pub maxy: f64,

    /// Distance added to every side of the query box
    #[serde(default)]
    pub buffer: f64,
}

impl TileQuery {
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(self.minx, self.miny, self.maxx, self.maxy)
    }
}

/// Tile as returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileDescriptor {
    pub filename: String,
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

impl From<&TileRecord> for TileDescriptor {
    fn from(record: &TileRecord) -> Self {
        Self {
            filename: record.filename.clone(),
            minx: record.bbox.minx,
            miny: record.bbox.miny,
            maxx: record.bbox.maxx,
            maxy: record.bbox.maxy,
        }
    }
}

/// Response of a successful tile query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileQueryResponse {
    pub message: String,
    pub num_tiles: usize,
    pub tiles: Vec<TileDescriptor>,
}

impl TileQueryResponse {
    pub fn from_records(records: &[TileRecord]) -> Self {
        Self {
            message: "Success".to_string(),
            num_tiles: records.len(),
            tiles: records.iter().map(TileDescriptor::from).collect(),
        }
    }
}
