//! Spatial tile atlas
//!
//! Each configured dataset owns one immutable [`Atlas`] snapshot held in an
//! [`ArcSwapOption`]. Queries load the current snapshot without locking;
//! reloads parse a complete new atlas and swap it in, so in-flight queries
//! keep the snapshot they started with.

pub mod catalog;

use arc_swap::ArcSwapOption;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{DatasetConfig, DatasetKind};
use crate::error::AtlasError;
use crate::models::{BoundingBox, TileRecord};

/// Immutable, ordered set of tile records for one dataset
#[derive(Debug, Clone, PartialEq)]
pub struct Atlas {
    dataset_id: String,
    records: Vec<TileRecord>,
}

impl Atlas {
    /// Build an atlas, rejecting any record with a malformed bounding box
    ///
    /// Records are ordered by `(minx, miny, filename)`.
    pub fn new(
        dataset_id: impl Into<String>,
        mut records: Vec<TileRecord>,
    ) -> Result<Self, AtlasError> {
        if let Some(bad) = records.iter().find(|r| !r.bbox.is_well_formed()) {
            return Err(AtlasError::InvalidBoundingBox(bad.filename.clone()));
        }

        records.sort_by(|a, b| {
            a.bbox
                .minx
                .total_cmp(&b.bbox.minx)
                .then(a.bbox.miny.total_cmp(&b.bbox.miny))
                .then_with(|| a.filename.cmp(&b.filename))
        });

        Ok(Self {
            dataset_id: dataset_id.into(),
            records,
        })
    }

    /// Parse a catalog document
    pub fn from_json(dataset_id: &str, kind: DatasetKind, json: &str) -> Result<Self, AtlasError> {
        let records = catalog::parse_catalog(dataset_id, kind, json)?;
        Self::new(dataset_id, records)
    }

    /// Read and parse a catalog file
    pub async fn load(
        dataset_id: &str,
        kind: DatasetKind,
        path: &Path,
    ) -> Result<Self, AtlasError> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| AtlasError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_json(dataset_id, kind, &json)
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[TileRecord] {
        &self.records
    }

    /// Every tile intersecting `bbox` grown by `buffer`, in atlas order
    ///
    /// An empty result is not an error.
    pub fn query(&self, bbox: &BoundingBox, buffer: f64) -> Result<Vec<TileRecord>, AtlasError> {
        if !buffer.is_finite() || buffer < 0.0 {
            return Err(AtlasError::InvalidQuery(
                "buffer must be a non-negative number".to_string(),
            ));
        }
        if !bbox.is_well_formed() {
            return Err(AtlasError::InvalidQuery(
                "bounding box must satisfy minx <= maxx and miny <= maxy".to_string(),
            ));
        }

        let search = bbox.expand(buffer);
        Ok(self
            .records
            .iter()
            .filter(|record| record.bbox.intersects(&search))
            .cloned()
            .collect())
    }
}

struct DatasetSlot {
    config: DatasetConfig,
    current: ArcSwapOption<Atlas>,
}

/// Atlas snapshots for every configured dataset
///
/// The set of datasets is fixed at construction; only snapshots change.
pub struct AtlasIndex {
    slots: HashMap<String, DatasetSlot>,
}

impl AtlasIndex {
    /// Create an index with no snapshot loaded yet
    pub fn new(datasets: &BTreeMap<String, DatasetConfig>) -> Self {
        let slots = datasets
            .iter()
            .map(|(name, config)| {
                (
                    name.clone(),
                    DatasetSlot {
                        config: config.clone(),
                        current: ArcSwapOption::empty(),
                    },
                )
            })
            .collect();
        Self { slots }
    }

    pub fn dataset(&self, name: &str) -> Option<&DatasetConfig> {
        self.slots.get(name).map(|slot| &slot.config)
    }

    pub fn dataset_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.slots.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.slots
            .get(name)
            .map(|slot| slot.current.load().is_some())
            .unwrap_or(false)
    }

    /// Load a fresh snapshot from disk and swap it in
    ///
    /// On failure the previous snapshot, if any, stays active.
    pub async fn reload(&self, name: &str) -> Result<Arc<Atlas>, AtlasError> {
        let slot = self
            .slots
            .get(name)
            .ok_or_else(|| AtlasError::UnknownDataset(name.to_string()))?;

        match Atlas::load(name, slot.config.kind, &slot.config.atlas_path).await {
            Ok(atlas) => {
                let atlas = Arc::new(atlas);
                slot.current.store(Some(Arc::clone(&atlas)));
                info!(dataset = %name, tiles = atlas.len(), "Atlas loaded");
                Ok(atlas)
            }
            Err(e) => {
                warn!(
                    dataset = %name,
                    error = %e,
                    keeping_previous = slot.current.load().is_some(),
                    "Atlas load failed"
                );
                Err(e)
            }
        }
    }

    /// Reload every dataset, returning the number that loaded
    pub async fn reload_all(&self) -> usize {
        let mut loaded = 0;
        for name in self.dataset_names() {
            if self.reload(name).await.is_ok() {
                loaded += 1;
            }
        }
        loaded
    }

    /// Current snapshot, loading it on first use
    pub async fn snapshot(&self, name: &str) -> Result<Arc<Atlas>, AtlasError> {
        let slot = self
            .slots
            .get(name)
            .ok_or_else(|| AtlasError::UnknownDataset(name.to_string()))?;

        if let Some(atlas) = slot.current.load_full() {
            return Ok(atlas);
        }
        self.reload(name).await
    }

    /// Query a dataset's current snapshot
    pub async fn query(
        &self,
        name: &str,
        bbox: &BoundingBox,
        buffer: f64,
    ) -> Result<Vec<TileRecord>, AtlasError> {
        self.snapshot(name).await?.query(bbox, buffer)
    }
}
