//! Outlet catalog
//!
//! The catalog is a JSON document shaped `region -> mediaCategory -> [outlet]`.
//! It is loaded fresh at the start of every daily cycle so that reachability
//! refreshed by [`probe`] is honored without a restart. Region order is the
//! document order.

pub mod probe;

use crate::models::{MediaCategory, Outlet, Region};
use crate::utils::error::CatalogError;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

/// In-memory, read-only view of the outlet catalog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    regions: Vec<Region>,
}

impl Catalog {
    /// Load and parse a catalog file
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let catalog = Self::from_json_str(&content)?;
        debug!(
            path = %path.display(),
            regions = catalog.regions.len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    /// Build from an already parsed document
    ///
    /// Structural problems are errors; an individual outlet entry that cannot
    /// be read is skipped with a warning.
    pub fn from_value(value: &Value) -> Result<Self, CatalogError> {
        let root = value
            .as_object()
            .ok_or_else(|| CatalogError::Shape("top level must be an object of regions".into()))?;

        let mut regions = Vec::with_capacity(root.len());
        for (region_name, categories) in root {
            let categories = categories.as_object().ok_or_else(|| {
                CatalogError::Shape(format!(
                    "region '{region_name}' must map media categories to outlet lists"
                ))
            })?;

            let mut region = Region::new(region_name.as_str());
            for (category_name, outlets) in categories {
                let entries = outlets.as_array().ok_or_else(|| {
                    CatalogError::Shape(format!(
                        "'{region_name}/{category_name}' must be a list of outlets"
                    ))
                })?;

                let outlets = entries
                    .iter()
                    .enumerate()
                    .filter_map(|(index, entry)| {
                        match serde_json::from_value::<Outlet>(entry.clone()) {
                            Ok(outlet) => Some(outlet),
                            Err(e) => {
                                warn!(
                                    region = %region_name,
                                    category = %category_name,
                                    index,
                                    error = %e,
                                    "Skipping unreadable outlet entry"
                                );
                                None
                            }
                        }
                    })
                    .collect();

                region = region.with_group(MediaCategory::parse(category_name), outlets);
            }
            regions.push(region);
        }

        Ok(Self { regions })
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn region(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|region| region.name == name)
    }

    /// Regions `[start, end)` by index, clamped to the catalog size
    pub fn window(&self, start: usize, end: Option<usize>) -> &[Region] {
        let end = end.unwrap_or(self.regions.len()).min(self.regions.len());
        let start = start.min(end);
        &self.regions[start..end]
    }

    /// Reachable outlets of a region; empty for an unknown region
    pub fn reachable_outlets(&self, region: &str) -> Vec<&Outlet> {
        self.region(region)
            .map(Region::reachable_outlets)
            .unwrap_or_default()
    }
}
