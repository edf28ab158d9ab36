// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use std::path::Path;

use chrono::Utc;
use serde::Serialize;

use radar_common::geo::{MercatorBounds, WgsBounds};

use crate::errors::Result;

const SCHEMA_VERSION: &str = "1.0";

#[derive(Serialize)]
struct ExtentMetadata {
    title: String,
    description: String,
    version: String,
    generated: String,
    coordinate_system: String,
}

#[derive(Serialize)]
struct ExtentBounds {
    west: f64,
    east: f64,
    south: f64,
    north: f64,
}

impl From<WgsBounds> for ExtentBounds {
    fn from(b: WgsBounds) -> Self {
        ExtentBounds { west: b.west, east: b.east, south: b.south, north: b.north }
    }
}

#[derive(Serialize)]
struct MercatorExtent {
    west: f64,
    east: f64,
    south: f64,
    north: f64,
}

#[derive(Serialize)]
struct SourceExtent {
    name: String,
    country: String,
    extent: ExtentBounds,
    projection: String,
    grid_size: [usize; 2],
    resolution_m: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    mercator: Option<MercatorExtent>,
}

#[derive(Serialize)]
struct ExtentIndex {
    metadata: ExtentMetadata,
    source: SourceExtent,
}

/// One entry's worth of information needed to describe a source's (or the
/// composite's) published extent.
pub struct ExtentDescriptor {
    pub name: String,
    pub country: String,
    pub wgs84_bounds: WgsBounds,
    pub projection: String,
    pub grid_size: (usize, usize),
    pub resolution_m: f64,
    pub mercator_bounds: Option<MercatorBounds>,
}

fn build_index(title: &str, description: &str, desc: &ExtentDescriptor) -> ExtentIndex {
    ExtentIndex {
        metadata: ExtentMetadata {
            title: title.to_string(),
            description: description.to_string(),
            version: SCHEMA_VERSION.to_string(),
            generated: Utc::now().to_rfc3339(),
            coordinate_system: "EPSG:4326".to_string(),
        },
        source: SourceExtent {
            name: desc.name.clone(),
            country: desc.country.clone(),
            extent: desc.wgs84_bounds.into(),
            projection: desc.projection.clone(),
            grid_size: [desc.grid_size.0, desc.grid_size.1],
            resolution_m: desc.resolution_m,
            mercator: desc.mercator_bounds.map(|m| MercatorExtent { west: m.min_x, east: m.max_x, south: m.min_y, north: m.max_y }),
        },
    }
}

/// Writes `extent_index.json` for a single source or the composite, following
/// the fixed schema published alongside per-source and composite PNGs.
pub fn write_extent_index(desc: &ExtentDescriptor, out_path: &Path, is_composite: bool) -> Result<()> {
    let title = if is_composite { "Combined Radar Composite Extent".to_string() } else { format!("{} Radar Extent", desc.name.to_uppercase()) };
    let description = if is_composite {
        "Geographic extent of the merged multi-source radar composite".to_string()
    } else {
        format!("Geographic extent of the {} national radar network", desc.country)
    };

    let index = build_index(&title, &description, desc);
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(out_path)?;
    serde_json::to_writer_pretty(file, &index)?;
    Ok(())
}
