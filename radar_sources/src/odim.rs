// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

//! Shared reading of ODIM_H5 radar composites (DWD, SHMU, CHMI, IMGW all use
//! this WMO-standard HDF5 layout, differing only in which `what`/`where` group
//! carries scaling/geometry and in their native projection).

use std::path::Path;

use ndarray::Array2;
use netcdf::{File as NcFile, Variable};

use crate::errors::{decode_error, netcdf_error, Result};

pub struct ScalingParams {
    pub gain: f64,
    pub offset: f64,
    pub nodata: f64,
    pub undetect: f64,
}

impl Default for ScalingParams {
    fn default() -> Self {
        ScalingParams { gain: 1.0, offset: 0.0, nodata: 65535.0, undetect: 0.0 }
    }
}

pub fn open_odim(path: &Path) -> Result<NcFile> {
    netcdf::open(path).map_err(netcdf_error)
}

fn f64_attr(file: &NcFile, group_path: &str, attr: &str) -> Option<f64> {
    let group = file.group(group_path).ok().flatten()?;
    let value = group.attribute(attr)?.value().ok()?;
    f64::try_from(value).ok()
}

/// Reads gain/offset/nodata/undetect from whichever of the two conventional
/// locations the file actually populates, falling back to ODIM defaults.
pub fn read_scaling(file: &NcFile) -> ScalingParams {
    let mut scaling = ScalingParams::default();
    for group in ["dataset1/data1/what", "dataset1/what"] {
        if let Some(v) = f64_attr(file, group, "gain") {
            scaling.gain = v;
        }
        if let Some(v) = f64_attr(file, group, "offset") {
            scaling.offset = v;
        }
        if let Some(v) = f64_attr(file, group, "nodata") {
            scaling.nodata = v;
        }
        if let Some(v) = f64_attr(file, group, "undetect") {
            scaling.undetect = v;
        }
    }
    scaling
}

/// `dBZ = gain * raw + offset`, with `nodata`/`undetect` mapped to NaN -
/// the standard ODIM_H5 scaling rule shared by every HDF5-based provider.
pub fn scale_raw(raw: f64, scaling: &ScalingParams) -> f32 {
    if (raw - scaling.nodata).abs() < f64::EPSILON || (raw - scaling.undetect).abs() < f64::EPSILON {
        f32::NAN
    } else {
        (scaling.gain * raw + scaling.offset) as f32
    }
}

fn find_data_variable<'a>(file: &'a NcFile) -> Option<Variable<'a>> {
    for path in ["dataset1/data1", "dataset1/data"] {
        if let Ok(Some(group)) = file.group(path) {
            if let Some(var) = group.variable("data") {
                return Some(var);
            }
        }
    }
    None
}

/// Reads the raw 2-D reflectivity grid as `u16`, applying ODIM scaling.
/// Covers DWD (native uint16) directly; 8-bit providers go through
/// [`read_dataset_u8`] instead since netcdf's typed API needs the real width.
pub fn read_dataset_u16(file: &NcFile, scaling: &ScalingParams) -> Result<Array2<f32>> {
    let var = find_data_variable(file).ok_or_else(|| decode_error("no ODIM data variable found"))?;
    let dims = var.dimensions();
    let (rows, cols) = (dims[0].len(), dims[1].len());
    let raw: Vec<u16> = var.get_values(..).map_err(netcdf_error)?;
    let scaled: Vec<f32> = raw.iter().map(|&v| scale_raw(v as f64, scaling)).collect();
    Array2::from_shape_vec((rows, cols), scaled).map_err(|e| decode_error(e.to_string()))
}

/// As [`read_dataset_u16`] but for the 8-bit providers (SHMU, CHMI, IMGW),
/// where 255 is the conventional nodata sentinel in addition to whatever the
/// file's own `nodata`/`undetect` attributes say.
pub fn read_dataset_u8(file: &NcFile, scaling: &ScalingParams) -> Result<Array2<f32>> {
    let var = find_data_variable(file).ok_or_else(|| decode_error("no ODIM data variable found"))?;
    let dims = var.dimensions();
    let (rows, cols) = (dims[0].len(), dims[1].len());
    let raw: Vec<u8> = var.get_values(..).map_err(netcdf_error)?;
    let scaled: Vec<f32> = raw
        .iter()
        .map(|&v| if v == 255 { f32::NAN } else { scale_raw(v as f64, scaling) })
        .collect();
    Array2::from_shape_vec((rows, cols), scaled).map_err(|e| decode_error(e.to_string()))
}

/// Reads the real `(rows, cols)` of the ODIM data variable, independent of
/// any caller-supplied nominal grid size. Shared by `decode` and
/// `decode_extent_only` so the two never disagree about a file's shape.
pub fn read_dataset_dims(file: &NcFile) -> Result<(usize, usize)> {
    let var = find_data_variable(file).ok_or_else(|| decode_error("no ODIM data variable found"))?;
    let dims = var.dimensions();
    Ok((dims[0].len(), dims[1].len()))
}

pub struct CornerBounds {
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
}

/// Reads `LL_lon/LL_lat/UR_lon/UR_lat` from whichever `where` group is
/// present, falling back to the caller's static extent when absent.
pub fn read_corner_bounds(file: &NcFile, fallback: CornerBounds) -> CornerBounds {
    for group in ["where", "dataset1/where"] {
        let ll_lon = f64_attr(file, group, "LL_lon");
        let ll_lat = f64_attr(file, group, "LL_lat");
        let ur_lon = f64_attr(file, group, "UR_lon");
        let ur_lat = f64_attr(file, group, "UR_lat");
        if let (Some(west), Some(south), Some(east), Some(north)) = (ll_lon, ll_lat, ur_lon, ur_lat) {
            return CornerBounds { west, east, south, north };
        }
    }
    fallback
}

/// Reads the `projdef` PROJ.4 string from `where` or `dataset1/where`, if present.
pub fn read_proj_def(file: &NcFile) -> Option<String> {
    for group in ["where", "dataset1/where"] {
        let g = file.group(group).ok().flatten()?;
        if let Some(attr) = g.attribute("projdef") {
            if let Ok(value) = attr.value() {
                if let Ok(s) = String::try_from(value) {
                    return Some(s);
                }
            }
        }
    }
    None
}
