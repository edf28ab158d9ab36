// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

//! Per-provider download and decode adapters for the six national radar
//! composite feeds: DWD, SHMU, CHMI, OMSZ, IMGW (ODIM_H5/netCDF, "core") and
//! ARSO (SRD-3 text format, optional).

pub mod adapter;
pub mod arso;
pub mod chmi;
pub mod dwd;
pub mod errors;
pub mod http;
pub mod imgw;
pub mod odim;
pub mod omsz;
pub mod registry;
pub mod shmu;

pub use adapter::{DownloadResult, ExtentOnly, NativeExtent, SessionCache, SourceAdapter};
pub use errors::{RadarSourcesError, Result};
pub use registry::{create_adapter, create_all_adapters, ALL_SOURCE_NAMES};
