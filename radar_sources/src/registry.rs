// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

//! Name-to-adapter lookup, the single place that knows the full provider
//! roster. Kept separate from `radar_match`'s notion of core/optional
//! sources so this crate never depends on the matching crate just to build
//! an adapter.

use std::path::PathBuf;

use crate::adapter::SourceAdapter;
use crate::arso::ArsoAdapter;
use crate::chmi::ChmiAdapter;
use crate::dwd::DwdAdapter;
use crate::errors::{unknown_source_error, Result};
use crate::imgw::ImgwAdapter;
use crate::omsz::OmszAdapter;
use crate::shmu::ShmuAdapter;

pub const ALL_SOURCE_NAMES: [&str; 6] = ["dwd", "shmu", "chmi", "omsz", "imgw", "arso"];

pub fn create_adapter(name: &str, cache_dir: PathBuf) -> Result<Box<dyn SourceAdapter>> {
    let adapter: Box<dyn SourceAdapter> = match name {
        "dwd" => Box::new(DwdAdapter::new(cache_dir)),
        "shmu" => Box::new(ShmuAdapter::new(cache_dir)),
        "chmi" => Box::new(ChmiAdapter::new(cache_dir)),
        "omsz" => Box::new(OmszAdapter::new(cache_dir)),
        "imgw" => Box::new(ImgwAdapter::new(cache_dir)),
        "arso" => Box::new(ArsoAdapter::new(cache_dir)),
        other => return Err(unknown_source_error(other)),
    };
    Ok(adapter)
}

pub fn create_all_adapters(cache_dir: &std::path::Path) -> Vec<Box<dyn SourceAdapter>> {
    ALL_SOURCE_NAMES.iter().map(|name| create_adapter(name, cache_dir.to_path_buf()).expect("registry names are always valid")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_name_creates_an_adapter() {
        for name in ALL_SOURCE_NAMES {
            let adapter = create_adapter(name, PathBuf::from("/tmp")).unwrap();
            assert_eq!(adapter.name(), name);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!(create_adapter("noaa", PathBuf::from("/tmp")).is_err());
    }
}
