// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

//! Command-line surface, grounded on `odin_n5`'s `clap::Parser` + `#[tokio::main]`
//! binary shape, generalized to a subcommand per operation.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "iradar", version, about = "National weather-radar composite ingestion and fusion")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download and decode frames for a single source, without compositing.
    Fetch {
        #[arg(long)]
        source: String,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        backload: bool,
        #[arg(long)]
        hours: Option<i64>,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        update_extent: bool,
        #[arg(long)]
        disable_upload: bool,
    },

    /// Fetch, reproject, and fuse multiple sources into composite PNGs.
    Composite {
        #[arg(long, value_delimiter = ',')]
        sources: Vec<String>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = 500.0)]
        resolution: f64,
        #[arg(long)]
        backload: bool,
        #[arg(long)]
        hours: Option<i64>,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        no_individual: bool,
        #[arg(long, default_value_t = 2)]
        timestamp_tolerance: i64,
        #[arg(long)]
        require_arso: bool,
        #[arg(long, default_value_t = 30)]
        max_data_age: i64,
        #[arg(long, default_value_t = 3)]
        min_core_sources: usize,
        #[arg(long, default_value_t = 1)]
        reprocess_count: usize,
        #[arg(long)]
        no_cache: bool,
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        #[arg(long, default_value_t = 60)]
        cache_ttl: i64,
        #[arg(long)]
        no_cache_upload: bool,
        #[arg(long)]
        clear_cache: bool,
    },

    /// Write per-source (or combined) extent metadata without downloading data.
    Extent {
        #[arg(long)]
        source: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Write a source's (or the composite's) coverage mask PNG.
    CoverageMask {
        #[arg(long)]
        source: String,
        #[arg(long, default_value_t = 500.0)]
        resolution: f64,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}
