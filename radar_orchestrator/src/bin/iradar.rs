// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use clap::Parser;

use radar_common::store::{NullObjectStore, ObjectStore};
use radar_orchestrator::cli::{Cli, Command};
use radar_orchestrator::errors::config_error;
use radar_orchestrator::{CompositeRunConfig, FetchRunConfig, Orchestrator, Result};

#[cfg(feature = "s3")]
async fn build_object_store() -> Arc<dyn ObjectStore> {
    if let Some(cfg) = radar_common::store::s3::SpacesConfig::from_env() {
        return Arc::new(radar_common::store::s3::S3ObjectStore::connect(&cfg).await);
    }
    tracing::warn!("no DIGITALOCEAN_SPACES_* credentials found, running in local-only mode");
    Arc::new(NullObjectStore)
}

#[cfg(not(feature = "s3"))]
async fn build_object_store() -> Arc<dyn ObjectStore> {
    Arc::new(NullObjectStore)
}

fn parse_range(hours: Option<i64>, from: &Option<String>, to: &Option<String>) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
    if let Some(hours) = hours {
        let now = Utc::now();
        return Ok(Some((now - Duration::hours(hours), now)));
    }
    if let (Some(from), Some(to)) = (from, to) {
        let parse = |s: &str| -> Result<DateTime<Utc>> {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
                .map(|n| Utc.from_utc_datetime(&n))
                .map_err(|e| config_error(format!("invalid time {s:?}: {e}")))
        };
        return Ok(Some((parse(from)?, parse(to)?)));
    }
    Ok(None)
}

fn resolve_output(output: Option<PathBuf>) -> PathBuf {
    output.unwrap_or_else(|| radar_build::data_dir().unwrap_or_else(|_| PathBuf::from("./output")))
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Fetch { source, output, backload, hours, from, to, update_extent, disable_upload } => {
            let range = if backload { parse_range(hours, &from, &to)? } else { None };
            let store: Arc<dyn ObjectStore> = if disable_upload { Arc::new(NullObjectStore) } else { build_object_store().await };
            let orchestrator = Orchestrator::new(&radar_build::cache_dir()?, store, 60)?;

            let cfg = FetchRunConfig { source, output_root: resolve_output(output), update_extent, upload_enabled: !disable_upload };
            let count = if backload { 500 } else { 5 };
            let summary = orchestrator.run_fetch(&cfg, range, count).await?;
            println!("{summary}");
        }

        Command::Composite {
            mut sources,
            output,
            resolution,
            backload,
            hours,
            from,
            to,
            no_individual,
            timestamp_tolerance,
            require_arso,
            max_data_age,
            min_core_sources,
            reprocess_count,
            no_cache,
            cache_dir,
            cache_ttl,
            no_cache_upload,
            clear_cache,
        } => {
            if sources.is_empty() {
                sources = radar_sources::ALL_SOURCE_NAMES.iter().map(|s| s.to_string()).collect();
            }
            if require_arso && !sources.iter().any(|s| s == "arso") {
                sources.push("arso".to_string());
            }

            let store: Arc<dyn ObjectStore> = if no_cache_upload { Arc::new(NullObjectStore) } else { build_object_store().await };
            let cache_root = match cache_dir {
                Some(dir) => dir,
                None => radar_build::cache_dir()?,
            };
            let ttl = if no_cache { 0 } else { cache_ttl };
            let orchestrator = Orchestrator::new(&cache_root, store, ttl)?;

            if clear_cache {
                orchestrator.clear_caches()?;
            }

            let range = if backload { parse_range(hours, &from, &to)? } else { None };
            let cfg = CompositeRunConfig {
                sources,
                output_root: resolve_output(output),
                resolution_m: resolution,
                individual: !no_individual,
                timestamp_tolerance_min: timestamp_tolerance,
                max_data_age_min: max_data_age,
                min_core_sources,
                reprocess_count,
                update_extent: true,
                upload_enabled: !no_cache_upload,
            };
            let summary = orchestrator.run_composite(&cfg, range).await?;
            println!("{summary}");
        }

        Command::Extent { source, output } => {
            let orchestrator = Orchestrator::new(&radar_build::cache_dir()?, build_object_store().await, 60)?;
            orchestrator.run_extent(&source, output).await?;
        }

        Command::CoverageMask { source, resolution, output } => {
            let orchestrator = Orchestrator::new(&radar_build::cache_dir()?, build_object_store().await, 60)?;
            orchestrator.run_coverage_mask(&source, resolution, output).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    radar_build::init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            std::process::ExitCode::FAILURE
        }
    }
}
