// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

//! The core run loop: probe every source for available timestamps, gate the run
//! on core-source outage, match timestamps across sources, then for each matched
//! timestamp decode/reproject/compose one source at a time so at most one full
//! source frame is resident alongside the running composite.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use radar_cache::ProcessedDataCache;
use radar_common::alert::{AlertSink, FailureTracker, TracingAlertSink};
use radar_common::datetime::{format_ts14, parse_ts14};
use radar_common::frame::RadarFrame;
use radar_common::geo::{WgsBounds, REFERENCE_WGS_BOUNDS};
use radar_common::store::ObjectStore;
use radar_common::timestamps::normalize_to_12;
use radar_compositor::{fast_reproject, CompositeResult, Compositor};
use radar_grid::{compute_transform_grid, new_transform_grid_cache, GridKey, TransformGrid, TransformGridCache, CURRENT_VERSION};
use radar_match::{match_timestamps, MatchedTimestamp, OutageDetector, SourceTimestamps};
use radar_render::{resize_nearest, write_coverage_mask, write_extent_index, ColorMap, ExtentDescriptor, FilePngSink, PngSink, ReflectivityColorMap};
use radar_sources::{DownloadResult, SourceAdapter};

use crate::country::country_folder;
use crate::errors::{config_error, RadarOrchestratorError, Result};
use crate::native_affine::native_affine;
use crate::summary::RunSummary;

/// Caps the number of concurrent in-flight network operations (probes and
/// downloads) per source, and the number of sources probed concurrently.
const MAX_WORKERS: usize = 6;

/// The query-string product passed to `list_available_timestamps`/`download`.
/// Distinct from a decoded frame's `metadata.product`, which some adapters
/// (OMSZ) derive from this and others (DWD, SHMU, IMGW) fix independently of it.
fn query_product(source: &str) -> &'static str {
    match source {
        "dwd" => "dmax",
        "shmu" => "zmax",
        "chmi" => "maxz",
        "omsz" => "cmax",
        "imgw" => "cmax",
        "arso" => "zm",
        _ => "default",
    }
}

/// The `FrameMetadata.product` a decoded frame for `query_product(source)` carries,
/// used as the Processed-Data Cache key when no freshly decoded frame is at hand.
fn cache_product_hint(source: &str) -> &'static str {
    match source {
        "dwd" | "shmu" => "composite",
        "chmi" => "maxz",
        "omsz" | "imgw" => "cmax",
        "arso" => "zm",
        _ => "default",
    }
}

/// ARSO has no archive: a backload run has a fixed time range to fill and
/// ARSO can never serve anything in it, so probing it would be wasted work
/// at best and a misleading gap in the composite at worst.
fn effective_sources(configured: &[String], is_backload: bool) -> Vec<String> {
    if is_backload {
        configured.iter().filter(|s| s.as_str() != "arso").cloned().collect()
    } else {
        configured.to_vec()
    }
}

pub struct CompositeRunConfig {
    pub sources: Vec<String>,
    pub output_root: PathBuf,
    pub resolution_m: f64,
    pub individual: bool,
    pub timestamp_tolerance_min: i64,
    pub max_data_age_min: i64,
    pub min_core_sources: usize,
    pub reprocess_count: usize,
    pub update_extent: bool,
    pub upload_enabled: bool,
}

pub struct FetchRunConfig {
    pub source: String,
    pub output_root: PathBuf,
    pub update_extent: bool,
    pub upload_enabled: bool,
}

pub struct Orchestrator {
    adapters: HashMap<String, Arc<dyn SourceAdapter>>,
    processed_cache: Arc<ProcessedDataCache>,
    grid_cache: Arc<TransformGridCache>,
    object_store: Arc<dyn ObjectStore>,
    alert_sink: Arc<dyn AlertSink>,
    failure_tracker: Mutex<FailureTracker>,
    cancel_token: CancellationToken,
}

impl Orchestrator {
    pub fn new(cache_root: &Path, object_store: Arc<dyn ObjectStore>, cache_ttl_minutes: i64) -> Result<Self> {
        let download_dir = cache_root.join("downloads");
        let adapters = radar_sources::create_all_adapters(&download_dir)
            .into_iter()
            .map(|adapter| (adapter.name().to_string(), Arc::from(adapter)))
            .collect();

        let processed_cache = Arc::new(ProcessedDataCache::new(cache_root.join("data"), object_store.clone(), cache_ttl_minutes)?);
        let grid_cache = Arc::new(new_transform_grid_cache(cache_root.join("grid"), object_store.clone())?);

        Ok(Orchestrator {
            adapters,
            processed_cache,
            grid_cache,
            object_store,
            alert_sink: Arc::new(TracingAlertSink),
            failure_tracker: Mutex::new(FailureTracker::new(3)),
            cancel_token: CancellationToken::new(),
        })
    }

    /// A token callers can cancel to stop `run_composite` between timestamps.
    /// Checked after each matched timestamp finishes processing, never mid-timestamp,
    /// so a cancelled run never leaves a composite half-written.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn clear_caches(&self) -> Result<()> {
        let removed_data = self.processed_cache.clear_local()?;
        let removed_grid = self.grid_cache.clear_local()?;
        info!(removed_data, removed_grid, "cleared local caches");
        Ok(())
    }

    fn note_failure(&self, source: &str, message: impl ToString) {
        let alert = self.failure_tracker.lock().unwrap().record_failure(source, message);
        if let Some(alert) = alert {
            self.alert_sink.record(alert);
        }
    }

    fn note_success(&self, source: &str) {
        self.failure_tracker.lock().unwrap().record_success(source);
    }

    async fn upload_file(&self, path: &Path, key: &str) {
        match std::fs::read(path) {
            Ok(bytes) => {
                if let Err(e) = self.object_store.put(key, bytes).await {
                    warn!(key, error = %e, "object store upload failed");
                }
            }
            Err(e) => warn!(path = %path.display(), error = %e, "failed to read rendered file for upload"),
        }
    }

    /// Lists cached + freshly-probed-and-downloaded timestamps for `source`,
    /// write-through-caching every newly decoded frame. Returns the available
    /// `(timestamp, ts12)` pairs (newest first) plus the raw file paths downloaded
    /// this run, keyed by `ts12`, so later passes can reuse or clean them up.
    async fn probe_source(
        &self,
        source: &str,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
        count: usize,
    ) -> (Vec<(DateTime<Utc>, String)>, HashMap<String, PathBuf>) {
        let mut available: Vec<(DateTime<Utc>, String)> = Vec::new();
        let mut downloaded_paths: HashMap<String, PathBuf> = HashMap::new();

        let Some(adapter) = self.adapters.get(source).cloned() else {
            return (available, downloaded_paths);
        };
        let product = cache_product_hint(source).to_string();

        match self.processed_cache.list_timestamps(source, Some(&product)).await {
            Ok(ts12s) => {
                for ts12 in ts12s {
                    if let Ok(dt) = parse_ts14(&format!("{ts12}00")) {
                        available.push((dt, ts12));
                    }
                }
            }
            Err(e) => warn!(source, error = %e, "failed to list cached timestamps"),
        }
        let cached_ts12: std::collections::HashSet<String> = available.iter().map(|(_, t)| t.clone()).collect();

        let query = query_product(source).to_string();
        let reported = match adapter.list_available_timestamps(count, std::slice::from_ref(&query), range).await {
            Ok(v) => v,
            Err(e) => {
                self.note_failure(source, e.to_string());
                warn!(source, error = %e, "failed to list available timestamps");
                Vec::new()
            }
        };

        let mut uncached_raw = Vec::new();
        for raw in &reported {
            if let Ok(ts12) = normalize_to_12(raw) {
                if !cached_ts12.contains(&ts12) {
                    uncached_raw.push(raw.clone());
                }
            }
        }

        if !uncached_raw.is_empty() {
            // Each uncached timestamp is downloaded on its own task, bounded by a
            // per-source semaphore rather than left to the adapter's own (fully
            // sequential) batch loop - this is what actually lets a source with
            // many backlogged timestamps fetch them concurrently.
            let semaphore = Arc::new(Semaphore::new(MAX_WORKERS));
            let mut downloads: JoinSet<(String, Result<Vec<DownloadResult>>)> = JoinSet::new();
            for raw in &uncached_raw {
                let adapter = adapter.clone();
                let raw = raw.clone();
                let query = query.clone();
                let semaphore = semaphore.clone();
                downloads.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
                    let outcome = adapter.download(std::slice::from_ref(&raw), std::slice::from_ref(&query)).await;
                    (raw, outcome)
                });
            }

            while let Some(joined) = downloads.join_next().await {
                let (raw, outcome) = match joined {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(source, error = %e, "download task panicked");
                        continue;
                    }
                };
                match outcome {
                    Ok(results) => {
                        for result in results {
                            let Some(path) = result.path else {
                                if let Some(err) = result.error {
                                    self.note_failure(source, &err);
                                    warn!(source, timestamp = %result.timestamp, error = %err, "download failed");
                                }
                                continue;
                            };
                            self.note_success(source);

                            let adapter2 = adapter.clone();
                            let path2 = path.clone();
                            let decoded = tokio::task::spawn_blocking(move || adapter2.decode(&path2)).await;
                            match decoded {
                                Ok(Ok(frame)) => {
                                    let ts12 = frame.timestamp[..12].to_string();
                                    if let Ok(dt) = parse_ts14(&frame.timestamp) {
                                        if let Err(e) = self.processed_cache.put(&ts12, frame, false).await {
                                            warn!(source, error = %e, "failed to write-through processed cache");
                                        }
                                        if !result.cached_in_session {
                                            downloaded_paths.insert(ts12.clone(), path);
                                        }
                                        available.push((dt, ts12));
                                    }
                                }
                                Ok(Err(e)) => {
                                    self.note_failure(source, e.to_string());
                                    warn!(source, error = %e, "decode failed");
                                }
                                Err(e) => warn!(source, error = %e, "decode task panicked"),
                            }
                        }
                    }
                    Err(e) => {
                        self.note_failure(source, e.to_string());
                        warn!(source, %raw, error = %e, "download failed");
                    }
                }
            }
        }

        available.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        available.dedup_by(|a, b| a.1 == b.1);
        (available, downloaded_paths)
    }

    /// Pass 1: cheap viability check - decode only the header of a freshly
    /// downloaded file, or accept an already-cached frame as given.
    async fn extent_viable(&self, source: &str, ts12: &str, downloaded_paths: &HashMap<(String, String), PathBuf>) -> bool {
        if let Some(path) = downloaded_paths.get(&(source.to_string(), ts12.to_string())) {
            if let Some(adapter) = self.adapters.get(source).cloned() {
                let path = path.clone();
                let result = tokio::task::spawn_blocking(move || adapter.decode_extent_only(&path)).await;
                return matches!(result, Ok(Ok(_)));
            }
        }
        let product = cache_product_hint(source);
        matches!(self.processed_cache.get(source, ts12, product).await, Ok(Some(_)))
    }

    fn bounds_hash(b: &WgsBounds) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        b.west.to_bits().hash(&mut hasher);
        b.east.to_bits().hash(&mut hasher);
        b.south.to_bits().hash(&mut hasher);
        b.north.to_bits().hash(&mut hasher);
        hasher.finish()
    }

    async fn grid_for(&self, frame: &RadarFrame, resolution_m: f64) -> Result<Arc<TransformGrid>> {
        let (src_h, src_w) = frame.dimensions();
        let source = frame.metadata.source.as_str();
        let bounds_hash = Self::bounds_hash(&frame.wgs84_bounds);
        let key = GridKey::new(source, src_h, src_w, Some(bounds_hash), CURRENT_VERSION)?;

        if let Some(grid) = self.grid_cache.get(&key).await? {
            return Ok(grid);
        }

        let src_affine = native_affine(frame)?;
        let grid = compute_transform_grid(source, (src_h, src_w), frame.projection_info.proj4_string(), &src_affine, &REFERENCE_WGS_BOUNDS, resolution_m)?;
        let grid_for_caller = grid.clone();
        self.grid_cache.put(key, grid).await?;
        Ok(Arc::new(grid_for_caller))
    }

    pub async fn run_composite(&self, cfg: &CompositeRunConfig, range: Option<(DateTime<Utc>, DateTime<Utc>)>) -> Result<RunSummary> {
        for source in &cfg.sources {
            if !self.adapters.contains_key(source) {
                return Err(config_error(format!("unknown source: {source}")));
            }
        }

        let sources = effective_sources(&cfg.sources, range.is_some());

        let now = Utc::now();
        let count = (cfg.reprocess_count * 4).max(10);

        let mut per_source_available: SourceTimestamps<String> = HashMap::new();
        let mut downloaded_paths: HashMap<(String, String), PathBuf> = HashMap::new();

        let probed = join_all(sources.iter().map(|source| self.probe_source(source, range, count))).await;
        for (source, (available, paths)) in sources.iter().zip(probed) {
            for (ts12, path) in paths {
                downloaded_paths.insert((source.clone(), ts12), path);
            }
            per_source_available.insert(source.clone(), available);
        }

        let newest: HashMap<String, Option<DateTime<Utc>>> =
            sources.iter().map(|s| (s.clone(), per_source_available.get(s).and_then(|v| v.iter().map(|(dt, _)| *dt).max()))).collect();

        let detector = OutageDetector { max_data_age_minutes: cfg.max_data_age_min, min_core_sources: cfg.min_core_sources };
        let statuses = detector.classify(&newest, now);
        if let Err(reasons) = detector.check_core_quorum(&statuses) {
            for reason in &reasons {
                tracing::error!(reason = %reason, "core quorum check failed");
            }
            return Err(RadarOrchestratorError::QuorumError(reasons));
        }

        let matched = match_timestamps(&per_source_available, &sources, Duration::minutes(cfg.timestamp_tolerance_min), cfg.min_core_sources, cfg.reprocess_count);

        let mut summary = RunSummary::default();
        for m in &matched {
            self.process_matched_timestamp(cfg, &m, &mut downloaded_paths, &mut summary).await?;
            if self.cancel_token.is_cancelled() {
                info!("composite run cancelled after finishing timestamp {}", format_ts14(m.timestamp));
                break;
            }
        }

        for source in &sources {
            if let Some(adapter) = self.adapters.get(source) {
                adapter.cleanup_temp_files();
            }
        }

        Ok(summary)
    }

    async fn process_matched_timestamp(
        &self,
        cfg: &CompositeRunConfig,
        matched: &MatchedTimestamp<String>,
        downloaded_paths: &mut HashMap<(String, String), PathBuf>,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let unix_ts = matched.timestamp.timestamp();
        let ts14 = format_ts14(matched.timestamp);
        let composite_path = cfg.output_root.join("composite").join(format!("{unix_ts}.png"));
        let composite_key = format!("iradar/composite/{unix_ts}.png");

        if composite_path.is_file() || self.object_store.head(&composite_key).await.unwrap_or(false) {
            summary.skipped_exists += 1;
            return Ok(());
        }

        if matched.arso_dropped {
            info!(timestamp = %ts14, "ARSO dropped from match: quorum met without it");
        }

        let mut viable = 0usize;
        for (source, ts12) in &matched.per_source {
            if self.extent_viable(source, ts12, downloaded_paths).await {
                viable += 1;
            }
        }
        if viable < cfg.min_core_sources {
            summary.skipped_insufficient += 1;
            summary.note_skip(&ts14);
            return Ok(());
        }

        let (dst_affine, dst_h, dst_w) = radar_gdal::default_mercator_transform(&REFERENCE_WGS_BOUNDS, cfg.resolution_m)?;
        let mercator_bounds = dst_affine.corner_bounds(dst_w, dst_h);
        let mut compositor = Compositor::new((dst_h, dst_w), REFERENCE_WGS_BOUNDS, mercator_bounds, cfg.resolution_m);
        let mut used_sources = Vec::new();

        for source in radar_sources::ALL_SOURCE_NAMES.into_iter().filter(|s| matched.per_source.contains_key(*s)) {
            let ts12 = matched.per_source[source].clone();
            let product = cache_product_hint(source);

            let frame = match self.processed_cache.get(source, &ts12, product).await {
                Ok(Some(f)) => f,
                Ok(None) => {
                    debug!(source, timestamp = %ts14, "frame missing from cache at compose time");
                    continue;
                }
                Err(e) => {
                    warn!(source, error = %e, "cache read failed");
                    continue;
                }
            };

            if cfg.individual {
                let country = country_folder(source);
                let out_path = cfg.output_root.join(country).join(format!("{unix_ts}.png"));
                if let Err(e) = FilePngSink.write_frame(&frame.data, &ReflectivityColorMap, &out_path) {
                    warn!(source, error = %e, "failed to write per-source png");
                } else if cfg.upload_enabled {
                    self.upload_file(&out_path, &format!("iradar/{country}/{unix_ts}.png")).await;
                }
            }

            let grid = match self.grid_for(&frame, cfg.resolution_m).await {
                Ok(g) => g,
                Err(e) => {
                    warn!(source, error = %e, "failed to compute transform grid");
                    continue;
                }
            };
            let reprojected = fast_reproject(&frame.data, &grid);
            compositor.add_source(source, &reprojected);
            used_sources.push(source.to_string());
            drop(reprojected);
            drop(frame);

            if let Some(path) = downloaded_paths.remove(&(source.to_string(), ts12)) {
                let _ = std::fs::remove_file(&path);
            }
        }

        if used_sources.len() < cfg.min_core_sources {
            summary.skipped_insufficient += 1;
            summary.note_skip(&ts14);
            return Ok(());
        }

        let composite = compositor.get_composite();
        FilePngSink.write_frame(&composite.data, &ReflectivityColorMap, &composite_path)?;
        if cfg.upload_enabled {
            self.upload_file(&composite_path, &composite_key).await;
        }

        if cfg.update_extent {
            self.write_composite_extent(cfg, &composite)?;
        }

        summary.processed += 1;
        summary.last_coverage_percent = Some(composite.coverage_percent);
        info!(timestamp = %ts14, sources = ?used_sources, coverage = composite.coverage_percent, "composite written");
        Ok(())
    }

    fn write_composite_extent(&self, cfg: &CompositeRunConfig, composite: &CompositeResult) -> Result<()> {
        let desc = ExtentDescriptor {
            name: "composite".to_string(),
            country: "combined".to_string(),
            wgs84_bounds: composite.extent,
            projection: "WebMercator".to_string(),
            grid_size: composite.grid_size,
            resolution_m: composite.resolution_m,
            mercator_bounds: Some(composite.mercator_bounds),
        };
        write_extent_index(&desc, &cfg.output_root.join("composite").join("extent_index.json"), true)?;
        write_extent_index(&desc, &cfg.output_root.join("radar_extent_combined.json"), true)?;
        Ok(())
    }

    pub async fn run_fetch(&self, cfg: &FetchRunConfig, range: Option<(DateTime<Utc>, DateTime<Utc>)>, count: usize) -> Result<RunSummary> {
        let adapter = self.adapters.get(&cfg.source).cloned().ok_or_else(|| config_error(format!("unknown source: {}", cfg.source)))?;
        let query = query_product(&cfg.source).to_string();
        let cache_product = cache_product_hint(&cfg.source).to_string();
        let country = country_folder(&cfg.source);

        let reported = adapter.list_available_timestamps(count, std::slice::from_ref(&query), range).await?;
        let mut summary = RunSummary::default();

        for raw_ts in &reported {
            let ts12 = normalize_to_12(raw_ts)?;
            let unix_ts = parse_ts14(&format!("{ts12}00"))?.timestamp();
            let out_path = cfg.output_root.join(country).join(format!("{unix_ts}.png"));
            if out_path.is_file() {
                summary.skipped_exists += 1;
                continue;
            }

            let frame = match self.processed_cache.get(&cfg.source, &ts12, &cache_product).await? {
                Some(f) => f,
                None => {
                    let results = adapter.download(std::slice::from_ref(raw_ts), std::slice::from_ref(&query)).await?;
                    let Some(result) = results.into_iter().find(|r| r.path.is_some()) else {
                        summary.failed += 1;
                        summary.note_skip(&ts12);
                        continue;
                    };
                    let path = result.path.unwrap();
                    let adapter2 = adapter.clone();
                    let path2 = path.clone();
                    let frame = tokio::task::spawn_blocking(move || adapter2.decode(&path2))
                        .await
                        .map_err(|e| config_error(e.to_string()))??;
                    self.processed_cache.put(&ts12, frame.clone(), false).await?;
                    if !result.cached_in_session {
                        let _ = std::fs::remove_file(&path);
                    }
                    frame
                }
            };

            FilePngSink.write_frame(&frame.data, &ReflectivityColorMap, &out_path)?;
            if cfg.upload_enabled {
                self.upload_file(&out_path, &format!("iradar/{country}/{unix_ts}.png")).await;
            }

            if cfg.update_extent {
                let desc = ExtentDescriptor {
                    name: cfg.source.clone(),
                    country: country.to_string(),
                    wgs84_bounds: frame.wgs84_bounds,
                    projection: format!("{:?}", frame.projection_info),
                    grid_size: frame.dimensions(),
                    resolution_m: adapter.native_extent().resolution_m,
                    mercator_bounds: None,
                };
                write_extent_index(&desc, &cfg.output_root.join(country).join("extent_index.json"), false)?;
            }

            summary.processed += 1;
        }

        adapter.cleanup_temp_files();
        Ok(summary)
    }

    pub async fn run_extent(&self, source: &str, output: Option<PathBuf>) -> Result<()> {
        let base = output.unwrap_or_else(|| PathBuf::from("."));
        if source == "all" {
            for name in radar_sources::ALL_SOURCE_NAMES {
                self.write_source_extent(name, &base).await?;
            }

            let mut bounds = WgsBounds { west: 180.0, east: -180.0, south: 90.0, north: -90.0 };
            for name in radar_sources::ALL_SOURCE_NAMES {
                if let Some(adapter) = self.adapters.get(name) {
                    let ext = adapter.native_extent();
                    bounds.west = bounds.west.min(ext.wgs84_bounds.west);
                    bounds.east = bounds.east.max(ext.wgs84_bounds.east);
                    bounds.south = bounds.south.min(ext.wgs84_bounds.south);
                    bounds.north = bounds.north.max(ext.wgs84_bounds.north);
                }
            }
            let desc = ExtentDescriptor {
                name: "combined".to_string(),
                country: "combined".to_string(),
                wgs84_bounds: bounds,
                projection: "WGS84".to_string(),
                grid_size: (0, 0),
                resolution_m: radar_common::geo::DEFAULT_RESOLUTION_M,
                mercator_bounds: None,
            };
            write_extent_index(&desc, &base.join("radar_extent_combined.json"), true)?;
            let key = "iradar-data/extent/combined/extent_index.json".to_string();
            if let Ok(bytes) = std::fs::read(base.join("radar_extent_combined.json")) {
                let _ = self.object_store.put(&key, bytes).await;
            }
        } else {
            self.write_source_extent(source, &base).await?;
        }
        Ok(())
    }

    async fn write_source_extent(&self, source: &str, base: &Path) -> Result<()> {
        let adapter = self.adapters.get(source).ok_or_else(|| config_error(format!("unknown source: {source}")))?;
        let ext = adapter.native_extent();
        let country = country_folder(source);
        let desc = ExtentDescriptor {
            name: source.to_string(),
            country: country.to_string(),
            wgs84_bounds: ext.wgs84_bounds,
            projection: "native".to_string(),
            grid_size: ext.grid_size,
            resolution_m: ext.resolution_m,
            mercator_bounds: ext.mercator_bounds,
        };
        let path = base.join(country).join("extent_index.json");
        write_extent_index(&desc, &path, false)?;
        if let Ok(bytes) = std::fs::read(&path) {
            let key = format!("iradar-data/extent/{source}/extent_index.json");
            let _ = self.object_store.put(&key, bytes).await;
        }
        Ok(())
    }

    pub async fn run_coverage_mask(&self, source: &str, resolution_m: f64, output: Option<PathBuf>) -> Result<()> {
        let base = output.unwrap_or_else(|| PathBuf::from("."));
        let targets: Vec<&str> = if source == "all" { radar_sources::ALL_SOURCE_NAMES.to_vec() } else { vec![source] };

        for name in targets {
            let adapter = self.adapters.get(name).cloned().ok_or_else(|| config_error(format!("unknown source: {name}")))?;
            let query = query_product(name).to_string();
            let cache_product = cache_product_hint(name).to_string();

            let reported = adapter.list_available_timestamps(1, std::slice::from_ref(&query), None).await?;
            let Some(raw_ts) = reported.first() else {
                warn!(source = name, "no timestamps available, skipping coverage mask");
                continue;
            };
            let ts12 = normalize_to_12(raw_ts)?;

            let frame = match self.processed_cache.get(name, &ts12, &cache_product).await? {
                Some(f) => f,
                None => {
                    let results = adapter.download(std::slice::from_ref(raw_ts), std::slice::from_ref(&query)).await?;
                    let Some(result) = results.into_iter().find(|r| r.path.is_some()) else {
                        warn!(source = name, "download failed, skipping coverage mask");
                        continue;
                    };
                    let path = result.path.unwrap();
                    let adapter2 = adapter.clone();
                    let path2 = path.clone();
                    let frame = tokio::task::spawn_blocking(move || adapter2.decode(&path2))
                        .await
                        .map_err(|e| config_error(e.to_string()))??;
                    self.processed_cache.put(&ts12, frame.clone(), false).await?;
                    frame
                }
            };

            let coverage = frame.data.map(|v| v.is_finite());
            let (_, dst_h, dst_w) = radar_gdal::default_mercator_transform(&frame.wgs84_bounds, resolution_m)?;
            let resized = resize_nearest(&coverage, (dst_h, dst_w));

            let country = country_folder(name);
            let path = base.join(country).join("coverage_mask.png");
            write_coverage_mask(&resized, &path)?;
            if let Ok(bytes) = std::fs::read(&path) {
                let key = format!("iradar-data/mask/{name}/coverage_mask.png");
                let _ = self.object_store.put(&key, bytes).await;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ndarray::Array2;
    use proptest::prelude::*;
    use radar_common::frame::FrameMetadata;
    use radar_common::geo::ProjectionInfo;
    use radar_common::store::NullObjectStore;
    use radar_sources::{ExtentOnly, NativeExtent};

    /// A `SourceAdapter` that serves one fixed timestamp straight out of memory -
    /// no network, no files on disk worth reading - so `run_composite` and
    /// `process_matched_timestamp` can be exercised end to end without a
    /// network connection.
    struct FakeAdapter {
        name: &'static str,
        ts14: String,
        bounds: WgsBounds,
        dims: (usize, usize),
        fill: f32,
    }

    #[async_trait]
    impl SourceAdapter for FakeAdapter {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_core(&self) -> bool {
            radar_match::CORE_SOURCES.contains(&self.name)
        }

        async fn list_available_timestamps(&self, count: usize, _products: &[String], range: Option<(DateTime<Utc>, DateTime<Utc>)>) -> radar_sources::Result<Vec<String>> {
            if let Some((start, end)) = range {
                let dt = parse_ts14(&self.ts14).map_err(|e| radar_sources::errors::decode_error(e.to_string()))?;
                if dt < start || dt > end {
                    return Ok(Vec::new());
                }
            }
            let mut out = vec![self.ts14.clone()];
            out.truncate(count.max(1));
            Ok(out)
        }

        async fn download(&self, timestamps: &[String], products: &[String]) -> radar_sources::Result<Vec<DownloadResult>> {
            let product = products.first().cloned().unwrap_or_default();
            Ok(timestamps
                .iter()
                .map(|ts| {
                    let path = std::env::temp_dir().join(format!("fake_{}_{ts}_{:p}.bin", self.name, self));
                    let _ = std::fs::write(&path, b"fake");
                    DownloadResult { timestamp: ts.clone(), product: product.clone(), path: Some(path), cached_in_session: false, error: None }
                })
                .collect())
        }

        fn decode(&self, _path: &Path) -> radar_sources::Result<RadarFrame> {
            let data = Array2::from_elem(self.dims, self.fill);
            let metadata = FrameMetadata {
                product: cache_product_hint(self.name).to_string(),
                quantity: "DBZH".to_string(),
                source: self.name.to_string(),
                units: "dBZ".to_string(),
                nodata_sentinel: None,
                gain: 1.0,
                offset: 0.0,
            };
            RadarFrame::new(data, self.bounds, ProjectionInfo::Wgs84, metadata, self.ts14.clone()).map_err(|e| radar_sources::errors::decode_error(e.to_string()))
        }

        fn decode_extent_only(&self, _path: &Path) -> radar_sources::Result<ExtentOnly> {
            Ok(ExtentOnly { wgs84_bounds: self.bounds, dimensions: self.dims, projection_info: ProjectionInfo::Wgs84 })
        }

        fn native_extent(&self) -> NativeExtent {
            NativeExtent { wgs84_bounds: self.bounds, mercator_bounds: None, grid_size: self.dims, resolution_m: 2000.0 }
        }

        fn cleanup_temp_files(&self) -> usize {
            0
        }
    }

    fn fake_orchestrator(tag: &str, adapters: Vec<(&'static str, Arc<dyn SourceAdapter>)>) -> (Orchestrator, PathBuf) {
        let dir = std::env::temp_dir().join(format!("radar_orchestrator_fake_{tag}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let object_store: Arc<dyn ObjectStore> = Arc::new(NullObjectStore);
        let processed_cache = Arc::new(ProcessedDataCache::new(dir.join("data"), object_store.clone(), 60).unwrap());
        let grid_cache = Arc::new(new_transform_grid_cache(dir.join("grid"), object_store.clone()).unwrap());
        let orchestrator = Orchestrator {
            adapters: adapters.into_iter().map(|(name, a)| (name.to_string(), a)).collect(),
            processed_cache,
            grid_cache,
            object_store,
            alert_sink: Arc::new(TracingAlertSink),
            failure_tracker: Mutex::new(FailureTracker::new(3)),
            cancel_token: CancellationToken::new(),
        };
        (orchestrator, dir)
    }

    fn base_cfg(sources: Vec<String>, output_root: PathBuf, min_core_sources: usize) -> CompositeRunConfig {
        CompositeRunConfig {
            sources,
            output_root,
            resolution_m: 20_000.0,
            individual: false,
            timestamp_tolerance_min: 5,
            max_data_age_min: 30,
            min_core_sources,
            reprocess_count: 1,
            update_extent: false,
            upload_enabled: false,
        }
    }

    #[tokio::test]
    async fn six_source_composite_reports_processed_and_coverage() {
        let ts14 = "20260128120000".to_string();
        let dims = (60, 60);
        let adapters: Vec<(&'static str, Arc<dyn SourceAdapter>)> = radar_sources::ALL_SOURCE_NAMES
            .iter()
            .map(|&name| (name, Arc::new(FakeAdapter { name, ts14: ts14.clone(), bounds: REFERENCE_WGS_BOUNDS, dims, fill: 20.0 }) as Arc<dyn SourceAdapter>))
            .collect();
        let (orchestrator, dir) = fake_orchestrator("s1", adapters);

        let cfg = base_cfg(radar_sources::ALL_SOURCE_NAMES.iter().map(|s| s.to_string()).collect(), dir.join("out"), 3);
        let summary = orchestrator.run_composite(&cfg, None).await.unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped_insufficient, 0);
        let coverage = summary.last_coverage_percent.expect("a composite was written");
        assert!(coverage > 50.0, "six sources covering the full reference area should yield substantial coverage, got {coverage}");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn too_few_live_core_sources_returns_a_quorum_error() {
        let ts14 = "20260128120000".to_string();
        let dims = (60, 60);
        // Only two core sources ever report data; "chmi"/"omsz"/"imgw" are
        // wired up but never have anything available, simulating an outage.
        let live = ["dwd", "shmu"];
        let adapters: Vec<(&'static str, Arc<dyn SourceAdapter>)> = radar_sources::ALL_SOURCE_NAMES
            .iter()
            .map(|&name| {
                let adapter: Arc<dyn SourceAdapter> = if live.contains(&name) {
                    Arc::new(FakeAdapter { name, ts14: ts14.clone(), bounds: REFERENCE_WGS_BOUNDS, dims, fill: 20.0 })
                } else {
                    Arc::new(EmptyAdapter { name })
                };
                (name, adapter)
            })
            .collect();
        let (orchestrator, dir) = fake_orchestrator("s3", adapters);

        let cfg = base_cfg(radar_sources::ALL_SOURCE_NAMES.iter().map(|s| s.to_string()).collect(), dir.join("out"), 3);
        let err = orchestrator.run_composite(&cfg, None).await.unwrap_err();
        assert!(matches!(err, RadarOrchestratorError::QuorumError(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }

    /// An adapter that never has anything available - the outage case for S3.
    struct EmptyAdapter {
        name: &'static str,
    }

    #[async_trait]
    impl SourceAdapter for EmptyAdapter {
        fn name(&self) -> &'static str {
            self.name
        }
        fn is_core(&self) -> bool {
            radar_match::CORE_SOURCES.contains(&self.name)
        }
        async fn list_available_timestamps(&self, _count: usize, _products: &[String], _range: Option<(DateTime<Utc>, DateTime<Utc>)>) -> radar_sources::Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn download(&self, _timestamps: &[String], _products: &[String]) -> radar_sources::Result<Vec<DownloadResult>> {
            Ok(Vec::new())
        }
        fn decode(&self, _path: &Path) -> radar_sources::Result<RadarFrame> {
            Err(radar_sources::errors::decode_error("EmptyAdapter never decodes"))
        }
        fn decode_extent_only(&self, _path: &Path) -> radar_sources::Result<ExtentOnly> {
            Err(radar_sources::errors::decode_error("EmptyAdapter never decodes"))
        }
        fn native_extent(&self) -> NativeExtent {
            NativeExtent { wgs84_bounds: REFERENCE_WGS_BOUNDS, mercator_bounds: None, grid_size: (1, 1), resolution_m: 2000.0 }
        }
        fn cleanup_temp_files(&self) -> usize {
            0
        }
    }

    #[tokio::test]
    async fn an_all_nan_decoded_frame_contributes_no_coverage_but_does_not_fail_the_run() {
        // Simulates the OMSZ all-0xFF case: the frame decodes successfully
        // (no crash, no error) but every pixel is NaN, so it must contribute
        // nothing to the composite instead of corrupting it.
        let ts14 = "20260128120000".to_string();
        let dims = (60, 60);
        let mut adapters: Vec<(&'static str, Arc<dyn SourceAdapter>)> = Vec::new();
        for &name in &["dwd", "shmu", "chmi", "imgw"] {
            adapters.push((name, Arc::new(FakeAdapter { name, ts14: ts14.clone(), bounds: REFERENCE_WGS_BOUNDS, dims, fill: 20.0 }) as Arc<dyn SourceAdapter>));
        }
        adapters.push(("omsz", Arc::new(FakeAdapter { name: "omsz", ts14: ts14.clone(), bounds: REFERENCE_WGS_BOUNDS, dims, fill: f32::NAN }) as Arc<dyn SourceAdapter>));
        adapters.push(("arso", Arc::new(FakeAdapter { name: "arso", ts14: ts14.clone(), bounds: REFERENCE_WGS_BOUNDS, dims, fill: 20.0 }) as Arc<dyn SourceAdapter>));

        let (orchestrator, dir) = fake_orchestrator("s5", adapters);
        let cfg = base_cfg(radar_sources::ALL_SOURCE_NAMES.iter().map(|s| s.to_string()).collect(), dir.join("out"), 3);
        let summary = orchestrator.run_composite(&cfg, None).await.unwrap();

        assert_eq!(summary.processed, 1, "the other five sources still meet quorum on their own");
        let coverage = summary.last_coverage_percent.expect("a composite was written");
        assert!(coverage > 0.0, "coverage should still come from the five non-NaN sources");

        let _ = std::fs::remove_dir_all(&dir);
    }

    fn test_orchestrator(tag: &str) -> (Orchestrator, PathBuf) {
        let dir = std::env::temp_dir().join(format!("radar_orchestrator_test_{tag}_{}", std::process::id()));
        let orchestrator = Orchestrator::new(&dir, Arc::new(NullObjectStore), 60).unwrap();
        (orchestrator, dir)
    }

    #[test]
    fn query_product_and_cache_hint_cover_every_registered_source() {
        for source in radar_sources::ALL_SOURCE_NAMES {
            assert_ne!(query_product(source), "default", "{source} has no query product mapping");
            assert_ne!(cache_product_hint(source), "default", "{source} has no cache product hint mapping");
        }
    }

    #[test]
    fn cache_product_hint_matches_what_adapters_actually_tag_frames_with() {
        // dwd/shmu fix metadata.product to "composite" regardless of requested
        // query product; omsz/imgw report decoded frames under "cmax"; chmi and
        // arso carry their query product straight through.
        assert_eq!(cache_product_hint("dwd"), "composite");
        assert_eq!(cache_product_hint("shmu"), "composite");
        assert_eq!(cache_product_hint("chmi"), "maxz");
        assert_eq!(cache_product_hint("omsz"), "cmax");
        assert_eq!(cache_product_hint("imgw"), "cmax");
        assert_eq!(cache_product_hint("arso"), "zm");
    }

    #[test]
    fn bounds_hash_is_stable_and_bounds_sensitive() {
        let a = WgsBounds { west: 2.5, east: 26.4, south: 44.0, north: 56.2 };
        let b = WgsBounds { west: 2.5, east: 26.4, south: 44.0, north: 56.2 };
        let c = WgsBounds { west: 3.0, east: 26.4, south: 44.0, north: 56.2 };
        assert_eq!(Orchestrator::bounds_hash(&a), Orchestrator::bounds_hash(&b));
        assert_ne!(Orchestrator::bounds_hash(&a), Orchestrator::bounds_hash(&c));
    }

    #[test]
    fn new_builds_one_adapter_per_registered_source() {
        let (orchestrator, dir) = test_orchestrator("new");
        assert_eq!(orchestrator.adapters.len(), radar_sources::ALL_SOURCE_NAMES.len());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn clear_caches_on_an_empty_store_is_a_harmless_no_op() {
        let (orchestrator, dir) = test_orchestrator("clear");
        orchestrator.clear_caches().unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn failure_tracker_escalates_to_an_alert_after_repeated_failures() {
        let (orchestrator, dir) = test_orchestrator("failures");
        for _ in 0..3 {
            orchestrator.note_failure("dwd", "probe timed out");
        }
        assert_eq!(orchestrator.failure_tracker.lock().unwrap().consecutive_failures("dwd"), 3);
        orchestrator.note_success("dwd");
        assert_eq!(orchestrator.failure_tracker.lock().unwrap().consecutive_failures("dwd"), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn run_composite_rejects_unknown_source_before_touching_the_network() {
        let (orchestrator, dir) = test_orchestrator("unknown_source");
        let cfg = CompositeRunConfig {
            sources: vec!["noaa".to_string()],
            output_root: dir.join("out"),
            resolution_m: 2000.0,
            individual: false,
            timestamp_tolerance_min: 5,
            max_data_age_min: 30,
            min_core_sources: 3,
            reprocess_count: 1,
            update_extent: false,
            upload_enabled: false,
        };
        let err = orchestrator.run_composite(&cfg, None).await.unwrap_err();
        assert!(matches!(err, RadarOrchestratorError::ConfigError(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn quorum_below_minimum_core_sources_is_reported_as_a_quorum_error() {
        let detector = OutageDetector { max_data_age_minutes: 30, min_core_sources: 4 };
        let now = Utc::now();
        let newest: HashMap<String, Option<DateTime<Utc>>> =
            [("dwd".to_string(), Some(now)), ("shmu".to_string(), Some(now)), ("chmi".to_string(), None), ("omsz".to_string(), None), ("imgw".to_string(), None)]
                .into_iter()
                .collect();
        let statuses = detector.classify(&newest, now);
        let result = detector.check_core_quorum(&statuses);
        assert!(result.is_err(), "two live core sources should not satisfy a quorum of four");
    }

    #[test]
    fn effective_sources_drops_arso_only_during_backload() {
        let configured = vec!["dwd".to_string(), "arso".to_string(), "shmu".to_string()];
        assert_eq!(effective_sources(&configured, false), configured);
        assert_eq!(effective_sources(&configured, true), vec!["dwd".to_string(), "shmu".to_string()]);
    }

    #[test]
    fn effective_sources_is_unchanged_when_arso_was_never_configured() {
        let configured = vec!["dwd".to_string(), "shmu".to_string()];
        assert_eq!(effective_sources(&configured, true), configured);
    }

    #[test]
    fn cancel_token_reflects_cancellation() {
        let (orchestrator, dir) = test_orchestrator("cancel");
        let token = orchestrator.cancel_token();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(orchestrator.cancel_token().is_cancelled());
        let _ = std::fs::remove_dir_all(&dir);
    }

    proptest! {
        /// The quorum gate is a pure function of the classified statuses: the
        /// same statuses always produce the same verdict, and the verdict
        /// flips exactly at `min_core_sources` available core sources.
        #[test]
        fn quorum_gate_is_deterministic_and_threshold_exact(available_count in 0usize..=5, min_core_sources in 0usize..=5) {
            let detector = OutageDetector { max_data_age_minutes: 30, min_core_sources };
            let now = Utc::now();
            let mut newest: HashMap<String, Option<DateTime<Utc>>> = HashMap::new();
            for (i, source) in radar_match::CORE_SOURCES.iter().enumerate() {
                newest.insert(source.to_string(), if i < available_count { Some(now) } else { None });
            }
            let statuses = detector.classify(&newest, now);

            let first = detector.check_core_quorum(&statuses);
            let second = detector.check_core_quorum(&statuses);
            prop_assert_eq!(first.is_ok(), second.is_ok(), "classifying and gating the same statuses twice must agree");
            prop_assert_eq!(first.is_ok(), available_count >= min_core_sources);
        }

        /// Whatever the configured sources, a non-backload run never drops any
        /// of them, and a backload run drops exactly "arso" and nothing else.
        #[test]
        fn effective_sources_never_drops_core_sources(has_arso in any::<bool>(), is_backload in any::<bool>()) {
            let mut configured = vec!["dwd".to_string(), "shmu".to_string(), "chmi".to_string()];
            if has_arso {
                configured.push("arso".to_string());
            }
            let result = effective_sources(&configured, is_backload);
            prop_assert!(result.contains(&"dwd".to_string()));
            prop_assert!(result.contains(&"shmu".to_string()));
            prop_assert!(result.contains(&"chmi".to_string()));
            prop_assert_eq!(result.contains(&"arso".to_string()), has_arso && !is_backload);
        }
    }
}
