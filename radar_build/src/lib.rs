// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

//! Root-directory resolution, RON config loading and logging setup shared by all
//! `radar_*` crates. Deliberately small - there is no web UI here so there is nothing
//! to embed at build time, only a handful of config files and a log/env-var contract.

pub mod errors;

use std::{env, fs, path::{Path, PathBuf}};
use serde::de::DeserializeOwned;
use tracing_subscriber::EnvFilter;

pub use errors::{RadarBuildError, Result};

/// Env var naming the root directory. Falls back to `$HOME/.iradar`.
pub const ROOT_ENV_VAR: &str = "IRADAR_ROOT";

pub fn get_env_root_dir() -> Option<PathBuf> {
    env::var(ROOT_ENV_VAR).ok().map(|s| Path::new(&s).to_path_buf())
}

pub fn default_root_dir() -> PathBuf {
    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let mut p = Path::new(&home).to_path_buf();
    p.push(".iradar");
    p
}

/// Resolve (and create if missing) the root directory used for cache/data/config.
/// Lookup order: `$IRADAR_ROOT` if set, else `$HOME/.iradar`.
pub fn get_or_create_root_dir() -> Result<PathBuf> {
    let path = get_env_root_dir().unwrap_or_else(default_root_dir);
    ensure_existing_dir(&path)?;
    Ok(path)
}

pub fn ensure_existing_dir(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if !path.is_dir() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

fn subdir(name: &str) -> Result<PathBuf> {
    let mut p = get_or_create_root_dir()?;
    p.push(name);
    ensure_existing_dir(&p)?;
    Ok(p)
}

pub fn cache_dir() -> Result<PathBuf> { subdir("cache") }
pub fn data_dir() -> Result<PathBuf> { subdir("data") }
pub fn config_dir() -> Result<PathBuf> { subdir("config") }

/// Load and parse a RON config file from `config_dir()/filename`.
pub fn load_config<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let mut path = config_dir()?;
    path.push(filename);
    if !path.is_file() {
        return Err(RadarBuildError::ConfigNotFoundError(path.display().to_string()));
    }
    let contents = fs::read_to_string(&path)?;
    Ok(ron::from_str(&contents)?)
}

/// Load a RON config file, falling back to `default` when the file does not exist.
pub fn load_config_or_default<T: DeserializeOwned + Default>(filename: &str) -> Result<T> {
    match load_config(filename) {
        Ok(cfg) => Ok(cfg),
        Err(RadarBuildError::ConfigNotFoundError(_)) => Ok(T::default()),
        Err(e) => Err(e),
    }
}

/// Initialize `tracing` from `IMETEO_LOG_{LEVEL,FORMAT,FILE}`.
///
/// `IMETEO_LOG_LEVEL` is any `tracing_subscriber::EnvFilter` directive (default `info`).
/// `IMETEO_LOG_FORMAT` is one of `pretty` (default), `json`, `compact`.
/// `IMETEO_LOG_FILE`, if set, redirects output to that path (appended) instead of stderr.
pub fn init_logging() {
    let level = env::var("IMETEO_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));
    let format = env::var("IMETEO_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let result = if let Ok(path) = env::var("IMETEO_LOG_FILE") {
        match fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => {
                let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::sync::Mutex::new(file));
                match format.as_str() {
                    "json" => builder.json().try_init(),
                    "compact" => builder.compact().try_init(),
                    _ => builder.try_init(),
                }
            }
            Err(e) => {
                eprintln!("cannot open log file {path}: {e}, falling back to stderr");
                init_stderr(filter, &format)
            }
        }
    } else {
        init_stderr(filter, &format)
    };

    if let Err(e) = result {
        eprintln!("logging already initialized: {e}");
    }
}

fn init_stderr(filter: EnvFilter, format: &str) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    match format {
        "json" => builder.json().try_init(),
        "compact" => builder.compact().try_init(),
        _ => builder.pretty().try_init(),
    }
}

pub fn is_env_enabled(key: &str) -> bool {
    matches!(env::var(key).as_deref(), Ok("1") | Ok("true") | Ok("on"))
}
