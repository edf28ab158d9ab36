// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

//! Shared memory -> local-disk -> object-store cache abstraction. Both the
//! Transform-Grid Cache and the Processed-Data Cache are thin instantiations of
//! this with their own key type and `Codec` impl, rather than two independently
//! hand-rolled three-tier caches.

use std::collections::HashMap;
use std::fs;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use regex::Regex;

use crate::errors::{invalid_key_error, Result};
use crate::fs::ScopedTempFile;
use crate::store::ObjectStore;

lazy_static! {
    static ref SOURCE_NAME_RE: Regex = Regex::new(r"^[a-z]{2,10}$").unwrap();
}

/// Defence against path traversal via an attacker-controlled source name ending up
/// in a cache key: every source name used to build a cache path must match this.
pub fn validate_source_name(name: &str) -> Result<()> {
    if SOURCE_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(invalid_key_error(format!("source name {name:?} fails validation ^[a-z]{{2,10}}$")))
    }
}

/// Ensure `path`, once canonicalized, is still contained in `root`. Call this after
/// building a path from externally-influenced components (cache keys, filenames)
/// and before opening it.
pub fn ensure_within_root(root: &Path, path: &Path) -> Result<()> {
    let root_canon = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let parent = path.parent().unwrap_or(path);
    let parent_canon = parent.canonicalize().unwrap_or_else(|_| parent.to_path_buf());
    if parent_canon.starts_with(&root_canon) {
        Ok(())
    } else {
        Err(invalid_key_error(format!("path {path:?} escapes cache root {root:?}")))
    }
}

pub trait CacheKey: Clone + Eq + Hash + Send + Sync {
    /// Filename (no directory components) used for the local-disk tier. Must be
    /// validated by the caller (see `validate_source_name`) before this is trusted.
    fn local_filename(&self) -> String;
    /// Full object-store key used for the remote tier.
    fn object_key(&self) -> String;
}

pub trait Codec<V>: Send + Sync {
    fn encode(&self, value: &V) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<V>;
}

pub struct LayeredCache<K, V, C> {
    memory: Mutex<HashMap<K, Arc<V>>>,
    local_root: PathBuf,
    store: Arc<dyn ObjectStore>,
    codec: C,
}

impl<K, V, C> LayeredCache<K, V, C>
where
    K: CacheKey,
    V: Send + Sync,
    C: Codec<V>,
{
    pub fn new(local_root: impl Into<PathBuf>, store: Arc<dyn ObjectStore>, codec: C) -> Result<Self> {
        let local_root = local_root.into();
        crate::fs::ensure_writable_dir(&local_root)?;
        Ok(LayeredCache { memory: Mutex::new(HashMap::new()), local_root, store, codec })
    }

    fn local_path(&self, key: &K) -> PathBuf {
        self.local_root.join(key.local_filename())
    }

    /// Memory -> local disk -> object store, in that order. Does not contact the
    /// network beyond what `self.store` needs for `get`.
    pub async fn get(&self, key: &K) -> Result<Option<Arc<V>>> {
        if let Some(v) = self.memory.lock().unwrap().get(key).cloned() {
            return Ok(Some(v));
        }

        let local_path = self.local_path(key);
        ensure_within_root(&self.local_root, &local_path)?;
        if local_path.is_file() {
            if let Ok(bytes) = fs::read(&local_path) {
                if let Ok(value) = self.codec.decode(&bytes) {
                    let arc = Arc::new(value);
                    self.memory.lock().unwrap().insert(key.clone(), arc.clone());
                    return Ok(Some(arc));
                }
                // corrupt cache entry: treat as a miss, never abort the run (§7 cache-corruption policy)
            }
        }

        if let Some(bytes) = self.store.get(&key.object_key()).await? {
            if let Ok(value) = self.codec.decode(&bytes) {
                self.write_local(key, &bytes)?;
                let arc = Arc::new(value);
                self.memory.lock().unwrap().insert(key.clone(), arc.clone());
                return Ok(Some(arc));
            }
        }

        Ok(None)
    }

    fn write_local(&self, key: &K, bytes: &[u8]) -> Result<()> {
        let dest = self.local_path(key);
        ensure_within_root(&self.local_root, &dest)?;
        let mut tmp = ScopedTempFile::new_in(&self.local_root, ".stage_", ".tmp")?;
        std::io::Write::write_all(tmp.file_mut(), bytes)?;
        tmp.persist_as(&dest)?;
        Ok(())
    }

    /// Write through memory, local disk, and (best-effort) the object store.
    pub async fn put(&self, key: K, value: V) -> Result<()> {
        let bytes = self.codec.encode(&value)?;
        self.write_local(&key, &bytes)?;
        if let Err(e) = self.store.put(&key.object_key(), bytes).await {
            tracing::warn!(error = %e, "object store upload failed, continuing in local-only mode for this entry");
        }
        self.memory.lock().unwrap().insert(key, Arc::new(value));
        Ok(())
    }

    pub fn clear_local(&self) -> Result<usize> {
        let mut n = 0;
        if self.local_root.is_dir() {
            for entry in fs::read_dir(&self.local_root)? {
                let entry = entry?;
                if entry.path().is_file() && fs::remove_file(entry.path()).is_ok() {
                    n += 1;
                }
            }
        }
        self.memory.lock().unwrap().clear();
        Ok(n)
    }

    pub fn memory_len(&self) -> usize {
        self.memory.lock().unwrap().len()
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn forget(&self, key: &K) {
        self.memory.lock().unwrap().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NullObjectStore;

    #[derive(Clone, PartialEq, Eq, Hash)]
    struct TestKey(String);

    impl CacheKey for TestKey {
        fn local_filename(&self) -> String { format!("{}.bin", self.0) }
        fn object_key(&self) -> String { format!("test/{}.bin", self.0) }
    }

    struct IdentityCodec;
    impl Codec<Vec<u8>> for IdentityCodec {
        fn encode(&self, value: &Vec<u8>) -> Result<Vec<u8>> { Ok(value.clone()) }
        fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> { Ok(bytes.to_vec()) }
    }

    #[tokio::test]
    async fn roundtrips_through_local_tier() {
        let dir = std::env::temp_dir().join(format!("radar_cache_test_{}", std::process::id()));
        let cache = LayeredCache::new(&dir, Arc::new(NullObjectStore), IdentityCodec).unwrap();
        let key = TestKey("abc".into());
        cache.put(key.clone(), vec![1, 2, 3]).await.unwrap();
        assert_eq!(cache.memory_len(), 1);

        let cache2 = LayeredCache::new(&dir, Arc::new(NullObjectStore), IdentityCodec).unwrap();
        let got = cache2.get(&key).await.unwrap().unwrap();
        assert_eq!(*got, vec![1, 2, 3]);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_bad_source_names() {
        assert!(validate_source_name("dwd").is_ok());
        assert!(validate_source_name("../../etc").is_err());
        assert!(validate_source_name("DWD").is_err());
    }
}
