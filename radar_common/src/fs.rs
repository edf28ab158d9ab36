// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use std::fs::{self, DirEntry, File};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

type Result<T> = std::result::Result<T, io::Error>;

pub fn ensure_writable_dir(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if path.is_dir() {
        let md = fs::metadata(path)?;
        if md.permissions().readonly() {
            return Err(io::Error::new(ErrorKind::PermissionDenied, format!("output dir {path:?} not writable")));
        }
        Ok(())
    } else {
        fs::create_dir_all(path)
    }
}

fn visit_dirs(dir: &Path, recursive: bool, cb: &mut dyn FnMut(&DirEntry)) -> io::Result<()> {
    if dir.is_dir() {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() && recursive {
                visit_dirs(&path, recursive, cb)?;
            } else {
                cb(&entry);
            }
        }
    }
    Ok(())
}

pub fn remove_old_files(dir: impl AsRef<Path>, max_age: std::time::Duration) -> Result<usize> {
    let dir = dir.as_ref();
    let now = SystemTime::now();
    let mut n_removed = 0;
    visit_dirs(dir, false, &mut |entry| {
        let path = entry.path();
        if let Ok(meta) = fs::metadata(&path) {
            if let Ok(modified) = meta.modified() {
                if let Ok(age) = now.duration_since(modified) {
                    if age > max_age && fs::remove_file(&path).is_ok() {
                        n_removed += 1;
                    }
                }
            }
        }
    })?;
    Ok(n_removed)
}

/// A temp file created inside a given root (never `/tmp`, so it always shares a
/// filesystem with the destination it will eventually be renamed into), mode 0600,
/// deleted on every exit path via `Drop`. Replaces the reference implementation's
/// `tempfile.NamedTemporaryFile(delete=False)` idiom, which left explicit cleanup to
/// every caller.
pub struct ScopedTempFile {
    path: PathBuf,
    file: Option<File>,
}

impl ScopedTempFile {
    pub fn new_in(root: impl AsRef<Path>, prefix: &str, suffix: &str) -> io::Result<Self> {
        let root = root.as_ref();
        ensure_writable_dir(root)?;
        let unique: u64 = {
            use std::sync::atomic::{AtomicU64, Ordering};
            static COUNTER: AtomicU64 = AtomicU64::new(0);
            let nanos = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0);
            nanos.wrapping_add(COUNTER.fetch_add(1, Ordering::Relaxed))
        };
        let path = root.join(format!("{prefix}{unique}{suffix}"));

        #[cfg(unix)]
        let file = {
            use std::os::unix::fs::OpenOptionsExt;
            fs::OpenOptions::new().write(true).create_new(true).mode(0o600).open(&path)?
        };
        #[cfg(not(unix))]
        let file = fs::OpenOptions::new().write(true).create_new(true).open(&path)?;

        Ok(ScopedTempFile { path, file: Some(file) })
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn file_mut(&mut self) -> &mut File {
        self.file.as_mut().expect("ScopedTempFile used after close")
    }

    /// Close the underlying handle and rename the temp file into its final location,
    /// consuming `self` so `Drop` never fires the cleanup unlink afterward.
    pub fn persist_as(mut self, dest: impl AsRef<Path>) -> io::Result<()> {
        self.file.take();
        let result = fs::rename(&self.path, dest.as_ref());
        std::mem::forget(self); // path has moved (or the rename failed and cleanup would race); nothing left to clean up here
        result
    }
}

impl Drop for ScopedTempFile {
    fn drop(&mut self) {
        self.file.take();
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_temp_file_is_removed_on_drop() {
        let dir = std::env::temp_dir().join(format!("radar_common_test_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = {
            let tmp = ScopedTempFile::new_in(&dir, "stage_", ".tmp").unwrap();
            tmp.path().to_path_buf()
        };
        assert!(!path.exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn persist_as_survives_drop() {
        let dir = std::env::temp_dir().join(format!("radar_common_test2_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let tmp = ScopedTempFile::new_in(&dir, "stage_", ".tmp").unwrap();
        let dest = dir.join("final.dat");
        tmp.persist_as(&dest).unwrap();
        assert!(dest.exists());
        let _ = fs::remove_dir_all(&dir);
    }
}
