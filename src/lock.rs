//! Directory lock for single-process ownership of a data path.
//!
//! fs2 advisory lock on <root>/LOCK. The store holds the guard for its whole
//! lifetime; a second `Store::open` on the same directory fails fast instead of
//! blocking. Lock is released on Drop.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::consts::LOCK_FILE;

pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("path", &self.path).finish()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // unlock errors on drop are ignored
        let _ = self.file.unlock();
    }
}

fn open_lock_file(root: &Path) -> Result<(File, PathBuf)> {
    let path = root.join(LOCK_FILE);
    let f = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&path)
        .with_context(|| format!("open lock file {}", path.display()))?;
    Ok((f, path))
}

/// Try to take the exclusive lock on `root`, creating the directory if needed.
pub fn try_lock_dir(root: &Path) -> Result<LockGuard> {
    if !root.exists() {
        std::fs::create_dir_all(root)
            .with_context(|| format!("create data dir {}", root.display()))?;
    }
    let (file, path) = open_lock_file(root)?;
    file.try_lock_exclusive()
        .with_context(|| format!("data dir already in use: {}", path.display()))?;
    Ok(LockGuard { file, path })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_fails_until_drop() {
        let root = std::env::temp_dir().join(format!(
            "arbor-lock-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let g = try_lock_dir(&root).expect("first lock");
        assert!(g.path().ends_with(LOCK_FILE));
        assert!(try_lock_dir(&root).is_err(), "second lock must fail");
        drop(g);
        assert!(try_lock_dir(&root).is_ok(), "lock must be free after drop");
    }
}
