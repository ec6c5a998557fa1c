use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "archiver.lock";

/// Exclusive lock held for the whole run; released on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

pub fn acquire(dir: &Path) -> Result<RunLock> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(LOCK_FILE);
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    if file.try_lock_exclusive().is_err() {
        anyhow::bail!(
            "another archiver run holds {}; refusing to start a second one",
            path.display()
        );
    }

    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(RunLock { file, path })
}
