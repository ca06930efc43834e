use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use crate::error::ScraperError;
use crate::models::now_string;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub started: String,
}

/// Marks a channel folder as busy for the lifetime of the guard.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let info = LockInfo { pid: std::process::id(), started: now_string() };
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                file.write_all(serde_json::to_string(&info)?.as_bytes())?;
                log::debug!("acquired {}", path.display());
                Ok(Self { path: path.to_path_buf() })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = read(path)?.unwrap_or(LockInfo { pid: 0, started: "unknown".into() });
                Err(ScraperError::Locked { pid: holder.pid, started: holder.started }.into())
            }
            Err(e) => Err(e).with_context(|| format!("failed to create {}", path.display())),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("failed to release {}: {}", self.path.display(), e);
        }
    }
}

/// Current holder of the lock at `path`, if any.
pub fn read(path: &Path) -> Result<Option<LockInfo>> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(serde_json::from_str(&raw).ok().or(Some(LockInfo { pid: 0, started: "unknown".into() }))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// Deletes a lock left behind by a run that died without cleaning up.
pub fn clear(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
    }
}
