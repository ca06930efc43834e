use std::path::PathBuf;

use thiserror::Error;

/// Failures of the on-disk bookkeeping that callers may want to tell apart.
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("corrupt JSON in {path}: {source}")]
    CorruptFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("a download is already running for this channel (pid {pid}, started {started}); see `status`")]
    Locked { pid: u32, started: String },

    #[error("no tracker file found at {0}")]
    MissingTracker(PathBuf),

    #[error("no metadata file found at {0}")]
    MissingMetadata(PathBuf),

    #[error("no channel folder under {root} contains {marker}")]
    NoChannelFolder { root: PathBuf, marker: &'static str },
}
