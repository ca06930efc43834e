mod media;
mod metadata;
mod stats;
mod tracker;

pub use media::{MediaItem, sanitize_file_name};
pub use metadata::{FileMetadata, MetadataEntry, SearchIn};
pub use stats::{OrganizeStats, RunStats};
pub use tracker::{DownloadTracker, FieldReport, TrackedFile, missing_message_text};

/// Timestamp layout shared by the tracker and metadata files.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn now_string() -> String {
    chrono::Local::now().format(DATE_FORMAT).to_string()
}
