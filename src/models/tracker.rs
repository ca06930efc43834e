use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{FileMetadata, MediaItem};

/// Persistent record of every file ever fetched, keyed by unique id.
///
/// Entries outlive the files on disk: a file moved away by the organizer is
/// still tracked and is never fetched again.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadTracker {
    #[serde(default)]
    pub downloaded_files: BTreeMap<String, TrackedFile>,
    #[serde(default)]
    pub statistics: Statistics,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(default)]
    pub total_downloads: usize,
    #[serde(default)]
    pub last_download_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackedFile {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub message_id: u64,
    #[serde(default)]
    pub download_date: String,
    #[serde(default)]
    pub original_message_date: String,
    #[serde(default)]
    pub message_text: String,
    #[serde(default)]
    pub file_size: u64,
    /// Fields written by other tools; carried through rewrites untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// How many raw tracker entries carry the fields older trackers lacked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldReport {
    pub total: usize,
    pub with_message_text: usize,
    pub with_file_size: usize,
}

impl FieldReport {
    pub fn from_raw(raw: &Value) -> Self {
        let Some(files) = raw.get("downloaded_files").and_then(Value::as_object) else {
            return Self::default();
        };

        let mut report = Self { total: files.len(), ..Self::default() };
        for info in files.values() {
            if info.get("message_text").is_some() {
                report.with_message_text += 1;
            }
            if info.get("file_size").is_some() {
                report.with_file_size += 1;
            }
        }
        report
    }

    pub fn is_complete(&self) -> bool {
        self.with_message_text == self.total && self.with_file_size == self.total
    }

}

/// Ids of raw tracker entries that have no `message_text` key at all.
pub fn missing_message_text(raw: &Value) -> BTreeSet<String> {
    raw.get("downloaded_files")
        .and_then(Value::as_object)
        .map(|files| {
            files
                .iter()
                .filter(|(_, info)| info.get("message_text").is_none())
                .map(|(id, _)| id.clone())
                .collect()
        })
        .unwrap_or_default()
}

impl DownloadTracker {
    pub fn is_downloaded(&self, unique_id: &str) -> bool {
        self.downloaded_files.contains_key(unique_id)
    }

    pub fn get(&self, unique_id: &str) -> Option<&TrackedFile> {
        self.downloaded_files.get(unique_id)
    }

    /// Unique id of the tracked entry stored under `filename`, if any.
    pub fn claimant(&self, filename: &str) -> Option<&str> {
        self.downloaded_files
            .iter()
            .find(|(_, info)| info.filename == filename)
            .map(|(id, _)| id.as_str())
    }

    pub fn len(&self) -> usize {
        self.downloaded_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.downloaded_files.is_empty()
    }

    /// Inserts or updates the entry for `item`. Fields not managed here are
    /// kept as they are on an existing entry.
    pub fn record(&mut self, item: &MediaItem, filename: &str, file_size: u64, now: &str) {
        let entry = self.downloaded_files.entry(item.unique_id.clone()).or_default();
        entry.filename = filename.to_string();
        entry.message_id = item.message_id;
        entry.download_date = now.to_string();
        entry.original_message_date = item.date.clone();
        entry.message_text = item.message_text.clone();
        entry.file_size = file_size;

        self.statistics.total_downloads = self.downloaded_files.len();
        self.statistics.last_download_date = Some(now.to_string());
    }

    /// Picks up edits to the message an already fetched file came with.
    pub fn refresh(&mut self, item: &MediaItem) -> bool {
        let Some(entry) = self.downloaded_files.get_mut(&item.unique_id) else {
            return false;
        };

        let mut changed = false;
        if entry.message_text != item.message_text {
            entry.message_text = item.message_text.clone();
            changed = true;
        }
        if !item.date.is_empty() && entry.original_message_date != item.date {
            entry.original_message_date = item.date.clone();
            changed = true;
        }
        changed
    }

    /// Removes by exact unique id, falling back to the first entry whose
    /// filename contains `term` (case-insensitive).
    pub fn remove(&mut self, term: &str) -> Option<(String, TrackedFile)> {
        let key = if self.downloaded_files.contains_key(term) {
            Some(term.to_string())
        } else {
            let needle = term.to_lowercase();
            self.downloaded_files
                .iter()
                .find(|(_, info)| info.filename.to_lowercase().contains(&needle))
                .map(|(id, _)| id.clone())
        }?;

        let removed = self.downloaded_files.remove_entry(&key);
        self.statistics.total_downloads = self.downloaded_files.len();
        removed
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Newest download first.
    pub fn sorted_by_download_date(&self) -> Vec<(&String, &TrackedFile)> {
        let mut files: Vec<_> = self.downloaded_files.iter().collect();
        files.sort_by(|a, b| b.1.download_date.cmp(&a.1.download_date));
        files
    }

    pub fn search(&self, term: &str) -> Vec<(&String, &TrackedFile)> {
        let needle = term.to_lowercase();
        self.downloaded_files
            .iter()
            .filter(|(_, info)| {
                info.filename.to_lowercase().contains(&needle)
                    || info.message_text.to_lowercase().contains(&needle)
            })
            .collect()
    }

    /// Copies message text, and size where recorded, from metadata entries
    /// with the same filename. Entries without metadata that are listed in
    /// `lacking_text` get an empty text. Returns `(updated, filled)`.
    pub fn sync_from_metadata(&mut self, metadata: &FileMetadata, lacking_text: &BTreeSet<String>) -> (usize, usize) {
        let mut updated = 0;
        let mut filled = 0;
        for (id, info) in self.downloaded_files.iter_mut() {
            let meta = if info.filename.is_empty() { None } else { metadata.get(&info.filename) };
            match meta {
                Some(meta) => {
                    info.message_text = meta.message_text.clone();
                    if let Some(size) = meta.file_size {
                        info.file_size = size;
                    }
                    updated += 1;
                }
                None if lacking_text.contains(id) => {
                    info.message_text.clear();
                    filled += 1;
                }
                None => {}
            }
        }
        (updated, filled)
    }
}
