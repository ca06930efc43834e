use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context as _, Result};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::ScraperError;
use crate::models::{DownloadTracker, FieldReport, FileMetadata, sanitize_file_name};

pub const METADATA_FILE: &str = "file_metadata.json";
pub const TRACKER_FILE: &str = "downloaded_files_tracker.json";
pub const LOCK_FILE: &str = ".download.lock";
pub const PARTIAL_SUFFIX: &str = ".part";

/// Everything a channel owns on disk lives below one folder named after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFolder {
    root: PathBuf,
}

impl ChannelFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn for_channel(output_dir: &Path, title: &str) -> Self {
        let mut name = sanitize_file_name(title);
        if name.is_empty() {
            name = "channel".to_string();
        }
        Self::new(output_dir.join(name))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string())
    }

    pub fn downloads(&self) -> PathBuf {
        self.root.join("downloads")
    }

    pub fn categorized(&self) -> PathBuf {
        self.root.join("categorized")
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    pub fn tracker_path(&self) -> PathBuf {
        self.root.join(TRACKER_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// Sub-folders of `root` that contain `marker`, sorted by name.
    pub fn discover(root: &Path, marker: &str) -> Result<Vec<ChannelFolder>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(root).with_context(|| format!("failed to list {}", root.display()))? {
            let path = entry?.path();
            if path.is_dir() && path.join(marker).is_file() {
                found.push(ChannelFolder::new(path));
            }
        }
        found.sort_by(|a, b| a.root.cmp(&b.root));
        Ok(found)
    }
}

/// Loads JSON from `path`; a missing file is `None`, unparsable content is
/// [`ScraperError::CorruptFile`].
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let value = serde_json::from_str(&raw).map_err(|source| ScraperError::CorruptFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(value))
}

/// Writes pretty JSON next to `path` and renames it into place, so readers
/// see either the old or the new file, never a torn one.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = sibling_with_suffix(path, ".tmp");
    {
        let file = File::create(&tmp).with_context(|| format!("failed to create {}", tmp.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.write_all(b"\n")?;
        writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    }
    fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

pub fn load_metadata(path: &Path) -> Result<FileMetadata> {
    Ok(read_json(path)?.unwrap_or_default())
}

/// Loads the tracker along with a count of entries that predate the
/// `message_text` and `file_size` fields.
pub fn load_tracker(path: &Path) -> Result<(DownloadTracker, FieldReport)> {
    let Some(raw) = read_json::<Value>(path)? else {
        return Ok((DownloadTracker::default(), FieldReport::default()));
    };
    let report = FieldReport::from_raw(&raw);
    let tracker = serde_json::from_value(raw).map_err(|source| ScraperError::CorruptFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok((tracker, report))
}

/// Like [`load_tracker`] but requires the file to exist.
pub fn load_existing_tracker(folder: &ChannelFolder) -> Result<DownloadTracker> {
    let path = folder.tracker_path();
    if !path.exists() {
        return Err(ScraperError::MissingTracker(path).into());
    }
    Ok(load_tracker(&path)?.0)
}

pub fn load_existing_metadata(folder: &ChannelFolder) -> Result<FileMetadata> {
    let path = folder.metadata_path();
    if !path.exists() {
        return Err(ScraperError::MissingMetadata(path).into());
    }
    load_metadata(&path)
}

pub fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// First path in `dir` for `file_name` that does not exist yet; later
/// candidates are built by `decorate(stem, n)` plus the original extension.
pub fn unique_path(dir: &Path, file_name: &str, decorate: impl Fn(&str, usize) -> String) -> PathBuf {
    unique_path_where(dir, file_name, decorate, |_| false)
}

/// [`unique_path`] that also passes over names `reserved` says belong to
/// someone else, whether or not they exist on disk.
pub fn unique_path_where(
    dir: &Path,
    file_name: &str,
    decorate: impl Fn(&str, usize) -> String,
    reserved: impl Fn(&str) -> bool,
) -> PathBuf {
    let (stem, ext) = split_extension(file_name);
    let mut name = file_name.to_string();

    let mut counter = 0;
    while reserved(&name) || dir.join(&name).exists() {
        counter += 1;
        name = format!("{}{}", decorate(stem, counter), ext);
    }
    dir.join(name)
}

/// `("report.final", ".pdf")` for `report.final.pdf`; dotfiles keep their name.
pub fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => file_name.split_at(idx),
        _ => (file_name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetadataEntry;

    #[test]
    fn missing_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (tracker, report) = load_tracker(&dir.path().join(TRACKER_FILE)).unwrap();
        assert!(tracker.is_empty());
        assert_eq!(report.total, 0);
        assert!(load_metadata(&dir.path().join(METADATA_FILE)).unwrap().is_empty());
    }

    #[test]
    fn corrupt_json_is_reported_with_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TRACKER_FILE);
        fs::write(&path, "{ not json").unwrap();

        let err = load_tracker(&path).unwrap_err();
        match err.downcast_ref::<ScraperError>() {
            Some(ScraperError::CorruptFile { path: p, .. }) => assert_eq!(p, &path),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn write_replaces_atomically_and_keeps_unicode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(METADATA_FILE);

        let mut metadata = FileMetadata::default();
        metadata.insert("café.pdf".into(), MetadataEntry {
            message_text: "Ünïcode ✓".into(),
            ..MetadataEntry::default()
        });
        write_json(&path, &metadata).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("Ünïcode ✓"));
        assert!(!sibling_with_suffix(&path, ".tmp").exists());
        assert_eq!(load_metadata(&path).unwrap(), metadata);
    }

    #[test]
    fn unique_path_decorates_before_the_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.pdf"), b"1").unwrap();
        fs::write(dir.path().join("notes (1).pdf"), b"2").unwrap();

        let next = unique_path(dir.path(), "notes.pdf", |stem, n| format!("{stem} ({n})"));
        assert_eq!(next, dir.path().join("notes (2).pdf"));

        let free = unique_path(dir.path(), "other.pdf", |stem, n| format!("{stem}_{n}"));
        assert_eq!(free, dir.path().join("other.pdf"));
    }

    #[test]
    fn reserved_names_are_skipped_even_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes (1).pdf"), b"1").unwrap();

        let next = unique_path_where(
            dir.path(),
            "notes.pdf",
            |stem, n| format!("{stem} ({n})"),
            |name| name == "notes.pdf" || name == "notes (2).pdf",
        );
        assert_eq!(next, dir.path().join("notes (3).pdf"));
    }

    #[test]
    fn split_extension_edge_cases() {
        assert_eq!(split_extension("a.tar.gz"), ("a.tar", ".gz"));
        assert_eq!(split_extension(".hidden"), (".hidden", ""));
        assert_eq!(split_extension("README"), ("README", ""));
    }

    #[test]
    fn discover_finds_folders_with_marker() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::create_dir_all(dir.path().join("c")).unwrap();
        fs::write(dir.path().join("b").join(TRACKER_FILE), "{}").unwrap();
        fs::write(dir.path().join("a").join(TRACKER_FILE), "{}").unwrap();

        let found = ChannelFolder::discover(dir.path(), TRACKER_FILE).unwrap();
        let names: Vec<_> = found.iter().map(ChannelFolder::name).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn channel_titles_become_safe_folder_names() {
        let folder = ChannelFolder::for_channel(Path::new("out"), "Lab / Notes");
        assert_eq!(folder.root(), Path::new("out").join("Lab _ Notes"));
    }
}
