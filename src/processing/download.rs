use std::{
    fs,
    future::Future,
    path::{Path, PathBuf},
    pin::pin,
};

use anyhow::{Context as _, Result};
use colorful::{Colorful, RGB};
use futures::TryStreamExt;

use crate::display::preview;
use crate::models::{DownloadTracker, FileMetadata, MediaItem, MetadataEntry, RunStats, now_string};
use crate::utils::file::{
    ChannelFolder, PARTIAL_SUFFIX, load_metadata, load_tracker, sibling_with_suffix, unique_path_where, write_json,
};
use crate::utils::lock::RunLock;

use super::source::{MediaSource, pages};

const SHOWN_SKIPS: usize = 5;

/// What the startup consistency pass found and fixed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Recovery {
    pub removed_partials: usize,
    pub adopted: usize,
    pub filled_fields: bool,
}

enum Target {
    /// Nothing usable on disk; fetch into this path.
    Fetch(PathBuf),
    /// A complete copy from an interrupted run is already there.
    Adopt(PathBuf),
}

/// Fetches everything `source` has that the tracker does not know yet.
pub struct Downloader<'a, S: MediaSource + ?Sized> {
    source: &'a S,
    folder: ChannelFolder,
    tracker: DownloadTracker,
    metadata: FileMetadata,
    stats: RunStats,
    dirty: bool,
}

/// Locks the channel folder, repairs it, and runs a full download.
pub async fn download_channel<S>(source: &S, output_dir: &Path) -> Result<RunStats>
where
    S: MediaSource + ?Sized,
{
    let folder = ChannelFolder::for_channel(output_dir, source.title());
    let _lock = RunLock::acquire(&folder.lock_path())?;

    let downloader = Downloader::open(source, folder)?;
    downloader.run_until(tokio::signal::ctrl_c()).await
}

impl<'a, S: MediaSource + ?Sized> Downloader<'a, S> {
    pub fn open(source: &'a S, folder: ChannelFolder) -> Result<Self> {
        let downloads = folder.downloads();
        fs::create_dir_all(&downloads).with_context(|| format!("failed to create {}", downloads.display()))?;

        let (tracker, report) = load_tracker(&folder.tracker_path())?;
        let metadata = load_metadata(&folder.metadata_path())?;

        let mut downloader = Self {
            source,
            folder,
            tracker,
            metadata,
            stats: RunStats::default(),
            dirty: false,
        };

        let recovery = downloader.recover(!report.is_complete())?;
        if recovery != Recovery::default() {
            log::info!("repaired channel folder: {recovery:?}");
        }
        Ok(downloader)
    }

    /// Brings the tracker back in line with what an interrupted run left on
    /// disk. Writes happen in the order file, metadata, tracker, so anything
    /// the metadata knows about was fully written.
    fn recover(&mut self, missing_fields: bool) -> Result<Recovery> {
        let mut recovery = Recovery { filled_fields: missing_fields, ..Recovery::default() };
        let downloads = self.folder.downloads();

        for entry in fs::read_dir(&downloads)? {
            let path = entry?.path();
            let is_partial = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(PARTIAL_SUFFIX));
            if is_partial && path.is_file() {
                log::warn!("removing incomplete download {}", path.display());
                fs::remove_file(&path)?;
                recovery.removed_partials += 1;
            }
        }

        let orphans: Vec<(String, MediaItem)> = self
            .metadata
            .iter()
            .filter_map(|(filename, entry)| {
                let unique_id = entry.file_unique_id.as_ref()?;
                if self.tracker.is_downloaded(unique_id) || !downloads.join(filename).is_file() {
                    return None;
                }
                Some((filename.clone(), item_from_metadata(unique_id, filename, entry)))
            })
            .collect();

        let now = now_string();
        for (filename, item) in orphans {
            let size = fs::metadata(downloads.join(&filename))?.len();
            log::info!("adopting {filename} into the tracker");
            self.tracker.record(&item, &filename, size, &now);
            recovery.adopted += 1;
        }

        if recovery.adopted > 0 || recovery.filled_fields {
            self.save_tracker()?;
        }
        Ok(recovery)
    }

    /// Runs until the history is exhausted or `shutdown` resolves. A
    /// shutdown is only observed between pages.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<RunStats>
    where
        F: Future,
    {
        println!("Downloading files from '{}'...", self.source.title());
        println!("Files will be saved to: {}", self.folder.downloads().display());
        println!("Already tracked: {} files", self.tracker.len());

        let source = self.source;
        let mut history = pin!(pages(source));
        let mut shutdown = pin!(shutdown);

        let outcome = async {
            loop {
                let batch = tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        println!("\n🛑 Interrupted, stopping after the current page");
                        break;
                    }
                    batch = history.try_next() => batch?,
                };
                let Some(batch) = batch else {
                    break;
                };
                for item in batch {
                    self.handle(item).await?;
                }
            }
            Ok::<_, anyhow::Error>(())
        }
        .await;

        // Refreshed message text is kept even when the run ends in an error.
        if self.dirty {
            self.save_metadata()?;
            self.save_tracker()?;
        }
        outcome?;

        self.stats.total_tracked = self.tracker.len();
        Ok(self.stats)
    }

    async fn handle(&mut self, item: MediaItem) -> Result<()> {
        if self.tracker.is_downloaded(&item.unique_id) {
            self.skip(&item);
            return Ok(());
        }

        let name = item.target_name();
        let path = match self.resolve_target(&item, &name)? {
            Target::Adopt(path) => {
                println!("🧩 Found complete copy on disk: {name}");
                self.stats.adopted += 1;
                path
            }
            Target::Fetch(path) => {
                println!("📥 Downloading: {name}...");
                log::debug!("fetching {} from message {}", item.url, item.message_id);
                let bytes = match self.source.fetch(&item).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        log::warn!("download of {} (message {}) failed: {e:#}", name, item.message_id);
                        println!("⚠️ Failed: {name}: {e}");
                        self.stats.failed += 1;
                        return Ok(());
                    }
                };
                write_complete(&path, &bytes)?;
                self.stats.downloaded += 1;
                self.stats.bytes += bytes.len() as u64;
                path
            }
        };

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(name);
        let size = fs::metadata(&path)?.len();

        self.metadata.insert(filename.clone(), MetadataEntry::for_item(&item, size));
        self.save_metadata()?;
        self.tracker.record(&item, &filename, size, &now_string());
        self.save_tracker()?;

        let done = self.stats.downloaded + self.stats.adopted;
        println!("{} ({done}): {filename}", "✓ Downloaded".color(RGB::new(16, 185, 129)));
        if !item.message_text.is_empty() {
            println!("  📝 Message: {}", preview(&item.message_text, 100));
        }
        Ok(())
    }

    fn skip(&mut self, item: &MediaItem) {
        self.stats.skipped += 1;
        if self.stats.skipped <= SHOWN_SKIPS {
            let filename = self.tracker.get(&item.unique_id).map_or("unknown", |f| f.filename.as_str());
            println!("⏭️  Already downloaded: {filename} (ID: {})", item.message_id);
        } else if self.stats.skipped == SHOWN_SKIPS + 1 {
            println!("⏭️  ... skipping more already-downloaded files ...");
        }

        let tracker_changed = self.tracker.refresh(item);
        let metadata_changed = self.metadata.refresh(item);
        if tracker_changed || metadata_changed {
            log::debug!("message {} was edited, refreshing its text", item.message_id);
            self.stats.refreshed += 1;
            self.dirty = true;
        }
    }

    fn resolve_target(&self, item: &MediaItem, name: &str) -> Result<Target> {
        let downloads = self.folder.downloads();
        // A tracked file may have been moved out of downloads; its name stays taken.
        let claimed = |name: &str| {
            let foreign = |owner: Option<&str>| owner.is_some_and(|id| id != item.unique_id);
            foreign(self.metadata.claimant(name)) || foreign(self.tracker.claimant(name))
        };

        let candidate = downloads.join(name);
        if !claimed(name) {
            if !candidate.exists() {
                return Ok(Target::Fetch(candidate));
            }
            if item.size > 0 && candidate.is_file() && fs::metadata(&candidate)?.len() == item.size {
                return Ok(Target::Adopt(candidate));
            }
        }

        Ok(Target::Fetch(unique_path_where(&downloads, name, |stem, n| format!("{stem} ({n})"), claimed)))
    }

    fn save_metadata(&self) -> Result<()> {
        write_json(&self.folder.metadata_path(), &self.metadata)
    }

    fn save_tracker(&self) -> Result<()> {
        write_json(&self.folder.tracker_path(), &self.tracker)
    }
}

/// Writes `<path>.part` and renames it, so `path` only ever holds whole files.
fn write_complete(path: &Path, bytes: &[u8]) -> Result<()> {
    let partial = sibling_with_suffix(path, PARTIAL_SUFFIX);
    fs::write(&partial, bytes).with_context(|| format!("failed to write {}", partial.display()))?;
    fs::rename(&partial, path).with_context(|| format!("failed to finish {}", path.display()))?;
    Ok(())
}

fn item_from_metadata(unique_id: &str, filename: &str, entry: &MetadataEntry) -> MediaItem {
    MediaItem {
        unique_id: unique_id.to_string(),
        message_id: entry.message_id,
        file_name: Some(filename.to_string()),
        message_text: entry.message_text.clone(),
        date: entry.date.clone(),
        size: entry.file_size.unwrap_or(0),
        mime_type: entry.mime_type.clone(),
        url: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::source::Page;
    use crate::utils::file::{METADATA_FILE, TRACKER_FILE};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::{collections::HashSet, sync::Mutex};

    #[derive(Default)]
    struct FakeSource {
        pages: Vec<Vec<MediaItem>>,
        failing: HashSet<String>,
        broken_page: Option<usize>,
        fetched: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn new(pages: Vec<Vec<MediaItem>>) -> Self {
            Self { pages, ..Self::default() }
        }

        fn fetched(&self) -> Vec<String> {
            self.fetched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MediaSource for FakeSource {
        fn title(&self) -> &str {
            "Lab Channel"
        }

        async fn fetch_page(&self, before: Option<u64>) -> Result<Page> {
            let index = before.unwrap_or(0) as usize;
            if self.broken_page == Some(index) {
                return Err(anyhow!("gateway timeout"));
            }
            match self.pages.get(index) {
                Some(items) => Ok(Page { items: items.clone(), next: Some(index as u64 + 1) }),
                None => Ok(Page::default()),
            }
        }

        async fn fetch(&self, item: &MediaItem) -> Result<Vec<u8>> {
            self.fetched.lock().unwrap().push(item.unique_id.clone());
            if self.failing.contains(&item.unique_id) {
                return Err(anyhow!("connection reset"));
            }
            Ok(body(&item.unique_id))
        }
    }

    fn body(unique_id: &str) -> Vec<u8> {
        format!("contents of {unique_id}").into_bytes()
    }

    fn media(id: &str, name: &str, text: &str) -> MediaItem {
        MediaItem {
            unique_id: id.into(),
            message_id: id.len() as u64 + 100,
            file_name: Some(name.into()),
            message_text: text.into(),
            date: "2024-02-03 04:05:06".into(),
            size: body(id).len() as u64,
            mime_type: Some("application/pdf".into()),
            url: String::new(),
        }
    }

    async fn run(source: &FakeSource, root: &Path) -> RunStats {
        let folder = ChannelFolder::for_channel(root, source.title());
        Downloader::open(source, folder)
            .unwrap()
            .run_until(std::future::pending::<()>())
            .await
            .unwrap()
    }

    fn folder(root: &Path) -> ChannelFolder {
        ChannelFolder::new(root.join("Lab Channel"))
    }

    #[tokio::test]
    async fn second_run_fetches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new(vec![
            vec![media("a1", "Blood.pdf", "Haematology notes"), media("b2", "Virus.pdf", "")],
            vec![media("c3", "Exam.pdf", "CAT 1")],
        ]);

        let first = run(&source, dir.path()).await;
        assert_eq!((first.downloaded, first.skipped, first.total_tracked), (3, 0, 3));

        let folder = folder(dir.path());
        assert_eq!(fs::read(folder.downloads().join("Blood.pdf")).unwrap(), body("a1"));
        let (tracker, report) = load_tracker(&folder.tracker_path()).unwrap();
        assert!(report.is_complete());
        assert_eq!(tracker.statistics.total_downloads, 3);
        assert_eq!(tracker.get("a1").unwrap().message_text, "Haematology notes");
        let metadata = load_metadata(&folder.metadata_path()).unwrap();
        assert_eq!(metadata.claimant("Exam.pdf"), Some("c3"));

        let second = run(&source, dir.path()).await;
        assert_eq!((second.downloaded, second.skipped), (0, 3));
        assert_eq!(source.fetched(), ["a1", "b2", "c3"]);
    }

    #[tokio::test]
    async fn moved_files_are_not_fetched_again() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new(vec![vec![media("a1", "Blood.pdf", "")]]);
        run(&source, dir.path()).await;

        fs::remove_file(folder(dir.path()).downloads().join("Blood.pdf")).unwrap();
        let stats = run(&source, dir.path()).await;
        assert_eq!((stats.downloaded, stats.skipped), (0, 1));
        assert_eq!(source.fetched().len(), 1);
    }

    #[tokio::test]
    async fn colliding_names_get_numbered() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new(vec![vec![media("a1", "notes.pdf", "one"), media("b2", "notes.pdf", "two")]]);

        let stats = run(&source, dir.path()).await;
        assert_eq!(stats.downloaded, 2);

        let folder = folder(dir.path());
        assert_eq!(fs::read(folder.downloads().join("notes.pdf")).unwrap(), body("a1"));
        assert_eq!(fs::read(folder.downloads().join("notes (1).pdf")).unwrap(), body("b2"));
        let (tracker, _) = load_tracker(&folder.tracker_path()).unwrap();
        assert_eq!(tracker.get("b2").unwrap().filename, "notes (1).pdf");
    }

    #[tokio::test]
    async fn name_of_a_moved_file_stays_reserved() {
        let dir = tempfile::tempdir().unwrap();
        run(&FakeSource::new(vec![vec![media("a1", "notes.pdf", "microbiology lecture")]]), dir.path()).await;
        let folder = folder(dir.path());
        fs::remove_file(folder.downloads().join("notes.pdf")).unwrap();

        let stats = run(&FakeSource::new(vec![vec![media("b2", "notes.pdf", "exam paper")]]), dir.path()).await;
        assert_eq!(stats.downloaded, 1);
        assert!(!folder.downloads().join("notes.pdf").exists());
        assert_eq!(fs::read(folder.downloads().join("notes (1).pdf")).unwrap(), body("b2"));

        let metadata = load_metadata(&folder.metadata_path()).unwrap();
        assert_eq!(metadata.claimant("notes.pdf"), Some("a1"));
        assert_eq!(metadata.get("notes.pdf").unwrap().message_text, "microbiology lecture");
        assert_eq!(metadata.claimant("notes (1).pdf"), Some("b2"));

        let (mut tracker, _) = load_tracker(&folder.tracker_path()).unwrap();
        assert_eq!(tracker.get("a1").unwrap().filename, "notes.pdf");
        assert_eq!(tracker.get("b2").unwrap().filename, "notes (1).pdf");
        tracker.sync_from_metadata(&metadata, &Default::default());
        assert_eq!(tracker.get("a1").unwrap().message_text, "microbiology lecture");
    }

    #[tokio::test]
    async fn crash_before_tracker_save_is_repaired_without_refetch() {
        let dir = tempfile::tempdir().unwrap();
        let folder = folder(dir.path());
        fs::create_dir_all(folder.downloads()).unwrap();
        fs::write(folder.downloads().join("Blood.pdf"), body("a1")).unwrap();

        let mut metadata = FileMetadata::default();
        let item = media("a1", "Blood.pdf", "recovered text");
        metadata.insert("Blood.pdf".into(), MetadataEntry::for_item(&item, body("a1").len() as u64));
        write_json(&folder.metadata_path(), &metadata).unwrap();

        let source = FakeSource::new(vec![vec![item]]);
        let stats = run(&source, dir.path()).await;

        assert_eq!((stats.downloaded, stats.skipped), (0, 1));
        assert!(source.fetched().is_empty());
        let (tracker, _) = load_tracker(&folder.tracker_path()).unwrap();
        assert_eq!(tracker.get("a1").unwrap().message_text, "recovered text");
    }

    #[tokio::test]
    async fn crash_before_metadata_save_adopts_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let folder = folder(dir.path());
        fs::create_dir_all(folder.downloads()).unwrap();
        fs::write(folder.downloads().join("Blood.pdf"), body("a1")).unwrap();

        let source = FakeSource::new(vec![vec![media("a1", "Blood.pdf", "")]]);
        let stats = run(&source, dir.path()).await;

        assert_eq!((stats.downloaded, stats.adopted), (0, 1));
        assert!(source.fetched().is_empty());
        assert!(!folder.downloads().join("Blood (1).pdf").exists());
        let (tracker, _) = load_tracker(&folder.tracker_path()).unwrap();
        assert_eq!(tracker.get("a1").unwrap().filename, "Blood.pdf");
    }

    #[tokio::test]
    async fn unrelated_file_with_same_name_is_not_adopted() {
        let dir = tempfile::tempdir().unwrap();
        let folder = folder(dir.path());
        fs::create_dir_all(folder.downloads()).unwrap();
        fs::write(folder.downloads().join("Blood.pdf"), b"something else entirely").unwrap();

        let source = FakeSource::new(vec![vec![media("a1", "Blood.pdf", "")]]);
        let stats = run(&source, dir.path()).await;

        assert_eq!((stats.downloaded, stats.adopted), (1, 0));
        assert_eq!(fs::read(folder.downloads().join("Blood (1).pdf")).unwrap(), body("a1"));
    }

    #[tokio::test]
    async fn partial_downloads_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let folder = folder(dir.path());
        fs::create_dir_all(folder.downloads()).unwrap();
        let partial = folder.downloads().join("Blood.pdf.part");
        fs::write(&partial, b"half").unwrap();

        let source = FakeSource::new(vec![vec![media("a1", "Blood.pdf", "")]]);
        let stats = run(&source, dir.path()).await;

        assert!(!partial.exists());
        assert_eq!(stats.downloaded, 1);
        assert_eq!(fs::read(folder.downloads().join("Blood.pdf")).unwrap(), body("a1"));
    }

    #[tokio::test]
    async fn failed_fetch_is_counted_and_retried_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = FakeSource::new(vec![vec![media("a1", "Blood.pdf", ""), media("b2", "Virus.pdf", "")]]);
        source.failing.insert("a1".into());

        let stats = run(&source, dir.path()).await;
        assert_eq!((stats.downloaded, stats.failed, stats.total_tracked), (1, 1, 1));
        assert!(!folder(dir.path()).downloads().join("Blood.pdf").exists());

        source.failing.clear();
        let stats = run(&source, dir.path()).await;
        assert_eq!((stats.downloaded, stats.skipped), (1, 1));
    }

    #[tokio::test]
    async fn edited_message_text_is_refreshed() {
        let dir = tempfile::tempdir().unwrap();
        run(&FakeSource::new(vec![vec![media("a1", "Blood.pdf", "draft")]]), dir.path()).await;

        let stats = run(&FakeSource::new(vec![vec![media("a1", "Blood.pdf", "final")]]), dir.path()).await;
        assert_eq!((stats.skipped, stats.refreshed), (1, 1));

        let folder = folder(dir.path());
        let (tracker, _) = load_tracker(&folder.tracker_path()).unwrap();
        assert_eq!(tracker.get("a1").unwrap().message_text, "final");
        let metadata = load_metadata(&folder.metadata_path()).unwrap();
        assert_eq!(metadata.get("Blood.pdf").unwrap().message_text, "final");
    }

    #[tokio::test]
    async fn refreshed_text_survives_a_failing_page() {
        let dir = tempfile::tempdir().unwrap();
        run(&FakeSource::new(vec![vec![media("a1", "Blood.pdf", "draft")]]), dir.path()).await;

        let mut source = FakeSource::new(vec![vec![media("a1", "Blood.pdf", "final")], vec![media("b2", "Virus.pdf", "")]]);
        source.broken_page = Some(1);
        let folder = folder(dir.path());
        let outcome = Downloader::open(&source, folder.clone())
            .unwrap()
            .run_until(std::future::pending::<()>())
            .await;
        assert!(outcome.is_err());

        let (tracker, _) = load_tracker(&folder.tracker_path()).unwrap();
        assert_eq!(tracker.get("a1").unwrap().message_text, "final");
        let metadata = load_metadata(&folder.metadata_path()).unwrap();
        assert_eq!(metadata.get("Blood.pdf").unwrap().message_text, "final");
    }

    #[tokio::test]
    async fn old_tracker_gains_missing_fields_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let folder = folder(dir.path());
        fs::create_dir_all(folder.root()).unwrap();
        fs::write(
            folder.root().join(TRACKER_FILE),
            r#"{"downloaded_files": {"a1": {"filename": "Blood.pdf", "message_id": 3}},
                "statistics": {"total_downloads": 1, "last_download_date": null}}"#,
        )
        .unwrap();

        let source = FakeSource::new(Vec::new());
        Downloader::open(&source, folder.clone()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(folder.tracker_path()).unwrap()).unwrap();
        assert_eq!(raw["downloaded_files"]["a1"]["message_text"], "");
        assert_eq!(raw["downloaded_files"]["a1"]["file_size"], 0);
        assert!(!folder.root().join(METADATA_FILE).exists());
    }

    #[tokio::test]
    async fn locked_folder_refuses_a_second_run() {
        let dir = tempfile::tempdir().unwrap();
        let folder = folder(dir.path());
        let _held = RunLock::acquire(&folder.lock_path()).unwrap();

        let source = FakeSource::new(Vec::new());
        assert!(download_channel(&source, dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn shutdown_stops_before_the_first_page() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new(vec![vec![media("a1", "Blood.pdf", "")]]);
        let folder = ChannelFolder::for_channel(dir.path(), source.title());

        let stats = Downloader::open(&source, folder)
            .unwrap()
            .run_until(std::future::ready(()))
            .await
            .unwrap();
        assert_eq!(stats.downloaded, 0);
    }
}
