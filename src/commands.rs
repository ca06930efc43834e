use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use tokio::time::Duration;

use crate::TrackerAction;
use crate::config::Config;
use crate::display::{self, banner, success, warn};
use crate::error::ScraperError;
use crate::models::{DownloadTracker, FieldReport, SearchIn, missing_message_text};
use crate::processing::categorize::Categories;
use crate::processing::download::download_channel;
use crate::processing::organize::{Mode, organize_categorized, organize_directory};
use crate::processing::source::{DiscordSource, MediaSource};
use crate::utils::file::{
    self, ChannelFolder, LOCK_FILE, METADATA_FILE, TRACKER_FILE, load_existing_metadata, load_existing_tracker,
    write_json,
};
use crate::utils::lock;
use crate::utils::selection::{confirm, parse_yes_no, prompt, select_folder};

pub async fn download(config: &Config, channel: Option<u64>, output: Option<PathBuf>) -> Result<()> {
    let token = Config::token()?;
    let channel_id = channel
        .or(config.channel_id)
        .context("no channel given: pass --channel or set channel_id in the config")?;
    let output = output.unwrap_or_else(|| config.output_dir.clone());

    println!("Initializing client...");
    let source = DiscordSource::connect(
        &token,
        config.proxy.as_deref(),
        channel_id,
        config.page_size,
        Duration::from_millis(config.request_delay_ms),
    )
    .await?;

    let folder = ChannelFolder::for_channel(&output, source.title());
    let stats = download_channel(&source, &output).await?;
    stats.print_stats(&folder.metadata_path(), &folder.tracker_path());
    Ok(())
}

pub fn tracker(root: &Path, folder: Option<PathBuf>, action: Option<TrackerAction>) -> Result<()> {
    let folder = select_folder(root, TRACKER_FILE, folder)?;
    let mut tracker = load_existing_tracker(&folder)?;

    let Some(action) = action else {
        return tracker_menu(&folder, tracker);
    };

    match action {
        TrackerAction::Stats => display::show_statistics(&tracker),
        TrackerAction::List { limit } => display::list_downloaded_files(&tracker, limit),
        TrackerAction::Search { term } => display::print_tracker_search(&term, &tracker.search(&term)),
        TrackerAction::Remove { term } => remove_from_tracker(&folder, &mut tracker, &term)?,
        TrackerAction::Reset { yes } => reset_tracker(&folder, &mut tracker, yes)?,
    }
    Ok(())
}

fn tracker_menu(folder: &ChannelFolder, mut tracker: DownloadTracker) -> Result<()> {
    banner("DOWNLOAD TRACKER MANAGER");
    loop {
        banner("OPTIONS:");
        println!("1. Show statistics");
        println!("2. List all downloaded files");
        println!("3. List recent downloads (last 20)");
        println!("4. Search files");
        println!("5. Remove file from tracker");
        println!("6. Reset tracker (WARNING: Files will be re-downloaded!)");
        println!("7. Exit");

        match prompt("\nEnter your choice (1-7): ")?.as_str() {
            "1" => display::show_statistics(&tracker),
            "2" => display::list_downloaded_files(&tracker, None),
            "3" => display::list_downloaded_files(&tracker, Some(20)),
            "4" => {
                let term = prompt("Enter search term: ")?;
                display::print_tracker_search(&term, &tracker.search(&term));
            }
            "5" => {
                let term = prompt("Enter file ID or filename: ")?;
                remove_from_tracker(folder, &mut tracker, &term)?;
                tracker = load_existing_tracker(folder)?;
            }
            "6" => {
                reset_tracker(folder, &mut tracker, false)?;
                tracker = load_existing_tracker(folder)?;
            }
            "7" => {
                println!("\nExiting...");
                return Ok(());
            }
            _ => println!("Invalid choice. Please try again."),
        }
    }
}

fn remove_from_tracker(folder: &ChannelFolder, tracker: &mut DownloadTracker, term: &str) -> Result<()> {
    let Some((_, removed)) = tracker.remove(term) else {
        println!("File not found: {term}");
        return Ok(());
    };
    success(&format!("Removed: {}", removed.filename));
    write_json(&folder.tracker_path(), tracker)?;
    success("Tracker updated!");
    Ok(())
}

fn reset_tracker(folder: &ChannelFolder, tracker: &mut DownloadTracker, yes: bool) -> Result<()> {
    if !yes {
        let answer = prompt(
            "\n⚠️  This will reset the download tracker. Files will be re-downloaded!\nAre you sure? (yes/no): ",
        )?;
        if !answer.eq_ignore_ascii_case("yes") {
            println!("Operation cancelled.");
            return Ok(());
        }
    }

    tracker.reset();
    let path = folder.tracker_path();
    write_json(&path, tracker)?;
    success(&format!("Tracker reset! File: {}", path.display()));
    Ok(())
}

pub fn categorize(root: &Path, folder: Option<PathBuf>, config: &Config) -> Result<()> {
    let folder = select_folder(root, METADATA_FILE, folder)?;
    let metadata = load_existing_metadata(&folder)?;
    if metadata.is_empty() {
        warn("The metadata file has no entries yet.");
        return Ok(());
    }

    println!("\nLoaded metadata for {} files.\n", metadata.len());
    println!("Options:");
    println!("1. Search files by keyword");
    println!("2. Categorize files automatically");
    println!("3. List all files");
    println!("4. Exit");

    match prompt("\nEnter your choice (1-4): ")?.as_str() {
        "1" => {
            let term = prompt("Enter search term: ")?;
            let search_in: SearchIn = prompt("Search in (text/filename/both) [both]: ")?
                .parse()
                .map_err(anyhow::Error::msg)?;
            display::print_metadata_search(&metadata.search(&term, search_in));
        }
        "2" => {
            println!("\nCategorizing files...");
            let categorized = Categories::new(&config.categories).categorize(&metadata);
            display::print_categorized(&categorized);

            if confirm("\nOrganize files into folders? (y/n): ", false)? {
                let mode = match prompt("Copy or move files? (copy/move) [copy]: ")?.to_lowercase().as_str() {
                    "move" => Mode::Move,
                    _ => Mode::Copy,
                };
                let placed = organize_categorized(&folder, &categorized, mode)?;
                success(&format!("{placed} files organized!"));
            }
        }
        "3" => display::print_metadata_list(&metadata),
        _ => println!("Exiting..."),
    }
    Ok(())
}

pub fn organize(source: &Path, target: &Path, mode: Option<Mode>, yes: bool, config: &Config) -> Result<()> {
    banner("FILE ORGANIZER");
    println!("\nSource: {}", source.display());
    println!("Target: {}", target.display());
    if !source.is_dir() {
        bail!("source directory '{}' not found", source.display());
    }

    let mode = match mode {
        Some(mode) => mode,
        None => {
            println!("\nChoose organization mode:");
            println!("1. COPY files (keeps originals in place)");
            println!("2. MOVE files (removes originals)");
            match prompt("\nEnter your choice (1 or 2) [1]: ")?.as_str() {
                "2" => Mode::Move,
                _ => Mode::Copy,
            }
        }
    };

    if !yes {
        let action = match mode {
            Mode::Copy => "copied",
            Mode::Move => "moved",
        };
        warn(&format!("Files will be {action} to '{}'", target.display()));
        if !parse_yes_no(&prompt("Continue? (yes/no) [yes]: ")?, true) {
            println!("\nOperation cancelled.");
            return Ok(());
        }
    }

    println!("\nOrganizing files...\n");
    let stats = organize_directory(source, target, &Categories::new(&config.categories), mode)?;
    stats.print_stats();
    success(&format!("Files organized in: {}", target.display()));
    Ok(())
}

pub fn sync(root: &Path, folder: Option<PathBuf>) -> Result<()> {
    let folder = select_folder(root, TRACKER_FILE, folder)?;
    banner("UPDATE TRACKER WITH MESSAGE TEXT");

    let path = folder.tracker_path();
    let raw: serde_json::Value = file::read_json(&path)?
        .ok_or_else(|| ScraperError::MissingTracker(path.clone()))?;
    let lacking_text = missing_message_text(&raw);
    let mut tracker: DownloadTracker = serde_json::from_value(raw)
        .map_err(|source| ScraperError::CorruptFile { path: path.clone(), source })?;
    let metadata = load_existing_metadata(&folder)?;

    let (updated, filled) = tracker.sync_from_metadata(&metadata, &lacking_text);
    write_json(&path, &tracker)?;

    success(&format!("Updated {updated} files with message text from metadata"));
    success(&format!("Added empty message_text field to {filled} files"));
    success(&format!("Total updated: {} files", updated + filled));
    success(&format!("Tracker saved: {}", path.display()));
    Ok(())
}

pub fn verify(root: &Path, folder: Option<PathBuf>) -> Result<()> {
    let folder = select_folder(root, TRACKER_FILE, folder)?;
    banner("TRACKER FIELDS CHECK");

    let path = folder.tracker_path();
    let raw: serde_json::Value = file::read_json(&path)?
        .ok_or_else(|| ScraperError::MissingTracker(path.clone()))?;
    let report = FieldReport::from_raw(&raw);

    println!("Total files: {}", report.total);
    println!("Files with message_text: {}/{}", report.with_message_text, report.total);
    println!("Files with file_size: {}/{}", report.with_file_size, report.total);

    if !report.is_complete() {
        bail!("some tracker entries are missing fields; run `sync` or `download` to fill them");
    }
    success("All files have required fields!");
    Ok(())
}

pub fn status(root: &Path, folder: Option<PathBuf>, clear: bool) -> Result<()> {
    banner("DOWNLOAD STATUS");

    let folders = match folder {
        Some(path) => vec![ChannelFolder::new(path)],
        None => ChannelFolder::discover(root, LOCK_FILE)?,
    };

    let mut running = Vec::new();
    for folder in folders {
        if let Some(info) = lock::read(&folder.lock_path())? {
            running.push((folder, info));
        }
    }

    if running.is_empty() {
        println!("\n✅ No download is currently running");
        return Ok(());
    }

    warn(&format!("Found {} active lock(s):", running.len()));
    for (i, (folder, info)) in running.iter().enumerate() {
        println!("{}. {} (pid {}, started {})", i + 1, folder.root().display(), info.pid, info.started);
    }

    if !clear {
        println!("\nIf no download is actually running, remove the locks with:");
        println!("  media_scraper status --clear");
        return Ok(());
    }

    if !confirm("\n⚠️  Remove these locks? (yes/no): ", false)? {
        println!("Operation cancelled");
        return Ok(());
    }
    for (folder, _) in &running {
        if lock::clear(&folder.lock_path())? {
            success(&format!("Cleared lock for {}", folder.name()));
        }
    }
    Ok(())
}
