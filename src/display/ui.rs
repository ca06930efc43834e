use colorful::{Colorful, RGB};

use crate::models::{DownloadTracker, FileMetadata, MetadataEntry, TrackedFile};
use crate::processing::categorize::Categorized;

fn primary_color() -> RGB {
    RGB::new(79, 70, 229) // Indigo
}

fn success_color() -> RGB {
    RGB::new(16, 185, 129) // Emerald
}

fn warning_color() -> RGB {
    RGB::new(245, 158, 11) // Amber
}

fn info_color() -> RGB {
    RGB::new(59, 130, 246) // Blue
}

fn subtle_color() -> RGB {
    RGB::new(107, 114, 128) // Gray
}

/// First `max` characters of `text`, with `...` when something was cut.
pub fn preview(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() { format!("{head}...") } else { head }
}

pub fn megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

pub fn banner(title: &str) {
    println!("\n{}", "=".repeat(60));
    println!("{}", title.color(primary_color()));
    println!("{}", "=".repeat(60));
}

pub fn show_statistics(tracker: &DownloadTracker) {
    banner("DOWNLOAD STATISTICS");
    println!("Total files tracked: {}", tracker.statistics.total_downloads.to_string().color(success_color()));
    println!(
        "Last download: {}",
        tracker.statistics.last_download_date.as_deref().unwrap_or("Never").color(info_color())
    );
    println!("Unique files: {}", tracker.len());
    println!("{}", "=".repeat(60));
}

pub fn list_downloaded_files(tracker: &DownloadTracker, limit: Option<usize>) {
    banner(&format!("DOWNLOADED FILES ({} total)", tracker.len()));
    if tracker.is_empty() {
        println!("\nNo files tracked yet.");
        return;
    }

    let files = tracker.sorted_by_download_date();
    let shown = limit.unwrap_or(files.len()).min(files.len());
    for (i, (file_id, info)) in files.iter().take(shown).enumerate() {
        print_tracked(i + 1, file_id, info);
    }

    if shown < files.len() {
        println!("\n... and {} more files", files.len() - shown);
    }
}

fn print_tracked(index: usize, file_id: &str, info: &TrackedFile) {
    println!("\n{}. {}", index, display_name(&info.filename).color(info_color()));
    println!("   File ID: {file_id}");
    println!("   Message ID: {}", info.message_id);
    println!("   Downloaded: {}", or_na(&info.download_date));
    println!("   Original date: {}", or_na(&info.original_message_date));
    if info.file_size > 0 {
        println!("   Size: {}", megabytes(info.file_size));
    }
    if !info.message_text.is_empty() {
        println!("   📝 Message: {}", preview(&info.message_text, 80).color(subtle_color()));
    }
}

pub fn print_tracker_search(term: &str, results: &[(&String, &TrackedFile)]) {
    if results.is_empty() {
        println!("\nNo files found matching '{term}'");
        return;
    }

    banner(&format!("SEARCH RESULTS: {} file(s) found", results.len()));
    for (i, (_, info)) in results.iter().enumerate() {
        println!("\n{}. {}", i + 1, display_name(&info.filename).color(info_color()));
        println!("   Downloaded: {}", or_na(&info.download_date));
        if !info.message_text.is_empty() {
            println!("   📝 Message: {}", preview(&info.message_text, 100).color(subtle_color()));
        }
    }
}

pub fn print_metadata_search(results: &[(&String, &MetadataEntry)]) {
    if results.is_empty() {
        println!("No files found matching your search.");
        return;
    }

    println!("\nFound {} matching file(s):\n", results.len());
    for (i, (filename, data)) in results.iter().enumerate() {
        println!("{}. {}", i + 1, filename.as_str().color(info_color()));
        println!("   Date: {}", or_na(&data.date));
        if !data.message_text.is_empty() {
            println!("   Message: {}", preview(&data.message_text, 150));
        }
        println!();
    }
}

pub fn print_metadata_list(metadata: &FileMetadata) {
    println!("\nAll files ({}):\n", metadata.len());
    for (i, (filename, data)) in metadata.iter().enumerate() {
        println!("{}. {}", i + 1, filename);
        if !data.message_text.is_empty() {
            println!("   {}", preview(&data.message_text, 100).color(subtle_color()));
        }
        println!();
    }
}

pub fn print_categorized(categorized: &Categorized) {
    for (category, files) in categorized.iter().filter(|(_, files)| !files.is_empty()) {
        println!("\n{}: {} file(s)", category.as_str().color(primary_color()), files.len());
        for filename in files.iter().take(5) {
            println!("  - {filename}");
        }
        if files.len() > 5 {
            println!("  ... and {} more", files.len() - 5);
        }
    }
}

pub fn success(message: &str) {
    println!("{}", format!("✓ {message}").color(success_color()));
}

pub fn warn(message: &str) {
    println!("{}", format!("⚠️  {message}").color(warning_color()));
}

fn display_name(filename: &str) -> &str {
    if filename.is_empty() { "Unknown" } else { filename }
}

fn or_na(value: &str) -> &str {
    if value.is_empty() { "N/A" } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_cuts_on_characters_not_bytes() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("exactly10!", 10), "exactly10!");
        assert_eq!(preview("ünïcödé text", 4), "ünïc...");
    }

    #[test]
    fn megabytes_uses_binary_units() {
        assert_eq!(megabytes(1024 * 1024), "1.00 MB");
        assert_eq!(megabytes(1536 * 1024), "1.50 MB");
    }
}
