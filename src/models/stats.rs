use std::{collections::BTreeMap, path::Path, time::Instant};

/// Counters for one download run.
#[derive(Debug)]
pub struct RunStats {
    pub downloaded: usize,
    pub adopted: usize,
    pub skipped: usize,
    pub refreshed: usize,
    pub failed: usize,
    pub bytes: u64,
    pub total_tracked: usize,
    pub start_time: Instant,
}

impl Default for RunStats {
    fn default() -> Self {
        Self {
            downloaded: 0,
            adopted: 0,
            skipped: 0,
            refreshed: 0,
            failed: 0,
            bytes: 0,
            total_tracked: 0,
            start_time: Instant::now(),
        }
    }
}

impl RunStats {
    pub fn print_stats(&self, metadata_path: &Path, tracker_path: &Path) {
        println!("\n{}", "=".repeat(60));
        println!("✅ Download complete!");
        println!("{}", "=".repeat(60));
        println!("⏱️  Time taken: {:.2?}", self.start_time.elapsed());
        println!("📥 New files downloaded: {}", self.downloaded);
        if self.adopted > 0 {
            println!("🧩 Files recovered from disk: {}", self.adopted);
        }
        println!("⏭️  Files skipped (already downloaded): {}", self.skipped);
        if self.refreshed > 0 {
            println!("📝 Message text refreshed: {}", self.refreshed);
        }
        if self.failed > 0 {
            println!("⚠️  Failed downloads: {}", self.failed);
        }
        println!("💾 Downloaded: {:.2} MB", self.bytes as f64 / (1024.0 * 1024.0));
        println!("📊 Total tracked files: {}", self.total_tracked);
        println!("✓ Metadata saved to: {}", metadata_path.display());
        println!("✓ Download tracker saved to: {}", tracker_path.display());
    }
}

/// Outcome of sorting a directory into category folders.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct OrganizeStats {
    pub found: usize,
    pub processed: usize,
    pub errors: usize,
    pub per_category: BTreeMap<String, usize>,
}

impl OrganizeStats {
    pub fn add(&mut self, category: &str) {
        self.processed += 1;
        *self.per_category.entry(category.to_string()).or_insert(0) += 1;
    }

    pub fn print_stats(&self) {
        println!("\n{}", "=".repeat(60));
        println!("ORGANIZATION COMPLETE!");
        println!("{}", "=".repeat(60));
        println!("\nTotal files processed: {}/{}", self.processed, self.found);
        if self.errors > 0 {
            println!("Errors: {}", self.errors);
        }
        println!("\nFiles per category:");
        println!("{}", "-".repeat(60));
        for (category, count) in &self.per_category {
            println!("{category:<40} {count:>5} files");
        }
        println!("\n{}", "=".repeat(60));
    }
}
