use crate::config::CategoryConfig;
use crate::models::FileMetadata;

pub const UNCATEGORIZED: &str = "uncategorized";

/// Buckets in table order, `uncategorized` last.
pub type Categorized = Vec<(String, Vec<String>)>;

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif"];
const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".avi", ".mov", ".mkv"];
const DOCUMENT_EXTENSIONS: &[&str] = &[".doc", ".docx"];
const PRESENTATION_EXTENSIONS: &[&str] = &[".ppt", ".pptx"];

/// Keyword table; the first category with a keyword found in the text wins.
#[derive(Debug, Clone)]
pub struct Categories {
    entries: Vec<(String, Vec<String>)>,
}

impl Categories {
    pub fn new(table: &[CategoryConfig]) -> Self {
        let entries = table
            .iter()
            .map(|c| (c.name.clone(), c.keywords.iter().map(|k| k.to_lowercase()).collect()))
            .collect();
        Self { entries }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    fn find(&self, lowered: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k.as_str())))
            .map(|(name, _)| name.as_str())
    }

    /// Category for a downloaded file, judged by its message text and name.
    pub fn classify_entry(&self, filename: &str, message_text: &str) -> &str {
        let combined = format!("{} {}", message_text.to_lowercase(), filename.to_lowercase());
        self.find(&combined).unwrap_or(UNCATEGORIZED)
    }

    /// Category for a bare file, by name first and extension second.
    pub fn classify_filename(&self, filename: &str) -> &str {
        let lowered = filename.to_lowercase();
        if let Some(category) = self.find(&lowered) {
            return category;
        }

        let has = |exts: &[&str]| exts.iter().any(|e| lowered.ends_with(e));
        if has(IMAGE_EXTENSIONS) {
            "19_Images_Photos"
        } else if has(VIDEO_EXTENSIONS) {
            "20_Videos"
        } else if lowered.ends_with(".pdf") {
            "21_PDFs_Uncategorized"
        } else if has(DOCUMENT_EXTENSIONS) {
            "22_Documents_Uncategorized"
        } else if has(PRESENTATION_EXTENSIONS) {
            "23_Presentations_Uncategorized"
        } else {
            "99_Uncategorized"
        }
    }

    pub fn categorize(&self, metadata: &FileMetadata) -> Categorized {
        let mut buckets: Categorized = self
            .names()
            .chain(std::iter::once(UNCATEGORIZED))
            .map(|name| (name.to_string(), Vec::new()))
            .collect();

        for (filename, data) in metadata.iter() {
            let category = self.classify_entry(filename, &data.message_text);
            if let Some((_, files)) = buckets.iter_mut().find(|(name, _)| name == category) {
                files.push(filename.clone());
            }
        }
        buckets
    }
}
