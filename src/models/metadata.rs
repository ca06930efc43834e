use std::{collections::BTreeMap, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::MediaItem;

/// Per-filename context captured at download time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileMetadata {
    entries: BTreeMap<String, MetadataEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    #[serde(default)]
    pub message_id: u64,
    #[serde(default)]
    pub message_text: String,
    #[serde(default)]
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_unique_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MetadataEntry {
    pub fn for_item(item: &MediaItem, file_size: u64) -> Self {
        Self {
            message_id: item.message_id,
            message_text: item.message_text.clone(),
            date: item.date.clone(),
            file_size: Some(file_size),
            mime_type: item.mime_type.clone(),
            file_unique_id: Some(item.unique_id.clone()),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchIn {
    Text,
    Filename,
    Both,
}

impl FromStr for SearchIn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "filename" => Ok(Self::Filename),
            "" | "both" => Ok(Self::Both),
            other => Err(format!("unknown search target '{other}' (text/filename/both)")),
        }
    }
}

impl FileMetadata {
    pub fn get(&self, filename: &str) -> Option<&MetadataEntry> {
        self.entries.get(filename)
    }

    pub fn insert(&mut self, filename: String, entry: MetadataEntry) {
        self.entries.insert(filename, entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unique id of the file stored under `filename`, if any.
    pub fn claimant(&self, filename: &str) -> Option<&str> {
        self.entries.get(filename).and_then(|e| e.file_unique_id.as_deref())
    }

    /// Updates text and date on every entry that came from `item`.
    pub fn refresh(&mut self, item: &MediaItem) -> bool {
        let mut changed = false;
        for entry in self.entries.values_mut() {
            if entry.file_unique_id.as_deref() != Some(item.unique_id.as_str()) {
                continue;
            }
            if entry.message_text != item.message_text {
                entry.message_text = item.message_text.clone();
                changed = true;
            }
            if !item.date.is_empty() && entry.date != item.date {
                entry.date = item.date.clone();
                changed = true;
            }
        }
        changed
    }

    pub fn search(&self, term: &str, search_in: SearchIn) -> Vec<(&String, &MetadataEntry)> {
        let needle = term.to_lowercase();
        self.entries
            .iter()
            .filter(|(filename, data)| {
                let in_text = matches!(search_in, SearchIn::Text | SearchIn::Both)
                    && data.message_text.to_lowercase().contains(&needle);
                let in_name = matches!(search_in, SearchIn::Filename | SearchIn::Both)
                    && filename.to_lowercase().contains(&needle);
                in_text || in_name
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> FileMetadata {
        serde_json::from_value(json!({
            "Blood Film.pdf": {
                "message_id": 1, "message_text": "Haematology week 3", "date": "2024-01-01 00:00:00",
                "file_size": 10, "mime_type": "application/pdf", "file_unique_id": "u1"
            },
            "scan.jpg": {
                "message_id": 2, "message_text": "", "date": "2024-01-02 00:00:00",
                "file_size": 20, "mime_type": null, "file_unique_id": null
            }
        }))
        .unwrap()
    }

    #[test]
    fn search_targets() {
        let metadata = sample();
        assert_eq!(metadata.search("haematology", SearchIn::Text).len(), 1);
        assert_eq!(metadata.search("haematology", SearchIn::Filename).len(), 0);
        assert_eq!(metadata.search("blood", SearchIn::Filename).len(), 1);
        assert_eq!(metadata.search("", SearchIn::Both).len(), 2);
    }

    #[test]
    fn claimant_is_the_recorded_unique_id() {
        let metadata = sample();
        assert_eq!(metadata.claimant("Blood Film.pdf"), Some("u1"));
        assert_eq!(metadata.claimant("scan.jpg"), None);
        assert_eq!(metadata.claimant("absent"), None);
    }

    #[test]
    fn search_in_parses_with_both_as_default() {
        assert_eq!("".parse::<SearchIn>().unwrap(), SearchIn::Both);
        assert_eq!(" Text ".parse::<SearchIn>().unwrap(), SearchIn::Text);
        assert!("body".parse::<SearchIn>().is_err());
    }

    #[test]
    fn null_mime_type_round_trips_as_null() {
        let out = serde_json::to_value(sample()).unwrap();
        assert_eq!(out["scan.jpg"]["mime_type"], Value::Null);
    }
}
