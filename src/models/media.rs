/// One downloadable file attached to a channel message.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    /// Stable id of the file itself; survives renames and moves on disk.
    pub unique_id: String,
    pub message_id: u64,
    pub file_name: Option<String>,
    pub message_text: String,
    pub date: String,
    pub size: u64,
    pub mime_type: Option<String>,
    pub url: String,
}

impl MediaItem {
    /// Name the file is stored under before collision handling.
    pub fn target_name(&self) -> String {
        match self.file_name.as_deref().map(sanitize_file_name) {
            Some(name) if !name.is_empty() => name,
            _ => format!("file_{}_{}", self.message_id, self.unique_id),
        }
    }
}

pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed == "." || trimmed == ".." {
        String::new()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(file_name: Option<&str>) -> MediaItem {
        MediaItem {
            unique_id: "991".into(),
            message_id: 7,
            file_name: file_name.map(String::from),
            message_text: String::new(),
            date: String::new(),
            size: 0,
            mime_type: None,
            url: String::new(),
        }
    }

    #[test]
    fn unnamed_items_get_a_stable_name() {
        assert_eq!(item(None).target_name(), "file_7_991");
        assert_eq!(item(Some("..")).target_name(), "file_7_991");
    }

    #[test]
    fn path_separators_are_stripped() {
        assert_eq!(item(Some("../etc/passwd")).target_name(), ".._etc_passwd");
        assert_eq!(item(Some("notes.pdf")).target_name(), "notes.pdf");
    }
}
