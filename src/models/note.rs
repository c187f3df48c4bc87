use serde::{Deserialize, Serialize};

use super::AttachmentStorage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: Option<i64>,
    pub title: String,
    /// Markdown
    pub content: String,
    /// Svag referens, kan peka på en borttagen kategori
    pub category_id: Option<i64>,
    pub tags: Option<String>,
    pub view_count: i64,
    /// Sekunder sedan 2001-01-01 UTC
    pub created_at: Option<f64>,
    pub attachment: Option<AttachmentStorage>,
}

impl Note {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            content: content.into(),
            category_id: None,
            tags: None,
            view_count: 0,
            created_at: None,
            attachment: None,
        }
    }

    pub fn get_tags_list(&self) -> Vec<&str> {
        self.tags
            .as_ref()
            .map(|t| t.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    /// Första tecknen av innehållet för listvyn
    pub fn excerpt(&self, max_chars: usize) -> String {
        let mut chars = self.content.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{}...", head)
        } else {
            head
        }
    }

    pub fn has_attachment(&self) -> bool {
        self.attachment.is_some()
    }
}

/// Anteckning med upplöst kategorinamn
#[derive(Debug, Clone, PartialEq)]
pub struct NoteListItem {
    pub note: Note,
    pub category_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt() {
        let note = Note::new("Test", "a".repeat(100));
        assert_eq!(note.excerpt(80).len(), 83);
        assert!(note.excerpt(80).ends_with("..."));

        let short = Note::new("Test", "kort");
        assert_eq!(short.excerpt(80), "kort");
    }

    #[test]
    fn test_tags() {
        let mut note = Note::new("Test", "");
        assert!(note.get_tags_list().is_empty());

        note.tags = Some("el, ,vvs ".into());
        assert_eq!(note.get_tags_list(), vec!["el", "vvs"]);
    }
}
