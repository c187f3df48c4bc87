use serde::{Deserialize, Serialize};

use super::AttachmentStorage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Option<i64>,
    pub name: String,
    pub manufacturer: String,
    /// Markdown
    pub specifications: String,
    /// Markdown
    pub installation_notes: String,
    pub tags: Option<String>,
    pub view_count: i64,
    pub created_at: Option<f64>,
    pub attachment: Option<AttachmentStorage>,
}

impl Product {
    pub fn new(name: impl Into<String>, manufacturer: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            manufacturer: manufacturer.into(),
            specifications: String::new(),
            installation_notes: String::new(),
            tags: None,
            view_count: 0,
            created_at: None,
            attachment: None,
        }
    }

    pub fn excerpt(&self, max_chars: usize) -> String {
        let mut chars = self.specifications.chars();
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
