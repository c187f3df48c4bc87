use serde::{Deserialize, Serialize};

/// Visningsnamn för anteckningar utan (giltig) kategori
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Option<i64>,
    pub name: String,
    /// Kort glyf eller emoji
    pub icon: String,
    pub sort_order: i64,
}

impl Category {
    pub fn new(name: impl Into<String>, icon: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            icon: icon.into(),
            sort_order: 0,
        }
    }

    /// Namn med ikon framför, som i listor
    pub fn display_name(&self) -> String {
        if self.icon.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.icon, self.name)
        }
    }
}
