use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::utils::path::get_config_path;

/// Inställningar som inte sparas i dokumentet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    /// Deflate-nivå för toolpack-arkiv (None = zip-standard)
    pub compression_level: Option<i64>,
    /// trace, debug, info, warn eller error
    pub log_level: String,
    /// Filnamn för nya dokument
    pub default_document_name: String,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            compression_level: Some(6),
            log_level: "info".to_string(),
            default_document_name: "library.toolpack".to_string(),
        }
    }
}

impl EditorSettings {
    pub fn load() -> Self {
        Self::load_from(&get_config_path())
    }

    /// Läs från en given fil, standardvärden om den saknas eller är trasig
    pub fn load_from(path: &Path) -> Self {
        if let Ok(content) = std::fs::read_to_string(path) {
            match toml::from_str(&content) {
                Ok(settings) => return settings,
                Err(e) => tracing::warn!("Ignorerar trasig inställningsfil {:?}: {}", path, e),
            }
        }

        Self::default()
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&get_config_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Kunde inte skapa katalog: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Kunde inte skriva inställningar: {:?}", path))?;

        Ok(())
    }

    /// Loggnivå, "info" om värdet är okänt
    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level
            .parse()
            .unwrap_or(tracing::Level::INFO)
    }
}
