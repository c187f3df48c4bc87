use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::{AppError, AppResult};

/// Containerformatets version i manifest.json
pub const MANIFEST_VERSION: &str = "1.0";

/// Schemaversion som den här versionen skriver och kan läsa
pub const CONTAINER_SCHEMA_VERSION: u32 = 1;

/// Innehållet i `manifest.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: String,
    pub library_id: Uuid,
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
}

impl Manifest {
    /// Nytt manifest med nytt bibliotek-ID
    pub fn new() -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            library_id: Uuid::new_v4(),
            schema_version: CONTAINER_SCHEMA_VERSION,
            created_at: Utc::now().trunc_subsecs(3),
        }
    }

    /// Behåll ID och skapandetid från en tidigare version, annars nytt
    pub fn from_seed(seed: Option<&Manifest>) -> Self {
        match seed {
            Some(previous) => Self {
                version: MANIFEST_VERSION.to_string(),
                library_id: previous.library_id,
                schema_version: CONTAINER_SCHEMA_VERSION,
                created_at: previous.created_at,
            },
            None => Self::new(),
        }
    }

    /// Tolka och validera manifest.json
    pub fn parse(bytes: &[u8]) -> AppResult<Self> {
        let manifest: Manifest = serde_json::from_slice(bytes)
            .map_err(|e| AppError::invalid_manifest(e.to_string()))?;

        if !manifest.version.starts_with("1.") {
            return Err(AppError::invalid_manifest(format!(
                "Okänd containerversion {}",
                manifest.version
            )));
        }

        if manifest.schema_version == 0 || manifest.schema_version > CONTAINER_SCHEMA_VERSION {
            return Err(AppError::invalid_manifest(format!(
                "Schemaversion {} stöds inte (max {})",
                manifest.schema_version, CONTAINER_SCHEMA_VERSION
            )));
        }

        Ok(manifest)
    }

    pub fn to_json(&self) -> AppResult<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| AppError::other(e.to_string()))
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}
