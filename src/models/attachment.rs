use serde::{Deserialize, Serialize};

/// MIME-typ som bilagor har enligt konvention
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Metadata för en bilaga som ligger i blob-lagret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    pub file_name: String,
    pub mime_type: String,
    pub size: i64,
    /// Hex-kodad SHA-256 av rådata
    pub hash: String,
    /// `<hash[0:2]>/<hash>.<ext>`
    pub relative_path: String,
}

/// Hur en rads bilaga är lagrad
///
/// Äldre filer har bytes direkt i raden (`ZPDFDATA`), nyare har en
/// referens in i blob-lagret. Avgörs per rad vid läsning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentStorage {
    Inline { file_name: String, data: Vec<u8> },
    Referenced(AttachmentRef),
}

impl AttachmentStorage {
    pub fn file_name(&self) -> &str {
        match self {
            Self::Inline { file_name, .. } => file_name,
            Self::Referenced(r) => &r.file_name,
        }
    }

    pub fn mime_type(&self) -> &str {
        match self {
            Self::Inline { .. } => PDF_MIME_TYPE,
            Self::Referenced(r) => &r.mime_type,
        }
    }

    pub fn size(&self) -> i64 {
        match self {
            Self::Inline { data, .. } => data.len() as i64,
            Self::Referenced(r) => r.size,
        }
    }

    pub fn relative_path(&self) -> Option<&str> {
        match self {
            Self::Inline { .. } => None,
            Self::Referenced(r) => Some(&r.relative_path),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline { .. })
    }

    pub fn size_display(&self) -> String {
        const KB: i64 = 1024;
        const MB: i64 = KB * 1024;
        const GB: i64 = MB * 1024;

        match self.size() {
            s if s >= GB => format!("{:.1} GB", s as f64 / GB as f64),
            s if s >= MB => format!("{:.1} MB", s as f64 / MB as f64),
            s if s >= KB => format!("{:.1} KB", s as f64 / KB as f64),
            s => format!("{} B", s),
        }
    }
}

/// En bilaga redo att visas eller laddas ned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentFile {
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Resultat när UI:t frågar efter en rads bilaga
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentLookup {
    /// Raden har ingen bilaga
    None,
    Available(AttachmentFile),
    /// Raden pekar på en sökväg som saknas i blob-lagret
    Missing { file_name: String, relative_path: String },
}

impl AttachmentLookup {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing { .. })
    }
}
