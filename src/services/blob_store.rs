//! Innehållsadresserat blob-lager för bilagor
//!
//! Lagret lever lika länge som det öppna dokumentet. Det läses från och
//! skrivs till containern; här finns ingen egen persistens.

use std::collections::BTreeMap;

use crate::utils::hash::{content_path, sha256_hex};
use crate::utils::{AppError, AppResult};

/// Sökväg → bytes, sorterat så att containern skrivs deterministiskt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobStore {
    entries: BTreeMap<String, Vec<u8>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lagra bytes och returnera deras hash
    ///
    /// Posten hamnar på `content_path(hash, extension)`. Finns sökvägen
    /// redan är innehållet identiskt och ingenting skrivs om.
    pub fn put(&mut self, data: &[u8], extension: &str) -> String {
        let hash = sha256_hex(data);
        self.entries
            .entry(content_path(&hash, extension))
            .or_insert_with(|| data.to_vec());
        hash
    }

    /// Hämta bytes för en sökväg
    pub fn get(&self, relative_path: &str) -> Option<&[u8]> {
        self.entries.get(relative_path).map(|d| d.as_slice())
    }

    /// Som `get` men en saknad sökväg är ett fel
    pub fn require(&self, relative_path: &str) -> AppResult<&[u8]> {
        self.get(relative_path)
            .ok_or_else(|| AppError::AttachmentNotFound(relative_path.to_string()))
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.entries.contains_key(relative_path)
    }

    /// Ta bort en post, returnerar true om den fanns
    pub fn delete(&mut self, relative_path: &str) -> bool {
        self.entries.remove(relative_path).is_some()
    }

    pub fn list(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(p, d)| (p.as_str(), d.as_slice()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|p| p.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Summa av alla posters storlek i bytes
    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|d| d.len() as u64).sum()
    }

    /// Behåll bara poster som predikatet godkänner, returnerar antal borttagna
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&str) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|path, _| keep(path));
        before - self.entries.len()
    }

    /// Lägg in en post under en given sökväg (vid inläsning av container)
    pub(crate) fn insert_raw(&mut self, relative_path: String, data: Vec<u8>) {
        self.entries.insert(relative_path, data);
    }
}
