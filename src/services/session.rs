//! Det öppna dokumentet och operationerna som UI:t anropar
//!
//! En `Session` har högst ett öppet dokument. Ett nytt dokument läses in
//! helt innan det ersätter det gamla, så ett misslyckat försök lämnar det
//! tidigare dokumentet orört.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::attachment;
use super::blob_store::BlobStore;
use super::container::{self, ContainerFormat};
use crate::db::{CategoryRepository, Database, NoteRepository, ProductRepository};
use crate::models::{AttachmentLookup, AttachmentStorage, EditorSettings, Manifest};
use crate::utils::path::{is_toolpack_file, sanitize_filename};
use crate::utils::{AppError, AppResult};

/// Flagga som markerar att en laddning, sparning eller bilaga pågår
///
/// Klonen delar tillstånd med originalet så att UI:t kan hålla flaggan
/// medan det väntar på en fil.
#[derive(Debug, Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Ta flaggan, eller `Busy` om någon annan redan har den
    pub fn acquire(&self) -> AppResult<BusyGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AppError::Busy)?;
        Ok(BusyGuard(Arc::clone(&self.0)))
    }
}

/// Släpper flaggan när den går ur scope
#[derive(Debug)]
pub struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Ett inläst dokument
pub struct OpenDocument {
    pub database: Database,
    pub blobs: BlobStore,
    /// None tills dokumentet har sparats som toolpack första gången
    pub manifest: Option<Manifest>,
    pub format: ContainerFormat,
    pub file_name: String,
    /// Bilageposter som inte gick att läsa vid inläsningen
    pub skipped_entries: Vec<String>,
}

/// En fil redo att laddas ned
#[derive(Debug, Clone)]
pub struct EncodedFile {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

/// Översikt för statusraden
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSummary {
    pub file_name: String,
    pub format: ContainerFormat,
    pub library_id: Option<Uuid>,
    pub created_at: Option<DateTime<Utc>>,
    pub categories: i64,
    pub notes: i64,
    pub products: i64,
    /// Poster i blob-lagret
    pub blobs: usize,
    pub blob_bytes: u64,
    /// Rader med bilagan inbäddad i raden
    pub inline_attachments: usize,
    /// Rader vars bilaga saknas i blob-lagret
    pub missing_attachments: usize,
    /// Poster i blob-lagret som ingen rad pekar på
    pub unreferenced_blobs: usize,
}

#[derive(Default)]
pub struct Session {
    document: Option<OpenDocument>,
    busy: BusyFlag,
    compression_level: Option<i64>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: &EditorSettings) -> Self {
        Self {
            compression_level: settings.compression_level,
            ..Self::default()
        }
    }

    /// Skapa ett nytt tomt toolpack-dokument
    pub fn create_document(&mut self, file_name: &str) -> AppResult<()> {
        let _guard = self.busy.acquire()?;

        let database = Database::open_in_memory()?;
        let file_name = output_file_name(file_name, ContainerFormat::Toolpack);
        info!("Nytt dokument {}", file_name);

        self.document = Some(OpenDocument {
            database,
            blobs: BlobStore::new(),
            manifest: None,
            format: ContainerFormat::Toolpack,
            file_name,
            skipped_entries: Vec::new(),
        });
        Ok(())
    }

    /// Läs in en fil och ersätt det öppna dokumentet
    pub fn load(&mut self, bytes: &[u8], file_name: &str) -> AppResult<()> {
        let _guard = self.busy.acquire()?;

        let decoded = container::decode(bytes, Some(file_name)).map_err(|e| {
            warn!("Kunde inte läsa {}: {}", file_name, e);
            e
        })?;

        if !decoded.schema_report.is_unchanged() {
            debug!("Schemat kompletterades: {:?}", decoded.schema_report);
        }

        info!("Öppnade {} ({})", file_name, decoded.format.display_name());

        self.document = Some(OpenDocument {
            database: decoded.database,
            blobs: decoded.blobs,
            manifest: decoded.manifest,
            format: decoded.format,
            file_name: file_name.to_string(),
            skipped_entries: decoded.skipped_entries,
        });
        Ok(())
    }

    /// Skriv dokumentet i samma format som det lästes in i
    pub fn save(&mut self) -> AppResult<EncodedFile> {
        let _guard = self.busy.acquire()?;
        let compression_level = self.compression_level;
        let doc = self.document_mut()?;

        let encoded = container::encode(
            &doc.database,
            &doc.blobs,
            doc.format,
            doc.manifest.as_ref(),
            compression_level,
        )?;

        if encoded.manifest.is_some() {
            doc.manifest = encoded.manifest;
        }

        let file_name = output_file_name(&doc.file_name, doc.format);
        info!("Sparade {} ({} bytes)", file_name, encoded.bytes.len());

        Ok(EncodedFile {
            bytes: encoded.bytes,
            file_name,
            mime_type: doc.format.mime_type().to_string(),
        })
    }

    pub fn close(&mut self) {
        if let Some(doc) = self.document.take() {
            debug!("Stängde {}", doc.file_name);
        }
    }

    pub fn document(&self) -> AppResult<&OpenDocument> {
        self.document.as_ref().ok_or(AppError::NoDocument)
    }

    pub fn is_open(&self) -> bool {
        self.document.is_some()
    }

    pub fn busy_flag(&self) -> BusyFlag {
        self.busy.clone()
    }

    pub fn categories(&self) -> AppResult<CategoryRepository> {
        Ok(self.document()?.database.categories())
    }

    pub fn notes(&self) -> AppResult<NoteRepository> {
        Ok(self.document()?.database.notes())
    }

    pub fn products(&self) -> AppResult<ProductRepository> {
        Ok(self.document()?.database.products())
    }

    /// Bifoga en PDF till en anteckning
    ///
    /// Ersätter eventuell tidigare bilaga. I äldre format bäddas bytes in i
    /// raden eftersom filen saknar blob-lager.
    pub fn attach_to_note(
        &mut self,
        note_id: i64,
        data: &[u8],
        file_name: &str,
        mime_type: &str,
    ) -> AppResult<AttachmentStorage> {
        let _guard = self.busy.acquire()?;
        Self::validate_upload(data, file_name, mime_type)?;

        let doc = self.document_mut()?;
        let notes = doc.database.notes();
        if notes.find_by_id(note_id)?.is_none() {
            return Err(AppError::not_found(format!("Anteckning {}", note_id)));
        }

        let storage = Self::store_upload(doc, data, file_name, mime_type);
        notes.set_attachment(note_id, Some(&storage))?;
        Ok(storage)
    }

    /// Bifoga en PDF till en produkt
    pub fn attach_to_product(
        &mut self,
        product_id: i64,
        data: &[u8],
        file_name: &str,
        mime_type: &str,
    ) -> AppResult<AttachmentStorage> {
        let _guard = self.busy.acquire()?;
        Self::validate_upload(data, file_name, mime_type)?;

        let doc = self.document_mut()?;
        let products = doc.database.products();
        if products.find_by_id(product_id)?.is_none() {
            return Err(AppError::not_found(format!("Produkt {}", product_id)));
        }

        let storage = Self::store_upload(doc, data, file_name, mime_type);
        products.set_attachment(product_id, Some(&storage))?;
        Ok(storage)
    }

    /// Ta bort anteckningens bilaga, blob-lagret lämnas orört
    ///
    /// Returnerar bilagan som togs bort.
    pub fn remove_note_attachment(&mut self, note_id: i64) -> AppResult<Option<AttachmentStorage>> {
        let _guard = self.busy.acquire()?;
        let notes = self.notes()?;

        let mut note = notes
            .find_by_id(note_id)?
            .ok_or_else(|| AppError::not_found(format!("Anteckning {}", note_id)))?;
        let removed = attachment::detach(&mut note.attachment);
        notes.set_attachment(note_id, note.attachment.as_ref())?;
        Ok(removed)
    }

    /// Ta bort produktens bilaga, blob-lagret lämnas orört
    pub fn remove_product_attachment(&mut self, product_id: i64) -> AppResult<Option<AttachmentStorage>> {
        let _guard = self.busy.acquire()?;
        let products = self.products()?;

        let mut product = products
            .find_by_id(product_id)?
            .ok_or_else(|| AppError::not_found(format!("Produkt {}", product_id)))?;
        let removed = attachment::detach(&mut product.attachment);
        products.set_attachment(product_id, product.attachment.as_ref())?;
        Ok(removed)
    }

    pub fn note_attachment(&self, note_id: i64) -> AppResult<AttachmentLookup> {
        let doc = self.document()?;
        let note = doc
            .database
            .notes()
            .find_by_id(note_id)?
            .ok_or_else(|| AppError::not_found(format!("Anteckning {}", note_id)))?;
        Ok(attachment::lookup(&doc.blobs, note.attachment.as_ref()))
    }

    pub fn product_attachment(&self, product_id: i64) -> AppResult<AttachmentLookup> {
        let doc = self.document()?;
        let product = doc
            .database
            .products()
            .find_by_id(product_id)?
            .ok_or_else(|| AppError::not_found(format!("Produkt {}", product_id)))?;
        Ok(attachment::lookup(&doc.blobs, product.attachment.as_ref()))
    }

    /// Ta bort blobbar som ingen rad pekar på, returnerar antal borttagna
    pub fn prune_unreferenced_blobs(&mut self) -> AppResult<usize> {
        let _guard = self.busy.acquire()?;
        let doc = self.document_mut()?;

        let referenced = Self::referenced_paths(&doc.database)?;
        let removed = doc.blobs.retain(|path| referenced.contains(path));

        if removed > 0 {
            info!("Tog bort {} oanvända bilagor", removed);
        }
        Ok(removed)
    }

    /// Flytta inbäddade bilagor till blob-lagret
    ///
    /// Fungerar bara i toolpack-dokument. Returnerar antal flyttade.
    pub fn externalize_inline_attachments(&mut self) -> AppResult<usize> {
        let _guard = self.busy.acquire()?;
        let doc = self.document_mut()?;

        if doc.format.is_legacy() {
            return Err(AppError::validation(
                "Bilagor kan bara flyttas ut i toolpack-dokument",
            ));
        }

        let mut moved = 0;

        let notes = doc.database.notes();
        for note in notes.find_all()? {
            let (Some(id), Some(storage)) = (note.id, note.attachment.as_ref()) else {
                continue;
            };
            if let Some(reference) = attachment::externalize(&mut doc.blobs, storage) {
                notes.set_attachment(id, Some(&AttachmentStorage::Referenced(reference)))?;
                moved += 1;
            }
        }

        let products = doc.database.products();
        for product in products.find_all()? {
            let (Some(id), Some(storage)) = (product.id, product.attachment.as_ref()) else {
                continue;
            };
            if let Some(reference) = attachment::externalize(&mut doc.blobs, storage) {
                products.set_attachment(id, Some(&AttachmentStorage::Referenced(reference)))?;
                moved += 1;
            }
        }

        if moved > 0 {
            info!("Flyttade {} inbäddade bilagor till blob-lagret", moved);
        }
        Ok(moved)
    }

    /// Sammanställ antal och bilagestatus för det öppna dokumentet
    pub fn summary(&self) -> AppResult<DocumentSummary> {
        let doc = self.document()?;
        let db = &doc.database;

        let attachments: Vec<AttachmentStorage> = db
            .notes()
            .find_all()?
            .into_iter()
            .filter_map(|n| n.attachment)
            .chain(db.products().find_all()?.into_iter().filter_map(|p| p.attachment))
            .collect();

        let inline_attachments = attachments.iter().filter(|a| a.is_inline()).count();
        let missing_attachments = attachments
            .iter()
            .filter_map(|a| a.relative_path())
            .filter(|p| !doc.blobs.contains(p))
            .count();

        let referenced = Self::referenced_paths(db)?;
        let unreferenced_blobs = doc.blobs.paths().filter(|p| !referenced.contains(*p)).count();

        Ok(DocumentSummary {
            file_name: doc.file_name.clone(),
            format: doc.format,
            library_id: doc.manifest.as_ref().map(|m| m.library_id),
            created_at: doc.manifest.as_ref().map(|m| m.created_at),
            categories: db.categories().count()?,
            notes: db.notes().count()?,
            products: db.products().count()?,
            blobs: doc.blobs.len(),
            blob_bytes: doc.blobs.total_size(),
            inline_attachments,
            missing_attachments,
            unreferenced_blobs,
        })
    }

    fn document_mut(&mut self) -> AppResult<&mut OpenDocument> {
        self.document.as_mut().ok_or(AppError::NoDocument)
    }

    fn validate_upload(data: &[u8], file_name: &str, mime_type: &str) -> AppResult<()> {
        attachment::ensure_pdf_mime(mime_type)?;
        if data.is_empty() {
            return Err(AppError::validation("Filen är tom"));
        }
        if file_name.trim().is_empty() {
            return Err(AppError::validation("Filnamn krävs"));
        }
        Ok(())
    }

    fn store_upload(
        doc: &mut OpenDocument,
        data: &[u8],
        file_name: &str,
        mime_type: &str,
    ) -> AttachmentStorage {
        let file_name = sanitize_filename(file_name);
        match doc.format {
            ContainerFormat::Legacy => AttachmentStorage::Inline {
                file_name,
                data: data.to_vec(),
            },
            ContainerFormat::Toolpack => AttachmentStorage::Referenced(attachment::attach(
                &mut doc.blobs,
                data,
                &file_name,
                mime_type,
            )),
        }
    }

    fn referenced_paths(db: &Database) -> AppResult<HashSet<String>> {
        let mut paths: HashSet<String> = db.notes().referenced_paths()?.into_iter().collect();
        paths.extend(db.products().referenced_paths()?);
        Ok(paths)
    }
}

/// Filnamn med ändelse som motsvarar formatet
fn output_file_name(file_name: &str, format: ContainerFormat) -> String {
    let trimmed = file_name.trim();
    let base = if trimmed.is_empty() { "library" } else { trimmed };

    match format {
        ContainerFormat::Toolpack if is_toolpack_file(base) => base.to_string(),
        ContainerFormat::Legacy if !is_toolpack_file(base) && Path::new(base).extension().is_some() => {
            base.to_string()
        }
        _ => Path::new(base)
            .with_extension(format.extension())
            .to_string_lossy()
            .to_string(),
    }
}
