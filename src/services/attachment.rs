//! Koppling mellan bilagor, blob-lagret och raderna som pekar på dem

use tracing::debug;

use super::blob_store::BlobStore;
use crate::models::{AttachmentFile, AttachmentLookup, AttachmentRef, AttachmentStorage, PDF_MIME_TYPE};
use crate::utils::hash::content_path;
use crate::utils::path::extension_of;
use crate::utils::{AppError, AppResult};

/// Lagra bytes i blob-lagret och bygg metadata för raden
///
/// MIME-typen sparas som den är; kontrollen görs av anroparen.
pub fn attach(store: &mut BlobStore, data: &[u8], file_name: &str, mime_type: &str) -> AttachmentRef {
    let extension = extension_of(file_name);
    let hash = store.put(data, &extension);
    let relative_path = content_path(&hash, &extension);

    debug!("Bilaga {} lagrad som {}", file_name, relative_path);

    AttachmentRef {
        file_name: file_name.to_string(),
        mime_type: mime_type.to_string(),
        size: data.len() as i64,
        hash,
        relative_path,
    }
}

/// Koppla loss bilagan från raden
///
/// Blob-lagret lämnas orört; samma innehåll kan användas av andra rader.
pub fn detach(slot: &mut Option<AttachmentStorage>) -> Option<AttachmentStorage> {
    let previous = slot.take();
    if let Some(storage) = &previous {
        debug!("Bilaga {} bortkopplad", storage.file_name());
    }
    previous
}

/// Hämta bytes för en bilaga
pub fn resolve(store: &BlobStore, storage: &AttachmentStorage) -> AppResult<AttachmentFile> {
    match storage {
        AttachmentStorage::Inline { file_name, data } => Ok(AttachmentFile {
            file_name: file_name.clone(),
            mime_type: PDF_MIME_TYPE.to_string(),
            data: data.clone(),
        }),
        AttachmentStorage::Referenced(r) => {
            let data = store.require(&r.relative_path)?;
            Ok(AttachmentFile {
                file_name: r.file_name.clone(),
                mime_type: r.mime_type.clone(),
                data: data.to_vec(),
            })
        }
    }
}

/// Som `resolve` men en saknad blob ger `Missing` i stället för fel
pub fn lookup(store: &BlobStore, storage: Option<&AttachmentStorage>) -> AttachmentLookup {
    let Some(storage) = storage else {
        return AttachmentLookup::None;
    };

    match resolve(store, storage) {
        Ok(file) => AttachmentLookup::Available(file),
        Err(_) => AttachmentLookup::Missing {
            file_name: storage.file_name().to_string(),
            relative_path: storage.relative_path().unwrap_or_default().to_string(),
        },
    }
}

/// Flytta en inbäddad bilaga till blob-lagret
///
/// Returnerar None om bilagan redan är en referens.
pub fn externalize(store: &mut BlobStore, storage: &AttachmentStorage) -> Option<AttachmentRef> {
    match storage {
        AttachmentStorage::Inline { file_name, data } => {
            Some(attach(store, data, file_name, PDF_MIME_TYPE))
        }
        AttachmentStorage::Referenced(_) => None,
    }
}

/// Avvisa allt som inte är PDF
pub fn ensure_pdf_mime(mime_type: &str) -> AppResult<()> {
    let essence = mime_type.split(';').next().unwrap_or_default().trim();
    if essence.eq_ignore_ascii_case(PDF_MIME_TYPE) {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "Endast PDF-filer kan bifogas (fick {})",
            if essence.is_empty() { "okänd typ" } else { essence }
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::hash::sha256_hex;

    const PDF_BYTES: &[u8] = b"%PDF-1.4\n%";

    #[test]
    fn test_attach_is_content_addressed() {
        let mut store = BlobStore::new();
        let reference = attach(&mut store, PDF_BYTES, "a.pdf", PDF_MIME_TYPE);

        let hash = sha256_hex(PDF_BYTES);
        assert_eq!(reference.hash, hash);
        assert_eq!(reference.size, 10);
        assert_eq!(reference.relative_path, format!("{}/{}.pdf", &hash[0..2], hash));
        assert_eq!(store.get(&reference.relative_path), Some(PDF_BYTES));
    }

    #[test]
    fn test_same_bytes_different_names_share_path() {
        let mut store = BlobStore::new();
        let a = attach(&mut store, PDF_BYTES, "manual.pdf", PDF_MIME_TYPE);
        let b = attach(&mut store, PDF_BYTES, "kopia.PDF", PDF_MIME_TYPE);

        assert_eq!(a.relative_path, b.relative_path);
        assert_ne!(a.file_name, b.file_name);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_missing_extension_falls_back_to_pdf() {
        let mut store = BlobStore::new();
        let reference = attach(&mut store, PDF_BYTES, "utan_andelse", PDF_MIME_TYPE);
        assert!(reference.relative_path.ends_with(".pdf"));
    }

    #[test]
    fn test_mime_type_is_recorded_verbatim() {
        let mut store = BlobStore::new();
        let reference = attach(&mut store, b"x", "x.bin", "application/octet-stream");
        assert_eq!(reference.mime_type, "application/octet-stream");
    }

    #[test]
    fn test_detach_keeps_blob() {
        let mut store = BlobStore::new();
        let reference = attach(&mut store, PDF_BYTES, "a.pdf", PDF_MIME_TYPE);
        let mut slot = Some(AttachmentStorage::Referenced(reference.clone()));

        assert!(detach(&mut slot).is_some());
        assert!(slot.is_none());
        assert!(store.contains(&reference.relative_path));
    }

    #[test]
    fn test_lookup_missing_blob() {
        let store = BlobStore::new();
        let reference = AttachmentRef {
            file_name: "borta.pdf".into(),
            mime_type: PDF_MIME_TYPE.into(),
            size: 3,
            hash: "00".repeat(32),
            relative_path: format!("00/{}.pdf", "00".repeat(32)),
        };
        let storage = AttachmentStorage::Referenced(reference.clone());

        assert_eq!(lookup(&store, None), AttachmentLookup::None);
        assert_eq!(
            lookup(&store, Some(&storage)),
            AttachmentLookup::Missing {
                file_name: "borta.pdf".into(),
                relative_path: reference.relative_path,
            }
        );
        assert!(matches!(
            resolve(&store, &storage).unwrap_err(),
            AppError::AttachmentNotFound(_)
        ));
    }

    #[test]
    fn test_externalize_inline() {
        let mut store = BlobStore::new();
        let inline = AttachmentStorage::Inline {
            file_name: "gammal.pdf".into(),
            data: PDF_BYTES.to_vec(),
        };

        let reference = externalize(&mut store, &inline).unwrap();
        assert_eq!(reference.file_name, "gammal.pdf");
        assert!(store.contains(&reference.relative_path));

        let referenced = AttachmentStorage::Referenced(reference);
        assert!(externalize(&mut store, &referenced).is_none());
    }

    #[test]
    fn test_ensure_pdf_mime() {
        assert!(ensure_pdf_mime("application/pdf").is_ok());
        assert!(ensure_pdf_mime("Application/PDF; name=x").is_ok());
        assert!(matches!(
            ensure_pdf_mime("image/png").unwrap_err(),
            AppError::Validation(_)
        ));
        assert!(ensure_pdf_mime("").is_err());
    }
}
