//! Läsning och skrivning av dokumentfiler
//!
//! Två format stöds:
//! - `.toolpack`: zip-arkiv med `manifest.json`, `library.sqlite` och
//!   `attachments/<aa>/<hash>.<ext>`, eventuellt under en gemensam
//!   toppkatalog
//! - `.sqlite`: en ren SQLite-fil utan manifest och utan blob-lager
//!
//! En fil sparas alltid i samma format som den lästes i.

use std::fs::{self, File};
use std::io::{self, Cursor, Read, Write};
use std::path::Path;

use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use super::blob_store::BlobStore;
use crate::db::{Database, SchemaReport};
use crate::models::Manifest;
use crate::utils::path::{is_safe_relative_path, is_toolpack_file};
use crate::utils::{AppError, AppResult};

pub const MANIFEST_ENTRY: &str = "manifest.json";
pub const DATABASE_ENTRY: &str = "library.sqlite";
pub const ATTACHMENTS_DIR: &str = "attachments/";

pub const TOOLPACK_MIME_TYPE: &str = "application/zip";
pub const LEGACY_MIME_TYPE: &str = "application/x-sqlite3";

/// Standardnivå för Deflate
pub const DEFAULT_COMPRESSION_LEVEL: i64 = 6;

const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// Ren SQLite-fil, bilagor inbäddade i raderna
    Legacy,
    /// Zip-arkiv med manifest och blob-lager
    Toolpack,
}

impl ContainerFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Legacy => "sqlite",
            Self::Toolpack => "toolpack",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Legacy => LEGACY_MIME_TYPE,
            Self::Toolpack => TOOLPACK_MIME_TYPE,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Legacy => "SQLite (äldre format)",
            Self::Toolpack => "Toolpack",
        }
    }
}

/// Resultat av en lyckad inläsning
pub struct DecodedContainer {
    pub database: Database,
    pub blobs: BlobStore,
    pub manifest: Option<Manifest>,
    pub format: ContainerFormat,
    /// Vad schemakontrollen ändrade i databasen
    pub schema_report: SchemaReport,
    /// Bilageposter som inte kunde läsas
    pub skipped_entries: Vec<String>,
}

/// Resultat av en lyckad skrivning
#[derive(Debug, Clone)]
pub struct EncodedContainer {
    pub bytes: Vec<u8>,
    /// Manifestet som skrevs (None för äldre format)
    pub manifest: Option<Manifest>,
}

/// Översikt av en fil utan att läsa in databasen
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub format: ContainerFormat,
    pub manifest: Option<Manifest>,
    /// Katalogprefix i arkivet, tomt om posterna ligger i roten
    pub prefix: String,
    pub database_size: u64,
    pub attachment_count: usize,
    /// Okomprimerad storlek på alla bilagor
    pub attachment_bytes: u64,
}

/// Läs en dokumentfil
///
/// Allt läses in i nya strukturer; vid fel finns inget halvfärdigt
/// tillstånd att städa upp.
pub fn decode(bytes: &[u8], file_name_hint: Option<&str>) -> AppResult<DecodedContainer> {
    if bytes.is_empty() {
        return Err(AppError::malformed("Filen är tom"));
    }

    if looks_like_zip(bytes) {
        return decode_toolpack(bytes);
    }

    if file_name_hint.map(is_toolpack_file).unwrap_or(false) {
        return Err(AppError::malformed("Filen har ändelsen .toolpack men är inget zip-arkiv"));
    }

    decode_legacy(bytes)
}

fn decode_legacy(bytes: &[u8]) -> AppResult<DecodedContainer> {
    let database = open_database(bytes, "Filen")?;
    let schema_report = database.ensure_schema()?;

    info!("Läste SQLite-fil ({} bytes)", bytes.len());

    Ok(DecodedContainer {
        database,
        blobs: BlobStore::new(),
        manifest: None,
        format: ContainerFormat::Legacy,
        schema_report,
        skipped_entries: Vec::new(),
    })
}

fn decode_toolpack(bytes: &[u8]) -> AppResult<DecodedContainer> {
    let mut archive = open_archive(bytes)?;
    let prefix = locate_prefix(&archive)?;

    let manifest = Manifest::parse(&read_entry(&mut archive, &prefix, MANIFEST_ENTRY)?)?;
    let database = open_database(&read_entry(&mut archive, &prefix, DATABASE_ENTRY)?, DATABASE_ENTRY)?;
    let schema_report = database.ensure_schema()?;

    let attachments_prefix = format!("{}{}", prefix, ATTACHMENTS_DIR);
    let mut blobs = BlobStore::new();
    let mut skipped_entries = Vec::new();

    for i in 0..archive.len() {
        let mut file = match archive.by_index(i) {
            Ok(f) => f,
            Err(e) => {
                warn!("Kunde inte läsa arkivpost {}: {}", i, e);
                skipped_entries.push(format!("#{}", i));
                continue;
            }
        };

        let name = file.name().to_string();
        let Some(relative) = name.strip_prefix(&attachments_prefix) else {
            continue;
        };
        if file.is_dir() || relative.is_empty() {
            continue;
        }
        if !is_safe_relative_path(relative) {
            warn!("Hoppar över bilaga med ogiltig sökväg: {}", name);
            skipped_entries.push(name);
            continue;
        }

        let mut data = Vec::new();
        if let Err(e) = file.read_to_end(&mut data) {
            warn!("Kunde inte läsa bilaga {}: {}", name, e);
            skipped_entries.push(name);
            continue;
        }

        blobs.insert_raw(relative.to_string(), data);
    }

    info!(
        "Läste toolpack {} ({} bilagor, {} överhoppade)",
        manifest.library_id,
        blobs.len(),
        skipped_entries.len()
    );

    Ok(DecodedContainer {
        database,
        blobs,
        manifest: Some(manifest),
        format: ContainerFormat::Toolpack,
        schema_report,
        skipped_entries,
    })
}

/// Skriv en dokumentfil i angivet format
///
/// Manifestet behåller bibliotek-ID och skapandetid från `seed` om ett
/// sådant finns.
pub fn encode(
    database: &Database,
    blobs: &BlobStore,
    format: ContainerFormat,
    seed: Option<&Manifest>,
    compression_level: Option<i64>,
) -> AppResult<EncodedContainer> {
    let database_bytes = database.export_bytes()?;

    match format {
        ContainerFormat::Legacy => {
            if !blobs.is_empty() {
                warn!(
                    "{} bilagor i blob-lagret skrivs inte till SQLite-formatet",
                    blobs.len()
                );
            }
            debug!("Skrev SQLite-fil ({} bytes)", database_bytes.len());
            Ok(EncodedContainer {
                bytes: database_bytes,
                manifest: None,
            })
        }
        ContainerFormat::Toolpack => {
            let manifest = Manifest::from_seed(seed);
            let options = entry_options(compression_level);

            let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

            zip.start_file(MANIFEST_ENTRY, options)?;
            zip.write_all(&manifest.to_json()?)?;

            zip.start_file(DATABASE_ENTRY, options)?;
            zip.write_all(&database_bytes)?;

            for (path, data) in blobs.list() {
                zip.start_file(format!("{}{}", ATTACHMENTS_DIR, path), options)?;
                zip.write_all(data)?;
            }

            let bytes = zip.finish()?.into_inner();
            info!(
                "Skrev toolpack {} ({} bilagor, {} bytes)",
                manifest.library_id,
                blobs.len(),
                bytes.len()
            );

            Ok(EncodedContainer {
                bytes,
                manifest: Some(manifest),
            })
        }
    }
}

/// Läs format, manifest och storlekar utan att öppna databasen
pub fn peek(bytes: &[u8], file_name_hint: Option<&str>) -> AppResult<ContainerInfo> {
    if !looks_like_zip(bytes) {
        if file_name_hint.map(is_toolpack_file).unwrap_or(false) {
            return Err(AppError::malformed("Filen har ändelsen .toolpack men är inget zip-arkiv"));
        }
        if !bytes.starts_with(SQLITE_HEADER) {
            return Err(AppError::malformed("Filen är varken ett toolpack-arkiv eller en SQLite-databas"));
        }
        return Ok(ContainerInfo {
            format: ContainerFormat::Legacy,
            manifest: None,
            prefix: String::new(),
            database_size: bytes.len() as u64,
            attachment_count: 0,
            attachment_bytes: 0,
        });
    }

    let mut archive = open_archive(bytes)?;
    let prefix = locate_prefix(&archive)?;
    let manifest = Manifest::parse(&read_entry(&mut archive, &prefix, MANIFEST_ENTRY)?)?;

    let database_name = format!("{}{}", prefix, DATABASE_ENTRY);
    let attachments_prefix = format!("{}{}", prefix, ATTACHMENTS_DIR);
    let mut database_size = 0;
    let mut attachment_count = 0;
    let mut attachment_bytes = 0;

    for i in 0..archive.len() {
        let file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        if file.name() == database_name {
            database_size = file.size();
        } else if file.name().starts_with(&attachments_prefix) {
            attachment_count += 1;
            attachment_bytes += file.size();
        }
    }

    Ok(ContainerInfo {
        format: ContainerFormat::Toolpack,
        manifest: Some(manifest),
        prefix,
        database_size,
        attachment_count,
        attachment_bytes,
    })
}

/// Packa upp en toolpack till en katalog
///
/// Ett eventuellt toppkatalogprefix tas bort. Returnerar antal filer.
pub fn unpack_to_directory(bytes: &[u8], target_dir: &Path) -> AppResult<usize> {
    if !looks_like_zip(bytes) {
        return Err(AppError::malformed("Endast toolpack-arkiv kan packas upp"));
    }

    let mut archive = open_archive(bytes)?;
    let prefix = locate_prefix(&archive)?;
    fs::create_dir_all(target_dir)?;

    let mut files_written = 0;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let name = file.name().to_string();

        let Some(relative) = name.strip_prefix(&prefix).filter(|r| !r.is_empty()) else {
            continue;
        };
        let relative = relative.trim_end_matches('/');
        if relative.is_empty() {
            continue;
        }
        if file.enclosed_name().is_none() || !is_safe_relative_path(relative) {
            warn!("Hoppar över post med ogiltig sökväg: {}", name);
            continue;
        }

        let target_path = target_dir.join(relative);

        if file.is_dir() {
            fs::create_dir_all(&target_path)?;
        } else {
            if let Some(parent) = target_path.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut outfile = File::create(&target_path)?;
            io::copy(&mut file, &mut outfile)?;
            files_written += 1;
        }
    }

    info!("Packade upp {} filer till {}", files_written, target_dir.display());
    Ok(files_written)
}

/// Packa en uppackad katalog till en toolpack
///
/// Katalogen måste innehålla ett giltigt manifest och en databas. Andra
/// filer än bilagor tas inte med.
pub fn pack_directory(source_dir: &Path, compression_level: Option<i64>) -> AppResult<Vec<u8>> {
    let manifest_path = source_dir.join(MANIFEST_ENTRY);
    let database_path = source_dir.join(DATABASE_ENTRY);

    if !manifest_path.is_file() {
        return Err(AppError::malformed(format!("{} saknas i katalogen", MANIFEST_ENTRY)));
    }
    if !database_path.is_file() {
        return Err(AppError::malformed(format!("{} saknas i katalogen", DATABASE_ENTRY)));
    }

    let manifest_bytes = fs::read(&manifest_path)?;
    Manifest::parse(&manifest_bytes)?;

    let options = entry_options(compression_level);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    zip.start_file(MANIFEST_ENTRY, options)?;
    zip.write_all(&manifest_bytes)?;

    zip.start_file(DATABASE_ENTRY, options)?;
    zip.write_all(&fs::read(&database_path)?)?;

    let attachments_dir = source_dir.join(ATTACHMENTS_DIR.trim_end_matches('/'));
    let mut count = 0;

    if attachments_dir.is_dir() {
        let mut entries: Vec<_> = WalkDir::new(&attachments_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .collect();
        entries.sort_by(|a, b| a.path().cmp(b.path()));

        for entry in entries {
            let path = entry.path();
            let relative = path.strip_prefix(&attachments_dir).unwrap_or(path);
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if !is_safe_relative_path(&relative) {
                warn!("Hoppar över fil med ogiltig sökväg: {}", path.display());
                continue;
            }

            zip.start_file(format!("{}{}", ATTACHMENTS_DIR, relative), options)?;
            zip.write_all(&fs::read(path)?)?;
            count += 1;
        }
    }

    let bytes = zip.finish()?.into_inner();
    info!("Packade {} med {} bilagor", source_dir.display(), count);
    Ok(bytes)
}

fn entry_options(compression_level: Option<i64>) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(compression_level.or(Some(DEFAULT_COMPRESSION_LEVEL)))
}

/// Zip-signatur för lokal filpost eller tomt arkiv
fn looks_like_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(b"PK\x05\x06")
}

fn open_archive(bytes: &[u8]) -> AppResult<ZipArchive<Cursor<&[u8]>>> {
    ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| AppError::malformed(format!("Kunde inte läsa zip-arkivet: {}", e)))
}

fn open_database(bytes: &[u8], what: &str) -> AppResult<Database> {
    Database::from_bytes(bytes).map_err(|e| match e {
        AppError::Database(inner) => {
            AppError::malformed(format!("{} är inte en giltig SQLite-databas: {}", what, inner))
        }
        other => other,
    })
}

/// Hitta katalogprefixet som manifest och databas ligger under
///
/// Antingen ligger de i roten (prefix "") eller under en gemensam
/// toppkatalog som vissa packverktyg lägger till.
fn locate_prefix<R: Read + io::Seek>(archive: &ZipArchive<R>) -> AppResult<String> {
    let names: Vec<&str> = archive.file_names().collect();

    let has = |prefix: &str, entry: &str| names.iter().any(|n| *n == format!("{}{}", prefix, entry));
    let complete = |prefix: &str| has(prefix, MANIFEST_ENTRY) && has(prefix, DATABASE_ENTRY);

    if complete("") {
        return Ok(String::new());
    }
    if has("", MANIFEST_ENTRY) {
        return Err(missing_entry_error("", true));
    }

    let mut tops: Vec<&str> = names
        .iter()
        .filter_map(|n| n.split_once('/').map(|(top, _)| top))
        .filter(|top| !top.is_empty() && *top != "__MACOSX")
        .collect();
    tops.sort_unstable();
    tops.dedup();

    if let [top] = tops.as_slice() {
        let prefix = format!("{}/", top);
        if complete(&prefix) {
            debug!("Arkivet använder toppkatalogen {}", prefix);
            return Ok(prefix);
        }
        return Err(missing_entry_error(&prefix, has(&prefix, MANIFEST_ENTRY)));
    }

    Err(missing_entry_error("", has("", MANIFEST_ENTRY)))
}

fn missing_entry_error(prefix: &str, has_manifest: bool) -> AppError {
    let missing = if has_manifest { DATABASE_ENTRY } else { MANIFEST_ENTRY };
    AppError::malformed(format!("Arkivet saknar {}{}", prefix, missing))
}

fn read_entry<R: Read + io::Seek>(
    archive: &mut ZipArchive<R>,
    prefix: &str,
    entry: &str,
) -> AppResult<Vec<u8>> {
    let name = format!("{}{}", prefix, entry);
    let mut file = archive
        .by_name(&name)
        .map_err(|_| AppError::malformed(format!("Arkivet saknar {}", name)))?;

    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    Ok(data)
}
