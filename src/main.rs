//! Toolpack - kommandoradsverktyg
//!
//! Läser och skriver `.toolpack`- och `.sqlite`-dokument.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use toolpack::db::{CategoryFilter, NoteFilter, ProductFilter};
use toolpack::models::{AttachmentLookup, EditorSettings, PDF_MIME_TYPE};
use toolpack::services::container;
use toolpack::utils::date::format_timestamp;
use toolpack::utils::path::{is_pdf_file, sanitize_filename};
use toolpack::{AppError, Session};

/// Antal tecken av innehållet som visas i listor
const EXCERPT_CHARS: usize = 80;

#[derive(Parser)]
#[command(name = "toolpack", version, about = "Dokumentlager för anteckningar, produkter och PDF-bilagor")]
struct Cli {
    /// Visa debug-loggning
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Visa översikt av ett dokument
    Info {
        file: PathBuf,
    },

    /// Lista anteckningar eller produkter
    List {
        file: PathBuf,

        /// Lista produkter i stället för anteckningar
        #[arg(short, long)]
        products: bool,

        /// Fritextsökning
        #[arg(short, long, default_value = "")]
        query: String,

        /// Endast anteckningar i kategorin
        #[arg(short, long, conflicts_with = "uncategorized")]
        category: Option<i64>,

        /// Endast anteckningar utan kategori
        #[arg(short, long)]
        uncategorized: bool,

        /// Endast poster med bilaga
        #[arg(long)]
        with_pdf: bool,
    },

    /// Visa en anteckning eller produkt
    Show {
        file: PathBuf,
        id: i64,

        #[arg(short, long)]
        product: bool,
    },

    /// Bifoga en PDF och spara dokumentet
    Attach {
        file: PathBuf,
        id: i64,
        pdf: PathBuf,

        #[arg(short, long)]
        product: bool,
    },

    /// Ta bort en bilaga och spara dokumentet
    Detach {
        file: PathBuf,
        id: i64,

        #[arg(short, long)]
        product: bool,
    },

    /// Spara en bilaga till fil
    Extract {
        file: PathBuf,
        id: i64,

        #[arg(short, long)]
        product: bool,

        /// Målfil (standard: bilagans filnamn)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Ta bort bilagor som ingen post pekar på
    Prune {
        file: PathBuf,
    },

    /// Flytta inbäddade bilagor till blob-lagret
    Externalize {
        file: PathBuf,
    },

    /// Skapa ett nytt tomt dokument
    New {
        /// Filnamn (standard från inställningarna)
        file: Option<PathBuf>,
    },

    /// Packa upp en toolpack till en katalog
    Unpack {
        file: PathBuf,
        dir: PathBuf,
    },

    /// Packa en katalog till en toolpack
    Pack {
        dir: PathBuf,
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    let settings = EditorSettings::load();

    // Initiera logging
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            settings.tracing_level()
        })
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli, &settings) {
        match e.downcast_ref::<AppError>() {
            Some(app_error) => eprintln!("fel: {}", app_error.user_message()),
            None => eprintln!("fel: {:#}", e),
        }
        process::exit(1);
    }
}

fn run(cli: Cli, settings: &EditorSettings) -> Result<()> {
    match cli.command {
        Commands::Info { file } => cmd_info(settings, &file),
        Commands::List {
            file,
            products,
            query,
            category,
            uncategorized,
            with_pdf,
        } => {
            let has_attachment = if with_pdf { Some(true) } else { None };
            if products {
                cmd_list_products(
                    settings,
                    &file,
                    ProductFilter {
                        query,
                        has_attachment,
                        ..Default::default()
                    },
                )
            } else {
                let category = match (category, uncategorized) {
                    (Some(id), _) => CategoryFilter::Category(id),
                    (None, true) => CategoryFilter::Uncategorized,
                    (None, false) => CategoryFilter::All,
                };
                cmd_list_notes(
                    settings,
                    &file,
                    NoteFilter {
                        query,
                        category,
                        has_attachment,
                        ..Default::default()
                    },
                )
            }
        }
        Commands::Show { file, id, product } => cmd_show(settings, &file, id, product),
        Commands::Attach { file, id, pdf, product } => cmd_attach(settings, &file, id, &pdf, product),
        Commands::Detach { file, id, product } => cmd_detach(settings, &file, id, product),
        Commands::Extract {
            file,
            id,
            product,
            output,
        } => cmd_extract(settings, &file, id, product, output),
        Commands::Prune { file } => cmd_prune(settings, &file),
        Commands::Externalize { file } => cmd_externalize(settings, &file),
        Commands::New { file } => {
            let file = file.unwrap_or_else(|| PathBuf::from(&settings.default_document_name));
            cmd_new(settings, &file)
        }
        Commands::Unpack { file, dir } => cmd_unpack(&file, &dir),
        Commands::Pack { dir, file } => cmd_pack(settings, &dir, &file),
    }
}

fn open_session(settings: &EditorSettings, path: &Path) -> Result<Session> {
    let bytes = fs::read(path).with_context(|| format!("Kunde inte läsa {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut session = Session::with_settings(settings);
    session.load(&bytes, &file_name)?;

    for entry in &session.document()?.skipped_entries {
        eprintln!("varning: hoppade över {}", entry);
    }
    Ok(session)
}

fn save_session(session: &mut Session, path: &Path) -> Result<()> {
    let encoded = session.save()?;
    write_atomic(path, &encoded.bytes)
}

/// Skriv via en temporär fil i samma katalog så att målet aldrig lämnas halvskrivet
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Kunde inte skapa temporär fil i {}", dir.display()))?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path)
        .with_context(|| format!("Kunde inte skriva {}", path.display()))?;

    Ok(())
}

fn cmd_info(settings: &EditorSettings, path: &Path) -> Result<()> {
    let session = open_session(settings, path)?;
    let summary = session.summary()?;

    println!("Fil:          {}", summary.file_name);
    println!("Format:       {}", summary.format.display_name());
    if let Some(id) = summary.library_id {
        println!("Bibliotek:    {}", id);
    }
    if let Some(created) = summary.created_at {
        println!("Skapad:       {}", created.format("%Y-%m-%d %H:%M"));
    }
    println!("Kategorier:   {}", summary.categories);
    for category in session.categories()?.find_all()? {
        println!("  {}", category.display_name());
    }
    println!("Anteckningar: {}", summary.notes);
    println!("Produkter:    {}", summary.products);
    println!("Blobbar:      {} ({} bytes)", summary.blobs, summary.blob_bytes);
    if summary.inline_attachments > 0 {
        println!("Inbäddade:    {}", summary.inline_attachments);
    }
    if summary.missing_attachments > 0 {
        println!("Saknas:       {}", summary.missing_attachments);
    }
    if summary.unreferenced_blobs > 0 {
        println!("Oanvända:     {}", summary.unreferenced_blobs);
    }

    Ok(())
}

fn cmd_list_notes(settings: &EditorSettings, path: &Path, filter: NoteFilter) -> Result<()> {
    let session = open_session(settings, path)?;
    let items = session.notes()?.search(&filter)?;

    if items.is_empty() {
        println!("Inga anteckningar.");
        return Ok(());
    }

    for item in &items {
        let marker = if item.note.has_attachment() { "📎" } else { "  " };
        println!(
            "{:>5} {} {:<40} [{}]",
            item.note.id.unwrap_or_default(),
            marker,
            item.note.title,
            item.category_name
        );
        let excerpt = item.note.excerpt(EXCERPT_CHARS);
        if !excerpt.is_empty() {
            println!("{:>8} {}", "", excerpt.replace('\n', " "));
        }
    }
    Ok(())
}

fn cmd_list_products(settings: &EditorSettings, path: &Path, filter: ProductFilter) -> Result<()> {
    let session = open_session(settings, path)?;
    let products = session.products()?.search(&filter)?;

    if products.is_empty() {
        println!("Inga produkter.");
        return Ok(());
    }

    for product in &products {
        let marker = if product.has_attachment() { "📎" } else { "  " };
        println!(
            "{:>5} {} {:<40} {}",
            product.id.unwrap_or_default(),
            marker,
            product.name,
            product.manufacturer
        );
        let excerpt = product.excerpt(EXCERPT_CHARS);
        if !excerpt.is_empty() {
            println!("{:>8} {}", "", excerpt.replace('\n', " "));
        }
    }
    Ok(())
}

fn cmd_show(settings: &EditorSettings, path: &Path, id: i64, product: bool) -> Result<()> {
    let session = open_session(settings, path)?;

    let (created_at, attachment) = if product {
        let p = session
            .products()?
            .find_by_id(id)?
            .ok_or_else(|| AppError::not_found(format!("Produkt {}", id)))?;
        println!("# {}", p.name);
        if !p.manufacturer.is_empty() {
            println!("Tillverkare: {}", p.manufacturer);
        }
        println!("\n{}", p.specifications);
        if !p.installation_notes.is_empty() {
            println!("\n## Installation\n\n{}", p.installation_notes);
        }
        (p.created_at, p.attachment)
    } else {
        let n = session
            .notes()?
            .find_by_id(id)?
            .ok_or_else(|| AppError::not_found(format!("Anteckning {}", id)))?;
        let categories = session.categories()?;
        let category = match n.category_id.map(|c| categories.find_by_id(c)).transpose()?.flatten() {
            Some(c) => c.display_name(),
            None => categories.name_of(None)?,
        };
        println!("# {}", n.title);
        println!("Kategori: {}", category);
        if !n.get_tags_list().is_empty() {
            println!("Taggar: {}", n.get_tags_list().join(", "));
        }
        println!("\n{}", n.content);
        (n.created_at, n.attachment)
    };

    if let Some(created) = created_at {
        println!("\nSkapad: {}", format_timestamp(created));
    }
    if let Some(a) = attachment {
        let lookup = if product {
            session.product_attachment(id)?
        } else {
            session.note_attachment(id)?
        };
        let status = if lookup.is_missing() { " (filen hittades inte)" } else { "" };
        println!("Bilaga: {} ({}){}", a.file_name(), a.size_display(), status);
    }

    Ok(())
}

fn cmd_attach(settings: &EditorSettings, path: &Path, id: i64, pdf: &Path, product: bool) -> Result<()> {
    let mut session = open_session(settings, path)?;
    let data = fs::read(pdf).with_context(|| format!("Kunde inte läsa {}", pdf.display()))?;
    let file_name = pdf
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let mime_type = if is_pdf_file(pdf) {
        PDF_MIME_TYPE
    } else {
        "application/octet-stream"
    };

    let storage = if product {
        session.attach_to_product(id, &data, &file_name, mime_type)?
    } else {
        session.attach_to_note(id, &data, &file_name, mime_type)?
    };
    save_session(&mut session, path)?;

    match storage.relative_path() {
        Some(p) => println!("Bifogade {} som {}", storage.file_name(), p),
        None => println!("Bifogade {} (inbäddad)", storage.file_name()),
    }
    Ok(())
}

fn cmd_detach(settings: &EditorSettings, path: &Path, id: i64, product: bool) -> Result<()> {
    let mut session = open_session(settings, path)?;
    let removed = if product {
        session.remove_product_attachment(id)?
    } else {
        session.remove_note_attachment(id)?
    };

    match removed {
        Some(storage) => {
            save_session(&mut session, path)?;
            println!("Tog bort bilagan {}.", storage.file_name());
        }
        None => println!("Posten har ingen bilaga."),
    }
    Ok(())
}

fn cmd_extract(
    settings: &EditorSettings,
    path: &Path,
    id: i64,
    product: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let session = open_session(settings, path)?;
    let lookup = if product {
        session.product_attachment(id)?
    } else {
        session.note_attachment(id)?
    };

    match lookup {
        AttachmentLookup::None => println!("Posten har ingen bilaga."),
        AttachmentLookup::Missing { relative_path, .. } => {
            return Err(AppError::AttachmentNotFound(relative_path).into());
        }
        AttachmentLookup::Available(file) => {
            let target = output.unwrap_or_else(|| PathBuf::from(sanitize_filename(&file.file_name)));
            write_atomic(&target, &file.data)?;
            println!("Sparade {} ({} bytes)", target.display(), file.data.len());
        }
    }
    Ok(())
}

fn cmd_prune(settings: &EditorSettings, path: &Path) -> Result<()> {
    let mut session = open_session(settings, path)?;
    let removed = session.prune_unreferenced_blobs()?;
    if removed > 0 {
        save_session(&mut session, path)?;
    }
    println!("Tog bort {} oanvända bilagor.", removed);
    Ok(())
}

fn cmd_externalize(settings: &EditorSettings, path: &Path) -> Result<()> {
    let mut session = open_session(settings, path)?;
    let moved = session.externalize_inline_attachments()?;
    if moved > 0 {
        save_session(&mut session, path)?;
    }
    println!("Flyttade {} bilagor.", moved);
    Ok(())
}

fn cmd_new(settings: &EditorSettings, path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("{} finns redan", path.display());
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut session = Session::with_settings(settings);
    session.create_document(&file_name)?;
    save_session(&mut session, path)?;

    println!("Skapade {}", path.display());
    Ok(())
}

fn cmd_unpack(path: &Path, dir: &Path) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("Kunde inte läsa {}", path.display()))?;
    let count = container::unpack_to_directory(&bytes, dir)?;
    println!("Packade upp {} filer till {}", count, dir.display());
    Ok(())
}

fn cmd_pack(settings: &EditorSettings, dir: &Path, path: &Path) -> Result<()> {
    let bytes = container::pack_directory(dir, settings.compression_level)?;
    write_atomic(path, &bytes)?;

    let info = container::peek(&bytes, None)?;
    println!(
        "Skapade {} ({} bilagor, {} bytes)",
        path.display(),
        info.attachment_count,
        bytes.len()
    );
    Ok(())
}
