pub mod schema;
pub mod layout;
pub mod migrations;
pub mod attachment_columns;
pub mod category_repo;
pub mod note_repo;
pub mod product_repo;

use rusqlite::backup::Progress;
use rusqlite::{Connection, DatabaseName};
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::utils::{AppError, AppResult};

pub use category_repo::CategoryRepository;
pub use layout::TableLayout;
pub use migrations::SchemaReport;
pub use note_repo::{CategoryFilter, NoteFilter, NoteRepository, NoteSort};
pub use product_repo::{ProductFilter, ProductRepository, ProductSort};

/// Det relationella lagret för ett öppet dokument
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Tom in-memory databas med aktuellt schema
    pub fn open_in_memory() -> AppResult<Self> {
        let db = Self::from_connection(Connection::open_in_memory()?);
        db.ensure_schema()?;
        Ok(db)
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Läs in en exporterad SQLite-fil till en in-memory databas
    ///
    /// Schemat kontrolleras inte här; anropa `ensure_schema` efteråt.
    pub fn from_bytes(bytes: &[u8]) -> AppResult<Self> {
        if bytes.is_empty() {
            return Err(AppError::malformed("Filen är tom"));
        }

        let mut source = tempfile::NamedTempFile::new()?;
        source.write_all(bytes)?;
        source.flush()?;

        let mut conn = Connection::open_in_memory()?;
        conn.restore(DatabaseName::Main, source.path(), None::<fn(Progress)>)?;

        // Tvinga SQLite att läsa sidhuvudet
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })?;

        Ok(Self::from_connection(conn))
    }

    /// Exportera hela databasen som bytes i SQLite-filformat
    pub fn export_bytes(&self) -> AppResult<Vec<u8>> {
        let target = tempfile::NamedTempFile::new()?;
        {
            let conn = self.lock()?;
            conn.backup(DatabaseName::Main, target.path(), None)?;
        }
        Ok(std::fs::read(target.path())?)
    }

    /// Skapa saknade tabeller och kolumner
    pub fn ensure_schema(&self) -> AppResult<SchemaReport> {
        let conn = self.lock()?;
        migrations::ensure_schema(&conn)
    }

    /// Hämta kategori-repository
    pub fn categories(&self) -> CategoryRepository {
        CategoryRepository::new(Arc::clone(&self.conn))
    }

    /// Hämta antecknings-repository
    pub fn notes(&self) -> NoteRepository {
        NoteRepository::new(Arc::clone(&self.conn))
    }

    /// Hämta produkt-repository
    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(Arc::clone(&self.conn))
    }

    /// Direkt tillgång till connection (för avancerade operationer)
    pub fn with_connection<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Connection) -> AppResult<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        lock(&self.conn)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

pub(crate) fn lock(conn: &Mutex<Connection>) -> AppResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| AppError::other("Databaslåset är förgiftat"))
}

/// Nästa lediga primärnyckel (max + 1)
///
/// Nycklarna sätts av applikationen, inte av SQLite, för att matcha
/// befintliga filer. Kräver att bara en skrivare finns åt gången.
pub(crate) fn next_id(conn: &Connection, table: &str) -> AppResult<i64> {
    let max: i64 = conn.query_row(
        &format!("SELECT COALESCE(MAX({}), 0) FROM {}", schema::PRIMARY_KEY, table),
        [],
        |row| row.get(0),
    )?;
    Ok(max + 1)
}
