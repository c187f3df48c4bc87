//! Kolumnuppsättning för en befintlig tabell
//!
//! Filer från olika versioner har olika kolumner. Frågorna byggs från
//! layouten så att saknade kolumner läses som NULL i stället för att
//! frågan misslyckas.

use rusqlite::Connection;
use std::collections::HashSet;

use crate::utils::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct TableLayout {
    pub table: String,
    columns: HashSet<String>,
}

impl TableLayout {
    /// Läs kolumnerna för en tabell, None om tabellen saknas
    pub fn probe(conn: &Connection, table: &str) -> AppResult<Option<Self>> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?)",
            [table],
            |row| row.get(0),
        )?;

        if !exists {
            return Ok(None);
        }

        let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?)")?;
        let columns = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|c| c.to_uppercase())
            .collect();

        Ok(Some(Self {
            table: table.to_string(),
            columns,
        }))
    }

    /// Som `probe` men saknad tabell är ett schemafel
    pub fn require(conn: &Connection, table: &str) -> AppResult<Self> {
        Self::probe(conn, table)?
            .ok_or_else(|| AppError::schema_mismatch(format!("Tabellen {} saknas", table)))
    }

    pub fn has(&self, column: &str) -> bool {
        self.columns.contains(&column.to_uppercase())
    }

    /// Kolumnnamnet om det finns, annars `NULL` för användning i SELECT
    pub fn column_or_null(&self, column: &str) -> String {
        self.qualified_or_null(None, column)
    }

    /// Som `column_or_null` men med tabellalias
    pub fn qualified_or_null(&self, alias: Option<&str>, column: &str) -> String {
        match (self.has(column), alias) {
            (true, Some(a)) => format!("{}.{}", a, column),
            (true, None) => column.to_string(),
            (false, _) => "NULL".to_string(),
        }
    }

    /// Första kolumnen i listan som finns
    pub fn first_of(&self, candidates: &[&'static str]) -> Option<&'static str> {
        candidates.iter().copied().find(|c| self.has(c))
    }
}
