use rusqlite::Connection;
use tracing::{debug, info};

use super::layout::TableLayout;
use super::schema::{TableSpec, INLINE_COLUMNS, REFERENCE_COLUMNS, TABLES};
use crate::utils::{AppError, AppResult};

/// Vad `ensure_schema` ändrade
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReport {
    pub created_tables: Vec<String>,
    /// (tabell, kolumn)
    pub added_columns: Vec<(String, String)>,
}

impl SchemaReport {
    pub fn is_unchanged(&self) -> bool {
        self.created_tables.is_empty() && self.added_columns.is_empty()
    }
}

/// Hur en bilaga ska skrivas till en rad
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentLayout {
    Reference,
    Inline,
}

/// Se till att alla tabeller finns och kan läsas
///
/// Saknade tabeller skapas med aktuell kolumnuppsättning. Saknade skalära
/// kolumner läggs till som nullbara. Bilagekolumner lämnas orörda; de
/// läggs till först när en bilaga av motsvarande slag skrivs.
pub fn ensure_schema(conn: &Connection) -> AppResult<SchemaReport> {
    let mut report = SchemaReport::default();

    for spec in TABLES {
        match TableLayout::probe(conn, spec.name)? {
            None => {
                info!("Tabellen {} saknas, skapar den", spec.name);
                conn.execute_batch(spec.create_sql)?;
                report.created_tables.push(spec.name.to_string());
            }
            Some(layout) => {
                check_required(&layout, spec)?;

                for (column, sql_type) in spec.scalar_columns {
                    if !layout.has(column) {
                        add_column(conn, spec.name, column, sql_type)?;
                        report.added_columns.push((spec.name.to_string(), column.to_string()));
                    }
                }
            }
        }
    }

    if report.is_unchanged() {
        debug!("Schemat är komplett");
    } else {
        info!(
            "Schemat uppdaterat: {} nya tabeller, {} nya kolumner",
            report.created_tables.len(),
            report.added_columns.len()
        );
    }

    Ok(report)
}

fn check_required(layout: &TableLayout, spec: &TableSpec) -> AppResult<()> {
    for alternatives in spec.required {
        if layout.first_of(alternatives).is_none() {
            return Err(AppError::schema_mismatch(format!(
                "Tabellen {} saknar kolumnen {}",
                spec.name,
                alternatives.join(" eller ")
            )));
        }
    }
    Ok(())
}

/// Lägg till de bilagekolumner som behövs för en viss lagringsform
pub fn ensure_attachment_columns(
    conn: &Connection,
    table: &str,
    kind: AttachmentLayout,
) -> AppResult<TableLayout> {
    let layout = TableLayout::require(conn, table)?;
    let wanted = match kind {
        AttachmentLayout::Reference => REFERENCE_COLUMNS,
        AttachmentLayout::Inline => INLINE_COLUMNS,
    };

    let mut changed = false;
    for (column, sql_type) in wanted {
        if !layout.has(column) {
            add_column(conn, table, column, sql_type)?;
            changed = true;
        }
    }

    if changed {
        TableLayout::require(conn, table)
    } else {
        Ok(layout)
    }
}

fn add_column(conn: &Connection, table: &str, column: &str, sql_type: &str) -> AppResult<()> {
    info!("Lägger till kolumnen {}.{}", table, column);
    conn.execute_batch(&format!(
        "ALTER TABLE {} ADD COLUMN {} {};",
        table, column, sql_type
    ))?;
    Ok(())
}
