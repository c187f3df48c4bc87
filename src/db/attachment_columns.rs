//! Läsning och skrivning av bilagekolumner för anteckningar och produkter
//!
//! Bilagan tolkas per rad: en icke-tom `ZPDFPATH` ger en referens in i
//! blob-lagret, annars ger `ZPDFDATA` (blob eller base64-text) en
//! inbäddad bilaga, annars finns ingen bilaga.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection, Row};

use super::layout::TableLayout;
use super::migrations::{ensure_attachment_columns, AttachmentLayout};
use super::schema::*;
use crate::models::{AttachmentRef, AttachmentStorage, PDF_MIME_TYPE};
use crate::utils::hash::is_sha256_hex;
use crate::utils::AppResult;

/// Filnamn för inbäddade bilagor som saknar namn
pub const FALLBACK_FILE_NAME: &str = "document.pdf";

/// SELECT-fragment med bilagekolumnerna, NULL för de som saknas
pub fn select_list(layout: &TableLayout, alias: Option<&str>) -> String {
    ATTACHMENT_SELECT_COLUMNS
        .iter()
        .map(|c| layout.qualified_or_null(alias, c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Villkor som är sant när raden har en bilaga
///
/// Tomma värden räknas som ingen bilaga, samma regel som `read_storage`.
pub fn present_condition(layout: &TableLayout, alias: Option<&str>) -> String {
    let column = |c: &str| match alias {
        Some(a) => format!("{}.{}", a, c),
        None => c.to_string(),
    };

    let mut parts = Vec::new();
    if layout.has(COL_PDF_PATH) {
        let path = column(COL_PDF_PATH);
        parts.push(format!("({0} IS NOT NULL AND {0} != '')", path));
    }
    if layout.has(COL_PDF_DATA) {
        let data = column(COL_PDF_DATA);
        parts.push(format!("({0} IS NOT NULL AND length({0}) > 0)", data));
    }

    if parts.is_empty() {
        "0".to_string()
    } else {
        format!("({})", parts.join(" OR "))
    }
}

/// Läs bilagan från en rad där `select_list` börjar på `offset`
pub fn read_storage(row: &Row, offset: usize) -> Option<AttachmentStorage> {
    let text = |i: usize| -> Option<String> { row.get::<_, Option<String>>(offset + i).ok().flatten() };

    let file_name = text(0).filter(|s| !s.is_empty());

    if let Some(path) = text(4).filter(|p| !p.is_empty()) {
        let hash = text(3).unwrap_or_else(|| hash_from_path(&path));
        return Some(AttachmentStorage::Referenced(AttachmentRef {
            file_name: file_name.unwrap_or_else(|| file_name_from_path(&path)),
            mime_type: text(1).unwrap_or_else(|| PDF_MIME_TYPE.to_string()),
            size: row.get::<_, Option<i64>>(offset + 2).ok().flatten().unwrap_or(0),
            hash,
            relative_path: path,
        }));
    }

    let data = row.get_ref(offset + 5).ok().and_then(inline_bytes)?;
    Some(AttachmentStorage::Inline {
        file_name: file_name.unwrap_or_else(|| FALLBACK_FILE_NAME.to_string()),
        data,
    })
}

/// Bytes från en ZPDFDATA-cell, som blob eller base64-text
fn inline_bytes(value: ValueRef<'_>) -> Option<Vec<u8>> {
    match value {
        ValueRef::Blob(b) if !b.is_empty() => Some(b.to_vec()),
        ValueRef::Text(t) => {
            let text = std::str::from_utf8(t).ok()?.trim();
            // Data-URL:er förekommer i filer skapade i webbläsaren
            let payload = text.split_once("base64,").map(|(_, p)| p).unwrap_or(text);
            match BASE64.decode(payload) {
                Ok(bytes) if !bytes.is_empty() => Some(bytes),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!("Kunde inte avkoda inbäddad bilaga: {}", e);
                    None
                }
            }
        }
        _ => None,
    }
}

/// Hash ur `<aa>/<hash>.<ext>`, tom sträng om sökvägen inte följer mönstret
fn hash_from_path(path: &str) -> String {
    let file_name = file_name_from_path(path);
    let stem = file_name.split('.').next().unwrap_or_default();
    if is_sha256_hex(stem) {
        stem.to_string()
    } else {
        String::new()
    }
}

fn file_name_from_path(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// Skriv (eller rensa) bilagan för en rad
///
/// Kolumner som krävs för lagringsformen läggs till vid behov. Kolumnerna
/// för den andra lagringsformen nollställs.
pub fn write_storage(
    conn: &Connection,
    table: &str,
    id: i64,
    storage: Option<&AttachmentStorage>,
) -> AppResult<()> {
    let layout = match storage {
        Some(AttachmentStorage::Referenced(_)) => {
            ensure_attachment_columns(conn, table, AttachmentLayout::Reference)?
        }
        Some(AttachmentStorage::Inline { .. }) => {
            ensure_attachment_columns(conn, table, AttachmentLayout::Inline)?
        }
        None => TableLayout::require(conn, table)?,
    };

    let mut values: Vec<(&str, Value)> = match storage {
        Some(AttachmentStorage::Referenced(r)) => vec![
            (COL_PDF_FILENAME, Value::Text(r.file_name.clone())),
            (COL_PDF_MIMETYPE, Value::Text(r.mime_type.clone())),
            (COL_PDF_SIZE, Value::Integer(r.size)),
            (COL_PDF_HASH, Value::Text(r.hash.clone())),
            (COL_PDF_PATH, Value::Text(r.relative_path.clone())),
            (COL_PDF_DATA, Value::Null),
        ],
        Some(AttachmentStorage::Inline { file_name, data }) => vec![
            (COL_PDF_FILENAME, Value::Text(file_name.clone())),
            (COL_PDF_MIMETYPE, Value::Null),
            (COL_PDF_SIZE, Value::Null),
            (COL_PDF_HASH, Value::Null),
            (COL_PDF_PATH, Value::Null),
            (COL_PDF_DATA, Value::Blob(data.clone())),
        ],
        None => ATTACHMENT_SELECT_COLUMNS
            .iter()
            .map(|c| (*c, Value::Null))
            .collect(),
    };

    values.retain(|(column, _)| layout.has(column));
    if values.is_empty() {
        return Ok(());
    }

    let assignments = values
        .iter()
        .enumerate()
        .map(|(i, (column, _))| format!("{} = ?{}", column, i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?{}",
        table,
        assignments,
        PRIMARY_KEY,
        values.len() + 1
    );

    let params = values
        .into_iter()
        .map(|(_, v)| v)
        .chain(std::iter::once(Value::Integer(id)));
    conn.execute(&sql, params_from_iter(params))?;

    Ok(())
}

/// Alla sökvägar i blob-lagret som en tabell refererar till
pub fn referenced_paths(conn: &Connection, table: &str) -> AppResult<Vec<String>> {
    let layout = TableLayout::require(conn, table)?;
    if !layout.has(COL_PDF_PATH) {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT {0} FROM {1} WHERE {0} IS NOT NULL AND {0} != ''",
        COL_PDF_PATH, table
    ))?;
    let paths = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::ensure_schema;

    fn read_note_storage(conn: &Connection, id: i64) -> Option<AttachmentStorage> {
        let layout = TableLayout::require(conn, NOTE_TABLE).unwrap();
        conn.query_row(
            &format!("SELECT {} FROM ZINFOITEM WHERE Z_PK = ?", select_list(&layout, None)),
            [id],
            |row| Ok(read_storage(row, 0)),
        )
        .unwrap()
    }

    fn legacy_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE ZINFOITEM (Z_PK INTEGER PRIMARY KEY, Z_ENT INTEGER, Z_OPT INTEGER,
                                     ZTITLE TEXT, ZCONTENT TEXT, ZPDFDATA BLOB, ZPDFFILENAME TEXT);
             INSERT INTO ZINFOITEM (Z_PK, ZTITLE) VALUES (1, 'Test');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_missing_columns_read_as_no_attachment() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE ZINFOITEM (Z_PK INTEGER PRIMARY KEY, ZTITLE TEXT);
             INSERT INTO ZINFOITEM VALUES (1, 'Test');",
        )
        .unwrap();

        assert!(read_note_storage(&conn, 1).is_none());
        let layout = TableLayout::require(&conn, NOTE_TABLE).unwrap();
        assert_eq!(present_condition(&layout, None), "0");
    }

    #[test]
    fn test_empty_values_do_not_count_as_attachment() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE ZINFOITEM (Z_PK INTEGER PRIMARY KEY, ZTITLE TEXT, ZPDFPATH TEXT, ZPDFDATA BLOB);
             INSERT INTO ZINFOITEM VALUES (1, 'tom sökväg', '', NULL);
             INSERT INTO ZINFOITEM VALUES (2, 'tom blob', NULL, x'');
             INSERT INTO ZINFOITEM VALUES (3, 'riktig', 'ab/x.pdf', NULL);",
        )
        .unwrap();

        let layout = TableLayout::require(&conn, NOTE_TABLE).unwrap();
        let ids: Vec<i64> = conn
            .prepare(&format!(
                "SELECT Z_PK FROM ZINFOITEM WHERE {} ORDER BY Z_PK",
                present_condition(&layout, None)
            ))
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(ids, vec![3]);
        assert!(read_note_storage(&conn, 1).is_none());
        assert!(read_note_storage(&conn, 2).is_none());
    }

    #[test]
    fn test_inline_blob_is_read() {
        let conn = legacy_conn();
        conn.execute(
            "UPDATE ZINFOITEM SET ZPDFDATA = ?, ZPDFFILENAME = 'gammal.pdf' WHERE Z_PK = 1",
            [vec![1u8, 2, 3]],
        )
        .unwrap();

        assert_eq!(
            read_note_storage(&conn, 1),
            Some(AttachmentStorage::Inline {
                file_name: "gammal.pdf".into(),
                data: vec![1, 2, 3],
            })
        );
    }

    #[test]
    fn test_inline_base64_text_is_read() {
        let conn = legacy_conn();
        conn.execute(
            "UPDATE ZINFOITEM SET ZPDFDATA = ? WHERE Z_PK = 1",
            ["data:application/pdf;base64,AQID"],
        )
        .unwrap();

        match read_note_storage(&conn, 1) {
            Some(AttachmentStorage::Inline { file_name, data }) => {
                assert_eq!(file_name, FALLBACK_FILE_NAME);
                assert_eq!(data, vec![1, 2, 3]);
            }
            other => panic!("Fel lagringsform: {:?}", other),
        }
    }

    #[test]
    fn test_write_reference_adds_columns_and_clears_inline() {
        let conn = legacy_conn();
        conn.execute("UPDATE ZINFOITEM SET ZPDFDATA = ? WHERE Z_PK = 1", [vec![9u8]])
            .unwrap();

        let reference = AttachmentRef {
            file_name: "a.pdf".into(),
            mime_type: PDF_MIME_TYPE.into(),
            size: 10,
            hash: "cd".repeat(32),
            relative_path: format!("cd/{}.pdf", "cd".repeat(32)),
        };
        write_storage(
            &conn,
            NOTE_TABLE,
            1,
            Some(&AttachmentStorage::Referenced(reference.clone())),
        )
        .unwrap();

        assert_eq!(
            read_note_storage(&conn, 1),
            Some(AttachmentStorage::Referenced(reference.clone()))
        );
        let inline: Option<Vec<u8>> = conn
            .query_row("SELECT ZPDFDATA FROM ZINFOITEM WHERE Z_PK = 1", [], |r| r.get(0))
            .unwrap();
        assert!(inline.is_none());

        assert_eq!(
            referenced_paths(&conn, NOTE_TABLE).unwrap(),
            vec![reference.relative_path]
        );
    }

    #[test]
    fn test_write_none_clears_everything() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        conn.execute("INSERT INTO ZINFOITEM (Z_PK, ZTITLE) VALUES (1, 'x')", [])
            .unwrap();

        write_storage(
            &conn,
            NOTE_TABLE,
            1,
            Some(&AttachmentStorage::Inline {
                file_name: "x.pdf".into(),
                data: vec![1],
            }),
        )
        .unwrap();
        assert!(read_note_storage(&conn, 1).unwrap().is_inline());

        write_storage(&conn, NOTE_TABLE, 1, None).unwrap();
        assert!(read_note_storage(&conn, 1).is_none());
    }

    #[test]
    fn test_reference_without_metadata_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE ZINFOITEM (Z_PK INTEGER PRIMARY KEY, ZTITLE TEXT, ZPDFPATH TEXT);",
        )
        .unwrap();
        let hash = "ef".repeat(32);
        conn.execute(
            "INSERT INTO ZINFOITEM VALUES (1, 'x', ?)",
            [format!("ef/{}.pdf", hash)],
        )
        .unwrap();

        match read_note_storage(&conn, 1) {
            Some(AttachmentStorage::Referenced(r)) => {
                assert_eq!(r.hash, hash);
                assert_eq!(r.file_name, format!("{}.pdf", hash));
                assert_eq!(r.mime_type, PDF_MIME_TYPE);
            }
            other => panic!("Fel lagringsform: {:?}", other),
        }
    }
}
