use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

use super::attachment_columns::{self, read_storage, write_storage};
use super::layout::TableLayout;
use super::schema::{ENTITY_OPTION, NOTE_ENTITY, NOTE_TABLE};
use super::{lock, next_id};
use crate::models::{AttachmentStorage, Note, NoteListItem, UNCATEGORIZED};
use crate::utils::date::reference_timestamp_now;
use crate::utils::{AppError, AppResult};

/// Filtrering på kategori
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    /// Utan kategori eller med en kategori som inte längre finns
    Uncategorized,
    Category(i64),
}

/// Sortering av anteckningslistan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoteSort {
    /// Högst ID först
    #[default]
    NewestFirst,
    Title,
    MostViewed,
}

/// Sökfilter för anteckningslistan
#[derive(Debug, Default, Clone)]
pub struct NoteFilter {
    /// Fritextsökning (titel, innehåll, taggar)
    pub query: String,
    pub category: CategoryFilter,
    /// Endast med/utan bilaga (None = alla)
    pub has_attachment: Option<bool>,
    pub sort: NoteSort,
}

impl NoteFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

pub struct NoteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl NoteRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Hämta alla anteckningar, nyast först
    pub fn find_all(&self) -> AppResult<Vec<Note>> {
        Ok(self
            .search(&NoteFilter::default())?
            .into_iter()
            .map(|item| item.note)
            .collect())
    }

    /// Sök anteckningar med kategorinamn upplöst
    pub fn search(&self, filter: &NoteFilter) -> AppResult<Vec<NoteListItem>> {
        let conn = lock(&self.conn)?;
        let layout = TableLayout::require(&conn, NOTE_TABLE)?;

        let mut sql = Self::select_sql(&layout);
        sql.push_str(" WHERE 1=1");

        let mut params_vec: Vec<rusqlite::types::Value> = Vec::new();

        // Fritextsökning
        if !filter.query.trim().is_empty() {
            params_vec.push(format!("%{}%", filter.query.trim()).into());
            sql.push_str(&format!(
                " AND (n.ZTITLE LIKE ?{0} OR {1} LIKE ?{0} OR {2} LIKE ?{0})",
                params_vec.len(),
                layout.qualified_or_null(Some("n"), "ZCONTENT"),
                layout.qualified_or_null(Some("n"), "ZTAGS"),
            ));
        }

        match filter.category {
            CategoryFilter::All => {}
            CategoryFilter::Uncategorized => {
                sql.push_str(" AND c.Z_PK IS NULL");
            }
            CategoryFilter::Category(id) => {
                params_vec.push(id.into());
                sql.push_str(&format!(" AND c.Z_PK = ?{}", params_vec.len()));
            }
        }

        if let Some(has) = filter.has_attachment {
            let present = attachment_columns::present_condition(&layout, Some("n"));
            if has {
                sql.push_str(&format!(" AND {}", present));
            } else {
                sql.push_str(&format!(" AND NOT {}", present));
            }
        }

        sql.push_str(match filter.sort {
            NoteSort::NewestFirst => " ORDER BY n.Z_PK DESC",
            NoteSort::Title => " ORDER BY n.ZTITLE COLLATE NOCASE, n.Z_PK",
            NoteSort::MostViewed => " ORDER BY COALESCE(n.ZVIEWCOUNT, 0) DESC, n.Z_PK DESC",
        });

        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(rusqlite::params_from_iter(params_vec), |row| {
                let category_name: Option<String> = row.get(7).ok().flatten();
                Ok(NoteListItem {
                    note: Self::row_to_note(row),
                    category_name: category_name
                        .filter(|n| !n.is_empty())
                        .unwrap_or_else(|| UNCATEGORIZED.to_string()),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(items)
    }

    /// Hämta anteckning via ID
    pub fn find_by_id(&self, id: i64) -> AppResult<Option<Note>> {
        let conn = lock(&self.conn)?;
        let layout = TableLayout::require(&conn, NOTE_TABLE)?;
        let sql = format!("{} WHERE n.Z_PK = ?", Self::select_sql(&layout));

        let note = conn
            .query_row(&sql, [id], |row| Ok(Self::row_to_note(row)))
            .optional()?;

        Ok(note)
    }

    /// Skapa anteckning med nästa lediga ID
    pub fn create(&self, note: &mut Note) -> AppResult<i64> {
        Self::validate(note)?;

        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;

        let id = next_id(&tx, NOTE_TABLE)?;
        let created_at = note.created_at.unwrap_or_else(reference_timestamp_now);
        tx.execute(
            "INSERT INTO ZINFOITEM (Z_PK, Z_ENT, Z_OPT, ZTITLE, ZCONTENT, ZCATEGORY, ZTAGS,
                                    ZVIEWCOUNT, ZCREATEDDATE)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                NOTE_ENTITY,
                ENTITY_OPTION,
                note.title.trim(),
                note.content,
                note.category_id,
                note.tags,
                note.view_count,
                created_at,
            ],
        )?;

        if note.attachment.is_some() {
            write_storage(&tx, NOTE_TABLE, id, note.attachment.as_ref())?;
        }
        tx.commit()?;

        note.id = Some(id);
        note.created_at = Some(created_at);
        Ok(id)
    }

    /// Uppdatera anteckning inklusive bilaga
    pub fn update(&self, note: &Note) -> AppResult<()> {
        let id = note
            .id
            .ok_or_else(|| AppError::validation("Anteckningen har inget ID"))?;
        Self::validate(note)?;

        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;

        let rows = tx.execute(
            "UPDATE ZINFOITEM SET ZTITLE = ?1, ZCONTENT = ?2, ZCATEGORY = ?3, ZTAGS = ?4
             WHERE Z_PK = ?5",
            params![note.title.trim(), note.content, note.category_id, note.tags, id],
        )?;
        if rows == 0 {
            return Err(AppError::not_found(format!("Anteckning {}", id)));
        }

        write_storage(&tx, NOTE_TABLE, id, note.attachment.as_ref())?;
        tx.commit()?;

        Ok(())
    }

    /// Byt eller ta bort bilagan utan att röra övriga fält
    pub fn set_attachment(&self, id: i64, attachment: Option<&AttachmentStorage>) -> AppResult<()> {
        let conn = lock(&self.conn)?;
        Self::ensure_exists(&conn, id)?;
        write_storage(&conn, NOTE_TABLE, id, attachment)
    }

    /// Ta bort anteckning
    pub fn delete(&self, id: i64) -> AppResult<()> {
        let conn = lock(&self.conn)?;
        conn.execute("DELETE FROM ZINFOITEM WHERE Z_PK = ?", [id])?;
        Ok(())
    }

    /// Räkna anteckningar
    pub fn count(&self) -> AppResult<i64> {
        let conn = lock(&self.conn)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM ZINFOITEM", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Sökvägar i blob-lagret som anteckningarna refererar till
    pub fn referenced_paths(&self) -> AppResult<Vec<String>> {
        let conn = lock(&self.conn)?;
        attachment_columns::referenced_paths(&conn, NOTE_TABLE)
    }

    fn ensure_exists(conn: &Connection, id: i64) -> AppResult<()> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM ZINFOITEM WHERE Z_PK = ?)",
            [id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(AppError::not_found(format!("Anteckning {}", id)));
        }
        Ok(())
    }

    fn validate(note: &Note) -> AppResult<()> {
        if note.title.trim().is_empty() {
            return Err(AppError::validation("Titel krävs"));
        }
        Ok(())
    }

    fn select_sql(layout: &TableLayout) -> String {
        let n = Some("n");
        format!(
            "SELECT n.Z_PK, n.ZTITLE, {}, {}, {}, {}, {}, c.ZNAME, {}
             FROM ZINFOITEM n
             LEFT JOIN ZINFOCATEGORY c ON n.ZCATEGORY = c.Z_PK",
            layout.qualified_or_null(n, "ZCONTENT"),
            layout.qualified_or_null(n, "ZCATEGORY"),
            layout.qualified_or_null(n, "ZTAGS"),
            layout.qualified_or_null(n, "ZVIEWCOUNT"),
            layout.qualified_or_null(n, "ZCREATEDDATE"),
            attachment_columns::select_list(layout, n),
        )
    }

    fn row_to_note(row: &Row) -> Note {
        Note {
            id: row.get(0).ok(),
            title: row.get::<_, Option<String>>(1).ok().flatten().unwrap_or_default(),
            content: row.get::<_, Option<String>>(2).ok().flatten().unwrap_or_default(),
            category_id: row.get::<_, Option<i64>>(3).ok().flatten(),
            tags: row.get::<_, Option<String>>(4).ok().flatten(),
            view_count: row.get::<_, Option<i64>>(5).ok().flatten().unwrap_or(0),
            created_at: row.get::<_, Option<f64>>(6).ok().flatten(),
            attachment: read_storage(row, 8),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{AttachmentRef, Category, PDF_MIME_TYPE};

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn sample_ref() -> AttachmentStorage {
        let hash = "ab".repeat(32);
        AttachmentStorage::Referenced(AttachmentRef {
            file_name: "a.pdf".into(),
            mime_type: PDF_MIME_TYPE.into(),
            size: 10,
            relative_path: format!("ab/{}.pdf", hash),
            hash,
        })
    }

    #[test]
    fn test_create_and_find() {
        let db = setup_db();
        let mut note = Note::new("Test", "# Rubrik");
        let id = db.notes().create(&mut note).unwrap();
        assert_eq!(id, 1);
        assert!(note.created_at.is_some());

        let found = db.notes().find_by_id(id).unwrap().unwrap();
        assert_eq!(found.title, "Test");
        assert_eq!(found.content, "# Rubrik");
        assert_eq!(found.view_count, 0);
        assert!(found.attachment.is_none());
    }

    #[test]
    fn test_empty_title_is_rejected_and_state_unchanged() {
        let db = setup_db();
        let mut note = Note::new("  ", "innehåll");
        let err = db.notes().create(&mut note).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(db.notes().count().unwrap(), 0);

        let mut ok = Note::new("Ok", "");
        db.notes().create(&mut ok).unwrap();
        let mut edited = ok.clone();
        edited.title = String::new();
        assert!(db.notes().update(&edited).is_err());
        assert_eq!(db.notes().find_by_id(1).unwrap().unwrap().title, "Ok");
    }

    #[test]
    fn test_update_and_delete() {
        let db = setup_db();
        let mut note = Note::new("Före", "");
        db.notes().create(&mut note).unwrap();

        note.title = "Efter".into();
        note.attachment = Some(sample_ref());
        db.notes().update(&note).unwrap();

        let found = db.notes().find_by_id(1).unwrap().unwrap();
        assert_eq!(found.title, "Efter");
        assert_eq!(found.attachment, Some(sample_ref()));

        db.notes().delete(1).unwrap();
        assert!(db.notes().find_by_id(1).unwrap().is_none());
    }

    #[test]
    fn test_set_attachment_independently() {
        let db = setup_db();
        let mut note = Note::new("Test", "text");
        db.notes().create(&mut note).unwrap();

        db.notes().set_attachment(1, Some(&sample_ref())).unwrap();
        assert!(db.notes().find_by_id(1).unwrap().unwrap().has_attachment());

        db.notes().set_attachment(1, None).unwrap();
        let found = db.notes().find_by_id(1).unwrap().unwrap();
        assert!(!found.has_attachment());
        assert_eq!(found.content, "text");

        assert!(matches!(
            db.notes().set_attachment(99, None).unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[test]
    fn test_search_resolves_category_names() {
        let db = setup_db();
        let mut cat = Category::new("Verktyg", "🔧");
        let cat_id = db.categories().create(&mut cat).unwrap();

        let mut with_cat = Note::new("Borr", "slagborr");
        with_cat.category_id = Some(cat_id);
        db.notes().create(&mut with_cat).unwrap();

        let mut dangling = Note::new("Såg", "");
        dangling.category_id = Some(77);
        db.notes().create(&mut dangling).unwrap();

        db.notes().create(&mut Note::new("Fil", "")).unwrap();

        let all = db.notes().search(&NoteFilter::new()).unwrap();
        let titles: Vec<&str> = all.iter().map(|i| i.note.title.as_str()).collect();
        assert_eq!(titles, vec!["Fil", "Såg", "Borr"]);
        assert_eq!(all[0].category_name, UNCATEGORIZED);
        assert_eq!(all[1].category_name, UNCATEGORIZED);
        assert_eq!(all[2].category_name, "Verktyg");

        let uncategorized = db
            .notes()
            .search(&NoteFilter {
                category: CategoryFilter::Uncategorized,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(uncategorized.len(), 2);

        let in_cat = db
            .notes()
            .search(&NoteFilter {
                category: CategoryFilter::Category(cat_id),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(in_cat.len(), 1);
        assert_eq!(in_cat[0].note.title, "Borr");
    }

    #[test]
    fn test_search_query_attachment_and_sort() {
        let db = setup_db();
        let mut a = Note::new("beta", "kabel");
        a.attachment = Some(sample_ref());
        db.notes().create(&mut a).unwrap();
        db.notes().create(&mut Note::new("Alfa", "rör")).unwrap();

        let hits = db.notes().search(&NoteFilter::with_query("KABEL")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].note.title, "beta");

        let with_pdf = db
            .notes()
            .search(&NoteFilter {
                has_attachment: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(with_pdf.len(), 1);

        let without_pdf = db
            .notes()
            .search(&NoteFilter {
                has_attachment: Some(false),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(without_pdf[0].note.title, "Alfa");

        let by_title = db
            .notes()
            .search(&NoteFilter {
                sort: NoteSort::Title,
                ..Default::default()
            })
            .unwrap();
        let titles: Vec<&str> = by_title.iter().map(|i| i.note.title.as_str()).collect();
        assert_eq!(titles, vec!["Alfa", "beta"]);
    }

    #[test]
    fn test_empty_path_is_not_an_attachment_in_search() {
        let db = setup_db();
        db.notes().create(&mut Note::new("Tom", "")).unwrap();
        db.notes().set_attachment(1, Some(&sample_ref())).unwrap();
        db.with_connection(|conn| {
            conn.execute("UPDATE ZINFOITEM SET ZPDFPATH = '' WHERE Z_PK = 1", [])?;
            Ok(())
        })
        .unwrap();

        let search = |has_attachment| {
            db.notes()
                .search(&NoteFilter {
                    has_attachment: Some(has_attachment),
                    ..Default::default()
                })
                .unwrap()
        };

        assert!(search(true).is_empty());
        let without_pdf = search(false);
        assert_eq!(without_pdf.len(), 1);
        assert!(!without_pdf[0].note.has_attachment());
    }

    #[test]
    fn test_entity_kind_is_note() {
        let db = setup_db();
        db.notes().create(&mut Note::new("x", "")).unwrap();
        let ent: i64 = db
            .with_connection(|conn| {
                Ok(conn.query_row("SELECT Z_ENT FROM ZINFOITEM", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(ent, NOTE_ENTITY);
    }
}
