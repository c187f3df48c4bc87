use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

use super::layout::TableLayout;
use super::schema::{CATEGORY_ENTITY, CATEGORY_TABLE, ENTITY_OPTION};
use super::{lock, next_id};
use crate::models::{Category, UNCATEGORIZED};
use crate::utils::{AppError, AppResult};

pub struct CategoryRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CategoryRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Hämta alla kategorier sorterade på sorteringsordning och namn
    pub fn find_all(&self) -> AppResult<Vec<Category>> {
        let conn = lock(&self.conn)?;
        let layout = TableLayout::require(&conn, CATEGORY_TABLE)?;
        let sql = format!(
            "{} ORDER BY {}, ZNAME",
            Self::select_sql(&layout),
            layout.column_or_null("ZSORTORDER")
        );
        let mut stmt = conn.prepare(&sql)?;

        let categories = stmt
            .query_map([], |row| Ok(Self::row_to_category(row)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(categories)
    }

    /// Hämta kategori via ID
    pub fn find_by_id(&self, id: i64) -> AppResult<Option<Category>> {
        let conn = lock(&self.conn)?;
        let layout = TableLayout::require(&conn, CATEGORY_TABLE)?;
        let sql = format!("{} WHERE Z_PK = ?", Self::select_sql(&layout));

        let category = conn
            .query_row(&sql, [id], |row| Ok(Self::row_to_category(row)))
            .optional()?;

        Ok(category)
    }

    /// Kategorinamn för visning, "Uncategorized" om ID saknas eller är ogiltigt
    pub fn name_of(&self, id: Option<i64>) -> AppResult<String> {
        let name = match id {
            Some(id) => self.find_by_id(id)?.map(|c| c.name),
            None => None,
        };
        Ok(name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNCATEGORIZED.to_string()))
    }

    /// Skapa kategori med nästa lediga ID
    pub fn create(&self, category: &mut Category) -> AppResult<i64> {
        Self::validate(category)?;

        let conn = lock(&self.conn)?;
        let id = next_id(&conn, CATEGORY_TABLE)?;
        conn.execute(
            "INSERT INTO ZINFOCATEGORY (Z_PK, Z_ENT, Z_OPT, ZNAME, ZICON, ZSORTORDER)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                CATEGORY_ENTITY,
                ENTITY_OPTION,
                category.name.trim(),
                category.icon.trim(),
                category.sort_order,
            ],
        )?;

        category.id = Some(id);
        Ok(id)
    }

    /// Uppdatera kategori
    pub fn update(&self, category: &Category) -> AppResult<()> {
        let id = category
            .id
            .ok_or_else(|| AppError::validation("Kategorin har inget ID"))?;
        Self::validate(category)?;

        let conn = lock(&self.conn)?;
        let rows = conn.execute(
            "UPDATE ZINFOCATEGORY SET ZNAME = ?1, ZICON = ?2, ZSORTORDER = ?3 WHERE Z_PK = ?4",
            params![category.name.trim(), category.icon.trim(), category.sort_order, id],
        )?;

        if rows == 0 {
            return Err(AppError::not_found(format!("Kategori {}", id)));
        }
        Ok(())
    }

    /// Ta bort kategori
    ///
    /// Anteckningar som pekar på kategorin lämnas kvar och visas som
    /// "Uncategorized".
    pub fn delete(&self, id: i64) -> AppResult<()> {
        let conn = lock(&self.conn)?;
        conn.execute("DELETE FROM ZINFOCATEGORY WHERE Z_PK = ?", [id])?;
        Ok(())
    }

    /// Skriv om sorteringsordningen till positionen i listan
    ///
    /// Kategorier som inte finns i listan hamnar efter de listade, i sin
    /// tidigare ordning.
    pub fn reorder(&self, ordered_ids: &[i64]) -> AppResult<()> {
        let current: Vec<i64> = self.find_all()?.into_iter().filter_map(|c| c.id).collect();

        let mut order: Vec<i64> = ordered_ids
            .iter()
            .copied()
            .filter(|id| current.contains(id))
            .collect();
        for id in current {
            if !order.contains(&id) {
                order.push(id);
            }
        }

        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("UPDATE ZINFOCATEGORY SET ZSORTORDER = ?1 WHERE Z_PK = ?2")?;
            for (index, id) in order.iter().enumerate() {
                stmt.execute(params![index as i64, id])?;
            }
        }
        tx.commit()?;

        Ok(())
    }

    /// Räkna kategorier
    pub fn count(&self) -> AppResult<i64> {
        let conn = lock(&self.conn)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM ZINFOCATEGORY", [], |row| row.get(0))?;
        Ok(count)
    }

    fn validate(category: &Category) -> AppResult<()> {
        if category.name.trim().is_empty() {
            return Err(AppError::validation("Kategorinamn krävs"));
        }
        Ok(())
    }

    fn select_sql(layout: &TableLayout) -> String {
        format!(
            "SELECT Z_PK, ZNAME, {}, {} FROM ZINFOCATEGORY",
            layout.column_or_null("ZICON"),
            layout.column_or_null("ZSORTORDER")
        )
    }

    fn row_to_category(row: &Row) -> Category {
        Category {
            id: row.get(0).ok(),
            name: row.get::<_, Option<String>>(1).ok().flatten().unwrap_or_default(),
            icon: row.get::<_, Option<String>>(2).ok().flatten().unwrap_or_default(),
            sort_order: row.get::<_, Option<i64>>(3).ok().flatten().unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::Note;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_create_assigns_max_plus_one() {
        let db = setup_db();
        let repo = db.categories();

        let mut a = Category::new("Verktyg", "🔧");
        let mut b = Category::new("El", "⚡");
        assert_eq!(repo.create(&mut a).unwrap(), 1);
        assert_eq!(repo.create(&mut b).unwrap(), 2);

        repo.delete(1).unwrap();
        let mut c = Category::new("VVS", "🚿");
        assert_eq!(repo.create(&mut c).unwrap(), 3);
    }

    #[test]
    fn test_entity_tags_are_written() {
        let db = setup_db();
        let mut cat = Category::new("Verktyg", "🔧");
        db.categories().create(&mut cat).unwrap();

        let (ent, opt): (i64, i64) = db
            .with_connection(|conn| {
                Ok(conn.query_row(
                    "SELECT Z_ENT, Z_OPT FROM ZINFOCATEGORY WHERE Z_PK = 1",
                    [],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )?)
            })
            .unwrap();
        assert_eq!((ent, opt), (CATEGORY_ENTITY, ENTITY_OPTION));
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let db = setup_db();
        let mut cat = Category::new("   ", "");
        let err = db.categories().create(&mut cat).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(db.categories().count().unwrap(), 0);
    }

    #[test]
    fn test_reorder_rewrites_sort_order() {
        let db = setup_db();
        let repo = db.categories();
        for name in ["A", "B", "C"] {
            repo.create(&mut Category::new(name, "")).unwrap();
        }

        repo.reorder(&[3, 1]).unwrap();
        let names: Vec<String> = repo.find_all().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["C", "A", "B"]);

        let sort_orders: Vec<i64> = repo.find_all().unwrap().iter().map(|c| c.sort_order).collect();
        assert_eq!(sort_orders, vec![0, 1, 2]);
    }

    #[test]
    fn test_delete_keeps_notes() {
        let db = setup_db();
        let mut cat = Category::new("Verktyg", "🔧");
        let cat_id = db.categories().create(&mut cat).unwrap();

        let mut note = Note::new("Borr", "");
        note.category_id = Some(cat_id);
        db.notes().create(&mut note).unwrap();

        db.categories().delete(cat_id).unwrap();

        let found = db.notes().find_by_id(note.id.unwrap()).unwrap().unwrap();
        assert_eq!(found.category_id, Some(cat_id));
        assert_eq!(db.categories().name_of(found.category_id).unwrap(), UNCATEGORIZED);
    }

    #[test]
    fn test_update_missing_category() {
        let db = setup_db();
        let mut cat = Category::new("X", "");
        cat.id = Some(99);
        assert!(matches!(
            db.categories().update(&cat).unwrap_err(),
            AppError::NotFound(_)
        ));
    }
}
