use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use rusqlite::types::Value;
use std::sync::{Arc, Mutex};

use super::attachment_columns::{self, read_storage, write_storage};
use super::layout::TableLayout;
use super::schema::{ENTITY_OPTION, PRODUCT_ENTITY, PRODUCT_TABLE};
use super::{lock, next_id};
use crate::models::{AttachmentStorage, Product};
use crate::utils::date::reference_timestamp_now;
use crate::utils::{AppError, AppResult};

/// Produktnamnet heter olika i olika filversioner
const NAME_COLUMNS: &[&str] = &["ZPRODUCTNAME", "ZNAME"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProductSort {
    #[default]
    NewestFirst,
    Name,
    Manufacturer,
}

/// Sökfilter för produktlistan
#[derive(Debug, Default, Clone)]
pub struct ProductFilter {
    /// Fritextsökning (namn, tillverkare, specifikationer, installationsanvisningar, taggar)
    pub query: String,
    /// Exakt tillverkare, skiftlägesokänsligt
    pub manufacturer: Option<String>,
    pub has_attachment: Option<bool>,
    pub sort: ProductSort,
}

impl ProductFilter {
    pub fn with_query(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

pub struct ProductRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProductRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn find_all(&self) -> AppResult<Vec<Product>> {
        self.search(&ProductFilter::default())
    }

    /// Sök produkter
    pub fn search(&self, filter: &ProductFilter) -> AppResult<Vec<Product>> {
        let conn = lock(&self.conn)?;
        let layout = TableLayout::require(&conn, PRODUCT_TABLE)?;
        let name_col = Self::name_column(&layout)?;
        let manufacturer_col = layout.column_or_null("ZMANUFACTURER");

        let mut sql = Self::select_sql(&layout, name_col);
        sql.push_str(" WHERE 1=1");

        let mut params_vec: Vec<Value> = Vec::new();

        if !filter.query.trim().is_empty() {
            params_vec.push(format!("%{}%", filter.query.trim()).into());
            sql.push_str(&format!(
                " AND ({1} LIKE ?{0} OR {2} LIKE ?{0} OR {3} LIKE ?{0} OR {4} LIKE ?{0} OR {5} LIKE ?{0})",
                params_vec.len(),
                name_col,
                manufacturer_col,
                layout.column_or_null("ZSPECIFICATIONS"),
                layout.column_or_null("ZINSTALLATIONNOTES"),
                layout.column_or_null("ZTAGS"),
            ));
        }

        if let Some(manufacturer) = filter.manufacturer.as_deref().filter(|m| !m.trim().is_empty()) {
            params_vec.push(manufacturer.trim().to_string().into());
            sql.push_str(&format!(
                " AND {} = ?{} COLLATE NOCASE",
                manufacturer_col,
                params_vec.len()
            ));
        }

        if let Some(has) = filter.has_attachment {
            let present = attachment_columns::present_condition(&layout, None);
            if has {
                sql.push_str(&format!(" AND {}", present));
            } else {
                sql.push_str(&format!(" AND NOT {}", present));
            }
        }

        match filter.sort {
            ProductSort::NewestFirst => sql.push_str(" ORDER BY Z_PK DESC"),
            ProductSort::Name => {
                sql.push_str(&format!(" ORDER BY {} COLLATE NOCASE, Z_PK", name_col))
            }
            ProductSort::Manufacturer => sql.push_str(&format!(
                " ORDER BY {} COLLATE NOCASE, {} COLLATE NOCASE, Z_PK",
                manufacturer_col, name_col
            )),
        }

        let mut stmt = conn.prepare(&sql)?;
        let products = stmt
            .query_map(params_from_iter(params_vec), |row| Ok(Self::row_to_product(row)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(products)
    }

    /// Hämta produkt via ID
    pub fn find_by_id(&self, id: i64) -> AppResult<Option<Product>> {
        let conn = lock(&self.conn)?;
        let layout = TableLayout::require(&conn, PRODUCT_TABLE)?;
        let name_col = Self::name_column(&layout)?;
        let sql = format!("{} WHERE Z_PK = ?", Self::select_sql(&layout, name_col));

        let product = conn
            .query_row(&sql, [id], |row| Ok(Self::row_to_product(row)))
            .optional()?;

        Ok(product)
    }

    /// Alla tillverkare som förekommer, sorterade
    pub fn manufacturers(&self) -> AppResult<Vec<String>> {
        let conn = lock(&self.conn)?;
        let layout = TableLayout::require(&conn, PRODUCT_TABLE)?;
        if !layout.has("ZMANUFACTURER") {
            return Ok(Vec::new());
        }

        let mut stmt = conn.prepare(
            "SELECT DISTINCT ZMANUFACTURER FROM ZPRODUCTDOC
             WHERE ZMANUFACTURER IS NOT NULL AND ZMANUFACTURER != ''
             ORDER BY ZMANUFACTURER COLLATE NOCASE",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(names)
    }

    /// Skapa produkt med nästa lediga ID
    pub fn create(&self, product: &mut Product) -> AppResult<i64> {
        Self::validate(product)?;

        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        let layout = TableLayout::require(&tx, PRODUCT_TABLE)?;
        let name_col = Self::name_column(&layout)?;

        let id = next_id(&tx, PRODUCT_TABLE)?;
        let created_at = product.created_at.unwrap_or_else(reference_timestamp_now);
        tx.execute(
            &format!(
                "INSERT INTO ZPRODUCTDOC (Z_PK, Z_ENT, Z_OPT, {}, ZMANUFACTURER, ZSPECIFICATIONS,
                                          ZINSTALLATIONNOTES, ZTAGS, ZVIEWCOUNT, ZCREATEDDATE)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                name_col
            ),
            rusqlite::params![
                id,
                PRODUCT_ENTITY,
                ENTITY_OPTION,
                product.name.trim(),
                product.manufacturer.trim(),
                product.specifications,
                product.installation_notes,
                product.tags,
                product.view_count,
                created_at,
            ],
        )?;

        if product.attachment.is_some() {
            write_storage(&tx, PRODUCT_TABLE, id, product.attachment.as_ref())?;
        }
        tx.commit()?;

        product.id = Some(id);
        product.created_at = Some(created_at);
        Ok(id)
    }

    /// Uppdatera produkt inklusive bilaga
    pub fn update(&self, product: &Product) -> AppResult<()> {
        let id = product
            .id
            .ok_or_else(|| AppError::validation("Produkten har inget ID"))?;
        Self::validate(product)?;

        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        let layout = TableLayout::require(&tx, PRODUCT_TABLE)?;
        let name_col = Self::name_column(&layout)?;

        let rows = tx.execute(
            &format!(
                "UPDATE ZPRODUCTDOC SET {} = ?1, ZMANUFACTURER = ?2, ZSPECIFICATIONS = ?3,
                                        ZINSTALLATIONNOTES = ?4, ZTAGS = ?5
                 WHERE Z_PK = ?6",
                name_col
            ),
            rusqlite::params![
                product.name.trim(),
                product.manufacturer.trim(),
                product.specifications,
                product.installation_notes,
                product.tags,
                id,
            ],
        )?;
        if rows == 0 {
            return Err(AppError::not_found(format!("Produkt {}", id)));
        }

        write_storage(&tx, PRODUCT_TABLE, id, product.attachment.as_ref())?;
        tx.commit()?;

        Ok(())
    }

    /// Byt eller ta bort bilagan utan att röra övriga fält
    pub fn set_attachment(&self, id: i64, attachment: Option<&AttachmentStorage>) -> AppResult<()> {
        let conn = lock(&self.conn)?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM ZPRODUCTDOC WHERE Z_PK = ?)",
            [id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(AppError::not_found(format!("Produkt {}", id)));
        }
        write_storage(&conn, PRODUCT_TABLE, id, attachment)
    }

    /// Ta bort produkt
    pub fn delete(&self, id: i64) -> AppResult<()> {
        let conn = lock(&self.conn)?;
        conn.execute("DELETE FROM ZPRODUCTDOC WHERE Z_PK = ?", [id])?;
        Ok(())
    }

    /// Räkna produkter
    pub fn count(&self) -> AppResult<i64> {
        let conn = lock(&self.conn)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM ZPRODUCTDOC", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn referenced_paths(&self) -> AppResult<Vec<String>> {
        let conn = lock(&self.conn)?;
        attachment_columns::referenced_paths(&conn, PRODUCT_TABLE)
    }

    fn name_column(layout: &TableLayout) -> AppResult<&'static str> {
        layout.first_of(NAME_COLUMNS).ok_or_else(|| {
            AppError::schema_mismatch("Tabellen ZPRODUCTDOC saknar kolumn för produktnamn")
        })
    }

    fn validate(product: &Product) -> AppResult<()> {
        if product.name.trim().is_empty() {
            return Err(AppError::validation("Produktnamn krävs"));
        }
        Ok(())
    }

    fn select_sql(layout: &TableLayout, name_col: &str) -> String {
        format!(
            "SELECT Z_PK, {}, {}, {}, {}, {}, {}, {}, {} FROM ZPRODUCTDOC",
            name_col,
            layout.column_or_null("ZMANUFACTURER"),
            layout.column_or_null("ZSPECIFICATIONS"),
            layout.column_or_null("ZINSTALLATIONNOTES"),
            layout.column_or_null("ZTAGS"),
            layout.column_or_null("ZVIEWCOUNT"),
            layout.column_or_null("ZCREATEDDATE"),
            attachment_columns::select_list(layout, None),
        )
    }

    fn row_to_product(row: &Row) -> Product {
        let text = |i: usize| row.get::<_, Option<String>>(i).ok().flatten();
        Product {
            id: row.get(0).ok(),
            name: text(1).unwrap_or_default(),
            manufacturer: text(2).unwrap_or_default(),
            specifications: text(3).unwrap_or_default(),
            installation_notes: text(4).unwrap_or_default(),
            tags: text(5),
            view_count: row.get::<_, Option<i64>>(6).ok().flatten().unwrap_or(0),
            created_at: row.get::<_, Option<f64>>(7).ok().flatten(),
            attachment: read_storage(row, 8),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::AttachmentStorage;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_create_and_find() {
        let db = setup_db();
        let mut product = Product::new("Värmepump X1", "Nibe");
        product.specifications = "COP 4.5".into();
        let id = db.products().create(&mut product).unwrap();
        assert_eq!(id, 1);

        let found = db.products().find_by_id(id).unwrap().unwrap();
        assert_eq!(found.name, "Värmepump X1");
        assert_eq!(found.manufacturer, "Nibe");
        assert_eq!(found.specifications, "COP 4.5");
        assert!(found.created_at.is_some());
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let db = setup_db();
        let err = db.products().create(&mut Product::new("", "Nibe")).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(db.products().count().unwrap(), 0);
    }

    #[test]
    fn test_legacy_name_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE ZPRODUCTDOC (Z_PK INTEGER PRIMARY KEY, ZNAME TEXT, ZMANUFACTURER TEXT);
             INSERT INTO ZPRODUCTDOC VALUES (5, 'Gammal', 'Acme');",
        )
        .unwrap();
        let db = Database::from_connection(conn);
        db.ensure_schema().unwrap();

        let found = db.products().find_by_id(5).unwrap().unwrap();
        assert_eq!(found.name, "Gammal");

        let id = db.products().create(&mut Product::new("Ny", "Acme")).unwrap();
        assert_eq!(id, 6);
        let names: Vec<String> = db.products().find_all().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Ny", "Gammal"]);
    }

    #[test]
    fn test_search_and_manufacturer_filter() {
        let db = setup_db();
        db.products().create(&mut Product::new("Borrmaskin", "Bosch")).unwrap();
        db.products().create(&mut Product::new("Slipmaskin", "bosch")).unwrap();
        db.products().create(&mut Product::new("Kapsåg", "Makita")).unwrap();

        let hits = db.products().search(&ProductFilter::with_query("maskin")).unwrap();
        assert_eq!(hits.len(), 2);

        let bosch = db
            .products()
            .search(&ProductFilter {
                manufacturer: Some("BOSCH".into()),
                sort: ProductSort::Name,
                ..Default::default()
            })
            .unwrap();
        let names: Vec<&str> = bosch.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Borrmaskin", "Slipmaskin"]);

        let makers = db.products().manufacturers().unwrap();
        assert_eq!(makers.len(), 3);
    }

    #[test]
    fn test_attachment_roundtrip_and_filter() {
        let db = setup_db();
        let mut product = Product::new("Pump", "Grundfos");
        db.products().create(&mut product).unwrap();
        db.products().create(&mut Product::new("Ventil", "Danfoss")).unwrap();

        let inline = AttachmentStorage::Inline {
            file_name: "manual.pdf".into(),
            data: b"%PDF-1.4".to_vec(),
        };
        db.products().set_attachment(1, Some(&inline)).unwrap();

        let found = db.products().find_by_id(1).unwrap().unwrap();
        assert_eq!(found.attachment, Some(inline));

        let with_pdf = db
            .products()
            .search(&ProductFilter {
                has_attachment: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(with_pdf.len(), 1);
        assert_eq!(with_pdf[0].name, "Pump");

        db.products().set_attachment(1, None).unwrap();
        assert!(db.products().find_by_id(1).unwrap().unwrap().attachment.is_none());
    }

    #[test]
    fn test_update_missing_product() {
        let db = setup_db();
        let mut product = Product::new("X", "");
        product.id = Some(12);
        assert!(matches!(
            db.products().update(&product).unwrap_err(),
            AppError::NotFound(_)
        ));
    }
}
