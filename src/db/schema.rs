/// SQL-schema för dokumentlagret
/// Tabell- och kolumnnamn följer ramverket som skapade de äldre filerna
/// och måste behållas exakt för att befintliga filer ska gå att läsa.

pub const CATEGORY_TABLE: &str = "ZINFOCATEGORY";
pub const NOTE_TABLE: &str = "ZINFOITEM";
pub const PRODUCT_TABLE: &str = "ZPRODUCTDOC";

/// Värden i Z_ENT per tabell
pub const CATEGORY_ENTITY: i64 = 1;
pub const NOTE_ENTITY: i64 = 2;
pub const PRODUCT_ENTITY: i64 = 3;

/// Värdet i Z_OPT för alla rader
pub const ENTITY_OPTION: i64 = 1;

pub const PRIMARY_KEY: &str = "Z_PK";

// Bilagekolumner
pub const COL_PDF_FILENAME: &str = "ZPDFFILENAME";
pub const COL_PDF_MIMETYPE: &str = "ZPDFMIMETYPE";
pub const COL_PDF_SIZE: &str = "ZPDFSIZE";
pub const COL_PDF_HASH: &str = "ZPDFHASH";
pub const COL_PDF_PATH: &str = "ZPDFPATH";
pub const COL_PDF_DATA: &str = "ZPDFDATA";

/// Kolumner för bilagor som refererar till blob-lagret
pub const REFERENCE_COLUMNS: &[(&str, &str)] = &[
    (COL_PDF_FILENAME, "TEXT"),
    (COL_PDF_MIMETYPE, "TEXT"),
    (COL_PDF_SIZE, "INTEGER"),
    (COL_PDF_HASH, "TEXT"),
    (COL_PDF_PATH, "TEXT"),
];

/// Kolumner för bilagor lagrade direkt i raden (äldre filer)
pub const INLINE_COLUMNS: &[(&str, &str)] = &[(COL_PDF_FILENAME, "TEXT"), (COL_PDF_DATA, "BLOB")];

/// Alla bilagekolumner i den ordning de läses
pub const ATTACHMENT_SELECT_COLUMNS: &[&str] = &[
    COL_PDF_FILENAME,
    COL_PDF_MIMETYPE,
    COL_PDF_SIZE,
    COL_PDF_HASH,
    COL_PDF_PATH,
    COL_PDF_DATA,
];

/// Beskrivning av en tabell och vad som krävs för att kunna läsa den
pub struct TableSpec {
    pub name: &'static str,
    pub create_sql: &'static str,
    /// Varje post är en uppsättning alternativa namn varav minst ett måste finnas
    pub required: &'static [&'static [&'static str]],
    /// Skalära kolumner som läggs till om de saknas
    pub scalar_columns: &'static [(&'static str, &'static str)],
}

pub const CREATE_CATEGORY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ZINFOCATEGORY (
    Z_PK INTEGER PRIMARY KEY,
    Z_ENT INTEGER,
    Z_OPT INTEGER,
    ZNAME TEXT,
    ZICON TEXT,
    ZSORTORDER INTEGER,
    ZCOLORRED REAL,
    ZCOLORGREEN REAL,
    ZCOLORBLUE REAL
)
"#;

pub const CREATE_NOTE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ZINFOITEM (
    Z_PK INTEGER PRIMARY KEY,
    Z_ENT INTEGER,
    Z_OPT INTEGER,
    ZTITLE TEXT,
    ZCONTENT TEXT,
    ZTAGS TEXT,
    ZCATEGORY INTEGER,
    ZVIEWCOUNT INTEGER,
    ZCREATEDDATE REAL,
    ZLASTVIEWEDDATE REAL,
    ZPDFFILENAME TEXT,
    ZPDFMIMETYPE TEXT,
    ZPDFSIZE INTEGER,
    ZPDFHASH TEXT,
    ZPDFPATH TEXT
)
"#;

pub const CREATE_PRODUCT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ZPRODUCTDOC (
    Z_PK INTEGER PRIMARY KEY,
    Z_ENT INTEGER,
    Z_OPT INTEGER,
    ZPRODUCTNAME TEXT,
    ZMANUFACTURER TEXT,
    ZSPECIFICATIONS TEXT,
    ZINSTALLATIONNOTES TEXT,
    ZTAGS TEXT,
    ZVIEWCOUNT INTEGER,
    ZCREATEDDATE REAL,
    ZLASTVIEWEDDATE REAL,
    ZPDFFILENAME TEXT,
    ZPDFMIMETYPE TEXT,
    ZPDFSIZE INTEGER,
    ZPDFHASH TEXT,
    ZPDFPATH TEXT
)
"#;

pub const TABLES: &[TableSpec] = &[
    TableSpec {
        name: CATEGORY_TABLE,
        create_sql: CREATE_CATEGORY_TABLE,
        required: &[&[PRIMARY_KEY], &["ZNAME"]],
        scalar_columns: &[
            ("Z_ENT", "INTEGER"),
            ("Z_OPT", "INTEGER"),
            ("ZICON", "TEXT"),
            ("ZSORTORDER", "INTEGER"),
        ],
    },
    TableSpec {
        name: NOTE_TABLE,
        create_sql: CREATE_NOTE_TABLE,
        required: &[&[PRIMARY_KEY], &["ZTITLE"]],
        scalar_columns: &[
            ("Z_ENT", "INTEGER"),
            ("Z_OPT", "INTEGER"),
            ("ZCONTENT", "TEXT"),
            ("ZTAGS", "TEXT"),
            ("ZCATEGORY", "INTEGER"),
            ("ZVIEWCOUNT", "INTEGER"),
            ("ZCREATEDDATE", "REAL"),
        ],
    },
    TableSpec {
        name: PRODUCT_TABLE,
        create_sql: CREATE_PRODUCT_TABLE,
        // Tidiga versioner skapade produkttabellen med ZNAME
        required: &[&[PRIMARY_KEY], &["ZPRODUCTNAME", "ZNAME"]],
        scalar_columns: &[
            ("Z_ENT", "INTEGER"),
            ("Z_OPT", "INTEGER"),
            ("ZMANUFACTURER", "TEXT"),
            ("ZSPECIFICATIONS", "TEXT"),
            ("ZINSTALLATIONNOTES", "TEXT"),
            ("ZTAGS", "TEXT"),
            ("ZVIEWCOUNT", "INTEGER"),
            ("ZCREATEDDATE", "REAL"),
        ],
    },
];

/// Hämta tabellbeskrivning via namn
pub fn table_spec(name: &str) -> Option<&'static TableSpec> {
    TABLES.iter().find(|t| t.name == name)
}
