use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Databasfel: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO-fel: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP-fel: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Arkivet saknar obligatoriska poster eller är inte ett giltigt arkiv
    #[error("Felaktig container: {0}")]
    MalformedContainer(String),

    /// manifest.json finns men kan inte tolkas
    #[error("Ogiltigt manifest: {0}")]
    InvalidManifest(String),

    /// En tabell saknar en kolumn som inte kan ersättas med ett tomt värde
    #[error("Schemat stämmer inte: {0}")]
    SchemaMismatch(String),

    #[error("Bilagan hittades inte: {0}")]
    AttachmentNotFound(String),

    #[error("Valideringsfel: {0}")]
    Validation(String),

    #[error("Hittades inte: {0}")]
    NotFound(String),

    /// En annan laddning eller sparning pågår redan
    #[error("En annan operation pågår redan")]
    Busy,

    #[error("Inget dokument är öppet")]
    NoDocument,

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedContainer(msg.into())
    }

    pub fn invalid_manifest(msg: impl Into<String>) -> Self {
        Self::InvalidManifest(msg.into())
    }

    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Kort meddelande som kan visas direkt för användaren
    pub fn user_message(&self) -> String {
        match self {
            Self::Database(e) => format!("Databasen kunde inte läsas eller sparas: {e}"),
            Self::Io(e) => format!("Filfel: {e}"),
            Self::Zip(_) => "Filen är inte ett läsbart arkiv".to_string(),
            Self::MalformedContainer(msg) => format!("Filen är inte en giltig toolpack: {msg}"),
            Self::InvalidManifest(msg) => format!("Filens manifest är skadat: {msg}"),
            Self::SchemaMismatch(msg) => format!("Databasens struktur stöds inte: {msg}"),
            Self::AttachmentNotFound(_) => "Filen hittades inte".to_string(),
            Self::Validation(msg) => msg.clone(),
            Self::NotFound(msg) => format!("Posten finns inte längre: {msg}"),
            Self::Busy => "Vänta tills föregående åtgärd är klar".to_string(),
            Self::NoDocument => "Öppna eller skapa ett dokument först".to_string(),
            Self::Other(msg) => msg.clone(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
