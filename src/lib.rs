//! Toolpack - dokumentlager för anteckningar, produkter och PDF-bilagor
//!
//! Ett dokument är antingen en `.toolpack` (zip med SQLite-databas,
//! manifest och innehållsadresserade bilagor) eller en äldre ren
//! `.sqlite`-fil.

pub mod db;
pub mod models;
pub mod services;
pub mod utils;

// Re-exports
pub use db::Database;
pub use models::*;
pub use services::{ContainerFormat, Session};
pub use utils::{AppError, AppResult};
