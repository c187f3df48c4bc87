pub mod attachment;
pub mod category;
pub mod config;
pub mod manifest;
pub mod note;
pub mod product;

pub use attachment::*;
pub use category::*;
pub use config::*;
pub use manifest::*;
pub use note::*;
pub use product::*;
