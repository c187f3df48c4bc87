//! Tjänster för dokumentlagret
//!
//! Blob-lager, bilagekoppling, containerformat och sessionen som håller
//! det öppna dokumentet.

pub mod attachment;
pub mod blob_store;
pub mod container;
pub mod session;

pub use blob_store::BlobStore;
pub use container::{ContainerFormat, ContainerInfo, DecodedContainer, EncodedContainer};
pub use session::{BusyFlag, BusyGuard, DocumentSummary, EncodedFile, OpenDocument, Session};
