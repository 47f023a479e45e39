//! External collaborator interfaces: files, vector search, response store.

pub mod files;
pub mod store;
pub mod vectors;

pub use files::{FileMetadata, FileService, InMemoryFileService};
pub use store::{InMemoryResponseStore, Pagination, ResponseStore, StoredResponse};
pub use vectors::{InMemoryVectorStore, SearchHit, VectorStore};
