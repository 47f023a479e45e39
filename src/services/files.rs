//! File service collaborator interface.
//!
//! The gateway consumes file content for `input_file` parts; upload and
//! extraction live elsewhere.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub filename: String,
    pub mime: String,
    pub bytes: u64,
    pub purpose: String,
    pub created_at: i64,
}

#[async_trait]
pub trait FileService: Send + Sync {
    async fn get_content(&self, file_id: &str) -> GatewayResult<Vec<u8>>;
    async fn get_metadata(&self, file_id: &str) -> GatewayResult<FileMetadata>;
}

/// In-process file service backed by a map. Used when no external file
/// store is wired in, and by tests.
#[derive(Default)]
pub struct InMemoryFileService {
    files: DashMap<String, (FileMetadata, Vec<u8>)>,
}

impl InMemoryFileService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, file_id: impl Into<String>, filename: impl Into<String>, content: Vec<u8>) {
        let filename = filename.into();
        let metadata = FileMetadata {
            mime: mime_for(&filename),
            bytes: content.len() as u64,
            purpose: "assistants".to_string(),
            created_at: chrono::Utc::now().timestamp(),
            filename,
        };
        self.files.insert(file_id.into(), (metadata, content));
    }
}

fn mime_for(filename: &str) -> String {
    match filename.rsplit_once('.').map(|(_, ext)| ext) {
        Some("txt") => "text/plain",
        Some("md") => "text/markdown",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[async_trait]
impl FileService for InMemoryFileService {
    async fn get_content(&self, file_id: &str) -> GatewayResult<Vec<u8>> {
        self.files
            .get(file_id)
            .map(|entry| entry.value().1.clone())
            .ok_or_else(|| GatewayError::NotFound(format!("file '{}' not found", file_id)))
    }

    async fn get_metadata(&self, file_id: &str) -> GatewayResult<FileMetadata> {
        self.files
            .get(file_id)
            .map(|entry| entry.value().0.clone())
            .ok_or_else(|| GatewayError::NotFound(format!("file '{}' not found", file_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_and_returns_content_and_metadata() {
        let service = InMemoryFileService::new();
        service.insert("file_1", "notes.txt", b"hello".to_vec());

        let content = service.get_content("file_1").await.unwrap();
        assert_eq!(content, b"hello");

        let meta = service.get_metadata("file_1").await.unwrap();
        assert_eq!(meta.filename, "notes.txt");
        assert_eq!(meta.mime, "text/plain");
        assert_eq!(meta.bytes, 5);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let service = InMemoryFileService::new();
        let err = service.get_content("file_x").await.unwrap_err();
        assert_eq!(err.error_type(), "not_found");
    }
}
