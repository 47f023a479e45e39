//! Vector search collaborator interface.
//!
//! Search internals (embedding, indexing) are external; the gateway consumes
//! `search` and `hybrid_search` over named vector stores. The in-memory
//! implementation scores by term overlap, which is enough for the native
//! tools and for tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::GatewayResult, tools::filters::Filter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub file_id: String,
    pub chunk_id: String,
    pub filename: String,
    pub score: f64,
    pub content: String,
    #[serde(default)]
    pub attributes: Value,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(
        &self,
        query: &str,
        store_ids: &[String],
        max_results: usize,
        filter: Option<&Filter>,
    ) -> GatewayResult<Vec<SearchHit>>;

    /// Similarity plus keyword blend. The in-memory store approximates both
    /// with the same lexical scoring.
    async fn hybrid_search(
        &self,
        query: &str,
        store_ids: &[String],
        max_results: usize,
        filter: Option<&Filter>,
    ) -> GatewayResult<Vec<SearchHit>>;
}

#[derive(Debug, Clone)]
struct IndexedChunk {
    store_id: String,
    file_id: String,
    chunk_id: String,
    filename: String,
    content: String,
    attributes: Value,
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    chunks: RwLock<Vec<IndexedChunk>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn index_chunk(
        &self,
        store_id: impl Into<String>,
        file_id: impl Into<String>,
        chunk_id: impl Into<String>,
        filename: impl Into<String>,
        content: impl Into<String>,
        attributes: Value,
    ) {
        self.chunks.write().push(IndexedChunk {
            store_id: store_id.into(),
            file_id: file_id.into(),
            chunk_id: chunk_id.into(),
            filename: filename.into(),
            content: content.into(),
            attributes,
        });
    }

    fn score(query: &str, content: &str) -> f64 {
        let content_lower = content.to_lowercase();
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if terms.is_empty() {
            return 0.0;
        }
        let hits = terms
            .iter()
            .filter(|t| content_lower.contains(t.as_str()))
            .count();
        hits as f64 / terms.len() as f64
    }

    fn query(
        &self,
        query: &str,
        store_ids: &[String],
        max_results: usize,
        filter: Option<&Filter>,
    ) -> Vec<SearchHit> {
        let chunks = self.chunks.read();
        let mut hits: Vec<SearchHit> = chunks
            .iter()
            .filter(|c| store_ids.is_empty() || store_ids.contains(&c.store_id))
            .filter(|c| filter.is_none_or(|f| f.matches(&c.attributes)))
            .filter_map(|c| {
                let score = Self::score(query, &c.content);
                if score > 0.0 {
                    Some(SearchHit {
                        file_id: c.file_id.clone(),
                        chunk_id: c.chunk_id.clone(),
                        filename: c.filename.clone(),
                        score,
                        content: c.content.clone(),
                        attributes: c.attributes.clone(),
                    })
                } else {
                    None
                }
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(max_results);
        hits
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn search(
        &self,
        query: &str,
        store_ids: &[String],
        max_results: usize,
        filter: Option<&Filter>,
    ) -> GatewayResult<Vec<SearchHit>> {
        Ok(self.query(query, store_ids, max_results, filter))
    }

    async fn hybrid_search(
        &self,
        query: &str,
        store_ids: &[String],
        max_results: usize,
        filter: Option<&Filter>,
    ) -> GatewayResult<Vec<SearchHit>> {
        Ok(self.query(query, store_ids, max_results, filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> InMemoryVectorStore {
        let store = InMemoryVectorStore::new();
        store.index_chunk(
            "vs_1",
            "file_a",
            "chunk_1",
            "guide.md",
            "Paris weather is mild in spring",
            json!({"topic": "weather"}),
        );
        store.index_chunk(
            "vs_1",
            "file_b",
            "chunk_2",
            "cities.md",
            "Paris is the capital of France",
            json!({"topic": "geography"}),
        );
        store.index_chunk(
            "vs_2",
            "file_c",
            "chunk_3",
            "other.md",
            "Unrelated document about databases",
            json!({"topic": "storage"}),
        );
        store
    }

    #[tokio::test]
    async fn search_scopes_to_store_ids_and_ranks() {
        let store = seeded();
        let hits = store
            .search("paris weather", &["vs_1".to_string()], 10, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, "chunk_1");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn filter_narrows_results() {
        let store = seeded();
        let filter = Filter::eq("topic", json!("geography"));
        let hits = store
            .search("paris", &["vs_1".to_string()], 10, Some(&filter))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "chunk_2");
    }
}
