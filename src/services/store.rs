//! Response persistence.
//!
//! Responses (and the input items that produced them) are stored only when
//! the request sets `store: true`. Writes are idempotent on response id.
//! Backends: in-memory (default) and MongoDB behind the `mongodb-store`
//! feature.

use async_trait::async_trait;
use dashmap::DashMap;
use openai_protocol::{
    chat::ChatCompletionResponse,
    responses::{generate_id, InputItem, ItemList, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResponse {
    pub response: Response,
    pub input_items: Vec<StoredInputItem>,
}

/// Input item with the synthetic id used for pagination cursors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredInputItem {
    pub id: String,
    #[serde(flatten)]
    pub item: InputItem,
}

#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub limit: usize,
    pub after: Option<String>,
    pub descending: bool,
}

impl Pagination {
    pub fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            20
        } else {
            self.limit.min(100)
        }
    }
}

#[async_trait]
pub trait ResponseStore: Send + Sync {
    async fn save(&self, response: &Response, input_items: &[InputItem]) -> GatewayResult<()>;
    async fn get(&self, id: &str) -> GatewayResult<Option<StoredResponse>>;
    async fn delete(&self, id: &str) -> GatewayResult<bool>;
    async fn list_input_items(&self, id: &str, page: Pagination) -> GatewayResult<ItemList>;

    async fn save_chat(&self, completion: &ChatCompletionResponse) -> GatewayResult<()>;
    async fn get_chat(&self, id: &str) -> GatewayResult<Option<ChatCompletionResponse>>;
    async fn delete_chat(&self, id: &str) -> GatewayResult<bool>;
}

pub(crate) fn wrap_items(input_items: &[InputItem]) -> Vec<StoredInputItem> {
    input_items
        .iter()
        .map(|item| StoredInputItem {
            id: generate_id("item"),
            item: item.clone(),
        })
        .collect()
}

pub(crate) fn paginate(items: &[StoredInputItem], page: &Pagination) -> ItemList {
    let ordered: Vec<&StoredInputItem> = if page.descending {
        items.iter().rev().collect()
    } else {
        items.iter().collect()
    };

    let start = match &page.after {
        Some(cursor) => ordered
            .iter()
            .position(|i| &i.id == cursor)
            .map(|pos| pos + 1)
            .unwrap_or(ordered.len()),
        None => 0,
    };

    let limit = page.effective_limit();
    let slice: Vec<&StoredInputItem> = ordered.into_iter().skip(start).collect();
    let has_more = slice.len() > limit;
    let slice = &slice[..slice.len().min(limit)];

    let mut list = ItemList::new(slice.iter().map(|i| i.item.clone()).collect(), has_more);
    list.first_id = slice.first().map(|i| i.id.clone());
    list.last_id = slice.last().map(|i| i.id.clone());
    list
}

// ----------------------------------------------------------------------------
// In-memory backend
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryResponseStore {
    responses: DashMap<String, StoredResponse>,
    chat_completions: DashMap<String, ChatCompletionResponse>,
}

impl InMemoryResponseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

#[async_trait]
impl ResponseStore for InMemoryResponseStore {
    async fn save(&self, response: &Response, input_items: &[InputItem]) -> GatewayResult<()> {
        self.responses.insert(
            response.id.clone(),
            StoredResponse {
                response: response.clone(),
                input_items: wrap_items(input_items),
            },
        );
        Ok(())
    }

    async fn get(&self, id: &str) -> GatewayResult<Option<StoredResponse>> {
        Ok(self.responses.get(id).map(|e| e.value().clone()))
    }

    async fn delete(&self, id: &str) -> GatewayResult<bool> {
        Ok(self.responses.remove(id).is_some())
    }

    async fn list_input_items(&self, id: &str, page: Pagination) -> GatewayResult<ItemList> {
        let stored = self
            .responses
            .get(id)
            .ok_or_else(|| GatewayError::NotFound(format!("response '{}' not found", id)))?;
        Ok(paginate(&stored.input_items, &page))
    }

    async fn save_chat(&self, completion: &ChatCompletionResponse) -> GatewayResult<()> {
        self.chat_completions
            .insert(completion.id.clone(), completion.clone());
        Ok(())
    }

    async fn get_chat(&self, id: &str) -> GatewayResult<Option<ChatCompletionResponse>> {
        Ok(self.chat_completions.get(id).map(|e| e.value().clone()))
    }

    async fn delete_chat(&self, id: &str) -> GatewayResult<bool> {
        Ok(self.chat_completions.remove(id).is_some())
    }
}

// ----------------------------------------------------------------------------
// MongoDB backend
// ----------------------------------------------------------------------------

#[cfg(feature = "mongodb-store")]
pub mod mongo {
    use super::*;
    use mongodb::bson::{doc, Document};
    use mongodb::{Client, Collection};

    pub struct MongoResponseStore {
        responses: Collection<Document>,
        chat_completions: Collection<Document>,
    }

    impl MongoResponseStore {
        pub async fn connect(uri: &str) -> GatewayResult<Self> {
            let client = Client::with_uri_str(uri)
                .await
                .map_err(|e| GatewayError::Storage(format!("mongodb connect: {}", e)))?;
            let db = client.database("toolgate");
            Ok(Self {
                responses: db.collection("responses"),
                chat_completions: db.collection("chat_completions"),
            })
        }

        fn to_document<T: Serialize>(value: &T) -> GatewayResult<Document> {
            let json = serde_json::to_value(value)
                .map_err(|e| GatewayError::Storage(format!("serialize: {}", e)))?;
            mongodb::bson::to_document(&json)
                .map_err(|e| GatewayError::Storage(format!("bson encode: {}", e)))
        }

        fn from_document<T: for<'de> Deserialize<'de>>(doc: Document) -> GatewayResult<T> {
            let json: serde_json::Value = mongodb::bson::from_document(doc)
                .map_err(|e| GatewayError::Storage(format!("bson decode: {}", e)))?;
            serde_json::from_value(json)
                .map_err(|e| GatewayError::Storage(format!("deserialize: {}", e)))
        }
    }

    #[async_trait]
    impl ResponseStore for MongoResponseStore {
        async fn save(&self, response: &Response, input_items: &[InputItem]) -> GatewayResult<()> {
            let stored = StoredResponse {
                response: response.clone(),
                input_items: wrap_items(input_items),
            };
            let mut doc = Self::to_document(&stored)?;
            doc.insert("_id", response.id.clone());
            self.responses
                .replace_one(doc! {"_id": &response.id}, doc)
                .upsert(true)
                .await
                .map_err(|e| GatewayError::Storage(format!("mongodb save: {}", e)))?;
            Ok(())
        }

        async fn get(&self, id: &str) -> GatewayResult<Option<StoredResponse>> {
            let found = self
                .responses
                .find_one(doc! {"_id": id})
                .await
                .map_err(|e| GatewayError::Storage(format!("mongodb get: {}", e)))?;
            match found {
                Some(mut doc) => {
                    doc.remove("_id");
                    Ok(Some(Self::from_document(doc)?))
                }
                None => Ok(None),
            }
        }

        async fn delete(&self, id: &str) -> GatewayResult<bool> {
            let result = self
                .responses
                .delete_one(doc! {"_id": id})
                .await
                .map_err(|e| GatewayError::Storage(format!("mongodb delete: {}", e)))?;
            Ok(result.deleted_count > 0)
        }

        async fn list_input_items(&self, id: &str, page: Pagination) -> GatewayResult<ItemList> {
            let stored = self
                .get(id)
                .await?
                .ok_or_else(|| GatewayError::NotFound(format!("response '{}' not found", id)))?;
            Ok(paginate(&stored.input_items, &page))
        }

        async fn save_chat(&self, completion: &ChatCompletionResponse) -> GatewayResult<()> {
            let mut doc = Self::to_document(completion)?;
            doc.insert("_id", completion.id.clone());
            self.chat_completions
                .replace_one(doc! {"_id": &completion.id}, doc)
                .upsert(true)
                .await
                .map_err(|e| GatewayError::Storage(format!("mongodb save: {}", e)))?;
            Ok(())
        }

        async fn get_chat(&self, id: &str) -> GatewayResult<Option<ChatCompletionResponse>> {
            let found = self
                .chat_completions
                .find_one(doc! {"_id": id})
                .await
                .map_err(|e| GatewayError::Storage(format!("mongodb get: {}", e)))?;
            match found {
                Some(mut doc) => {
                    doc.remove("_id");
                    Ok(Some(Self::from_document(doc)?))
                }
                None => Ok(None),
            }
        }

        async fn delete_chat(&self, id: &str) -> GatewayResult<bool> {
            let result = self
                .chat_completions
                .delete_one(doc! {"_id": id})
                .await
                .map_err(|e| GatewayError::Storage(format!("mongodb delete: {}", e)))?;
            Ok(result.deleted_count > 0)
        }
    }
}
