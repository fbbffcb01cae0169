use std::sync::Arc;

use uuid::Uuid;

use crate::embedding::EmbeddingProvider;
use crate::index::{ScoredPayload, VectorIndex};
use crate::StoreError;

/// Candidate pool scanned for an exact sentence match.
const EXACT_MATCH_CANDIDATES: usize = 10;

const DISTANCE_METRIC: &str = "Cosine";

/// One named collection of sentence embeddings plus the machinery to fill
/// and query it.
///
/// Two error policies, attached to two operation categories:
/// - store paths are loud — `store_embedding` propagates every failure;
/// - search paths are quiet — `search_similar` / `search_exact` log and
///   degrade to "nothing retrieved".
pub struct SimilarityStore {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    collection: String,
}

impl SimilarityStore {
    /// Open a store over `collection`, creating the collection if absent.
    /// With `reset`, any existing collection is dropped first (best-effort:
    /// a failed delete is logged, not fatal).
    pub async fn open(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        collection: impl Into<String>,
        reset: bool,
    ) -> Result<Self, StoreError> {
        let store = Self {
            index,
            embedder,
            collection: collection.into(),
        };
        if reset {
            store.delete_collection().await;
        }
        store.ensure_collection().await?;
        Ok(store)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Create the backing collection only if it does not exist yet.
    async fn ensure_collection(&self) -> Result<(), StoreError> {
        let existing = self.index.list_collections().await?;
        if !existing.iter().any(|name| name == &self.collection) {
            self.index
                .create_collection(
                    &self.collection,
                    self.embedder.dimensions(),
                    DISTANCE_METRIC,
                )
                .await?;
            tracing::info!(collection = %self.collection, "created similarity collection");
        }
        Ok(())
    }

    /// Best-effort drop of the backing collection.
    pub async fn delete_collection(&self) {
        match self.index.delete_collection(&self.collection).await {
            Ok(()) => tracing::info!(collection = %self.collection, "deleted similarity collection"),
            Err(err) => tracing::warn!(
                collection = %self.collection,
                error = %err,
                "failed to delete similarity collection"
            ),
        }
    }

    /// Embed and store one payload under a freshly generated id. Storing the
    /// same sentence twice produces two records; there is no upsert-by-key.
    pub async fn store_embedding(&self, payload: serde_json::Value) -> Result<(), StoreError> {
        let text = {
            let map = payload.as_object().ok_or(StoreError::InvalidInput)?;
            format!("{} {}", text_field(map, "sentence"), text_field(map, "pln"))
        };
        let vector = self.embedder.embed(&text).await?;
        self.index
            .upsert(&self.collection, Uuid::new_v4(), vector, payload)
            .await
    }

    /// Nearest-neighbor payloads, nearest first. Never fails: embedding or
    /// index trouble degrades to an empty result.
    pub async fn search_similar(&self, text: &str, limit: usize) -> Vec<serde_json::Value> {
        match self.try_search(text, limit).await {
            Ok(hits) => hits.into_iter().map(|hit| hit.payload).collect(),
            Err(err) => {
                tracing::warn!(
                    collection = %self.collection,
                    error = %err,
                    "similarity search failed, returning no context"
                );
                Vec::new()
            }
        }
    }

    /// Scan the top candidates for a payload whose `sentence` equals `text`
    /// exactly. Same degrade-to-nothing policy as `search_similar`.
    pub async fn search_exact(&self, text: &str) -> Option<serde_json::Value> {
        match self.try_search(text, EXACT_MATCH_CANDIDATES).await {
            Ok(hits) => hits
                .into_iter()
                .map(|hit| hit.payload)
                .find(|payload| payload.get("sentence").and_then(|s| s.as_str()) == Some(text)),
            Err(err) => {
                tracing::warn!(
                    collection = %self.collection,
                    error = %err,
                    "exact-match search failed"
                );
                None
            }
        }
    }

    async fn try_search(&self, text: &str, limit: usize) -> Result<Vec<ScoredPayload>, StoreError> {
        let vector = self.embedder.embed(text).await?;
        self.index.search(&self.collection, vector, limit).await
    }
}

fn text_field<'a>(map: &'a serde_json::Map<String, serde_json::Value>, key: &str) -> &'a str {
    map.get(key).and_then(|v| v.as_str()).unwrap_or_default()
}
