use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::StoreError;

/// One nearest-neighbor hit, nearest first in the containing sequence.
#[derive(Debug, Clone)]
pub struct ScoredPayload {
    pub payload: serde_json::Value,
    pub score: f32,
}

/// Vector index operations the similarity store needs. Implemented for the
/// Qdrant REST API; tests substitute in-memory fakes.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    async fn create_collection(
        &self,
        name: &str,
        dim: usize,
        distance: &str,
    ) -> Result<(), StoreError>;

    async fn delete_collection(&self, name: &str) -> Result<(), StoreError>;

    async fn upsert(
        &self,
        collection: &str,
        id: Uuid,
        vector: Vec<f32>,
        payload: serde_json::Value,
    ) -> Result<(), StoreError>;

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredPayload>, StoreError>;
}

/// Qdrant over its JSON REST API.
#[derive(Clone)]
pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
}

impl QdrantIndex {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Decode a Qdrant reply, mapping non-success statuses and unparseable
/// bodies to `IndexUnexpectedResponse`.
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StoreError> {
    let status = response.status();
    let body = response.text().await.map_err(StoreError::IndexTransport)?;
    if !status.is_success() {
        return Err(StoreError::IndexUnexpectedResponse {
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_str(&body).map_err(|_| StoreError::IndexUnexpectedResponse {
        status: status.as_u16(),
        body,
    })
}

async fn expect_success(response: reqwest::Response) -> Result<(), StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::IndexUnexpectedResponse {
        status: status.as_u16(),
        body,
    })
}

#[derive(Deserialize)]
struct CollectionsEnvelope {
    result: CollectionsResult,
}

#[derive(Deserialize)]
struct CollectionsResult {
    collections: Vec<CollectionDescription>,
}

#[derive(Deserialize)]
struct CollectionDescription {
    name: String,
}

#[derive(Serialize)]
struct CreateCollectionRequest {
    vectors: VectorParams,
}

#[derive(Serialize)]
struct VectorParams {
    size: usize,
    distance: String,
}

#[derive(Serialize)]
struct UpsertRequest {
    points: Vec<PointStruct>,
}

#[derive(Serialize)]
struct PointStruct {
    id: String,
    vector: Vec<f32>,
    payload: serde_json::Value,
}

#[derive(Serialize)]
struct SearchRequest {
    vector: Vec<f32>,
    limit: usize,
    with_payload: bool,
}

#[derive(Deserialize)]
struct SearchEnvelope {
    result: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(default)]
    payload: Option<serde_json::Value>,
    score: f32,
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let response = self
            .client
            .get(self.url("/collections"))
            .send()
            .await
            .map_err(StoreError::IndexTransport)?;
        let envelope: CollectionsEnvelope = read_json(response).await?;
        Ok(envelope
            .result
            .collections
            .into_iter()
            .map(|c| c.name)
            .collect())
    }

    async fn create_collection(
        &self,
        name: &str,
        dim: usize,
        distance: &str,
    ) -> Result<(), StoreError> {
        let request = CreateCollectionRequest {
            vectors: VectorParams {
                size: dim,
                distance: distance.to_string(),
            },
        };
        let response = self
            .client
            .put(self.url(&format!("/collections/{name}")))
            .json(&request)
            .send()
            .await
            .map_err(StoreError::IndexTransport)?;
        expect_success(response).await
    }

    async fn delete_collection(&self, name: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.url(&format!("/collections/{name}")))
            .send()
            .await
            .map_err(StoreError::IndexTransport)?;
        expect_success(response).await
    }

    async fn upsert(
        &self,
        collection: &str,
        id: Uuid,
        vector: Vec<f32>,
        payload: serde_json::Value,
    ) -> Result<(), StoreError> {
        let request = UpsertRequest {
            points: vec![PointStruct {
                id: id.to_string(),
                vector,
                payload,
            }],
        };
        let response = self
            .client
            .put(self.url(&format!("/collections/{collection}/points")))
            .json(&request)
            .send()
            .await
            .map_err(StoreError::IndexTransport)?;
        expect_success(response).await
    }

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredPayload>, StoreError> {
        let request = SearchRequest {
            vector,
            limit,
            with_payload: true,
        };
        let response = self
            .client
            .post(self.url(&format!("/collections/{collection}/points/search")))
            .json(&request)
            .send()
            .await
            .map_err(StoreError::IndexTransport)?;
        let envelope: SearchEnvelope = read_json(response).await?;
        Ok(envelope
            .result
            .into_iter()
            .map(|hit| ScoredPayload {
                payload: hit.payload.unwrap_or(serde_json::Value::Null),
                score: hit.score,
            })
            .collect())
    }
}
