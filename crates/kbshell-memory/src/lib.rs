pub mod embedding;
pub mod index;
pub mod store;

pub use embedding::{EmbeddingProvider, OllamaEmbeddingProvider, StubEmbeddingProvider};
pub use index::{QdrantIndex, ScoredPayload, VectorIndex};
pub use store::SimilarityStore;

use thiserror::Error;

/// Failure taxonomy for the similarity store.
///
/// Store paths propagate every variant (a hidden failed write is silent data
/// loss); search paths catch all of them and degrade to "no context
/// retrieved". That asymmetry lives in [`store::SimilarityStore`], not here.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store payload must be a JSON object")]
    InvalidInput,

    #[error("embedding service failure")]
    Embedding(#[source] reqwest::Error),

    #[error("vector index transport failure")]
    IndexTransport(#[source] reqwest::Error),

    #[error("unexpected response from vector index ({status}): {body}")]
    IndexUnexpectedResponse { status: u16, body: String },
}
