use std::sync::Arc;

use kbshell_memory::SimilarityStore;
use kbshell_schema::RetrievedExample;

/// One similarity collection to draw context from, with its own result cap.
#[derive(Clone)]
pub struct RetrievalSource {
    pub store: Arc<SimilarityStore>,
    pub limit: usize,
}

impl RetrievalSource {
    pub fn new(store: Arc<SimilarityStore>, limit: usize) -> Self {
        Self { store, limit }
    }
}

/// Query every source in order and concatenate the results by source
/// priority. Results are never interleaved by score: everything from the
/// first source precedes everything from the second. Payloads without a
/// `sentence` field are dropped.
pub async fn retrieve_context(sources: &[RetrievalSource], text: &str) -> Vec<RetrievedExample> {
    let mut examples = Vec::new();
    for source in sources {
        for payload in source.store.search_similar(text, source.limit).await {
            if let Some(example) = RetrievedExample::from_payload(&payload) {
                examples.push(example);
            }
        }
    }
    examples
}
