use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The symbolic reasoner, treated as an opaque remote service. Failures are
/// never caught inside the pipeline; they abort the current input.
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Load a knowledge-base file's contents into the reasoner.
    async fn load_kb(&self, content: &str) -> Result<()>;

    /// Assert a statement and run forward chaining. An empty result means
    /// the assertion produced no new inferences.
    async fn forward_chain(&self, statement: &str) -> Result<Vec<String>>;

    /// Run backward-chaining proof search for a question. Each entry is one
    /// proof branch; `None` marks a branch that could not be proven without
    /// invalidating the remaining entries.
    async fn backward_chain(&self, question: &str) -> Result<Vec<Option<String>>>;
}

/// Reasoner over a JSON HTTP API.
#[derive(Clone)]
pub struct HttpReasoner {
    client: reqwest::Client,
    base_url: String,
}

impl HttpReasoner {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base.trim_end_matches('/').to_string(),
        }
    }

    async fn post<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("reasoner call {path} failed ({status}): {text}"));
        }
        Ok(response.json().await?)
    }
}

#[derive(Serialize)]
struct LoadKbRequest<'a> {
    content: &'a str,
}

#[derive(Deserialize)]
struct LoadKbResponse {}

#[derive(Serialize)]
struct ForwardRequest<'a> {
    statement: &'a str,
}

#[derive(Deserialize)]
struct ForwardResponse {
    #[serde(default)]
    derived: Vec<String>,
}

#[derive(Serialize)]
struct BackwardRequest<'a> {
    question: &'a str,
}

#[derive(Deserialize)]
struct BackwardResponse {
    #[serde(default)]
    proofs: Vec<Option<String>>,
}

#[async_trait]
impl Reasoner for HttpReasoner {
    async fn load_kb(&self, content: &str) -> Result<()> {
        let _: LoadKbResponse = self.post("/kb/load", &LoadKbRequest { content }).await?;
        Ok(())
    }

    async fn forward_chain(&self, statement: &str) -> Result<Vec<String>> {
        let response: ForwardResponse = self
            .post("/chain/forward", &ForwardRequest { statement })
            .await?;
        Ok(response.derived)
    }

    async fn backward_chain(&self, question: &str) -> Result<Vec<Option<String>>> {
        let response: BackwardResponse = self
            .post("/chain/backward", &BackwardRequest { question })
            .await?;
        Ok(response.proofs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backward_response_keeps_null_branches() {
        let raw = r#"{"proofs": ["(grandparent john bob)", null]}"#;
        let parsed: BackwardResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.proofs.len(), 2);
        assert_eq!(parsed.proofs[0].as_deref(), Some("(grandparent john bob)"));
        assert!(parsed.proofs[1].is_none());
    }

    #[test]
    fn forward_response_defaults_to_empty() {
        let parsed: ForwardResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.derived.is_empty());
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let reasoner = HttpReasoner::new("http://localhost:8008/");
        assert_eq!(reasoner.base_url, "http://localhost:8008");
    }
}
