use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use kbshell_schema::RetrievedExample;

use crate::llm::{ChatRequest, LlmProvider};

const VERBALIZE_SYSTEM_PROMPT: &str = "\
You turn a single logic expression back into one plain English sentence. \
Use the vocabulary of the provided examples. When an original question is \
given, phrase the sentence as a direct answer to it. Reply with the \
sentence only.";

#[async_trait]
pub trait Verbalizer: Send + Sync {
    /// Render one fact or proof result as English. `anchor_text` carries
    /// the original question for proof results and is empty for
    /// forward-chained facts.
    async fn to_english(
        &self,
        fact: &str,
        anchor_text: &str,
        examples: &[RetrievedExample],
    ) -> Result<String>;
}

pub struct LlmVerbalizer {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl LlmVerbalizer {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Verbalizer for LlmVerbalizer {
    async fn to_english(
        &self,
        fact: &str,
        anchor_text: &str,
        examples: &[RetrievedExample],
    ) -> Result<String> {
        let request = ChatRequest::simple(
            self.model.clone(),
            Some(VERBALIZE_SYSTEM_PROMPT.to_string()),
            render_task(fact, anchor_text, examples),
        );
        let response = self
            .provider
            .chat(request)
            .await
            .context("verbalization request failed")?;
        Ok(response.text.trim().to_string())
    }
}

fn render_task(fact: &str, anchor_text: &str, examples: &[RetrievedExample]) -> String {
    let mut parts = Vec::new();
    if !examples.is_empty() {
        let blocks: Vec<String> = examples.iter().map(RetrievedExample::render).collect();
        parts.push(format!("Vocabulary examples:\n\n{}", blocks.join("\n\n")));
    }
    if !anchor_text.is_empty() {
        parts.push(format!("Original question: {anchor_text}"));
    }
    parts.push(format!("Logic: {fact}"));
    parts.join("\n\n")
}
