use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use kbshell_schema::{RetrievedExample, TranslationPayload, TranslationResult};

use crate::llm::{ChatRequest, LlmProvider};

const TRANSLATE_SYSTEM_PROMPT: &str = "\
You translate natural language into typed logic.

Classify the sentence first:
- If it is a performative (greeting, acknowledgment, anything that asserts \
nothing and asks nothing), reply with exactly the word: Performative
- Otherwise reply with a single JSON object with these keys:
  \"statements\": logic expressions asserted by the sentence,
  \"questions\": logic expressions for anything the sentence asks, with \
free variables for the unknowns,
  \"from_context\": expressions for entities the sentence presupposes,
  \"type_definitions\": type declarations for every new predicate or entity.
All four values are arrays of strings. A sentence may yield both statements \
and questions. Reuse the notation and vocabulary of the provided examples. \
Output nothing besides the word Performative or the JSON object.";

#[async_trait]
pub trait Translator: Send + Sync {
    /// Classify `text` and translate it to logic, conditioned on retrieved
    /// examples. Stateless: all context must be passed in each call.
    async fn classify_and_translate(
        &self,
        text: &str,
        examples: &[RetrievedExample],
    ) -> Result<TranslationResult>;
}

pub struct LlmTranslator {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl LlmTranslator {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn classify_and_translate(
        &self,
        text: &str,
        examples: &[RetrievedExample],
    ) -> Result<TranslationResult> {
        let request = ChatRequest::simple(
            self.model.clone(),
            Some(TRANSLATE_SYSTEM_PROMPT.to_string()),
            render_task(text, examples),
        );
        let response = self
            .provider
            .chat(request)
            .await
            .context("translation request failed")?;
        parse_translation(&response.text)
    }
}

fn render_task(text: &str, examples: &[RetrievedExample]) -> String {
    if examples.is_empty() {
        return format!("Sentence: {text}");
    }
    let blocks: Vec<String> = examples.iter().map(RetrievedExample::render).collect();
    format!(
        "Similar previously translated sentences:\n\n{}\n\nSentence: {text}",
        blocks.join("\n\n")
    )
}

/// Parse the model reply: the bare word `Performative`, or a JSON object
/// (optionally fenced) with the four translation arrays.
fn parse_translation(raw: &str) -> Result<TranslationResult> {
    let cleaned = strip_code_fence(raw.trim());
    if cleaned == "Performative" || cleaned == "\"Performative\"" {
        return Ok(TranslationResult::Performative);
    }
    let payload: TranslationPayload = serde_json::from_str(cleaned)
        .map_err(|err| anyhow!("translation reply is neither Performative nor valid JSON: {err}"))?;
    Ok(TranslationResult::Content(payload))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop an optional language tag after the opening fence.
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.strip_suffix("```").map(str::trim).unwrap_or(text)
}
