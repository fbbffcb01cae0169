use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in the session's conversation history. Append-only; the
/// assistant side is only present when the free-form LLM echo is active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user_text: String,
    #[serde(default)]
    pub assistant_text: Option<String>,
    pub at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            user_text: text.into(),
            assistant_text: None,
            at: Utc::now(),
        }
    }

    pub fn exchange(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user_text: user.into(),
            assistant_text: Some(assistant.into()),
            at: Utc::now(),
        }
    }
}

/// A previously translated sentence pulled back out of a similarity
/// collection to condition the next translation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedExample {
    pub sentence: String,
    #[serde(default)]
    pub from_context: Vec<String>,
    #[serde(default)]
    pub type_definitions: Vec<String>,
    #[serde(default)]
    pub statements: Vec<String>,
}

impl RetrievedExample {
    /// Build an example from a raw stored payload. Payloads without a
    /// `sentence` field are unusable as context and yield `None`.
    pub fn from_payload(payload: &serde_json::Value) -> Option<Self> {
        let sentence = payload.get("sentence")?.as_str()?.to_string();
        Some(Self {
            sentence,
            from_context: string_list(payload.get("from_context")),
            type_definitions: string_list(payload.get("type_definitions")),
            statements: string_list(payload.get("statements")),
        })
    }

    /// Render the example as the prompt block handed to the translator.
    pub fn render(&self) -> String {
        format!(
            "Sentence: {}\nFrom Context:\n{}\nType Definitions:\n{}\nStatements:\n{}",
            self.sentence,
            self.from_context.join("\n"),
            self.type_definitions.join("\n"),
            self.statements.join("\n"),
        )
    }
}

fn string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Logic payload for a translated input. A single sentence may carry both
/// statements and questions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationPayload {
    #[serde(default)]
    pub statements: Vec<String>,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub from_context: Vec<String>,
    #[serde(default)]
    pub type_definitions: Vec<String>,
}

/// Classification of one user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationResult {
    /// Neither assertion nor question (greeting, acknowledgment); requires
    /// no logic processing at all.
    Performative,
    Content(TranslationPayload),
}

/// What happened while processing one input, in display order. The shell
/// renders these; tests assert on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ProcessEvent {
    /// Free-form LLM echo reply (side channel, display only).
    LlmReply { text: String },
    /// Input was a performative; processing stopped here.
    Performative,
    /// A statement was asserted into the reasoner.
    StatementAccepted { statement: String },
    /// A forward-chained fact, verbalized.
    Inference { fact: String, english: String },
    /// Forward chaining over every statement derived nothing.
    NoNewInferences,
    /// One provable branch of the query, verbalized.
    Proof { atom: String, english: String },
    /// One branch of the query could not be proven.
    CannotProve,
}
