use std::sync::Arc;

use anyhow::Result;
use kbshell_gateway::{ChatMessage, ChatRequest, LlmProvider, Reasoner, Translator, Verbalizer};
use kbshell_memory::SimilarityStore;
use kbshell_schema::{ConversationTurn, ProcessEvent, TranslationResult};
use serde_json::json;

use crate::retrieval::{retrieve_context, RetrievalSource};
use crate::session::Session;

/// Context drawn from the long-lived knowledge collection per input.
const BASE_CONTEXT_LIMIT: usize = 3;
/// Context drawn from this session's query collection per input.
const QUERY_CONTEXT_LIMIT: usize = 2;

/// Drives the per-input pipeline: echo side channel, context retrieval,
/// translation, then the assertion and/or query branches. Owns the session
/// state and both similarity collections.
pub struct Orchestrator {
    session: Session,
    base_store: Arc<SimilarityStore>,
    query_store: Arc<SimilarityStore>,
    translator: Arc<dyn Translator>,
    reasoner: Arc<dyn Reasoner>,
    verbalizer: Arc<dyn Verbalizer>,
    chat: Arc<dyn LlmProvider>,
    chat_model: String,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base_store: Arc<SimilarityStore>,
        query_store: Arc<SimilarityStore>,
        translator: Arc<dyn Translator>,
        reasoner: Arc<dyn Reasoner>,
        verbalizer: Arc<dyn Verbalizer>,
        chat: Arc<dyn LlmProvider>,
        chat_model: impl Into<String>,
    ) -> Self {
        Self {
            session: Session::new(),
            base_store,
            query_store,
            translator,
            reasoner,
            verbalizer,
            chat,
            chat_model: chat_model.into(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Process one input to completion. Translation, reasoning, and
    /// verbalization failures propagate and abort the rest of this input;
    /// state written by completed earlier steps stays in place. Only the
    /// similarity searches degrade silently (to "no context").
    pub async fn process_input(&mut self, text: &str) -> Result<Vec<ProcessEvent>> {
        let mut events = Vec::new();

        if self.session.llm_echo {
            let reply = self.echo_reply(text).await?;
            self.session
                .history
                .push(ConversationTurn::exchange(text, reply.clone()));
            events.push(ProcessEvent::LlmReply { text: reply });
        } else {
            self.session.history.push(ConversationTurn::user(text));
        }

        let sources = [
            RetrievalSource::new(self.base_store.clone(), BASE_CONTEXT_LIMIT),
            RetrievalSource::new(self.query_store.clone(), QUERY_CONTEXT_LIMIT),
        ];
        let examples = retrieve_context(&sources, text).await;
        if self.session.debug {
            tracing::debug!(input = text, examples = examples.len(), "retrieved context");
        }

        let translated = self.translator.classify_and_translate(text, &examples).await?;
        let payload = match translated {
            TranslationResult::Performative => {
                // Required short-circuit: nothing stored, nothing chained.
                events.push(ProcessEvent::Performative);
                return Ok(events);
            }
            TranslationResult::Content(payload) => payload,
        };
        if self.session.debug {
            tracing::debug!(
                statements = payload.statements.len(),
                questions = payload.questions.len(),
                "translated input"
            );
        }

        if !payload.statements.is_empty() {
            // One record per input regardless of statement count, stored
            // before any chaining call.
            self.query_store
                .store_embedding(json!({
                    "sentence": text,
                    "statements": payload.statements.clone(),
                    "type_definitions": payload.type_definitions.clone(),
                    "from_context": payload.from_context.clone(),
                }))
                .await?;

            let mut derived = Vec::new();
            for statement in &payload.statements {
                events.push(ProcessEvent::StatementAccepted {
                    statement: statement.clone(),
                });
                derived.extend(self.reasoner.forward_chain(statement).await?);
            }

            if self.session.inference {
                if derived.is_empty() {
                    events.push(ProcessEvent::NoNewInferences);
                } else {
                    for fact in derived {
                        let english = self.verbalizer.to_english(&fact, "", &examples).await?;
                        events.push(ProcessEvent::Inference { fact, english });
                    }
                }
            }
        }

        if let Some(question) = payload.questions.first() {
            // Single-question-per-turn policy: later questions in the same
            // input are intentionally not processed.
            if payload.questions.len() > 1 {
                tracing::debug!(
                    skipped = payload.questions.len() - 1,
                    "additional questions in this turn are not processed"
                );
            }
            for proof in self.reasoner.backward_chain(question).await? {
                match proof {
                    Some(atom) => {
                        let english = self.verbalizer.to_english(&atom, text, &examples).await?;
                        events.push(ProcessEvent::Proof { atom, english });
                    }
                    None => events.push(ProcessEvent::CannotProve),
                }
            }
        }

        Ok(events)
    }

    /// Free-form reply over the conversation so far; display side channel
    /// only, no influence on the logic pipeline.
    async fn echo_reply(&self, text: &str) -> Result<String> {
        let mut messages = Vec::with_capacity(self.session.history.len() * 2 + 1);
        for turn in &self.session.history {
            messages.push(ChatMessage::user(turn.user_text.clone()));
            if let Some(assistant) = &turn.assistant_text {
                messages.push(ChatMessage::assistant(assistant.clone()));
            }
        }
        messages.push(ChatMessage::user(text));

        let response = self
            .chat
            .chat(ChatRequest {
                model: self.chat_model.clone(),
                system: None,
                messages,
            })
            .await?;
        Ok(response.text)
    }
}
