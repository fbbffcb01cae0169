use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use kbshell_core::Orchestrator;
use kbshell_gateway::{ChatRequest, ChatResponse, LlmProvider, Reasoner, Translator, Verbalizer};
use kbshell_memory::{
    ScoredPayload, SimilarityStore, StoreError, StubEmbeddingProvider, VectorIndex,
};
use kbshell_schema::{
    ProcessEvent, RetrievedExample, TranslationPayload, TranslationResult,
};
use serde_json::json;
use uuid::Uuid;

type CallLog = Arc<Mutex<Vec<String>>>;

/// In-memory vector index: payloads come back in insertion order, capped at
/// the search limit. Every upsert is recorded in the shared call log so
/// tests can assert call ordering across collaborators.
struct FakeIndex {
    collections: Mutex<HashMap<String, Vec<serde_json::Value>>>,
    log: CallLog,
    fail_upserts: bool,
}

impl FakeIndex {
    fn new(log: CallLog) -> Arc<Self> {
        Arc::new(Self {
            collections: Mutex::new(HashMap::new()),
            log,
            fail_upserts: false,
        })
    }

    fn failing_upserts(log: CallLog) -> Arc<Self> {
        Arc::new(Self {
            collections: Mutex::new(HashMap::new()),
            log,
            fail_upserts: true,
        })
    }

    fn record_count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl VectorIndex for FakeIndex {
    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.collections.lock().unwrap().keys().cloned().collect())
    }

    async fn create_collection(
        &self,
        name: &str,
        _dim: usize,
        _distance: &str,
    ) -> Result<(), StoreError> {
        self.collections
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), StoreError> {
        self.collections.lock().unwrap().remove(name);
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        _id: Uuid,
        _vector: Vec<f32>,
        payload: serde_json::Value,
    ) -> Result<(), StoreError> {
        if self.fail_upserts {
            return Err(StoreError::IndexUnexpectedResponse {
                status: 500,
                body: "fake index down".to_string(),
            });
        }
        self.log.lock().unwrap().push(format!("store:{collection}"));
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(payload);
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        _vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredPayload>, StoreError> {
        Ok(self
            .collections
            .lock()
            .unwrap()
            .get(collection)
            .map(|payloads| {
                payloads
                    .iter()
                    .take(limit)
                    .map(|payload| ScoredPayload {
                        payload: payload.clone(),
                        score: 1.0,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

struct FakeTranslator {
    result: TranslationResult,
    fail: bool,
    seen_examples: Mutex<Vec<Vec<RetrievedExample>>>,
}

impl FakeTranslator {
    fn returning(result: TranslationResult) -> Arc<Self> {
        Arc::new(Self {
            result,
            fail: false,
            seen_examples: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            result: TranslationResult::Performative,
            fail: true,
            seen_examples: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Translator for FakeTranslator {
    async fn classify_and_translate(
        &self,
        _text: &str,
        examples: &[RetrievedExample],
    ) -> Result<TranslationResult> {
        self.seen_examples.lock().unwrap().push(examples.to_vec());
        if self.fail {
            return Err(anyhow!("translation service exploded"));
        }
        Ok(self.result.clone())
    }
}

struct FakeReasoner {
    forward: HashMap<String, Vec<String>>,
    backward: Vec<Option<String>>,
    log: CallLog,
}

impl FakeReasoner {
    fn new(log: CallLog) -> Arc<Self> {
        Arc::new(Self {
            forward: HashMap::new(),
            backward: Vec::new(),
            log,
        })
    }

    fn with_forward(log: CallLog, forward: &[(&str, &[&str])]) -> Arc<Self> {
        Arc::new(Self {
            forward: forward
                .iter()
                .map(|(statement, derived)| {
                    (
                        statement.to_string(),
                        derived.iter().map(|d| d.to_string()).collect(),
                    )
                })
                .collect(),
            backward: Vec::new(),
            log,
        })
    }

    fn with_backward(log: CallLog, backward: Vec<Option<String>>) -> Arc<Self> {
        Arc::new(Self {
            forward: HashMap::new(),
            backward,
            log,
        })
    }
}

#[async_trait]
impl Reasoner for FakeReasoner {
    async fn load_kb(&self, _content: &str) -> Result<()> {
        Ok(())
    }

    async fn forward_chain(&self, statement: &str) -> Result<Vec<String>> {
        self.log.lock().unwrap().push(format!("fc:{statement}"));
        Ok(self.forward.get(statement).cloned().unwrap_or_default())
    }

    async fn backward_chain(&self, question: &str) -> Result<Vec<Option<String>>> {
        self.log.lock().unwrap().push(format!("bc:{question}"));
        Ok(self.backward.clone())
    }
}

struct FakeVerbalizer;

#[async_trait]
impl Verbalizer for FakeVerbalizer {
    async fn to_english(
        &self,
        fact: &str,
        anchor_text: &str,
        _examples: &[RetrievedExample],
    ) -> Result<String> {
        Ok(format!("english({fact}|{anchor_text})"))
    }
}

struct FakeChat {
    reply: String,
    seen_message_counts: Mutex<Vec<usize>>,
}

impl FakeChat {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            seen_message_counts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LlmProvider for FakeChat {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.seen_message_counts
            .lock()
            .unwrap()
            .push(request.messages.len());
        Ok(ChatResponse {
            text: self.reply.clone(),
        })
    }
}

async fn store_over(index: Arc<FakeIndex>, name: &str) -> Arc<SimilarityStore> {
    Arc::new(
        SimilarityStore::open(index, Arc::new(StubEmbeddingProvider::new(8)), name, false)
            .await
            .expect("open fake-backed store"),
    )
}

struct Harness {
    orchestrator: Orchestrator,
    index: Arc<FakeIndex>,
    log: CallLog,
    translator: Arc<FakeTranslator>,
    chat: Arc<FakeChat>,
}

async fn harness(
    log: CallLog,
    translator: Arc<FakeTranslator>,
    reasoner: Arc<FakeReasoner>,
) -> Harness {
    let index = FakeIndex::new(log.clone());
    let chat = FakeChat::new("echo reply");
    let orchestrator = Orchestrator::new(
        store_over(index.clone(), "base").await,
        store_over(index.clone(), "query").await,
        translator.clone(),
        reasoner,
        Arc::new(FakeVerbalizer),
        chat.clone(),
        "test-model",
    );
    Harness {
        orchestrator,
        index,
        log,
        translator,
        chat,
    }
}

fn statement_only(statements: &[&str]) -> TranslationResult {
    TranslationResult::Content(TranslationPayload {
        statements: statements.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    })
}

fn question_only(questions: &[&str]) -> TranslationResult {
    TranslationResult::Content(TranslationPayload {
        questions: questions.iter().map(|q| q.to_string()).collect(),
        ..Default::default()
    })
}

#[tokio::test]
async fn statement_with_no_inferences_reports_explicit_notice() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let mut h = harness(
        log.clone(),
        FakeTranslator::returning(statement_only(&["(father john mary)"])),
        FakeReasoner::new(log.clone()),
    )
    .await;
    h.orchestrator.session_mut().inference = true;

    let events = h
        .orchestrator
        .process_input("John is the father of Mary.")
        .await
        .unwrap();

    assert_eq!(h.index.record_count("query"), 1);
    let fc_calls: Vec<_> = h
        .log
        .lock()
        .unwrap()
        .iter()
        .filter(|entry| entry.starts_with("fc:"))
        .cloned()
        .collect();
    assert_eq!(fc_calls, vec!["fc:(father john mary)"]);
    assert!(events.contains(&ProcessEvent::StatementAccepted {
        statement: "(father john mary)".into()
    }));
    assert!(events.contains(&ProcessEvent::NoNewInferences));
}

#[tokio::test]
async fn narration_off_suppresses_inference_events() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let mut h = harness(
        log.clone(),
        FakeTranslator::returning(statement_only(&["(father john mary)"])),
        FakeReasoner::new(log.clone()),
    )
    .await;

    let events = h
        .orchestrator
        .process_input("John is the father of Mary.")
        .await
        .unwrap();

    assert!(!events.contains(&ProcessEvent::NoNewInferences));
    assert!(!events
        .iter()
        .any(|event| matches!(event, ProcessEvent::Inference { .. })));
}

#[tokio::test]
async fn derived_facts_verbalized_in_statement_then_derivation_order() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let mut h = harness(
        log.clone(),
        FakeTranslator::returning(statement_only(&["(s one)", "(s two)"])),
        FakeReasoner::with_forward(
            log.clone(),
            &[
                ("(s one)", &["(d one-a)", "(d one-b)"]),
                ("(s two)", &["(d two-a)"]),
            ],
        ),
    )
    .await;
    h.orchestrator.session_mut().inference = true;

    let events = h.orchestrator.process_input("Two statements.").await.unwrap();

    let inferences: Vec<String> = events
        .iter()
        .filter_map(|event| match event {
            ProcessEvent::Inference { fact, english } => {
                assert_eq!(english, &format!("english({fact}|)"));
                Some(fact.clone())
            }
            _ => None,
        })
        .collect();
    assert_eq!(inferences, vec!["(d one-a)", "(d one-b)", "(d two-a)"]);
    // One stored record even though the input carried two statements.
    assert_eq!(h.index.record_count("query"), 1);
}

#[tokio::test]
async fn unprovable_question_reports_single_cannot_prove() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let mut h = harness(
        log.clone(),
        FakeTranslator::returning(question_only(&["(relation john bob $r)"])),
        FakeReasoner::with_backward(log.clone(), vec![None]),
    )
    .await;

    let events = h.orchestrator.process_input("Who is John to Bob?").await.unwrap();

    let cannot_prove = events
        .iter()
        .filter(|event| matches!(event, ProcessEvent::CannotProve))
        .count();
    assert_eq!(cannot_prove, 1);
    // Question-only input stores nothing.
    assert_eq!(h.index.record_count("query"), 0);
    assert!(!h.log.lock().unwrap().iter().any(|e| e.starts_with("fc:")));
}

#[tokio::test]
async fn provable_question_verbalizes_anchored_to_input() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let mut h = harness(
        log.clone(),
        FakeTranslator::returning(question_only(&["(relation john bob $r)"])),
        FakeReasoner::with_backward(
            log.clone(),
            vec![Some("(grandparent john bob)".to_string()), None],
        ),
    )
    .await;

    let events = h.orchestrator.process_input("Who is John to Bob?").await.unwrap();

    assert!(events.contains(&ProcessEvent::Proof {
        atom: "(grandparent john bob)".into(),
        english: "english((grandparent john bob)|Who is John to Bob?)".into(),
    }));
    assert!(events.contains(&ProcessEvent::CannotProve));
}

#[tokio::test]
async fn performative_stores_nothing_and_chains_nothing() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let mut h = harness(
        log.clone(),
        FakeTranslator::returning(TranslationResult::Performative),
        FakeReasoner::new(log.clone()),
    )
    .await;

    let events = h.orchestrator.process_input("Hello there!").await.unwrap();

    assert_eq!(events, vec![ProcessEvent::Performative]);
    assert_eq!(h.index.record_count("base"), 0);
    assert_eq!(h.index.record_count("query"), 0);
    assert!(h.log.lock().unwrap().is_empty());
    // The turn is still part of the conversation history.
    assert_eq!(h.orchestrator.session().history.len(), 1);
    assert_eq!(h.orchestrator.session().history[0].user_text, "Hello there!");
}

#[tokio::test]
async fn statement_and_question_both_run_with_store_first() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let translator = FakeTranslator::returning(TranslationResult::Content(TranslationPayload {
        statements: vec!["(surgeon parent-of-boy)".into()],
        questions: vec!["(relation surgeon boy $r)".into()],
        ..Default::default()
    }));
    let mut h = harness(
        log.clone(),
        translator,
        FakeReasoner::with_backward(log.clone(), vec![Some("(mother surgeon boy)".to_string())]),
    )
    .await;

    let events = h.orchestrator.process_input("The surgeon riddle.").await.unwrap();

    assert!(events
        .iter()
        .any(|event| matches!(event, ProcessEvent::StatementAccepted { .. })));
    assert!(events
        .iter()
        .any(|event| matches!(event, ProcessEvent::Proof { .. })));

    // The query-collection store must precede every chaining call.
    let calls = h.log.lock().unwrap().clone();
    let store_pos = calls.iter().position(|c| c == "store:query").unwrap();
    let first_chain = calls
        .iter()
        .position(|c| c.starts_with("fc:") || c.starts_with("bc:"))
        .unwrap();
    assert!(store_pos < first_chain, "calls were: {calls:?}");
}

#[tokio::test]
async fn only_first_question_is_processed() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let mut h = harness(
        log.clone(),
        FakeTranslator::returning(question_only(&["(q one)", "(q two)"])),
        FakeReasoner::with_backward(log.clone(), vec![None]),
    )
    .await;

    h.orchestrator.process_input("Two questions?").await.unwrap();

    let bc_calls: Vec<_> = h
        .log
        .lock()
        .unwrap()
        .iter()
        .filter(|entry| entry.starts_with("bc:"))
        .cloned()
        .collect();
    assert_eq!(bc_calls, vec!["bc:(q one)"]);
}

#[tokio::test]
async fn context_merges_base_before_query_and_filters_sentenceless() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let mut h = harness(
        log.clone(),
        FakeTranslator::returning(TranslationResult::Performative),
        FakeReasoner::new(log.clone()),
    )
    .await;

    // Seed three base records, one junk record, and two query records.
    {
        let mut collections = h.index.collections.lock().unwrap();
        collections.insert(
            "base".to_string(),
            vec![
                json!({"sentence": "base one"}),
                json!({"no_sentence": true}),
                json!({"sentence": "base two"}),
            ],
        );
        collections.insert(
            "query".to_string(),
            vec![
                json!({"sentence": "query one"}),
                json!({"sentence": "query two"}),
            ],
        );
    }

    h.orchestrator.process_input("anything").await.unwrap();

    let seen = h.translator.seen_examples.lock().unwrap();
    let sentences: Vec<&str> = seen[0].iter().map(|e| e.sentence.as_str()).collect();
    assert_eq!(sentences, vec!["base one", "base two", "query one", "query two"]);
}

#[tokio::test]
async fn llm_echo_records_exchange_and_carries_history() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let mut h = harness(
        log.clone(),
        FakeTranslator::returning(TranslationResult::Performative),
        FakeReasoner::new(log.clone()),
    )
    .await;
    h.orchestrator.session_mut().llm_echo = true;

    let events = h.orchestrator.process_input("first input").await.unwrap();
    assert_eq!(
        events[0],
        ProcessEvent::LlmReply {
            text: "echo reply".into()
        }
    );
    assert_eq!(
        h.orchestrator.session().history[0].assistant_text.as_deref(),
        Some("echo reply")
    );

    h.orchestrator.process_input("second input").await.unwrap();

    // First call: just the current input. Second call: prior user +
    // assistant turns plus the current input.
    let counts = h.chat.seen_message_counts.lock().unwrap().clone();
    assert_eq!(counts, vec![1, 3]);
}

#[tokio::test]
async fn translation_failure_propagates_but_keeps_history() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let mut h = harness(log.clone(), FakeTranslator::failing(), FakeReasoner::new(log.clone())).await;

    let err = h.orchestrator.process_input("anything").await.unwrap_err();
    assert!(err.to_string().contains("translation service exploded"));
    assert_eq!(h.orchestrator.session().history.len(), 1);
    assert!(h.log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn store_failure_aborts_before_any_chaining() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let index = FakeIndex::failing_upserts(log.clone());
    let mut orchestrator = Orchestrator::new(
        store_over(index.clone(), "base").await,
        store_over(index, "query").await,
        FakeTranslator::returning(statement_only(&["(father john mary)"])),
        FakeReasoner::new(log.clone()),
        Arc::new(FakeVerbalizer),
        FakeChat::new("unused"),
        "test-model",
    );

    assert!(orchestrator
        .process_input("John is the father of Mary.")
        .await
        .is_err());
    assert!(log.lock().unwrap().is_empty());
}
