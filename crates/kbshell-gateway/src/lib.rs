pub mod llm;
pub mod reason;
pub mod translate;
pub mod verbalize;

pub use llm::{ollama, ChatMessage, ChatRequest, ChatResponse, LlmProvider, OpenAiCompatProvider};
pub use reason::{HttpReasoner, Reasoner};
pub use translate::{LlmTranslator, Translator};
pub use verbalize::{LlmVerbalizer, Verbalizer};
