pub mod orchestrator;
pub mod retrieval;
pub mod session;

pub use orchestrator::Orchestrator;
pub use retrieval::{retrieve_context, RetrievalSource};
pub use session::Session;
