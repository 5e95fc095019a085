pub mod fallback;
pub mod orchestrator;
pub mod retrieval;

pub use fallback::{FallbackError, FallbackResponder, LlmResponder, NoFallback};
pub use orchestrator::ChatService;
pub use retrieval::{ContextRetriever, KeywordRetriever, NoRetrieval, RetrievalError};
