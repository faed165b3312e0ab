//! NorthStar Agent crate - the query pipeline.
//!
//! Classifies a query into intents, fans out structured record lookups and
//! semantic search, assembles a size-bounded context bundle, synthesizes an
//! answer through a primary/fallback/default chain and records the exchange
//! in the session's conversation history.

pub mod augment;
pub mod error;
pub mod generation;
pub mod keys;
pub mod orchestrator;
pub mod prompt;
pub mod retrieval;
pub mod router;
pub mod session;
pub mod synthesis;

pub use augment::ContextAugmenter;
pub use error::AgentError;
pub use generation::{DisabledGeneration, HttpGeneration};
pub use orchestrator::AgentOrchestrator;
pub use retrieval::RetrievalCoordinator;
pub use router::IntentRouter;
pub use session::SessionManager;
pub use synthesis::{SynthesisEngine, SynthesisRun, SynthesisState};
