//! NorthStar Core crate - shared types, capability traits, configuration and errors.
//!
//! Every other crate in the workspace depends on this one. It has no I/O of
//! its own beyond reading and writing the config file.

pub mod capability;
pub mod config;
pub mod error;
pub mod types;

pub use capability::{ConversationStore, Generation, RecordStore, SemanticSearch};
pub use config::NorthstarConfig;
pub use error::{CapabilityError, GenerationError, NorthstarError, Result};
pub use types::*;
