//! NorthStar API crate - axum HTTP surface for the agent.
//!
//! Exposes the query endpoint, session history and a health check over the
//! shared orchestrator.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
