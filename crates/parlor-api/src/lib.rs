//! JSON REST API for Parlor.
//!
//! Exposes an axum [`Router`] backed by any
//! [`parlor_core::store::ConversationStore`]. Auth, TLS, and transport
//! concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", parlor_api::api_router(store.clone()))
//! ```

pub mod conversations;
pub mod error;
pub mod speakers;
pub mod turns;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use parlor_core::store::ConversationStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: ConversationStore + 'static,
{
  Router::new()
    // Conversations
    .route("/conversations", get(conversations::list::<S>))
    .route("/conversations/latest", get(conversations::latest::<S>))
    .route("/conversations/{id}", get(conversations::document::<S>))
    // Speakers
    .route("/speakers", get(speakers::list::<S>).post(speakers::save::<S>))
    .route("/speakers/{id}", get(speakers::get_one::<S>))
    .route("/speakers/named/{name}", get(speakers::get_named::<S>))
    // Turns
    .route("/turns", post(turns::save::<S>))
    .with_state(store)
}
