//! Handlers for `/conversations` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/conversations` | Newest first |
//! | `GET`  | `/conversations/latest` | 404 if there are none |
//! | `GET`  | `/conversations/:id` | Full document: conversation, turns, speakers |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use parlor_core::{
  conversation::{Conversation, ConversationDocument},
  id::ConversationId,
  store::ConversationStore,
};

use crate::error::ApiError;

/// `GET /conversations`
pub async fn list<S>(State(store): State<Arc<S>>) -> Result<Json<Vec<Conversation>>, ApiError>
where
  S: ConversationStore,
{
  let conversations = store
    .get_conversations()
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(conversations))
}

/// `GET /conversations/latest`
pub async fn latest<S>(State(store): State<Arc<S>>) -> Result<Json<Conversation>, ApiError>
where
  S: ConversationStore,
{
  let conversation = store
    .get_latest_conversation()
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(conversation))
}

/// `GET /conversations/:id`
pub async fn document<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<ConversationId>,
) -> Result<Json<ConversationDocument>, ApiError>
where
  S: ConversationStore,
{
  let doc = store
    .get_conversation_document(&id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(doc))
}
