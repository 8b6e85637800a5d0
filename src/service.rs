//! Relay of user queries to the completion API

use std::sync::Arc;

use futures::Stream;
use serde::{Deserialize, Serialize};
use sqlx_any_conn_mgr::LazySingleton;
use tracing::debug;

use crate::completion::{ChatMessage, ChatRole, CompletionClient};
use crate::error::{Error, Result};

/// Queries must be shorter than this many characters
pub const MAX_QUERY_CHARS: usize = 1000;

pub type CompletionSingleton = LazySingleton<CompletionClient, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
   User,
   Assistant,
}

/// One earlier turn of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogEntry {
   /// Absent means the user spoke
   #[serde(default)]
   pub role: Option<Role>,
   pub content: String,
   /// Unix timestamp of the turn
   #[serde(default)]
   pub date: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
   #[serde(default)]
   pub dialog: Vec<DialogEntry>,
   pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
   pub response: String,
}

/// Reject empty or over-long query text.
///
/// Whitespace counts toward the length; only the empty string is empty.
pub fn validate_query(text: &str) -> Result<()> {
   if text.is_empty() {
      return Err(Error::Validation("query must not be empty".into()));
   }
   let length = text.chars().count();
   if length >= MAX_QUERY_CHARS {
      return Err(Error::Validation(format!(
         "query must be shorter than {} characters, got {}",
         MAX_QUERY_CHARS, length
      )));
   }
   Ok(())
}

/// Dialog history followed by the new query, in the completion API's terms.
pub fn build_messages(dialog: &[DialogEntry], text: &str) -> Vec<ChatMessage> {
   dialog
      .iter()
      .map(|entry| {
         let role = match entry.role {
            Some(Role::Assistant) => ChatRole::Assistant,
            Some(Role::User) | None => ChatRole::User,
         };
         ChatMessage::new(role, entry.content.as_str())
      })
      .chain(std::iter::once(ChatMessage::new(ChatRole::User, text)))
      .collect()
}

/// Validates queries and forwards them to the shared completion client.
///
/// The client is built on first use, so a rejected query never reaches the
/// vault or the completion API.
#[derive(Debug, Clone)]
pub struct RelayService {
   completion: Arc<CompletionSingleton>,
}

impl RelayService {
   pub fn new(completion: Arc<CompletionSingleton>) -> Self {
      Self { completion }
   }

   pub async fn query(&self, dialog: &[DialogEntry], text: &str) -> Result<String> {
      validate_query(text)?;

      let client = self.completion.get_instance().await?;
      let reply = client.complete(&build_messages(dialog, text)).await?;
      debug!("Relayed query ({} dialog entries)", dialog.len());
      Ok(reply)
   }

   /// Streaming form of [`query`](Self::query).
   ///
   /// Validation happens before the stream is returned. The stream yields the
   /// whole reply as a single chunk.
   pub fn query_stream(
      &self,
      dialog: Vec<DialogEntry>,
      text: String,
   ) -> Result<impl Stream<Item = Result<String>> + Send + 'static + use<>> {
      validate_query(&text)?;

      let service = self.clone();
      Ok(futures::stream::once(async move {
         service.query(&dialog, &text).await
      }))
   }
}
