//! Client for an OpenAI-compatible chat completion endpoint
//!
//! The API key is wrapped in [`SecretString`] and only exposed when building the
//! request's authorization header.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::secrets::SecretItem;

/// Vault item holding the completion API credentials
pub const COMPLETION_ITEM: &str = "PHALA_SERVERLESS_TEE";
/// Vault field label holding the API key
pub const FIELD_API_KEY: &str = "credential";
/// Vault field label holding the API host
pub const FIELD_HOST: &str = "hostname";

/// Model requested when none is configured
pub const DEFAULT_MODEL: &str = "phala/deepseek-chat-v3-0324";

const COMPLETIONS_PATH: &str = "/v1/chat/completions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
   System,
   User,
   Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
   pub role: ChatRole,
   pub content: String,
}

impl ChatMessage {
   pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
      Self {
         role,
         content: content.into(),
      }
   }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
   model: &'a str,
   messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatResponse {
   choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
   message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
   content: Option<String>,
}

pub struct CompletionClient {
   client: reqwest::Client,
   api_key: SecretString,
   base_url: String,
   model: String,
}

impl CompletionClient {
   /// `host` may omit its scheme, in which case `https://` is assumed.
   pub fn new(client: reqwest::Client, api_key: SecretString, host: &str) -> Self {
      let host = host.trim().trim_end_matches('/');
      let base_url = if host.contains("://") {
         host.to_string()
      } else {
         format!("https://{}", host)
      };

      Self {
         client,
         api_key,
         base_url,
         model: DEFAULT_MODEL.to_string(),
      }
   }

   /// Build from the [`COMPLETION_ITEM`] vault item.
   pub fn from_secret_item(client: reqwest::Client, item: &SecretItem) -> Result<Self> {
      let api_key = SecretString::from(item.require(FIELD_API_KEY)?.to_string());
      let host = item.require(FIELD_HOST)?;
      Ok(Self::new(client, api_key, host))
   }

   pub fn with_model(mut self, model: impl Into<String>) -> Self {
      self.model = model.into();
      self
   }

   pub fn base_url(&self) -> &str {
      &self.base_url
   }

   pub fn model(&self) -> &str {
      &self.model
   }

   /// Send `messages` and return the content of the first choice.
   ///
   /// A non-success status, or a body without `choices[0].message.content`,
   /// is returned as [`Error::UpstreamApi`] carrying the status and raw body.
   pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
      let url = format!("{}{}", self.base_url, COMPLETIONS_PATH);
      let request = ChatRequest {
         model: &self.model,
         messages,
      };

      debug!("Requesting completion for {} message(s)", messages.len());
      let response = self
         .client
         .post(&url)
         .bearer_auth(self.api_key.expose_secret())
         .json(&request)
         .send()
         .await
         .map_err(unavailable)?;

      let status = response.status().as_u16();
      let body = response.text().await.map_err(unavailable)?;

      if !(200..300).contains(&status) {
         error!("Completion API returned {}: {}", status, body);
         return Err(Error::UpstreamApi { status, body });
      }

      let content = serde_json::from_str::<ChatResponse>(&body)
         .ok()
         .and_then(|parsed| parsed.choices.into_iter().next())
         .and_then(|choice| choice.message.content);

      match content {
         Some(content) => Ok(content),
         None => {
            error!("Unexpected completion response: {}", body);
            Err(Error::UpstreamApi { status, body })
         }
      }
   }
}

impl fmt::Debug for CompletionClient {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("CompletionClient")
         .field("base_url", &self.base_url)
         .field("model", &self.model)
         .finish_non_exhaustive()
   }
}

fn unavailable(error: reqwest::Error) -> Error {
   error!("Completion API unreachable: {}", error);
   Error::ResourceUnavailable(format!("completion API unreachable: {error}"))
}
