//! Client for a 1Password Connect style secrets vault
//!
//! Items are looked up by title inside one vault. Only labelled fields with a
//! value are kept. The connect token is sent as a bearer token and never logged.

use std::collections::HashMap;
use std::fmt;

use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct VaultSummary {
   id: String,
}

#[derive(Debug, Deserialize)]
struct ItemSummary {
   id: String,
}

#[derive(Debug, Deserialize)]
struct FullItem {
   title: String,
   #[serde(default)]
   fields: Vec<ItemField>,
}

#[derive(Debug, Deserialize)]
struct ItemField {
   label: Option<String>,
   value: Option<String>,
}

/// Labelled values of one vault item.
pub struct SecretItem {
   title: String,
   fields: HashMap<String, String>,
}

impl SecretItem {
   pub fn new(title: impl Into<String>, fields: HashMap<String, String>) -> Self {
      Self {
         title: title.into(),
         fields,
      }
   }

   pub fn title(&self) -> &str {
      &self.title
   }

   pub fn get(&self, label: &str) -> Option<&str> {
      self.fields.get(label).map(String::as_str)
   }

   /// Value of `label`, or a configuration error naming the item and label.
   pub fn require(&self, label: &str) -> Result<&str> {
      self.get(label).ok_or_else(|| {
         Error::Configuration(format!(
            "secret item '{}' has no field '{}'",
            self.title, label
         ))
      })
   }
}

impl fmt::Debug for SecretItem {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let mut labels: Vec<_> = self.fields.keys().collect();
      labels.sort();
      f.debug_struct("SecretItem")
         .field("title", &self.title)
         .field("labels", &labels)
         .finish()
   }
}

/// Handle on one vault, resolved from its title at connect time.
pub struct SecretsManager {
   client: reqwest::Client,
   host: String,
   token: SecretString,
   vault_id: String,
   vault_title: String,
}

impl SecretsManager {
   /// Resolve `vault_title` to a vault id.
   ///
   /// Fails with a configuration error if no vault has that title, and with
   /// `ResourceUnavailable` if the vault server cannot be reached or rejects the token.
   pub async fn connect(
      client: reqwest::Client,
      host: &str,
      token: SecretString,
      vault_title: &str,
   ) -> Result<Self> {
      let host = host.trim_end_matches('/').to_string();
      let mut manager = Self {
         client,
         host,
         token,
         vault_id: String::new(),
         vault_title: vault_title.to_string(),
      };

      let url = format!("{}/v1/vaults", manager.host);
      let vaults: Vec<VaultSummary> = manager
         .send(manager.get(&url).query(&[("filter", title_filter(vault_title))]))
         .await?;
      let vault = vaults.into_iter().next().ok_or_else(|| {
         error!("Vault '{}' not found at {}", vault_title, manager.host);
         Error::Configuration(format!("vault '{}' not found", vault_title))
      })?;

      manager.vault_id = vault.id;
      info!("Connected to vault '{}' at {}", vault_title, manager.host);
      Ok(manager)
   }

   /// Fetch an item by title with all of its labelled fields.
   pub async fn get_secret_item(&self, name: &str) -> Result<SecretItem> {
      let item_id = self.find_item(name).await?;
      let url = format!("{}/v1/vaults/{}/items/{}", self.host, self.vault_id, item_id);
      let item: FullItem = self.send(self.get(&url)).await?;

      let fields = item
         .fields
         .into_iter()
         .filter_map(|field| match (field.label, field.value) {
            (Some(label), Some(value)) => Some((label, value)),
            _ => None,
         })
         .collect::<HashMap<_, _>>();

      debug!("Fetched secret item '{}' ({} field(s))", name, fields.len());
      Ok(SecretItem::new(item.title, fields))
   }

   /// Fetch a file attached to an item, as UTF-8 text.
   pub async fn get_secret_file(&self, name: &str, file_id: &str) -> Result<String> {
      let item_id = self.find_item(name).await?;
      let url = format!(
         "{}/v1/vaults/{}/items/{}/files/{}/content",
         self.host, self.vault_id, item_id, file_id
      );
      let response = self.check(self.get(&url)).await?;
      let bytes = response.bytes().await.map_err(unavailable)?;

      String::from_utf8(bytes.to_vec()).map_err(|_| {
         Error::Configuration(format!(
            "secret file '{}' of item '{}' is not valid UTF-8",
            file_id, name
         ))
      })
   }

   pub fn vault_title(&self) -> &str {
      &self.vault_title
   }

   async fn find_item(&self, name: &str) -> Result<String> {
      let url = format!("{}/v1/vaults/{}/items", self.host, self.vault_id);
      let items: Vec<ItemSummary> = self
         .send(self.get(&url).query(&[("filter", title_filter(name))]))
         .await?;

      items.into_iter().next().map(|item| item.id).ok_or_else(|| {
         Error::Configuration(format!(
            "secret item '{}' not found in vault '{}'",
            name, self.vault_title
         ))
      })
   }

   fn get(&self, url: &str) -> RequestBuilder {
      self.client.get(url).bearer_auth(self.token.expose_secret())
   }

   async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
      let response = self.check(request).await?;
      response.json().await.map_err(|e| {
         error!("Malformed vault response: {}", e);
         Error::ResourceUnavailable(format!("malformed vault response: {e}"))
      })
   }

   async fn check(&self, request: RequestBuilder) -> Result<reqwest::Response> {
      let response = request.send().await.map_err(unavailable)?;
      let status = response.status();
      if status.is_success() {
         return Ok(response);
      }

      let body = response.text().await.unwrap_or_default();
      error!("Vault request failed with {}: {}", status, body);
      let reason = match status {
         StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => "vault rejected the connect token",
         _ => "vault request failed",
      };
      Err(Error::ResourceUnavailable(format!("{reason} ({status})")))
   }
}

impl fmt::Debug for SecretsManager {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("SecretsManager")
         .field("host", &self.host)
         .field("vault_title", &self.vault_title)
         .field("vault_id", &self.vault_id)
         .finish_non_exhaustive()
   }
}

fn title_filter(title: &str) -> String {
   format!("title eq \"{}\"", title)
}

fn unavailable(error: reqwest::Error) -> Error {
   error!("Vault unreachable: {}", error);
   Error::ResourceUnavailable(format!("vault unreachable: {error}"))
}
