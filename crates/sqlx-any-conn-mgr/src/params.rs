//! Connection parameters resolved from a vault item plus deployment rules

use std::fmt;

use secrecy::{ExposeSecret, SecretString};

use crate::Result;
use crate::error::Error;

/// Vault field label holding the database name
pub const FIELD_DATABASE: &str = "database";
/// Vault field label holding the login role
pub const FIELD_USERNAME: &str = "username";
/// Vault field label holding the password
pub const FIELD_PASSWORD: &str = "password";

const DEFAULT_SCHEME: &str = "postgres";
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 5432;
const PASSWORD_PLACEHOLDER: &str = "XXXXXX";

/// Everything needed to build a connection URL.
///
/// The password is held as a [`SecretString`] and never appears in `Debug` output
/// or in [`safe_url`](Self::safe_url).
pub struct ConnectParams {
   pub scheme: String,
   pub host: String,
   pub port: u16,
   pub username: String,
   password: SecretString,
   pub database: String,
}

impl ConnectParams {
   pub fn new(
      host: impl Into<String>,
      port: u16,
      username: impl Into<String>,
      password: SecretString,
      database: impl Into<String>,
   ) -> Self {
      Self {
         scheme: DEFAULT_SCHEME.to_string(),
         host: host.into(),
         port,
         username: username.into(),
         password,
         database: database.into(),
      }
   }

   /// Resolve parameters from the labelled fields of a vault item.
   ///
   /// `field` looks up a label in the item. The item must carry
   /// [`FIELD_DATABASE`], [`FIELD_USERNAME`] and [`FIELD_PASSWORD`]; the first one
   /// missing is reported by name.
   ///
   /// A `local` deployment always talks to the loopback default. Any other
   /// deployment uses the supplied host/port, falling back to the same defaults.
   pub fn from_secret_item<F>(
      field: F,
      local: bool,
      host: Option<String>,
      port: Option<u16>,
   ) -> Result<Self>
   where
      F: Fn(&str) -> Option<String>,
   {
      let required = |label: &str| {
         field(label)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| Error::MissingField(label.to_string()))
      };

      let database = required(FIELD_DATABASE)?;
      let username = required(FIELD_USERNAME)?;
      let password = SecretString::from(required(FIELD_PASSWORD)?);

      let (host, port) = if local {
         (DEFAULT_HOST.to_string(), DEFAULT_PORT)
      } else {
         (
            host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port.unwrap_or(DEFAULT_PORT),
         )
      };

      Ok(Self::new(host, port, username, password, database))
   }

   /// Override the URL scheme (defaults to `postgres`).
   pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
      self.scheme = scheme.into();
      self
   }

   /// Check that no part of the URL is blank before any connection is attempted.
   pub fn validate(&self) -> Result<()> {
      let checks = [
         (FIELD_USERNAME, self.username.as_str()),
         (FIELD_DATABASE, self.database.as_str()),
         (FIELD_PASSWORD, self.password.expose_secret()),
         ("host", self.host.as_str()),
      ];
      for (name, value) in checks {
         if value.is_empty() {
            return Err(Error::MissingField(name.to_string()));
         }
      }
      Ok(())
   }

   /// Connection URL including the real password.
   pub fn url(&self) -> String {
      self.build_url(self.password.expose_secret())
   }

   /// Connection URL with the password replaced by a fixed placeholder, for logs.
   pub fn safe_url(&self) -> String {
      self.build_url(PASSWORD_PLACEHOLDER)
   }

   fn build_url(&self, password: &str) -> String {
      format!(
         "{}://{}:{}@{}:{}/{}",
         self.scheme,
         urlencoding::encode(&self.username),
         urlencoding::encode(password),
         self.host,
         self.port,
         urlencoding::encode(&self.database),
      )
   }
}

impl fmt::Debug for ConnectParams {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("ConnectParams")
         .field("url", &self.safe_url())
         .finish()
   }
}

/// Redact the password of an arbitrary connection URL.
///
/// URLs without credentials are returned unchanged.
pub fn redact_url(url: &str) -> String {
   let Some((scheme, rest)) = url.split_once("://") else {
      return url.to_string();
   };
   let authority_end = rest.find('/').unwrap_or(rest.len());
   let (authority, tail) = rest.split_at(authority_end);

   match authority.rsplit_once('@') {
      Some((userinfo, host)) => match userinfo.split_once(':') {
         Some((user, _)) => format!(
            "{}://{}:{}@{}{}",
            scheme, user, PASSWORD_PLACEHOLDER, host, tail
         ),
         None => url.to_string(),
      },
      None => url.to_string(),
   }
}
