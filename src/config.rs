//! Process settings read from the environment

use std::env;
use std::fmt;
use std::str::FromStr;

use secrecy::SecretString;
use sqlx_any_conn_mgr::DatabaseConfig;

use crate::error::{Error, Result};

/// Vault title used when `ONEPASS_VAULT` is unset
pub const DEFAULT_VAULT: &str = "loyal-web-backend";

const LOCAL_BIND_HOST: &str = "127.0.0.1";
const LOCAL_BIND_PORT: u16 = 50051;
const LOCAL_FRONTEND_URL: &str = "https://127.0.0.1:3000/";
const DEFAULT_LOG_LEVEL: &str = "debug";

/// Where the process is running. Only the exact value `local` changes behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deployment {
   Local,
   Remote(String),
}

impl Deployment {
   pub fn is_local(&self) -> bool {
      matches!(self, Deployment::Local)
   }
}

impl From<&str> for Deployment {
   fn from(value: &str) -> Self {
      if value == "local" {
         Deployment::Local
      } else {
         Deployment::Remote(value.to_string())
      }
   }
}

impl fmt::Display for Deployment {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         Deployment::Local => f.write_str("local"),
         Deployment::Remote(name) => f.write_str(name),
      }
   }
}

/// Everything the service reads from its environment at startup.
pub struct Settings {
   pub deployment: Deployment,
   pub vault_host: String,
   pub vault_token: SecretString,
   pub vault_title: String,
   /// Database host and port, used outside `local`
   pub postgres_host: Option<String>,
   pub postgres_port: Option<u16>,
   pub bind_host: String,
   pub bind_port: u16,
   pub frontend_url: String,
   pub log_level: String,
   pub database: DatabaseConfig,
}

impl Settings {
   /// Read settings from the process environment, loading `.env` first if present.
   pub fn from_env() -> Result<Self> {
      dotenvy::dotenv().ok();
      Self::from_lookup(|name| env::var(name).ok())
   }

   /// Read settings through `lookup`. Empty values count as unset.
   pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
      let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
      let required = |name: &str| {
         var(name).ok_or_else(|| Error::Configuration(format!("{name} must be set")))
      };

      let deployment = var("GLOBAL_APP_ENV")
         .map(|value| Deployment::from(value.as_str()))
         .unwrap_or(Deployment::Local);

      let vault_token = SecretString::from(required("ONEPASS_CONNECT_TOKEN")?);
      let vault_host = required("ONEPASS_CONNECT_HOST")?;
      let vault_title = var("ONEPASS_VAULT").unwrap_or_else(|| DEFAULT_VAULT.to_string());

      let postgres_host = var("POSTGRES_HOST");
      let postgres_port = var("POSTGRES_PORT")
         .map(|value| parse_var::<u16>("POSTGRES_PORT", &value))
         .transpose()?;

      let (bind_host, bind_port, frontend_url) = if deployment.is_local() {
         (
            LOCAL_BIND_HOST.to_string(),
            LOCAL_BIND_PORT,
            LOCAL_FRONTEND_URL.to_string(),
         )
      } else {
         (
            required("GRPC_HOST")?,
            parse_var("GRPC_PORT", &required("GRPC_PORT")?)?,
            required("FRONTEND_URL")?,
         )
      };

      let log_level = var("LOGGING_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

      let mut database = DatabaseConfig::default();
      if let Some(value) = var("DATABASE_MAX_CONNECTIONS") {
         database.max_connections = parse_var("DATABASE_MAX_CONNECTIONS", &value)?;
      }
      if let Some(value) = var("DATABASE_STATEMENT_TIMEOUT_SECS") {
         database.statement_timeout_secs = parse_var("DATABASE_STATEMENT_TIMEOUT_SECS", &value)?;
      }

      Ok(Self {
         deployment,
         vault_host,
         vault_token,
         vault_title,
         postgres_host,
         postgres_port,
         bind_host,
         bind_port,
         frontend_url,
         log_level,
         database,
      })
   }

   pub fn bind_address(&self) -> String {
      format!("{}:{}", self.bind_host, self.bind_port)
   }
}

impl fmt::Debug for Settings {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Settings")
         .field("deployment", &self.deployment)
         .field("vault_host", &self.vault_host)
         .field("vault_title", &self.vault_title)
         .field("bind_address", &self.bind_address())
         .field("frontend_url", &self.frontend_url)
         .field("log_level", &self.log_level)
         .finish_non_exhaustive()
   }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
   value
      .trim()
      .parse()
      .map_err(|_| Error::Configuration(format!("{name} has an invalid value '{value}'")))
}
