//! Process-wide shared resources
//!
//! Each resource lives in a [`LazySingleton`] and is built on first use. The
//! database and completion client both read their credentials from the secrets
//! vault, so asking for either one also builds the vault handle.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use sqlx_any_conn_mgr::{ConnectParams, Database, LazySingleton};
use sqlx_any_toolkit::QueryRunner;
use tracing::{info, warn};

use crate::completion::{COMPLETION_ITEM, CompletionClient};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::secrets::SecretsManager;
use crate::service::{CompletionSingleton, RelayService};
use crate::transport;

/// Vault item holding the database credentials
pub const DATABASE_ITEM: &str = "ATHENA_POSTGRES";

pub struct AppContext {
   settings: Arc<Settings>,
   secrets: Arc<LazySingleton<SecretsManager, Error>>,
   database: Arc<LazySingleton<Database, Error>>,
   completion: Arc<CompletionSingleton>,
}

impl AppContext {
   /// Wire the singletons. Nothing is contacted until a resource is first requested.
   pub fn new(settings: Settings) -> Result<Self> {
      let settings = Arc::new(settings);
      let http = transport::http_client()?;

      let secrets = Arc::new(LazySingleton::new("secrets manager", {
         let settings = Arc::clone(&settings);
         let http = http.clone();
         move || {
            let settings = Arc::clone(&settings);
            let http = http.clone();
            async move {
               let token = SecretString::from(settings.vault_token.expose_secret().to_string());
               SecretsManager::connect(http, &settings.vault_host, token, &settings.vault_title)
                  .await
            }
         }
      }));

      let database = Arc::new(LazySingleton::new("database", {
         let settings = Arc::clone(&settings);
         let secrets = Arc::clone(&secrets);
         move || {
            let settings = Arc::clone(&settings);
            let secrets = Arc::clone(&secrets);
            async move {
               let item = secrets.get_instance().await?.get_secret_item(DATABASE_ITEM).await?;
               let params = ConnectParams::from_secret_item(
                  |label| item.get(label).map(str::to_string),
                  settings.deployment.is_local(),
                  settings.postgres_host.clone(),
                  settings.postgres_port,
               )?;
               Ok::<_, Error>(Database::connect(&params, Some(settings.database.clone())).await?)
            }
         }
      }));

      let completion = Arc::new(LazySingleton::new("completion client", {
         let secrets = Arc::clone(&secrets);
         move || {
            let secrets = Arc::clone(&secrets);
            let http = http.clone();
            async move {
               let item = secrets.get_instance().await?.get_secret_item(COMPLETION_ITEM).await?;
               CompletionClient::from_secret_item(http, &item)
            }
         }
      }));

      info!("Application context ready ({} deployment)", settings.deployment);
      Ok(Self {
         settings,
         secrets,
         database,
         completion,
      })
   }

   pub fn settings(&self) -> &Settings {
      &self.settings
   }

   pub async fn secrets(&self) -> Result<Arc<SecretsManager>> {
      self.secrets.get_instance().await
   }

   pub async fn database(&self) -> Result<Arc<Database>> {
      self.database.get_instance().await
   }

   pub async fn completion(&self) -> Result<Arc<CompletionClient>> {
      self.completion.get_instance().await
   }

   /// Query runner over the shared database.
   pub async fn query_runner(&self) -> Result<QueryRunner> {
      Ok(QueryRunner::new(self.database().await?))
   }

   pub fn relay_service(&self) -> RelayService {
      RelayService::new(Arc::clone(&self.completion))
   }

   /// Release what was built. Resources never requested are left alone.
   pub async fn shutdown(&self) {
      if let Some(database) = self.database.get() {
         if let Err(e) = database.close().await {
            warn!("Failed to close database: {}", e);
         }
         self.database.reset_instance();
      }
      self.completion.reset_instance();
      self.secrets.reset_instance();
      info!("Application context shut down");
   }
}
