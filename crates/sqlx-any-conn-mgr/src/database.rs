//! Shared database engine with pooled sessions

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};

use sqlx::any::AnyPoolOptions;
use sqlx::{Any, Pool};
use tracing::{error, info, warn};

use crate::Result;
use crate::config::DatabaseConfig;
use crate::dialect::Dialect;
use crate::error::Error;
use crate::params::{ConnectParams, redact_url};
use crate::session::Session;

/// Pooled database engine shared by every request of a service.
///
/// The pool pings each connection before handing it out and recycles connections
/// after [`DatabaseConfig::max_lifetime_secs`]. Work is done through [`Session`]s,
/// which never commit on their own.
///
/// Typically held in a [`LazySingleton`](crate::LazySingleton) so it is built once
/// on first use.
///
/// # Example
///
/// ```no_run
/// use sqlx_any_conn_mgr::Database;
///
/// # async fn example() -> Result<(), sqlx_any_conn_mgr::Error> {
/// let db = Database::connect_url("sqlite://app.db?mode=rwc", None).await?;
///
/// let rows = db
///     .with_session(async |session| session.fetch_all(sqlx::query("SELECT * FROM users")).await)
///     .await?;
///
/// db.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Database {
   pool: Pool<Any>,

   dialect: Dialect,

   /// Connection URL with the password redacted
   safe_url: String,

   config: DatabaseConfig,

   /// Marks database as closed to prevent further operations
   closed: AtomicBool,
}

impl Database {
   /// Connect using parameters resolved from the vault.
   ///
   /// Parameters are validated before any connection is attempted.
   ///
   /// # Arguments
   ///
   /// * `params` - Credentials and host
   /// * `custom_config` - Optional pool and schema configuration.
   ///   Pass `None` to use defaults (10 connections, 1 hour connection lifetime).
   pub async fn connect(
      params: &ConnectParams,
      custom_config: Option<DatabaseConfig>,
   ) -> Result<Self> {
      params.validate()?;
      Self::open(&params.url(), params.safe_url(), custom_config).await
   }

   /// Connect to a database URL directly.
   ///
   /// Useful for file-backed SQLite (`sqlite://path?mode=rwc`) and tests.
   ///
   /// ```no_run
   /// use sqlx_any_conn_mgr::{Database, DatabaseConfig};
   ///
   /// # async fn example() -> Result<(), sqlx_any_conn_mgr::Error> {
   /// let config = DatabaseConfig {
   ///     max_connections: 2,
   ///     statement_timeout_secs: 5,
   ///     ..Default::default()
   /// };
   /// let db = Database::connect_url("sqlite://test.db?mode=rwc", Some(config)).await?;
   /// # Ok(())
   /// # }
   /// ```
   pub async fn connect_url(url: &str, custom_config: Option<DatabaseConfig>) -> Result<Self> {
      if url.trim().is_empty() {
         return Err(Error::InvalidConfig("connection URL cannot be empty".into()));
      }
      Self::open(url, redact_url(url), custom_config).await
   }

   async fn open(
      url: &str,
      safe_url: String,
      custom_config: Option<DatabaseConfig>,
   ) -> Result<Self> {
      let config = custom_config.unwrap_or_default();
      if config.max_connections == 0 {
         return Err(Error::InvalidConfig(
            "max_connections must be at least 1".into(),
         ));
      }

      let dialect = Dialect::from_url(url)?;

      // Idempotent, registers the compiled-in drivers with the Any driver
      sqlx::any::install_default_drivers();

      let pool = AnyPoolOptions::new()
         .max_connections(config.max_connections)
         .acquire_timeout(config.acquire_timeout())
         .max_lifetime(Some(config.max_lifetime()))
         .test_before_acquire(true)
         .connect(url)
         .await
         .map_err(|source| {
            error!("Failed to initialize database at {}: {}", safe_url, source);
            Error::ResourceUnavailable {
               url: safe_url.clone(),
               source,
            }
         })?;

      info!("Database initialized at {}", safe_url);

      Ok(Self {
         pool,
         dialect,
         safe_url,
         config,
         closed: AtomicBool::new(false),
      })
   }

   /// Draw a pooled connection and open a transaction on it.
   ///
   /// The returned session must be committed explicitly; dropping it rolls back.
   pub async fn begin_session(&self) -> Result<Session> {
      if self.is_closed() {
         return Err(Error::DatabaseClosed);
      }

      let conn = self.pool.acquire().await?;
      Session::begin(conn, self.dialect, self.config.statement_timeout()).await
   }

   /// Run `body` inside a session that commits on success.
   ///
   /// If `body` fails the session is rolled back and the original error is returned.
   /// A failure to roll back is logged and does not replace that error.
   pub async fn with_session<T, E, F>(&self, body: F) -> std::result::Result<T, E>
   where
      F: AsyncFnOnce(&mut Session) -> std::result::Result<T, E>,
      E: From<Error> + Display,
   {
      let mut session = self.begin_session().await?;
      match body(&mut session).await {
         Ok(value) => {
            session.commit().await?;
            Ok(value)
         }
         Err(e) => {
            error!("Session failed, rolling back: {}", e);
            if let Err(rollback_err) = session.rollback().await {
               error!("Rollback failed: {}", rollback_err);
            }
            Err(e)
         }
      }
   }

   /// Run `body` inside a session that is never committed automatically.
   ///
   /// The body persists work with [`Session::commit_in_place`]. Anything left
   /// uncommitted when the body returns is discarded. If `body` fails the session is
   /// rolled back and the original error is returned.
   pub async fn with_manual_session<T, E, F>(&self, body: F) -> std::result::Result<T, E>
   where
      F: AsyncFnOnce(&mut Session) -> std::result::Result<T, E>,
      E: From<Error> + Display,
   {
      let mut session = self.begin_session().await?;
      match body(&mut session).await {
         Ok(value) => {
            if let Err(e) = session.rollback().await {
               error!("Rollback after manual session failed: {}", e);
            }
            Ok(value)
         }
         Err(e) => {
            error!("Manual session failed, rolling back: {}", e);
            if let Err(rollback_err) = session.rollback().await {
               error!("Rollback failed: {}", rollback_err);
            }
            Err(e)
         }
      }
   }

   /// Drop every declared table in reverse declaration order, in one transaction.
   ///
   /// Destructive. Tables are taken from [`DatabaseConfig::tables`].
   pub async fn drop_all(&self) -> Result<()> {
      let tables = &self.config.tables;
      warn!(
         "Dropping {} table(s) from {}",
         tables.len(),
         self.safe_url
      );

      let dialect = self.dialect;
      self
         .with_session(async |session| {
            for table in tables.iter().rev() {
               let statement = dialect.drop_table_statement(table);
               session.execute(sqlx::query(&statement)).await?;
            }
            Ok::<_, Error>(())
         })
         .await?;

      info!("Dropped all tables from {}", self.safe_url);
      Ok(())
   }

   /// Close the pool.
   ///
   /// Waits for checked-out connections to be returned. After calling close, any
   /// attempt to open a session returns `Error::DatabaseClosed`, as does a second
   /// call to close.
   pub async fn close(&self) -> Result<()> {
      if self.closed.swap(true, Ordering::SeqCst) {
         return Err(Error::DatabaseClosed);
      }

      self.pool.close().await;
      info!("Database closed at {}", self.safe_url);
      Ok(())
   }

   pub fn is_closed(&self) -> bool {
      self.closed.load(Ordering::SeqCst)
   }

   pub fn dialect(&self) -> Dialect {
      self.dialect
   }

   pub fn safe_url(&self) -> &str {
      &self.safe_url
   }

   pub fn config(&self) -> &DatabaseConfig {
      &self.config
   }

   /// The underlying pool, for statements that do not need a session.
   pub fn pool(&self) -> Result<&Pool<Any>> {
      if self.is_closed() {
         return Err(Error::DatabaseClosed);
      }
      Ok(&self.pool)
   }
}
