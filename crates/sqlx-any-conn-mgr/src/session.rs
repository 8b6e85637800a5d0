//! Unit-of-work guard over one pooled connection

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use sqlx::any::{AnyArguments, AnyQueryResult, AnyRow};
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::{Any, AnyConnection};
use tracing::{debug, warn};

use crate::Result;
use crate::dialect::Dialect;
use crate::error::Error;

type AnyQuery<'q> = Query<'q, Any, AnyArguments<'q>>;

/// RAII guard for one transaction on one pooled connection
///
/// A session is opened by [`Database::begin_session`](crate::Database::begin_session)
/// and is resolved exactly once, by [`commit`](Self::commit) or
/// [`rollback`](Self::rollback). Both consume the guard. A session that is dropped
/// unresolved is rolled back: its connection is closed instead of being returned to
/// the pool, so the server discards the open transaction.
///
/// Every statement run through the session is bounded by the configured statement
/// timeout. A statement that exceeds it aborts the session; only rollback is
/// possible afterwards.
///
/// The guard derefs to `AnyConnection` for queries that need the raw connection.
///
/// # Example
///
/// ```no_run
/// use sqlx_any_conn_mgr::Database;
///
/// # async fn example() -> Result<(), sqlx_any_conn_mgr::Error> {
/// let db = Database::connect_url("sqlite://app.db?mode=rwc", None).await?;
/// let mut session = db.begin_session().await?;
/// session
///     .execute(sqlx::query("INSERT INTO users (name) VALUES (?1)").bind("Alice"))
///     .await?;
/// session.commit().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
#[must_use = "if unused, the session is immediately rolled back"]
pub struct Session {
   conn: PoolConnection<Any>,
   dialect: Dialect,
   statement_timeout: Duration,
   active: bool,
   aborted: bool,
}

impl Session {
   pub(crate) async fn begin(
      conn: PoolConnection<Any>,
      dialect: Dialect,
      statement_timeout: Duration,
   ) -> Result<Self> {
      let mut session = Self {
         conn,
         dialect,
         statement_timeout,
         active: false,
         aborted: false,
      };
      session.control("BEGIN").await?;
      session.active = true;
      Ok(session)
   }

   /// Execute a statement and return what it affected.
   pub async fn execute<'q>(&mut self, query: AnyQuery<'q>) -> Result<AnyQueryResult> {
      self.ensure_usable()?;
      let timeout = self.statement_timeout;
      match tokio::time::timeout(timeout, query.execute(&mut *self.conn)).await {
         Ok(result) => Ok(result?),
         Err(_) => Err(self.abort()),
      }
   }

   /// Execute a statement and collect every row it returns.
   pub async fn fetch_all<'q>(&mut self, query: AnyQuery<'q>) -> Result<Vec<AnyRow>> {
      self.ensure_usable()?;
      let timeout = self.statement_timeout;
      match tokio::time::timeout(timeout, query.fetch_all(&mut *self.conn)).await {
         Ok(result) => Ok(result?),
         Err(_) => Err(self.abort()),
      }
   }

   /// Execute a statement and return its first row, if any.
   pub async fn fetch_optional<'q>(&mut self, query: AnyQuery<'q>) -> Result<Option<AnyRow>> {
      self.ensure_usable()?;
      let timeout = self.statement_timeout;
      match tokio::time::timeout(timeout, query.fetch_optional(&mut *self.conn)).await {
         Ok(result) => Ok(result?),
         Err(_) => Err(self.abort()),
      }
   }

   /// Commit the transaction and release the connection.
   pub async fn commit(mut self) -> Result<()> {
      self.ensure_usable()?;
      self.control("COMMIT").await?;
      self.active = false;
      debug!("Session committed");
      Ok(())
   }

   /// Roll back the transaction and release the connection.
   pub async fn rollback(mut self) -> Result<()> {
      if self.aborted {
         // The connection is closed on drop, which discards the transaction
         return Ok(());
      }
      self.control("ROLLBACK").await?;
      self.active = false;
      debug!("Session rolled back");
      Ok(())
   }

   /// Commit the work done so far and immediately start a new transaction on the
   /// same connection.
   ///
   /// Used by manual scopes that persist work in batches.
   pub async fn commit_in_place(&mut self) -> Result<()> {
      self.ensure_usable()?;
      self.control("COMMIT").await?;
      self.active = false;
      self.control("BEGIN").await?;
      self.active = true;
      debug!("Session committed, new transaction started");
      Ok(())
   }

   pub fn dialect(&self) -> Dialect {
      self.dialect
   }

   /// True while the session holds an open transaction.
   pub fn is_active(&self) -> bool {
      self.active && !self.aborted
   }

   async fn control(&mut self, statement: &'static str) -> Result<()> {
      self.execute(sqlx::query(statement)).await?;
      Ok(())
   }

   fn ensure_usable(&self) -> Result<()> {
      if self.aborted {
         return Err(Error::StatementTimeout(self.statement_timeout));
      }
      Ok(())
   }

   fn abort(&mut self) -> Error {
      warn!(
         "Statement exceeded {:?}, aborting session",
         self.statement_timeout
      );
      self.aborted = true;
      self.conn.close_on_drop();
      Error::StatementTimeout(self.statement_timeout)
   }
}

impl Deref for Session {
   type Target = AnyConnection;

   fn deref(&self) -> &Self::Target {
      &self.conn
   }
}

impl DerefMut for Session {
   fn deref_mut(&mut self) -> &mut Self::Target {
      &mut self.conn
   }
}

impl Drop for Session {
   fn drop(&mut self) {
      if self.active && !self.aborted {
         debug!("Dropping unresolved session (will roll back)");
         self.conn.close_on_drop();
      }
   }
}
