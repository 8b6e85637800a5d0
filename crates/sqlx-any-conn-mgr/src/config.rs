//! Configuration for the shared database engine

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`Database`](crate::Database) engine
///
/// # Examples
///
/// ```
/// use sqlx_any_conn_mgr::DatabaseConfig;
///
/// // Use defaults
/// let config = DatabaseConfig::default();
///
/// // Declare the application's tables and shrink the pool
/// let config = DatabaseConfig {
///     max_connections: 4,
///     tables: vec!["users".into(), "orders".into()],
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
   /// Maximum number of pooled connections
   ///
   /// Default: 10
   pub max_connections: u32,

   /// How long a caller waits for a free connection before giving up (in seconds)
   ///
   /// Default: 30
   pub acquire_timeout_secs: u64,

   /// Maximum lifetime of a pooled connection before it is recycled (in seconds)
   ///
   /// Default: 3600
   pub max_lifetime_secs: u64,

   /// Upper bound on any single statement run through a session (in seconds)
   ///
   /// Default: 30
   pub statement_timeout_secs: u64,

   /// Tables owned by the application, in creation order
   ///
   /// [`Database::drop_all`](crate::Database::drop_all) drops them in reverse order.
   ///
   /// Default: empty
   pub tables: Vec<String>,
}

impl DatabaseConfig {
   pub(crate) fn acquire_timeout(&self) -> Duration {
      Duration::from_secs(self.acquire_timeout_secs)
   }

   pub(crate) fn max_lifetime(&self) -> Duration {
      Duration::from_secs(self.max_lifetime_secs)
   }

   pub(crate) fn statement_timeout(&self) -> Duration {
      Duration::from_secs(self.statement_timeout_secs)
   }
}

impl Default for DatabaseConfig {
   fn default() -> Self {
      Self {
         max_connections: 10,
         acquire_timeout_secs: 30,
         max_lifetime_secs: 3600,
         statement_timeout_secs: 30,
         tables: Vec::new(),
      }
   }
}
