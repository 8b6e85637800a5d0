//! SQL dialect rules for the engines reachable through the `Any` driver

use crate::Result;
use crate::error::Error;

/// The SQL dialect spoken by the engine behind a [`Database`](crate::Database).
///
/// Derived from the connection URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
   Postgres,
   Sqlite,
}

impl Dialect {
   /// Determine the dialect from a connection URL.
   pub fn from_url(url: &str) -> Result<Self> {
      let scheme = url
         .split_once(':')
         .map(|(scheme, _)| scheme)
         .ok_or_else(|| Error::InvalidConfig("connection URL has no scheme".into()))?;

      match scheme {
         "postgres" | "postgresql" => Ok(Self::Postgres),
         "sqlite" => Ok(Self::Sqlite),
         other => Err(Error::InvalidConfig(format!(
            "unsupported database scheme '{}'",
            other
         ))),
      }
   }

   /// Native positional placeholder for the 1-based parameter `index`.
   ///
   /// Both engines let the same index appear more than once in a statement.
   pub fn placeholder(&self, index: usize) -> String {
      match self {
         Self::Postgres => format!("${}", index),
         Self::Sqlite => format!("?{}", index),
      }
   }

   /// Quote an identifier, doubling any embedded quote characters.
   pub fn quote_identifier(&self, ident: &str) -> String {
      format!("\"{}\"", ident.replace('"', "\"\""))
   }

   /// Statement that drops `table` along with objects that depend on it.
   ///
   /// SQLite has no cascading drop, so only the table itself is removed there.
   pub fn drop_table_statement(&self, table: &str) -> String {
      let quoted = self.quote_identifier(table);
      match self {
         Self::Postgres => format!("DROP TABLE IF EXISTS {} CASCADE", quoted),
         Self::Sqlite => format!("DROP TABLE IF EXISTS {}", quoted),
      }
   }

   /// Connection-scoped query returning the most recently generated row id as `id`.
   ///
   /// The value survives across transactions on the same connection, so it is only
   /// meaningful when compared with a reading taken before the insert. On Postgres
   /// the query fails until the connection has used a sequence.
   pub fn last_insert_id_query(&self) -> &'static str {
      match self {
         Self::Postgres => "SELECT lastval() AS id",
         Self::Sqlite => "SELECT last_insert_rowid() AS id",
      }
   }
}
