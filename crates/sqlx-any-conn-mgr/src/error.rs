//! Error types for sqlx-any-conn-mgr

use std::time::Duration;

use thiserror::Error;

/// Errors that may occur while constructing or using a shared database handle
#[derive(Error, Debug)]
pub enum Error {
   /// A required credential field was absent from the vault item (or empty)
   #[error("missing required database field '{0}'")]
   MissingField(String),

   /// Connection settings were present but unusable
   #[error("invalid database configuration: {0}")]
   InvalidConfig(String),

   /// The pool could not be created because the server was unreachable or refused us
   #[error("database unavailable at {url}: {source}")]
   ResourceUnavailable {
      /// Connection URL with the password redacted
      url: String,
      #[source]
      source: sqlx::Error,
   },

   /// Error from the sqlx library. Statement failures are converted to this variant
   #[error("Sqlx error: {0}")]
   Sqlx(#[from] sqlx::Error),

   /// A statement ran longer than the configured statement timeout
   #[error("statement exceeded timeout of {0:?}")]
   StatementTimeout(Duration),

   /// Database has been closed and cannot be used
   #[error("Database has been closed")]
   DatabaseClosed,
}

impl Error {
   /// Machine-readable code for this error.
   pub fn error_code(&self) -> String {
      match self {
         Error::MissingField(_) => "MISSING_FIELD".to_string(),
         Error::InvalidConfig(_) => "INVALID_CONFIG".to_string(),
         Error::ResourceUnavailable { .. } => "RESOURCE_UNAVAILABLE".to_string(),
         Error::Sqlx(e) => {
            if let Some(code) = e.as_database_error().and_then(|db_err| db_err.code()) {
               return format!("SQL_{}", code);
            }
            "SQLX_ERROR".to_string()
         }
         Error::StatementTimeout(_) => "STATEMENT_TIMEOUT".to_string(),
         Error::DatabaseClosed => "DATABASE_CLOSED".to_string(),
      }
   }

   /// True for failures raised by a submitted statement rather than by setup.
   pub fn is_statement_error(&self) -> bool {
      matches!(self, Error::Sqlx(_) | Error::StatementTimeout(_))
   }
}
