/// Result type alias for toolkit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for query runner operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Error from SQLx operations.
   #[error(transparent)]
   Sqlx(#[from] sqlx::Error),

   /// Error from the connection manager, including statement timeouts.
   #[error(transparent)]
   ConnectionManager(#[from] sqlx_any_conn_mgr::Error),

   /// A `%(name)s` placeholder has no value in the parameter map.
   #[error("missing query parameter: {0}")]
   MissingParameter(String),

   /// Database type that cannot be mapped to JSON.
   #[error("unsupported datatype: {0}")]
   UnsupportedDatatype(String),
}

impl Error {
   /// Extract a structured error code from the error type.
   ///
   /// This provides machine-readable error codes for error handling.
   pub fn error_code(&self) -> String {
      match self {
         Error::Sqlx(e) => {
            if let Some(code) = e.as_database_error().and_then(|db_err| db_err.code()) {
               return format!("SQL_{}", code);
            }
            "SQLX_ERROR".to_string()
         }
         Error::ConnectionManager(e) => e.error_code(),
         Error::MissingParameter(_) => "MISSING_PARAMETER".to_string(),
         Error::UnsupportedDatatype(_) => "UNSUPPORTED_DATATYPE".to_string(),
      }
   }

   /// True when the failure came from running a statement rather than from
   /// reaching the database.
   pub fn is_statement_error(&self) -> bool {
      match self {
         Error::Sqlx(_) | Error::MissingParameter(_) | Error::UnsupportedDatatype(_) => true,
         Error::ConnectionManager(e) => e.is_statement_error(),
      }
   }
}
