use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Serialize, Serializer};

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error body returned to clients.
#[derive(Serialize)]
struct ErrorResponse {
   code: String,
   message: String,
}

/// Failure categories callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
   /// Settings, vault items or connection parameters are missing or malformed
   Configuration,
   /// A backing resource (vault, database, model API) could not be reached
   ResourceUnavailable,
   /// A statement failed or timed out; its session was rolled back
   StatementExecution,
   /// The model API answered with an error status or an unexpected body
   UpstreamApi,
   /// Caller input was rejected before any outbound call
   Validation,
}

/// Error types for the relay service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Error from the connection manager.
   #[error(transparent)]
   ConnectionManager(#[from] sqlx_any_conn_mgr::Error),

   /// Error from the query runner.
   #[error(transparent)]
   Toolkit(#[from] sqlx_any_toolkit::Error),

   #[error("configuration error: {0}")]
   Configuration(String),

   #[error("resource unavailable: {0}")]
   ResourceUnavailable(String),

   /// Non-success status or malformed body from the model API.
   #[error("upstream API returned {status}: {body}")]
   UpstreamApi { status: u16, body: String },

   #[error("invalid input: {0}")]
   Validation(String),

   /// Failure building the outbound HTTP client.
   #[error(transparent)]
   Http(#[from] reqwest::Error),
}

impl Error {
   pub fn kind(&self) -> ErrorKind {
      match self {
         Error::ConnectionManager(e) => conn_mgr_kind(e),
         Error::Toolkit(sqlx_any_toolkit::Error::ConnectionManager(e)) => conn_mgr_kind(e),
         Error::Toolkit(_) => ErrorKind::StatementExecution,
         Error::Configuration(_) => ErrorKind::Configuration,
         Error::ResourceUnavailable(_) | Error::Http(_) => ErrorKind::ResourceUnavailable,
         Error::UpstreamApi { .. } => ErrorKind::UpstreamApi,
         Error::Validation(_) => ErrorKind::Validation,
      }
   }

   /// Machine-readable code sent alongside the message.
   pub fn error_code(&self) -> String {
      match self {
         Error::ConnectionManager(e) => e.error_code(),
         Error::Toolkit(e) => e.error_code(),
         Error::Configuration(_) => "CONFIGURATION_ERROR".to_string(),
         Error::ResourceUnavailable(_) => "RESOURCE_UNAVAILABLE".to_string(),
         Error::UpstreamApi { .. } => "UPSTREAM_API_ERROR".to_string(),
         Error::Validation(_) => "VALIDATION_ERROR".to_string(),
         Error::Http(_) => "HTTP_ERROR".to_string(),
      }
   }

   pub fn status_code(&self) -> StatusCode {
      match self.kind() {
         ErrorKind::Validation => StatusCode::BAD_REQUEST,
         ErrorKind::UpstreamApi => StatusCode::BAD_GATEWAY,
         ErrorKind::ResourceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
         ErrorKind::Configuration | ErrorKind::StatementExecution => {
            StatusCode::INTERNAL_SERVER_ERROR
         }
      }
   }

   fn to_response(&self) -> ErrorResponse {
      ErrorResponse {
         code: self.error_code(),
         message: self.to_string(),
      }
   }
}

fn conn_mgr_kind(error: &sqlx_any_conn_mgr::Error) -> ErrorKind {
   use sqlx_any_conn_mgr::Error as ConnError;

   match error {
      ConnError::MissingField(_) | ConnError::InvalidConfig(_) => ErrorKind::Configuration,
      ConnError::ResourceUnavailable { .. } | ConnError::DatabaseClosed => {
         ErrorKind::ResourceUnavailable
      }
      ConnError::Sqlx(_) | ConnError::StatementTimeout(_) => ErrorKind::StatementExecution,
   }
}

impl Serialize for Error {
   fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
   where
      S: Serializer,
   {
      self.to_response().serialize(serializer)
   }
}

impl IntoResponse for Error {
   fn into_response(self) -> Response {
      (self.status_code(), Json(self.to_response())).into_response()
   }
}
