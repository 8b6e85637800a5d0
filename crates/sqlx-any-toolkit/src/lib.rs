//! Transactional query runner for the `Any` driver.
//!
//! This crate sits between the connection manager (`sqlx-any-conn-mgr`) and
//! application code. It provides:
//!
//! - [`QueryRunner`]: runs statements written with `%(name)s` placeholders, each in
//!   its own committed-or-rolled-back session
//! - Placeholder translation to the engine's positional syntax ([`translate_placeholders`])
//! - Read/write classification ([`StatementKind`])
//! - JSON decoding of result rows
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use sqlx_any_toolkit::{Database, Params, QueryRunner};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::connect_url("sqlite://mydb.db?mode=rwc", None).await?;
//! let runner = QueryRunner::new(Arc::new(db));
//!
//! let mut params = Params::new();
//! params.insert("name".into(), json!("Alice"));
//!
//! // Write
//! runner
//!    .run_query("INSERT INTO users (name) VALUES (%(name)s)", &params)
//!    .await?;
//!
//! // Read
//! let rows = runner.run_query("SELECT * FROM users", &Params::new()).await?;
//!
//! // Transaction
//! runner
//!    .execute_in_transaction(
//!       &[
//!          "INSERT INTO users (name) VALUES (%(name)s)",
//!          "INSERT INTO audit (entry) VALUES (%(name)s)",
//!       ],
//!       &params,
//!    )
//!    .await?;
//! # Ok(())
//! # }
//! ```

pub mod decode;
pub mod error;
pub mod placeholders;
pub mod runner;

pub use error::{Error, Result};
pub use placeholders::{
   StatementKind, has_returning_clause, translate_placeholders, translate_placeholders_with_nulls,
};
pub use runner::{
   Params, PreparedStatement, QueryOutcome, QueryRunner, Row, bind_value, decode_rows,
};

// Re-export commonly used types from dependencies
pub use sqlx_any_conn_mgr::{Database, DatabaseConfig, Dialect};
