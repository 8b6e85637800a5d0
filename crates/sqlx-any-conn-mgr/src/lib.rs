//! # sqlx-any-conn-mgr
//!
//! A small lifecycle layer around SQLx's `Any` driver for services that share one
//! database engine across every request.
//!
//! ## Core Types
//!
//! - **[`LazySingleton`]**: Once-only, concurrency-safe construction of a shared instance
//!   from an async factory
//! - **[`Database`]**: Pooled engine built from validated connection parameters
//! - **[`ConnectParams`]**: Credentials and host rules resolved from a vault item
//! - **[`DatabaseConfig`]**: Pool, timeout and schema settings
//! - **[`Session`]**: RAII unit of work that is committed or rolled back exactly once
//! - **[`Dialect`]**: Per-engine SQL rules (placeholders, quoting, last-id lookup)
//! - **[`Error`]**: Error type for lifecycle operations
//!
//! ## Architecture
//!
//! - **Lazy construction**: Shared handles are built on first use, never twice at once
//! - **Healthy pool**: Connections are pinged before use and recycled after an hour
//! - **Explicit commit**: Sessions never commit on close; scopes decide commit or rollback
//! - **Loud misuse**: Using a closed engine fails instead of silently reconnecting
//!
//! ## Usage
//!
//! ```no_run
//! use sqlx_any_conn_mgr::Database;
//!
//! #[tokio::main]
//! async fn main() -> sqlx_any_conn_mgr::Result<()> {
//!     let db = Database::connect_url("sqlite://app.db?mode=rwc", None).await?;
//!
//!     // Auto-commit scope: commits on Ok, rolls back on Err
//!     db.with_session(async |session| {
//!         session
//!             .execute(sqlx::query("CREATE TABLE IF NOT EXISTS users (name TEXT)"))
//!             .await?;
//!         Ok::<_, sqlx_any_conn_mgr::Error>(())
//!     })
//!     .await?;
//!
//!     // Manual session: nothing is kept unless committed
//!     let mut session = db.begin_session().await?;
//!     session
//!         .execute(sqlx::query("INSERT INTO users (name) VALUES ('Alice')"))
//!         .await?;
//!     session.commit().await?;
//!
//!     db.close().await?;
//!     Ok(())
//! }
//! ```
//!
mod config;
mod database;
mod dialect;
mod error;
mod params;
mod registry;
mod session;

// Re-export public types
pub use config::DatabaseConfig;
pub use database::Database;
pub use dialect::Dialect;
pub use error::Error;
pub use params::{ConnectParams, FIELD_DATABASE, FIELD_PASSWORD, FIELD_USERNAME, redact_url};
pub use registry::{LazySingleton, SingletonFactory};
pub use session::Session;

/// A type alias for Results with our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
