//! Relay service that forwards user queries to a hosted chat completion API.
//!
//! Shared resources (the secrets vault handle, the pooled database and the
//! completion client) are built lazily through
//! [`LazySingleton`](sqlx_any_conn_mgr::LazySingleton) and owned by
//! [`AppContext`]. Credentials for the database and the completion API are read
//! from the vault.
//!
//! # Example
//!
//! ```no_run
//! use query_relay::{AppContext, Settings};
//!
//! # async fn example() -> Result<(), query_relay::Error> {
//! let context = AppContext::new(Settings::from_env()?)?;
//!
//! let reply = context.relay_service().query(&[], "What is a vault?").await?;
//! println!("{reply}");
//!
//! context.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod completion;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod secrets;
pub mod server;
pub mod service;
pub mod transport;

pub use completion::{ChatMessage, ChatRole, CompletionClient};
pub use config::{Deployment, Settings};
pub use context::AppContext;
pub use error::{Error, ErrorKind, Result};
pub use secrets::{SecretItem, SecretsManager};
pub use service::{DialogEntry, QueryRequest, QueryResponse, RelayService, Role};
