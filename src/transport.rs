//! Outbound HTTP client shared by the vault and model collaborators

use std::time::Duration;

use crate::error::Result;

/// Total time allowed for one outbound request, connect to last byte
pub const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(20);

/// Build the client used for every outbound call. No retries are configured.
pub fn http_client() -> Result<reqwest::Client> {
   let client = reqwest::Client::builder()
      .timeout(OUTBOUND_TIMEOUT)
      .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
      .build()?;
   Ok(client)
}
