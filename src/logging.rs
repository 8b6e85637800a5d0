//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::{Error, Result};

/// Chatty dependencies held at `info` whatever the configured level
const QUIET_TARGETS: [&str; 3] = ["sqlx=info", "hyper_util=info", "reqwest=info"];

/// Build the filter for `level`.
///
/// Accepts tracing levels and directives in any case, plus the `warning` and
/// `critical` level names some deployments still set.
pub fn build_filter(level: &str) -> Result<EnvFilter> {
   let level = match level.trim().to_ascii_lowercase().as_str() {
      "warning" => "warn".to_string(),
      "critical" | "fatal" => "error".to_string(),
      other => other.to_string(),
   };

   let mut filter = EnvFilter::try_new(&level)
      .map_err(|e| Error::Configuration(format!("invalid LOGGING_LEVEL '{level}': {e}")))?;
   for directive in QUIET_TARGETS {
      let directive = directive
         .parse::<Directive>()
         .map_err(|e| Error::Configuration(format!("invalid log directive '{directive}': {e}")))?;
      filter = filter.add_directive(directive);
   }
   Ok(filter)
}

/// Install the global subscriber: `level` filter plus a `fmt` layer with targets.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(level: &str) -> Result<()> {
   tracing_subscriber::registry()
      .with(build_filter(level)?)
      .with(tracing_subscriber::fmt::layer().with_target(true))
      .try_init()
      .map_err(|e| Error::Configuration(format!("logging already initialized: {e}")))
}
