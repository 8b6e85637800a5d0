use anyhow::{Context, Result};
use query_relay::{AppContext, Settings, logging, server};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> Result<()> {
   let settings = Settings::from_env().context("failed to read configuration")?;
   logging::init_logging(&settings.log_level).context("failed to initialize logging")?;
   debug!("Configured {:?}", settings);

   let context = AppContext::new(settings).context("failed to build application context")?;

   // Fail fast on a bad vault token or title
   context
      .secrets()
      .await
      .context("failed to connect to the secrets vault")?;

   let router = server::build_router(context.relay_service(), &context.settings().frontend_url)
      .context("failed to build router")?;

   let address = context.settings().bind_address();
   let listener = tokio::net::TcpListener::bind(&address)
      .await
      .with_context(|| format!("failed to bind {address}"))?;

   info!("Listening on {}", address);
   axum::serve(listener, router)
      .with_graceful_shutdown(shutdown_signal())
      .await
      .context("server error")?;

   context.shutdown().await;
   Ok(())
}

async fn shutdown_signal() {
   if let Err(e) = tokio::signal::ctrl_c().await {
      error!("Failed to listen for shutdown signal: {}", e);
   }
   info!("Shutdown signal received");
}
