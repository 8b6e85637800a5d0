//! HTTP binding of the relay service

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderValue, Method, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::{Error, Result};
use crate::service::{QueryRequest, QueryResponse, RelayService};

/// Build the router with every route and middleware.
///
/// `frontend_url` is the one origin allowed by CORS; a trailing slash is ignored.
pub fn build_router(relay: RelayService, frontend_url: &str) -> Result<Router> {
   let origin = HeaderValue::from_str(frontend_url.trim_end_matches('/')).map_err(|_| {
      Error::Configuration(format!("FRONTEND_URL is not a valid origin: '{frontend_url}'"))
   })?;
   let cors = CorsLayer::new()
      .allow_origin(origin)
      .allow_methods([Method::GET, Method::POST])
      .allow_headers([header::CONTENT_TYPE]);

   let router = Router::new()
      .route("/health", get(health))
      .route("/query", post(query))
      .route("/query/stream", post(query_stream))
      .layer(cors)
      .layer(TraceLayer::new_for_http())
      .with_state(relay);

   Ok(router)
}

async fn health() -> &'static str {
   "ok"
}

async fn query(
   State(relay): State<RelayService>,
   Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>> {
   let response = relay.query(&request.dialog, &request.query).await?;
   Ok(Json(QueryResponse { response }))
}

/// One `data:` frame per chunk. A failure after the stream has started is sent
/// as an `error` event carrying the usual error body.
async fn query_stream(
   State(relay): State<RelayService>,
   Json(request): Json<QueryRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
   let chunks = relay.query_stream(request.dialog, request.query)?;

   let events = chunks.map(|chunk| {
      let event = match chunk {
         Ok(response) => {
            let data = serde_json::json!({ "response": response });
            Event::default().data(data.to_string())
         }
         Err(e) => {
            warn!("Streaming query failed: {}", e);
            let data = serde_json::to_string(&e).unwrap_or_default();
            Event::default().event("error").data(data)
         }
      };
      Ok::<_, Infallible>(event)
   });

   Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
