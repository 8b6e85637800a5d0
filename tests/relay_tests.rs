//! Integration tests for the relay service against local stand-ins for the
//! secrets vault and the completion API.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use query_relay::completion::DEFAULT_MODEL;
use query_relay::service::MAX_QUERY_CHARS;
use query_relay::{
   AppContext, ChatMessage, ChatRole, CompletionClient, DialogEntry, Error, ErrorKind, Role,
   SecretsManager, Settings, server, transport,
};
use secrecy::SecretString;
use serde_json::{Value, json};

const VAULT_TITLE: &str = "loyal-web-backend";
const VAULT_TOKEN: &str = "vault-token";
const CHAT_KEY: &str = "chat-key";

#[derive(Clone, Default)]
struct Hits {
   vault: Arc<AtomicUsize>,
   vault_lookups: Arc<AtomicUsize>,
   chat: Arc<AtomicUsize>,
   last_chat: Arc<Mutex<Option<Value>>>,
}

impl Hits {
   fn vault(&self) -> usize {
      self.vault.load(Ordering::SeqCst)
   }

   fn vault_lookups(&self) -> usize {
      self.vault_lookups.load(Ordering::SeqCst)
   }

   fn chat(&self) -> usize {
      self.chat.load(Ordering::SeqCst)
   }

   fn last_chat(&self) -> Value {
      self.last_chat.lock().unwrap().clone().unwrap_or(Value::Null)
   }
}

#[derive(Clone)]
struct VaultState {
   hits: Hits,
   chat_url: String,
}

struct Fixture {
   hits: Hits,
   vault_url: String,
   chat_url: String,
}

async fn spawn(router: Router) -> String {
   let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
   let address = listener.local_addr().unwrap();
   tokio::spawn(async move {
      axum::serve(listener, router).await.unwrap();
   });
   format!("http://{}", address)
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
   headers
      .get(AUTHORIZATION)
      .and_then(|value| value.to_str().ok())
      .and_then(|value| value.strip_prefix("Bearer "))
}

fn filter_title(params: &HashMap<String, String>) -> Option<&str> {
   params
      .get("filter")?
      .strip_prefix("title eq \"")?
      .strip_suffix('"')
}

async fn list_vaults(
   State(state): State<VaultState>,
   headers: HeaderMap,
   Query(params): Query<HashMap<String, String>>,
) -> Response {
   state.hits.vault.fetch_add(1, Ordering::SeqCst);
   state.hits.vault_lookups.fetch_add(1, Ordering::SeqCst);
   if bearer(&headers) != Some(VAULT_TOKEN) {
      return (StatusCode::UNAUTHORIZED, "invalid token").into_response();
   }

   match filter_title(&params) {
      Some(VAULT_TITLE) => Json(json!([{ "id": "vault-1", "name": VAULT_TITLE }])).into_response(),
      _ => Json(json!([])).into_response(),
   }
}

async fn list_items(
   State(state): State<VaultState>,
   headers: HeaderMap,
   Path(vault): Path<String>,
   Query(params): Query<HashMap<String, String>>,
) -> Response {
   state.hits.vault.fetch_add(1, Ordering::SeqCst);
   if bearer(&headers) != Some(VAULT_TOKEN) || vault != "vault-1" {
      return StatusCode::NOT_FOUND.into_response();
   }

   let id = match filter_title(&params) {
      Some("ATHENA_POSTGRES") => "item-db",
      Some("PHALA_SERVERLESS_TEE") => "item-llm",
      Some("TLS_BUNDLE") => "item-tls",
      _ => return Json(json!([])).into_response(),
   };
   Json(json!([{ "id": id, "title": filter_title(&params) }])).into_response()
}

async fn get_item(
   State(state): State<VaultState>,
   Path((_vault, item)): Path<(String, String)>,
) -> Response {
   state.hits.vault.fetch_add(1, Ordering::SeqCst);
   let body = match item.as_str() {
      "item-db" => json!({
         "id": "item-db",
         "title": "ATHENA_POSTGRES",
         "fields": [
            { "id": "a", "label": "database", "value": "athena" },
            { "id": "b", "label": "username", "value": "svc" },
            { "id": "c", "label": "password", "value": "pw" },
            { "id": "notesPlain", "label": "notesPlain" },
         ]
      }),
      "item-llm" => json!({
         "id": "item-llm",
         "title": "PHALA_SERVERLESS_TEE",
         "fields": [
            { "id": "a", "label": "credential", "value": CHAT_KEY },
            { "id": "b", "label": "hostname", "value": state.chat_url },
         ]
      }),
      _ => return StatusCode::NOT_FOUND.into_response(),
   };
   Json(body).into_response()
}

async fn get_file(Path((_vault, item, file)): Path<(String, String, String)>) -> Response {
   if item == "item-tls" && file == "ca" {
      "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n".into_response()
   } else {
      StatusCode::NOT_FOUND.into_response()
   }
}

async fn chat(State(hits): State<Hits>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
   hits.chat.fetch_add(1, Ordering::SeqCst);
   *hits.last_chat.lock().unwrap() = Some(body.clone());
   if bearer(&headers) != Some(CHAT_KEY) {
      return (StatusCode::UNAUTHORIZED, "bad key").into_response();
   }

   let last = body["messages"]
      .as_array()
      .and_then(|messages| messages.last())
      .and_then(|message| message["content"].as_str())
      .unwrap_or_default()
      .to_string();

   match last.as_str() {
      "fail" => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
      "empty" => Json(json!({ "choices": [] })).into_response(),
      "garbled" => "not json".into_response(),
      "null" => Json(json!({ "choices": [{ "message": { "content": null } }] })).into_response(),
      other => Json(json!({
         "choices": [{ "index": 0, "message": { "role": "assistant", "content": format!("echo: {other}") } }]
      }))
      .into_response(),
   }
}

async fn fixture() -> Fixture {
   let hits = Hits::default();

   let chat_url = spawn(
      Router::new()
         .route("/v1/chat/completions", post(chat))
         .with_state(hits.clone()),
   )
   .await;

   let vault_url = spawn(
      Router::new()
         .route("/v1/vaults", get(list_vaults))
         .route("/v1/vaults/{vault}/items", get(list_items))
         .route("/v1/vaults/{vault}/items/{item}", get(get_item))
         .route("/v1/vaults/{vault}/items/{item}/files/{file}/content", get(get_file))
         .with_state(VaultState {
            hits: hits.clone(),
            chat_url: chat_url.clone(),
         }),
   )
   .await;

   Fixture {
      hits,
      vault_url,
      chat_url,
   }
}

fn settings(fixture: &Fixture) -> Settings {
   let vars: HashMap<&str, String> = HashMap::from([
      ("GLOBAL_APP_ENV", "staging".to_string()),
      ("ONEPASS_CONNECT_TOKEN", VAULT_TOKEN.to_string()),
      ("ONEPASS_CONNECT_HOST", fixture.vault_url.clone()),
      ("GRPC_HOST", "127.0.0.1".to_string()),
      ("GRPC_PORT", "0".to_string()),
      ("FRONTEND_URL", "http://localhost:3000/".to_string()),
      ("POSTGRES_HOST", "127.0.0.1".to_string()),
      ("POSTGRES_PORT", "1".to_string()),
      ("DATABASE_MAX_CONNECTIONS", "1".to_string()),
   ]);
   let mut settings = Settings::from_lookup(|name| vars.get(name).cloned()).unwrap();
   settings.database.acquire_timeout_secs = 1;
   settings
}

async fn secrets(fixture: &Fixture, token: &str, title: &str) -> Result<SecretsManager, Error> {
   SecretsManager::connect(
      transport::http_client().unwrap(),
      &fixture.vault_url,
      SecretString::from(token),
      title,
   )
   .await
}

fn completion_client(fixture: &Fixture, key: &str) -> CompletionClient {
   CompletionClient::new(
      transport::http_client().unwrap(),
      SecretString::from(key),
      &fixture.chat_url,
   )
}

// Secrets vault

#[tokio::test]
async fn test_secret_item_keeps_labelled_values() {
   let fixture = fixture().await;
   let manager = secrets(&fixture, VAULT_TOKEN, VAULT_TITLE).await.unwrap();

   let item = manager.get_secret_item("ATHENA_POSTGRES").await.unwrap();
   assert_eq!(item.title(), "ATHENA_POSTGRES");
   assert_eq!(item.get("database"), Some("athena"));
   assert_eq!(item.get("username"), Some("svc"));
   assert_eq!(item.require("password").unwrap(), "pw");
   assert_eq!(item.get("notesPlain"), None);
}

#[tokio::test]
async fn test_unknown_vault_is_configuration_error() {
   let fixture = fixture().await;
   let err = secrets(&fixture, VAULT_TOKEN, "no-such-vault").await.unwrap_err();

   assert_eq!(err.kind(), ErrorKind::Configuration);
   assert!(err.to_string().contains("no-such-vault"));
}

#[tokio::test]
async fn test_rejected_token_is_unavailable() {
   let fixture = fixture().await;
   let err = secrets(&fixture, "wrong", VAULT_TITLE).await.unwrap_err();

   assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);
   assert!(!err.to_string().contains("wrong"));
}

#[tokio::test]
async fn test_unreachable_vault_is_unavailable() {
   let err = SecretsManager::connect(
      transport::http_client().unwrap(),
      "http://127.0.0.1:1",
      SecretString::from(VAULT_TOKEN),
      VAULT_TITLE,
   )
   .await
   .unwrap_err();

   assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);
}

#[tokio::test]
async fn test_unknown_item_is_configuration_error() {
   let fixture = fixture().await;
   let manager = secrets(&fixture, VAULT_TOKEN, VAULT_TITLE).await.unwrap();

   let err = manager.get_secret_item("MISSING").await.unwrap_err();
   assert_eq!(err.kind(), ErrorKind::Configuration);
   assert!(err.to_string().contains("MISSING"));
}

#[tokio::test]
async fn test_secret_file_content() {
   let fixture = fixture().await;
   let manager = secrets(&fixture, VAULT_TOKEN, VAULT_TITLE).await.unwrap();

   let pem = manager.get_secret_file("TLS_BUNDLE", "ca").await.unwrap();
   assert!(pem.starts_with("-----BEGIN CERTIFICATE-----"));
}

// Completion API

#[tokio::test]
async fn test_completion_returns_first_choice() {
   let fixture = fixture().await;
   let client = completion_client(&fixture, CHAT_KEY);

   let reply = client
      .complete(&[ChatMessage::new(ChatRole::User, "hi")])
      .await
      .unwrap();

   assert_eq!(reply, "echo: hi");
   let request = fixture.hits.last_chat();
   assert_eq!(request["model"], DEFAULT_MODEL);
   assert_eq!(request["messages"], json!([{ "role": "user", "content": "hi" }]));
}

#[tokio::test]
async fn test_completion_error_status_keeps_body() {
   let fixture = fixture().await;
   let client = completion_client(&fixture, CHAT_KEY);

   let err = client
      .complete(&[ChatMessage::new(ChatRole::User, "fail")])
      .await
      .unwrap_err();

   assert!(matches!(err, Error::UpstreamApi { status: 500, ref body } if body == "boom"));
}

#[tokio::test]
async fn test_completion_rejected_key() {
   let fixture = fixture().await;
   let client = completion_client(&fixture, "stolen");

   let err = client
      .complete(&[ChatMessage::new(ChatRole::User, "hi")])
      .await
      .unwrap_err();

   assert!(matches!(err, Error::UpstreamApi { status: 401, .. }));
}

#[tokio::test]
async fn test_completion_unexpected_shapes() {
   let fixture = fixture().await;
   let client = completion_client(&fixture, CHAT_KEY);

   for text in ["empty", "garbled", "null"] {
      let err = client
         .complete(&[ChatMessage::new(ChatRole::User, text)])
         .await
         .unwrap_err();
      assert!(
         matches!(err, Error::UpstreamApi { status: 200, .. }),
         "{text}: {err}"
      );
   }

   let err = client
      .complete(&[ChatMessage::new(ChatRole::User, "garbled")])
      .await
      .unwrap_err();
   assert!(matches!(err, Error::UpstreamApi { ref body, .. } if body == "not json"));
}

// Relay service through the application context

#[tokio::test]
async fn test_rejected_query_makes_no_outbound_calls() {
   let fixture = fixture().await;
   let context = AppContext::new(settings(&fixture)).unwrap();
   let relay = context.relay_service();

   let empty = relay.query(&[], "").await.unwrap_err();
   assert_eq!(empty.kind(), ErrorKind::Validation);

   let long = "x".repeat(MAX_QUERY_CHARS);
   let too_long = relay.query(&[], &long).await.unwrap_err();
   assert_eq!(too_long.kind(), ErrorKind::Validation);

   assert!(relay.query_stream(Vec::new(), String::new()).is_err());

   assert_eq!(fixture.hits.vault(), 0);
   assert_eq!(fixture.hits.chat(), 0);
}

#[tokio::test]
async fn test_query_relays_dialog() {
   let fixture = fixture().await;
   let context = AppContext::new(settings(&fixture)).unwrap();

   let dialog = vec![
      DialogEntry {
         role: None,
         content: "hi".into(),
         date: 1_700_000_000,
      },
      DialogEntry {
         role: Some(Role::Assistant),
         content: "hello".into(),
         date: 1_700_000_001,
      },
   ];
   let reply = context
      .relay_service()
      .query(&dialog, "how are you?")
      .await
      .unwrap();

   assert_eq!(reply, "echo: how are you?");
   let request = fixture.hits.last_chat();
   assert_eq!(
      request["messages"],
      json!([
         { "role": "user", "content": "hi" },
         { "role": "assistant", "content": "hello" },
         { "role": "user", "content": "how are you?" },
      ])
   );
}

#[tokio::test]
async fn test_concurrent_queries_build_clients_once() {
   let fixture = fixture().await;
   let context = AppContext::new(settings(&fixture)).unwrap();
   let relay = context.relay_service();

   let replies = futures::future::join_all((0..8).map(|i| {
      let relay = relay.clone();
      async move { relay.query(&[], &format!("q{i}")).await }
   }))
   .await;

   for (i, reply) in replies.into_iter().enumerate() {
      assert_eq!(reply.unwrap(), format!("echo: q{i}"));
   }
   assert_eq!(fixture.hits.vault_lookups(), 1);
   assert_eq!(fixture.hits.chat(), 8);
}

#[tokio::test]
async fn test_query_stream_yields_one_chunk() {
   let fixture = fixture().await;
   let context = AppContext::new(settings(&fixture)).unwrap();

   let chunks: Vec<_> = context
      .relay_service()
      .query_stream(Vec::new(), "hi".to_string())
      .unwrap()
      .collect()
      .await;

   assert_eq!(chunks.len(), 1);
   assert_eq!(chunks[0].as_ref().unwrap(), "echo: hi");
}

#[tokio::test]
async fn test_upstream_failure_keeps_singleton() {
   let fixture = fixture().await;
   let context = AppContext::new(settings(&fixture)).unwrap();
   let relay = context.relay_service();

   let err = relay.query(&[], "fail").await.unwrap_err();
   assert_eq!(err.kind(), ErrorKind::UpstreamApi);

   assert_eq!(relay.query(&[], "again").await.unwrap(), "echo: again");
   assert_eq!(fixture.hits.vault_lookups(), 1);
}

#[tokio::test]
async fn test_unreachable_database_is_retried_and_shutdown_is_clean() {
   let fixture = fixture().await;
   let context = AppContext::new(settings(&fixture)).unwrap();

   let err = context.database().await.unwrap_err();
   assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);
   assert!(err.to_string().contains("XXXXXX"));
   assert!(!err.to_string().contains(":pw@"));

   // A failed construction is not cached
   let err = context.query_runner().await.unwrap_err();
   assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);

   context.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_forgets_built_resources() {
   let fixture = fixture().await;
   let context = AppContext::new(settings(&fixture)).unwrap();

   context.secrets().await.unwrap();
   context.completion().await.unwrap();
   assert_eq!(fixture.hits.vault_lookups(), 1);

   context.shutdown().await;

   context.secrets().await.unwrap();
   assert_eq!(fixture.hits.vault_lookups(), 2);
}

// HTTP binding

async fn serve_relay(fixture: &Fixture) -> (AppContext, String) {
   let context = AppContext::new(settings(fixture)).unwrap();
   let router = server::build_router(context.relay_service(), &context.settings().frontend_url)
      .unwrap();
   let url = spawn(router).await;
   (context, url)
}

#[tokio::test]
async fn test_http_health_and_cors() {
   let fixture = fixture().await;
   let (_context, url) = serve_relay(&fixture).await;

   let response = reqwest::Client::new()
      .get(format!("{url}/health"))
      .header("Origin", "http://localhost:3000")
      .send()
      .await
      .unwrap();

   assert_eq!(response.status(), reqwest::StatusCode::OK);
   assert_eq!(
      response.headers()["access-control-allow-origin"],
      "http://localhost:3000"
   );
   assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_http_query() {
   let fixture = fixture().await;
   let (_context, url) = serve_relay(&fixture).await;

   let response = reqwest::Client::new()
      .post(format!("{url}/query"))
      .json(&json!({
         "dialog": [{ "role": "USER", "content": "hi", "date": 1 }],
         "query": "hello"
      }))
      .send()
      .await
      .unwrap();

   assert_eq!(response.status(), reqwest::StatusCode::OK);
   let body: Value = response.json().await.unwrap();
   assert_eq!(body, json!({ "response": "echo: hello" }));
}

#[tokio::test]
async fn test_http_error_statuses() {
   let fixture = fixture().await;
   let (_context, url) = serve_relay(&fixture).await;
   let client = reqwest::Client::new();

   let response = client
      .post(format!("{url}/query"))
      .json(&json!({ "query": "" }))
      .send()
      .await
      .unwrap();
   assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
   let body: Value = response.json().await.unwrap();
   assert_eq!(body["code"], "VALIDATION_ERROR");

   let response = client
      .post(format!("{url}/query"))
      .json(&json!({ "query": "fail" }))
      .send()
      .await
      .unwrap();
   assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
   let body: Value = response.json().await.unwrap();
   assert_eq!(body["code"], "UPSTREAM_API_ERROR");

   let response = client
      .post(format!("{url}/query/stream"))
      .json(&json!({ "query": "" }))
      .send()
      .await
      .unwrap();
   assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

   assert_eq!(fixture.hits.chat(), 1);
}

#[tokio::test]
async fn test_http_query_stream() {
   let fixture = fixture().await;
   let (_context, url) = serve_relay(&fixture).await;

   let response = reqwest::Client::new()
      .post(format!("{url}/query/stream"))
      .json(&json!({ "query": "hi" }))
      .send()
      .await
      .unwrap();

   assert_eq!(response.status(), reqwest::StatusCode::OK);
   assert!(
      response.headers()["content-type"]
         .to_str()
         .unwrap()
         .starts_with("text/event-stream")
   );
   let body = response.text().await.unwrap();
   assert!(body.contains(r#"data: {"response":"echo: hi"}"#), "{body}");
}

#[tokio::test]
async fn test_http_stream_reports_upstream_failure_as_event() {
   let fixture = fixture().await;
   let (_context, url) = serve_relay(&fixture).await;

   let body = reqwest::Client::new()
      .post(format!("{url}/query/stream"))
      .json(&json!({ "query": "fail" }))
      .send()
      .await
      .unwrap()
      .text()
      .await
      .unwrap();

   assert!(body.contains("event: error"), "{body}");
   assert!(body.contains("UPSTREAM_API_ERROR"), "{body}");
}

#[test]
fn test_invalid_frontend_origin() {
   let hits = Hits::default();
   let fixture = Fixture {
      hits,
      vault_url: "http://127.0.0.1:1".into(),
      chat_url: String::new(),
   };
   let context = AppContext::new(settings(&fixture)).unwrap();

   let err = server::build_router(context.relay_service(), "http://bad\norigin").unwrap_err();
   assert_eq!(err.kind(), ErrorKind::Configuration);
}
