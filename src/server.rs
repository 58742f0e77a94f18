//! JSON HTTP API for chats, messages and configuration.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/api` | Greeting |
//! | `GET`    | `/api/health` | Health check (returns version) |
//! | `POST`   | `/api/chats` | Create a chat seeded with the greeting message |
//! | `GET`    | `/api/chats/{id}` | Chat session |
//! | `GET`    | `/api/chats/{id}/messages` | Chat history |
//! | `POST`   | `/api/chats/{id}/messages` | Add a customer message and generate a reply |
//! | `DELETE` | `/api/chats/{id}` | Delete a chat and its messages |
//! | `GET`    | `/api/knowledge_base` | Stored knowledge items |
//! | `GET`    | `/api/config/current` | Current configuration |
//! | `POST`   | `/api/config/current` | Replace the configuration |
//! | `POST`   | `/api/config/messages` | Configuration assistant (returns no config) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "Chat with ID 42 not found" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `store_error` (500),
//! `internal` (500).

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::db::StoreError;
use crate::models::{Chat, Configuration, Message, Metadata};
use crate::Data;

type AppState = Arc<Data>;

pub fn router(data: Arc<Data>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api", get(handle_hello))
        .route("/api/health", get(handle_health))
        .route("/api/chats", post(handle_create_chat))
        .route("/api/chats/{id}", get(handle_get_chat).delete(handle_delete_chat))
        .route(
            "/api/chats/{id}/messages",
            get(handle_get_messages).post(handle_add_message),
        )
        .route("/api/knowledge_base", get(handle_knowledge_base))
        .route(
            "/api/config/current",
            get(handle_get_configuration).post(handle_set_configuration),
        )
        .route("/api/config/messages", post(handle_config_message))
        .layer(cors)
        .with_state(data)
}

/// Serves the API on `listener` until `shutdown` resolves.
pub async fn serve(
    data: Arc<Data>,
    listener: tokio::net::TcpListener,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!("HTTP API listening on http://{}", addr);
    axum::serve(listener, router(data))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: message.into(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ChatNotFound(_) => AppError::not_found(err.to_string()),
            other => {
                error!("Store operation failed: {}", other);
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "store_error",
                    message: other.to_string(),
                }
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        error!("Request failed: {:#}", err);
        AppError::internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn chat_not_found(id: &str) -> AppError {
    AppError::from(StoreError::ChatNotFound(id.to_string()))
}

/// Parses an optional JSON body; an empty body yields the default.
fn optional_json<T: for<'de> Deserialize<'de> + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    parse_json(body)
}

fn required_json<T: for<'de> Deserialize<'de>>(body: &Bytes) -> Result<T, AppError> {
    parse_json(body)
}

fn parse_json<T: for<'de> Deserialize<'de>>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::bad_request(format!("Invalid JSON body: {}", e)))
}

// ============ Bodies ============

#[derive(Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize, Default)]
struct CreateChatRequest {
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Deserialize)]
struct ChatMessageRequest {
    content: String,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Serialize)]
struct ChatMessageResponse {
    message: Message,
    response: Message,
}

#[derive(Serialize)]
struct ChatHistory {
    chat_id: String,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct KnowledgeEntry {
    id: String,
    title: String,
    content: String,
    category: String,
}

#[derive(Serialize)]
struct ConfigMessageResponse {
    config: Option<Value>,
}

// ============ Handlers ============

async fn handle_hello() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Hello from the Customer Support Chat API!".to_string(),
    })
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn handle_create_chat(
    State(data): State<AppState>,
    body: Bytes,
) -> Result<Json<Chat>, AppError> {
    let request: CreateChatRequest = optional_json(&body)?;
    let greeting = data.config.greeting_message.clone();

    let chat = data
        .store
        .run_blocking(move |s| {
            let chat_id = s.create_chat(request.metadata)?;
            let chat = s
                .get_chat(&chat_id)?
                .ok_or_else(|| StoreError::ChatNotFound(chat_id.clone()))?;
            s.add_message(&chat_id, "system", &greeting, None)?;
            Ok(chat)
        })
        .await?;

    Ok(Json(chat))
}

async fn handle_get_chat(
    State(data): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Chat>, AppError> {
    let lookup = id.clone();
    let chat = data.store.run_blocking(move |s| s.get_chat(&lookup)).await?;
    chat.map(Json).ok_or_else(|| chat_not_found(&id))
}

async fn handle_get_messages(
    State(data): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ChatHistory>, AppError> {
    let chat_id = id.clone();
    let messages = data
        .store
        .run_blocking(move |s| {
            if s.get_chat(&chat_id)?.is_none() {
                return Err(StoreError::ChatNotFound(chat_id));
            }
            s.get_messages(&chat_id)
        })
        .await?;

    Ok(Json(ChatHistory {
        chat_id: id,
        messages,
    }))
}

async fn handle_add_message(
    State(data): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ChatMessageResponse>, AppError> {
    let lookup = id.clone();
    if data.store.run_blocking(move |s| s.get_chat(&lookup)).await?.is_none() {
        return Err(chat_not_found(&id));
    }

    let request: ChatMessageRequest = required_json(&body)?;
    if request.content.trim().is_empty() {
        return Err(AppError::bad_request("Message content cannot be empty"));
    }

    let chat_id = id.clone();
    let content = request.content.clone();
    let metadata = request.metadata.clone();
    let (history, config, message) = data
        .store
        .run_blocking(move |s| {
            let (message_id, created_at) =
                s.add_message(&chat_id, "user", &content, metadata.clone())?;
            let history = s.get_messages(&chat_id)?;
            let config = s.get_configuration()?;
            let message = Message {
                id: message_id,
                chat_id,
                role: "user".to_string(),
                content,
                created_at,
                metadata: metadata.unwrap_or_default(),
            };
            Ok((history, config, message))
        })
        .await?;

    let reply = data.responder.respond(&history, &config).await?;

    let chat_id = id.clone();
    let reply_content = reply.clone();
    let (response_id, response_ts) = data
        .store
        .run_blocking(move |s| s.add_message(&chat_id, "assistant", &reply_content, None))
        .await?;

    Ok(Json(ChatMessageResponse {
        message,
        response: Message {
            id: response_id,
            chat_id: id,
            role: "assistant".to_string(),
            content: reply,
            created_at: response_ts,
            metadata: Metadata::new(),
        },
    }))
}

async fn handle_delete_chat(
    State(data): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let chat_id = id.clone();
    let deleted = data
        .store
        .run_blocking(move |s| {
            if s.get_chat(&chat_id)?.is_none() {
                return Err(StoreError::ChatNotFound(chat_id));
            }
            s.delete_chat(&chat_id)
        })
        .await?;
    if !deleted {
        return Err(AppError::internal("Failed to delete chat"));
    }
    Ok(Json(MessageResponse {
        message: format!("Chat {} deleted successfully", id),
    }))
}

async fn handle_knowledge_base(
    State(data): State<AppState>,
) -> Result<Json<Vec<KnowledgeEntry>>, AppError> {
    let config = data.store.run_blocking(|s| s.get_configuration()).await?;
    Ok(Json(
        config
            .knowledge_base
            .into_iter()
            .map(|item| KnowledgeEntry {
                id: item.id,
                title: item.title,
                content: item.content,
                category: item.category,
            })
            .collect(),
    ))
}

async fn handle_get_configuration(
    State(data): State<AppState>,
) -> Result<Json<Configuration>, AppError> {
    let config = data.store.run_blocking(|s| s.get_configuration()).await?;
    Ok(Json(config))
}

async fn handle_set_configuration(
    State(data): State<AppState>,
    body: Bytes,
) -> Result<Json<MessageResponse>, AppError> {
    let config: Configuration = required_json(&body)?;
    data.store
        .run_blocking(move |s| s.set_configuration(&config))
        .await?;
    Ok(Json(MessageResponse {
        message: "Successfully updated configuration!".to_string(),
    }))
}

async fn handle_config_message(body: Bytes) -> Result<Json<ConfigMessageResponse>, AppError> {
    let request: ChatMessageRequest = required_json(&body)?;
    if request.content.trim().is_empty() {
        return Err(AppError::bad_request("Message content cannot be empty"));
    }
    Ok(Json(ConfigMessageResponse { config: None }))
}
