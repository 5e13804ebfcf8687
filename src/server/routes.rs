//! HTTP route handlers for the conversation API.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{Local, TimeZone};
use futures::stream::{self, Stream};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast::error::RecvError;

use crate::store::guard::actions::UNTITLED_CONVERSATION;
use crate::store::{
    Conversation, ConversationGroup, ConversationId, ConversationMeta, Message, MessageId,
    group_conversations,
};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route("/api/conversations/grouped", get(grouped_conversations))
        .route("/api/conversations/import", post(import_conversation))
        .route(
            "/api/conversations/{id}",
            get(get_conversation)
                .patch(rename_conversation)
                .delete(delete_conversation),
        )
        .route("/api/conversations/{id}/export", get(export_conversation))
        .route("/api/conversations/{id}/messages", post(append_message))
        .route(
            "/api/conversations/{id}/messages/{message_id}",
            patch(edit_message).delete(delete_message),
        )
        .route("/api/events", get(change_events))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "chatvault",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

fn conversation_id(raw: &str) -> ApiResult<ConversationId> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid conversation id {raw:?}: {e}")))
}

fn message_id(raw: &str) -> ApiResult<MessageId> {
    MessageId::new(raw).map_err(|e| ApiError::BadRequest(format!("invalid message id: {e}")))
}

async fn list_conversations(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<ConversationMeta>>> {
    Ok(Json(state.store.get_all_conversations().await?))
}

/// Query for the grouped listing.
#[derive(Debug, Deserialize)]
pub struct GroupedQuery {
    /// Locale tag for month names, e.g. `fr-FR`.
    pub locale: Option<String>,
    /// Reference time in epoch milliseconds; defaults to now.
    pub now: Option<i64>,
}

async fn grouped_conversations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GroupedQuery>,
) -> ApiResult<Json<Vec<ConversationGroup<ConversationMeta>>>> {
    let conversations = state.store.get_all_conversations().await?;
    let reference = match query.now {
        Some(ms) => Local
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| ApiError::BadRequest(format!("timestamp out of range: {ms}")))?,
        None => Local::now(),
    };
    let locale = query.locale.as_deref().unwrap_or(&state.default_locale);
    Ok(Json(group_conversations(&conversations, &reference, locale)))
}

/// Body for creating a conversation.
#[derive(Debug, Default, Deserialize)]
pub struct CreateConversationRequest {
    /// Explicit name.
    pub name: Option<String>,
    /// First user message; names the conversation when `name` is absent.
    pub first_message: Option<String>,
}

async fn create_conversation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateConversationRequest>,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    let conversation = match request.first_message {
        Some(content) => {
            state
                .actions
                .create_with_first_message(request.name.as_deref(), Message::user(content))
                .await?
        }
        None => {
            let name = request.name.as_deref().unwrap_or(UNTITLED_CONVERSATION);
            state.store.create_conversation(name).await?
        }
    };
    Ok((StatusCode::CREATED, Json(conversation)))
}

async fn import_conversation(
    State(state): State<Arc<AppState>>,
    body: String,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    let conversation = state.store.import_conversation_json(&body).await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Conversation>> {
    let id = conversation_id(&id)?;
    Ok(Json(state.store.get_conversation(id).await?))
}

/// Body for renaming a conversation.
#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    /// New display name.
    pub name: String,
}

async fn rename_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<RenameRequest>,
) -> ApiResult<StatusCode> {
    let id = conversation_id(&id)?;
    state.actions.rename(id, &request.name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = conversation_id(&id)?;
    state.actions.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn export_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = conversation_id(&id)?;
    let document = state.actions.export(id).await?;
    let body = document.to_pretty_json()?;
    let disposition = format!("attachment; filename=\"{}\"", document.file_name());
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

/// Body for appending a message.
#[derive(Debug, Deserialize)]
pub struct AppendMessageRequest {
    /// Caller-chosen id; generated when absent.
    pub id: Option<String>,
    /// Author role.
    pub role: String,
    /// Message body.
    pub content: String,
    /// Opaque metadata stored as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

async fn append_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<AppendMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let id = conversation_id(&id)?;
    let mut message = Message::new(request.role, request.content);
    message.extra = request.extra;
    if let Some(raw) = request.id {
        message = message.with_id(message_id(&raw)?);
    }
    let stored = state.store.append_message(id, message).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// Body for editing a message.
#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    /// Replacement content.
    pub content: String,
}

async fn edit_message(
    State(state): State<Arc<AppState>>,
    Path((id, msg_id)): Path<(String, String)>,
    Json(request): Json<EditMessageRequest>,
) -> ApiResult<StatusCode> {
    let id = conversation_id(&id)?;
    let msg_id = message_id(&msg_id)?;
    state
        .store
        .edit_message(id, &msg_id, &request.content)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_message(
    State(state): State<Arc<AppState>>,
    Path((id, msg_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let id = conversation_id(&id)?;
    let msg_id = message_id(&msg_id)?;
    state.store.delete_message(id, &msg_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Server-sent `changed` events, one per committed mutation.
///
/// Clients re-fetch the conversation list on each event; a lagging client
/// gets a single `changed` event for everything it missed.
async fn change_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.events.subscribe();
    let events = stream::unfold(receiver, |mut receiver| async move {
        let data = match receiver.recv().await {
            Ok(sequence) => sequence.to_string(),
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "SSE client lagged behind change events");
                "lagged".to_string()
            }
            Err(RecvError::Closed) => return None,
        };
        let event = Event::default().event("changed").data(data);
        Some((Ok::<Event, Infallible>(event), receiver))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::store::{ServerConfig, SqliteConversationStore};

    async fn app() -> (Router, Arc<AppState>) {
        let store = SqliteConversationStore::open_in_memory().await.unwrap();
        let state = AppState::with_store(Arc::new(store), &ServerConfig::default());
        (create_router(Arc::clone(&state)), state)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _) = app().await;
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_conversation_lifecycle() {
        let (app, _) = app().await;

        let (status, created) = send(
            &app,
            Method::POST,
            "/api/conversations",
            Some(json!({ "name": "Trip" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            Method::PATCH,
            &format!("/api/conversations/{id}"),
            Some(json!({ "name": "Road trip" })),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, listed) = send(&app, Method::GET, "/api/conversations", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed[0]["name"], "Road trip");
        assert_eq!(listed[0]["messageCount"], 0);

        let (status, _) =
            send(&app, Method::DELETE, &format!("/api/conversations/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) =
            send(&app, Method::GET, &format!("/api/conversations/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_create_from_first_message() {
        let (app, _) = app().await;
        let (status, created) = send(
            &app,
            Method::POST,
            "/api/conversations",
            Some(json!({ "first_message": "How do lifetimes work?" })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["name"], "How do lifetimes work?");
        assert_eq!(created["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn test_blank_rename_and_bad_ids_are_bad_requests() {
        let (app, state) = app().await;
        let conv = state.store.create_conversation("Keep").await.unwrap();

        let (status, body) = send(
            &app,
            Method::PATCH,
            &format!("/api/conversations/{}", conv.id),
            Some(json!({ "name": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_argument");

        let (status, _) = send(&app, Method::GET, "/api/conversations/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_guarded_routes_conflict_while_generating() {
        let (app, state) = app().await;
        let conv = state.store.create_conversation("Busy").await.unwrap();
        let _ticket = state.generations.begin(conv.id);

        let uri = format!("/api/conversations/{}", conv.id);
        let (status, body) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "generation_in_progress");

        let (status, _) = send(&app, Method::GET, &format!("{uri}/export"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_message_routes() {
        let (app, state) = app().await;
        let conv = state.store.create_conversation("Chat").await.unwrap();
        let base = format!("/api/conversations/{}/messages", conv.id);

        let (status, message) = send(
            &app,
            Method::POST,
            &base,
            Some(json!({ "id": "m1", "role": "assistant", "content": "hi", "model": "llama" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(message["model"], "llama");

        let (status, _) = send(
            &app,
            Method::PATCH,
            &format!("{base}/m1"),
            Some(json!({ "content": "hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let stored = state.store.get_conversation(conv.id).await.unwrap();
        assert_eq!(stored.messages[0].content, "hello");

        let (status, _) = send(&app, Method::DELETE, &format!("{base}/m1"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = send(&app, Method::DELETE, &format!("{base}/m1"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_export_then_import() {
        let (app, state) = app().await;
        let conv = state.store.create_conversation("Portable").await.unwrap();
        state
            .store
            .append_message(conv.id, Message::user("q"))
            .await
            .unwrap();

        let request = Request::builder()
            .uri(format!("/api/conversations/{}/export", conv.id))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains(&format!("conversation_{}.json", conv.id)));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let document: Value = serde_json::from_slice(&bytes).unwrap();

        let (status, imported) = send(
            &app,
            Method::POST,
            "/api/conversations/import",
            Some(document),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_ne!(imported["id"], json!(conv.id.to_string()));
        assert_eq!(imported["messages"][0]["content"], "q");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/conversations/import",
            Some(json!({ "name": "No messages" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "invalid_format");
    }

    #[tokio::test]
    async fn test_grouped_listing() {
        let (app, state) = app().await;
        state.store.create_conversation("Fresh").await.unwrap();

        let (status, groups) = send(
            &app,
            Method::GET,
            "/api/conversations/grouped?locale=fr-FR",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(groups[0]["title"], "Today");
        assert_eq!(groups[0]["kind"]["type"], "today");
        assert_eq!(groups[0]["conversations"][0]["name"], "Fresh");
    }

    #[tokio::test]
    async fn test_mutations_publish_change_events() {
        let (app, state) = app().await;
        let mut events = state.events.subscribe();

        send(
            &app,
            Method::POST,
            "/api/conversations",
            Some(json!({ "name": "Observed" })),
        )
        .await;

        assert_eq!(events.try_recv().unwrap(), 1);
    }
}
