//! The HTTP API: sync endpoints plus the local record API.
//!
//! Sync receive endpoints run every record through the shared
//! validation pipeline; duplicate ids are silently skipped and any
//! validation failure fails the request with 500, stopping the batch.
//! Callers retry idempotently.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axon_core::{
    Bulletin, Fingerprint, Message, NewBulletin, NewMessage, NewUser, Period, RecordId,
    StringRange, User,
};
use axon_store::{InsertOutcome, StoreError, StoreExt};
use axon_sync::{
    respond, PingResponse, PushBulletins, PushMessages, PushUsers, SyncRequest, SyncResponse,
    MAX_BATCH,
};

use crate::error::ApiError;
use crate::node::Node;

#[derive(Clone)]
pub struct AppState {
    pub node: Arc<Node>,
}

pub fn router(node: Arc<Node>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/sync", post(sync))
        .route("/v1/sync/messages", post(sync_messages))
        .route("/v1/sync/bulletins", post(sync_bulletins))
        .route("/v1/sync/users", post(sync_users))
        .route("/v1/users", get(list_users).post(register_user))
        .route("/v1/users/{fingerprint}", get(get_user))
        .route("/v1/messages", get(list_messages).post(create_message))
        .route("/v1/bulletins", get(list_bulletins).post(create_bulletin))
        .route("/v1/topics", get(list_topics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { node })
}

// ── sync endpoints ──────────────────────────────────────────────────────

async fn ping(State(state): State<AppState>) -> Result<Json<PingResponse>, ApiError> {
    let hash = state
        .node
        .store
        .database_hashes()
        .await
        .map_err(ApiError::Store)?;
    Ok(Json(PingResponse {
        hash,
        is_busy: state.node.guard.is_busy(),
    }))
}

async fn sync(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, ApiError> {
    let Some(_permit) = state.node.guard.permit() else {
        tracing::debug!("sync request while busy");
        return Ok(Json(SyncResponse::busy()));
    };
    let response = respond(state.node.store.as_ref(), &request, MAX_BATCH).await?;
    Ok(Json(response))
}

async fn sync_messages(
    State(state): State<AppState>,
    Json(request): Json<PushMessages>,
) -> Result<StatusCode, ApiError> {
    if request.messages.is_empty() {
        return Err(ApiError::BadRequest("messages are required".into()));
    }
    for message in &request.messages {
        state
            .node
            .store
            .ingest_message(NewMessage::from_wire(message))
            .await
            .map_err(ApiError::Ingest)?;
    }
    Ok(StatusCode::CREATED)
}

async fn sync_bulletins(
    State(state): State<AppState>,
    Json(request): Json<PushBulletins>,
) -> Result<StatusCode, ApiError> {
    if request.bulletins.is_empty() {
        return Err(ApiError::BadRequest("bulletins are required".into()));
    }
    // Oldest first, so thread parents land before their replies.
    let mut ordered = request.bulletins;
    ordered.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    for bulletin in &ordered {
        state
            .node
            .store
            .ingest_bulletin(NewBulletin::from_wire(bulletin))
            .await
            .map_err(ApiError::Ingest)?;
    }
    Ok(StatusCode::CREATED)
}

async fn sync_users(
    State(state): State<AppState>,
    Json(request): Json<PushUsers>,
) -> Result<StatusCode, ApiError> {
    if request.users.is_empty() {
        return Err(ApiError::BadRequest("users are required".into()));
    }
    for user in &request.users {
        state
            .node
            .store
            .ingest_user(NewUser::from_wire(user))
            .await
            .map_err(ApiError::Ingest)?;
    }
    Ok(StatusCode::CREATED)
}

// ── local record API ────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RegisterUser {
    public_key: String,
}

async fn register_user(
    State(state): State<AppState>,
    Json(request): Json<RegisterUser>,
) -> Result<StatusCode, ApiError> {
    let outcome = state
        .node
        .store
        .ingest_user(NewUser::from_public_key(request.public_key))
        .await
        .map_err(create_error)?;
    match outcome {
        InsertOutcome::Inserted => Ok(StatusCode::CREATED),
        InsertOutcome::Duplicate => Err(ApiError::Duplicate),
    }
}

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    // Canonical fingerprints are hex, so ["", "z"] covers every user.
    let users = state
        .node
        .store
        .list_users(&StringRange::new("", "z"))
        .await
        .map_err(ApiError::Store)?;
    Ok(Json(users))
}

async fn get_user(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> Result<Json<User>, ApiError> {
    let fingerprint = Fingerprint::parse(&fingerprint)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    state
        .node
        .store
        .get_user(&fingerprint)
        .await
        .map_err(ApiError::Store)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

#[derive(Deserialize)]
struct CreateMessage {
    content: String,
}

async fn create_message(
    State(state): State<AppState>,
    Json(request): Json<CreateMessage>,
) -> Result<StatusCode, ApiError> {
    if request.content.is_empty() {
        return Err(ApiError::BadRequest("content is required".into()));
    }
    let outcome = state
        .node
        .store
        .ingest_message(NewMessage::from_content(request.content))
        .await
        .map_err(create_error)?;
    match outcome {
        InsertOutcome::Inserted => Ok(StatusCode::CREATED),
        InsertOutcome::Duplicate => Err(ApiError::Duplicate),
    }
}

async fn list_messages(State(state): State<AppState>) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state
        .node
        .store
        .list_messages(&Period::unbounded())
        .await
        .map_err(ApiError::Store)?;
    Ok(Json(messages))
}

#[derive(Deserialize)]
struct CreateBulletin {
    #[serde(default)]
    topic: String,
    content: String,
    #[serde(default)]
    parent_id: Option<String>,
}

async fn create_bulletin(
    State(state): State<AppState>,
    Json(request): Json<CreateBulletin>,
) -> Result<StatusCode, ApiError> {
    if request.content.is_empty() {
        return Err(ApiError::BadRequest("content is required".into()));
    }
    if request.topic.is_empty() && request.parent_id.is_none() {
        return Err(ApiError::BadRequest("either topic or parent_id is required".into()));
    }
    let candidate = NewBulletin {
        topic: request.topic,
        content: request.content,
        parent_id: request.parent_id.map(RecordId::new),
        sender: None,
        created_at: None,
    };
    let outcome = state
        .node
        .store
        .ingest_bulletin(candidate)
        .await
        .map_err(create_error)?;
    match outcome {
        InsertOutcome::Inserted => Ok(StatusCode::CREATED),
        InsertOutcome::Duplicate => Err(ApiError::Duplicate),
    }
}

async fn list_bulletins(State(state): State<AppState>) -> Result<Json<Vec<Bulletin>>, ApiError> {
    let bulletins = state
        .node
        .store
        .list_all_bulletins()
        .await
        .map_err(ApiError::Store)?;
    Ok(Json(bulletins))
}

async fn list_topics(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let topics = state
        .node
        .store
        .list_topics()
        .await
        .map_err(ApiError::Store)?;
    Ok(Json(topics))
}

/// User-facing create endpoints turn validation failures into 400s;
/// everything else is a server error.
fn create_error(err: StoreError) -> ApiError {
    match err {
        StoreError::Validation(e) => ApiError::BadRequest(e.to_string()),
        other => ApiError::Store(other),
    }
}
