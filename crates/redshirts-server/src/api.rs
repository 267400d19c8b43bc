use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, Method, StatusCode},
    middleware,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use redshirts_store::{Message, NewMessage};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::context::{correlation_middleware, RequestContext};
use crate::error::ServerError;
use crate::service::{Cursor, MessageService, Principal, SYSTEM_AUTHOR};

const MAX_TOPIC_LEN: usize = 64;

#[derive(Clone)]
pub struct AppState {
    pub service: MessageService,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/message/:lobby_id/msg", post(create_message_id))
        // `:key` is a message id for PUT and a cursor number for GET.
        .route(
            "/message/:lobby_id/msg/:key",
            put(create_message).get(get_messages),
        )
        .route(
            "/message/:lobby_id/player/:player_id",
            put(player_joined).delete(player_left),
        )
        .layer(middleware::from_fn(correlation_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
struct PlayerQuery {
    player_id: Option<Uuid>,
}

#[derive(Deserialize)]
struct MessageCreate {
    topic: String,
    #[serde(default)]
    message: serde_json::Value,
}

/// Public shape of a delivered message.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct MessageResponse {
    pub id: Uuid,
    pub send_time: DateTime<Utc>,
    pub player_id: Uuid,
    pub number: i64,
    pub topic: String,
    pub message: serde_json::Value,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            send_time: m.send_time,
            player_id: m.player_id,
            number: m.number,
            topic: m.topic,
            message: m.message,
        }
    }
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Hand out a fresh message id so that clients can retry a send safely.
async fn create_message_id(
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<(StatusCode, String), ServerError> {
    let Path(lobby_id) = path?;
    debug!(%lobby_id, "Create message id");
    Ok((StatusCode::CREATED, Uuid::new_v4().to_string()))
}

async fn create_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    headers: HeaderMap,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
    query: Result<Query<PlayerQuery>, QueryRejection>,
    body: Result<Json<MessageCreate>, JsonRejection>,
) -> Result<StatusCode, ServerError> {
    let Path((lobby_id, message_id)) = path?;
    let Query(query) = query?;
    let Json(req) = body?;
    let principal = resolve_principal(&headers, &query, &state.config)?;

    let topic = req.topic.trim();
    if topic.is_empty() || topic.chars().count() > MAX_TOPIC_LEN {
        return Err(ServerError::Validation(format!(
            "topic must be 1 to {MAX_TOPIC_LEN} characters"
        )));
    }
    if !matches!(
        req.message,
        serde_json::Value::Object(_) | serde_json::Value::Null
    ) {
        return Err(ServerError::Validation(
            "message must be a JSON object".to_string(),
        ));
    }

    let player_id = match principal {
        Principal::Player(id) => id,
        Principal::System => SYSTEM_AUTHOR,
    };
    let message = NewMessage {
        id: message_id,
        lobby_id,
        player_id,
        send_time: Utc::now(),
        topic: topic.to_string(),
        message: req.message,
    };

    state
        .service
        .create_message(&ctx, principal, message)
        .await?;
    Ok(StatusCode::CREATED)
}

async fn get_messages(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    path: Result<Path<(Uuid, i64)>, PathRejection>,
    query: Result<Query<PlayerQuery>, QueryRejection>,
) -> Result<Json<Vec<MessageResponse>>, ServerError> {
    let Path((lobby_id, number)) = path?;
    let Query(query) = query?;
    let player_id = require_player(&query)?;
    let cursor = Cursor::from_wire(number)?;

    let messages = state
        .service
        .get_messages(&ctx, player_id, lobby_id, cursor)
        .await?;

    Ok(Json(messages.into_iter().map(MessageResponse::from).collect()))
}

async fn player_joined(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
) -> Result<StatusCode, ServerError> {
    let Path((lobby_id, player_id)) = path?;
    let principal = require_system(&headers, &state.config)?;
    state
        .service
        .record_player_joined(principal, lobby_id, player_id)
        .await?;

    info!(%lobby_id, %player_id, "Player joined lobby");
    Ok(StatusCode::CREATED)
}

async fn player_left(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
) -> Result<StatusCode, ServerError> {
    let Path((lobby_id, player_id)) = path?;
    let principal = require_system(&headers, &state.config)?;
    state
        .service
        .record_player_left(principal, lobby_id, player_id)
        .await?;

    info!(%lobby_id, %player_id, "Player left lobby");
    Ok(StatusCode::NO_CONTENT)
}

// ─── Caller identity ───

/// A bearer token marks the lobby service; otherwise the caller is the
/// player named in the query string.
fn resolve_principal(
    headers: &HeaderMap,
    query: &PlayerQuery,
    config: &ServerConfig,
) -> Result<Principal, ServerError> {
    if headers.contains_key("authorization") {
        return require_system(headers, config);
    }
    require_player(query).map(Principal::Player)
}

fn require_player(query: &PlayerQuery) -> Result<Uuid, ServerError> {
    query
        .player_id
        .ok_or_else(|| ServerError::Validation("missing player_id query parameter".into()))
}

fn require_system(headers: &HeaderMap, config: &ServerConfig) -> Result<Principal, ServerError> {
    let Some(ref expected) = config.service_token else {
        return Err(ServerError::Unauthenticated(
            "system access is disabled (no SERVICE_TOKEN configured)".into(),
        ));
    };

    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);

    use subtle::ConstantTimeEq;
    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    if token_bytes.len() != expected_bytes.len()
        || token_bytes.ct_eq(expected_bytes).unwrap_u8() != 1
    {
        return Err(ServerError::Unauthenticated("invalid service token".into()));
    }

    Ok(Principal::System)
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
