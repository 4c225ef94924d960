use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::{HeaderValue, StatusCode},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use application::{ConversationOverview, HistoryMessage};
use domain::{
    normalize_display_name, ChatId, ConnectionIdentity, ParticipantRole, RosterEntry, UserId,
};

use crate::{error::ApiError, state::AppState, ws_connection::WebSocketConnection};

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    after: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WsQuery {
    user_id: Option<String>,
    name: Option<String>,
    role: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    connections: usize,
    users: Vec<RosterEntry>,
}

pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/ws", get(websocket_upgrade))
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/conversations/{user_id}", get(get_conversations))
        .route("/messages/{chat_id}", get(get_messages))
}

/// 包含 `*` 时放开所有来源，否则只允许列出的来源
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(origin = %origin, error = %err, "忽略无效的 CORS 来源");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let users = state.hub.roster().await?;
    Ok(Json(StatusResponse {
        status: "ok",
        connections: users.len(),
        users,
    }))
}

async fn get_conversations(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ConversationOverview>>, ApiError> {
    let user_id = UserId::parse(user_id)?;
    let items = state.history.conversations(&user_id).await?;
    Ok(Json(items))
}

async fn get_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<HistoryMessage>>, ApiError> {
    let chat_id = ChatId::parse(chat_id)?;
    let items = state.history.messages(&chat_id, query.after).await?;
    Ok(Json(items))
}

/// 握手时必须携带有效的 `userId`，否则拒绝升级
async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let user_id = query
        .user_id
        .as_deref()
        .map(UserId::parse)
        .transpose()
        .ok()
        .flatten()
        .ok_or_else(|| {
            tracing::warn!("拒绝缺少或无效 userId 的连接");
            ApiError::unauthorized("missing or invalid userId")
        })?;

    let identity = ConnectionIdentity {
        user_id,
        display_name: normalize_display_name(query.name.as_deref()),
        role: query
            .role
            .as_deref()
            .map(ParticipantRole::parse_lenient)
            .unwrap_or_default(),
    };

    Ok(ws.on_upgrade(move |socket| WebSocketConnection::serve(socket, state.hub, identity)))
}
