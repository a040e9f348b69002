//! Connection handlers for the StudyHub hub.
//!
//! This module handles the connection lifecycle and frame processing. The
//! hub owns room membership; this layer persists messages, answers requests
//! and writes room deliveries back to the socket.

use crate::auth;
use crate::config::{Config, StoreBackend};
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use studyhub_core::{
    validate_content, ConnectionId, DirectMessageStore, GroupId, Hub, Identity, MembershipStore,
    MemoryStore, NewDirectMessage, RouterConfig, UserId,
};
use studyhub_db::Database;
use studyhub_protocol::{codec, error_codes, Frame};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The realtime hub.
    pub hub: Hub,
    /// Direct message persistence.
    pub messages: Arc<dyn DirectMessageStore>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create app state with the stores selected by `config.database`.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQLite database cannot be opened.
    pub fn new(config: Config) -> Result<Self> {
        match config.database.backend {
            StoreBackend::Memory => {
                let store = Arc::new(MemoryStore::new());
                Ok(Self::with_stores(config, store.clone(), store))
            }
            StoreBackend::Sqlite => {
                let db = Arc::new(Database::open(Path::new(&config.database.path))?);
                Ok(Self::with_stores(config, db.clone(), db))
            }
        }
    }

    /// Create app state over explicit stores.
    #[must_use]
    pub fn with_stores(
        config: Config,
        memberships: Arc<dyn MembershipStore>,
        messages: Arc<dyn DirectMessageStore>,
    ) -> Self {
        let router_config = RouterConfig {
            max_rooms: config.limits.max_rooms,
            max_subscriptions_per_connection: config.limits.max_subscriptions_per_connection,
            room_capacity: config.limits.room_capacity,
            auto_delete_empty_rooms: true,
        };

        Self {
            hub: Hub::with_config(memberships, router_config),
            messages,
            config,
        }
    }

    fn caller(&self, connection_id: &ConnectionId) -> Option<UserId> {
        self.hub
            .identity(connection_id)
            .and_then(|identity| identity.user_id().cloned())
    }
}

/// Build the HTTP router: the hub endpoint and `/health`.
pub fn app(state: Arc<AppState>) -> Router {
    let hub_path = state.config.transport.hub_path.clone();
    Router::new()
        .route(&hub_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the configuration is refused, the stores cannot be
/// opened or the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    config.validate()?;
    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config.clone())?);

    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let listener = TcpListener::bind(addr).await?;

    info!("StudyHub server listening on {}", addr);
    info!("Hub endpoint: ws://{}{}", addr, config.transport.hub_path);

    axum::serve(listener, app(state)).await?;

    Ok(())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.hub.stats();
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": stats.connections,
        "onlineUsers": stats.online_users,
        "rooms": stats.router.room_count,
    }))
}

/// Query string of the hub endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct HubQuery {
    pub access_token: Option<String>,
}

/// WebSocket upgrade handler.
///
/// The identity is resolved once, here, and bound to the connection for its
/// whole lifetime.
///
/// `max_connections` is approximate: the count is read before the upgrade
/// registers the connection, so simultaneous upgrades can overshoot it.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<HubQuery>,
    headers: HeaderMap,
) -> Response {
    if state.hub.stats().connections >= state.config.limits.max_connections {
        warn!("Connection limit reached, rejecting upgrade");
        metrics::record_error("connection_limit");
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    }

    let token = query
        .access_token
        .as_deref()
        .or_else(|| auth::bearer_token(&headers));
    let identity = auth::identity_from_token(token, &state.config.auth.jwt_secret);

    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state, identity))
        .into_response()
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, identity: Identity) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let mut conn = state.hub.on_connected(identity);
    let connection_id = conn.id.clone();
    metrics::record_hub_stats(&state.hub.stats());

    let (mut sender, mut receiver) = socket.split();

    let connected_frame = Frame::connected(
        connection_id.as_str(),
        conn.identity.user_id().map(|u| u.as_str().to_string()),
        u32::try_from(state.config.heartbeat.interval_ms).unwrap_or(u32::MAX),
    );
    if send_frame(&mut sender, &connected_frame).await.is_err() {
        error!(connection = %connection_id, "Failed to send Connected frame");
        state.hub.on_disconnected(&connection_id);
        return;
    }

    let frame_limit = state.config.limits.max_message_size;
    let mut read_buffer = BytesMut::with_capacity(4096);

    'connection: loop {
        tokio::select! {
            biased;

            Some(message) = conn.deliveries.recv() => {
                let frame = Frame::event(
                    message.room.as_str(),
                    message.event.as_str(),
                    message.payload.to_vec(),
                );
                if send_frame(&mut sender, &frame).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Binary(data))) => {
                        read_buffer.extend_from_slice(&data);
                        metrics::record_frame(data.len(), "inbound");
                    }
                    Some(Ok(WsMessage::Text(text))) => {
                        read_buffer.extend_from_slice(text.as_bytes());
                        metrics::record_frame(text.len(), "inbound");
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        if sender.send(WsMessage::Pong(data)).await.is_err() {
                            break;
                        }
                        continue;
                    }
                    Some(Ok(WsMessage::Pong(_))) => continue,
                    Some(Ok(WsMessage::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }

                loop {
                    match codec::decode_from_with_limit(&mut read_buffer, frame_limit) {
                        Ok(Some(frame)) => {
                            let start = Instant::now();
                            let reply = handle_frame(&state, &connection_id, frame).await;
                            metrics::record_latency(start.elapsed().as_secs_f64());

                            if let Some(reply) = reply {
                                if send_frame(&mut sender, &reply).await.is_err() {
                                    break 'connection;
                                }
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(connection = %connection_id, error = %e, "Invalid frame, closing");
                            metrics::record_error("decode");
                            let reply = Frame::error(0, error_codes::INVALID_FRAME, e.to_string());
                            let _ = send_frame(&mut sender, &reply).await;
                            break 'connection;
                        }
                    }
                }
            }
        }
    }

    state.hub.on_disconnected(&connection_id);
    metrics::record_hub_stats(&state.hub.stats());
}

/// Body of a `ReceiveGroupMessage` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessagePayload {
    pub group_id: GroupId,
    pub sender_id: UserId,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// Handle a decoded frame, returning the reply to send, if any.
pub async fn handle_frame(
    state: &AppState,
    connection_id: &ConnectionId,
    frame: Frame,
) -> Option<Frame> {
    match frame {
        Frame::JoinGroup { id, group_id } => {
            let outcome = state.hub.join_group(connection_id, group_id).await;
            debug!(connection = %connection_id, group = group_id, ?outcome, "Join group request");
            metrics::record_join(outcome);
            metrics::record_hub_stats(&state.hub.stats());
            Some(Frame::ack(id))
        }

        Frame::LeaveGroup { id, group_id } => {
            state.hub.leave_group(connection_id, group_id);
            metrics::record_hub_stats(&state.hub.stats());
            Some(Frame::ack(id))
        }

        Frame::SendMessage {
            id,
            receiver_id,
            content,
        } => send_direct_message(state, connection_id, id, receiver_id, &content).await,

        Frame::SendGroupMessage {
            id,
            group_id,
            content,
        } => {
            let reply_id = id.unwrap_or(0);
            let Some(sender_id) = state.caller(connection_id) else {
                return Some(unauthenticated(reply_id));
            };
            let content = match validate_content(&content, state.config.limits.max_message_length) {
                Ok(content) => content.to_string(),
                Err(e) => return Some(Frame::error(reply_id, error_codes::INVALID_CONTENT, e.to_string())),
            };

            let payload = GroupMessagePayload {
                group_id,
                sender_id,
                content,
                sent_at: Utc::now(),
            };
            let body = match serde_json::to_vec(&payload) {
                Ok(body) => body,
                Err(e) => return Some(internal_error(connection_id, reply_id, "encode", &e)),
            };

            let fan_out = state.hub.send_group_message(connection_id, group_id, body);
            debug!(
                connection = %connection_id,
                group = group_id,
                receivers = fan_out.receivers,
                dropped = fan_out.is_dropped(),
                "Group message"
            );
            id.map(Frame::ack)
        }

        Frame::MarkRead { id, message_id } => mark_read(state, connection_id, id, message_id).await,

        Frame::Ping { timestamp } => Some(Frame::pong(timestamp)),

        Frame::Pong { .. } => None,

        other => {
            warn!(connection = %connection_id, frame_type = ?other.frame_type(), "Unexpected frame type");
            Some(Frame::error(
                0,
                error_codes::INVALID_FRAME,
                "server frames are not accepted from clients",
            ))
        }
    }
}

/// Persist a direct message, then fan the stored row out to both user rooms.
async fn send_direct_message(
    state: &AppState,
    connection_id: &ConnectionId,
    id: Option<u64>,
    receiver_id: String,
    content: &str,
) -> Option<Frame> {
    let reply_id = id.unwrap_or(0);
    let Some(sender_id) = state.caller(connection_id) else {
        return Some(unauthenticated(reply_id));
    };
    if receiver_id.trim().is_empty() {
        return Some(Frame::error(reply_id, error_codes::INVALID_FRAME, "receiver_id is empty"));
    }

    let new_message = match NewDirectMessage::new(
        sender_id,
        UserId::new(receiver_id),
        content,
        state.config.limits.max_message_length,
    ) {
        Ok(message) => message,
        Err(e) => return Some(Frame::error(reply_id, error_codes::INVALID_CONTENT, e.to_string())),
    };

    let stored = match state.messages.insert_direct_message(new_message).await {
        Ok(stored) => stored,
        Err(e) => return Some(internal_error(connection_id, reply_id, "store", &e)),
    };

    let body = match serde_json::to_vec(&stored) {
        Ok(body) => body,
        Err(e) => return Some(internal_error(connection_id, reply_id, "encode", &e)),
    };

    let fan_out = state
        .hub
        .send_direct_message(connection_id, &stored.receiver_id, body);
    metrics::record_direct_message(fan_out.receivers);
    debug!(
        connection = %connection_id,
        message_id = stored.id,
        receivers = fan_out.receivers,
        "Direct message stored"
    );

    id.map(Frame::ack)
}

/// Mark a message read on behalf of its receiver and notify the sender.
async fn mark_read(
    state: &AppState,
    connection_id: &ConnectionId,
    id: Option<u64>,
    message_id: i64,
) -> Option<Frame> {
    let reply_id = id.unwrap_or(0);
    let Some(reader) = state.caller(connection_id) else {
        return Some(unauthenticated(reply_id));
    };

    let message = match state.messages.get_direct_message(message_id).await {
        Ok(Some(message)) => message,
        Ok(None) => {
            return Some(Frame::error(
                reply_id,
                error_codes::NOT_FOUND,
                format!("message {message_id} not found"),
            ))
        }
        Err(e) => return Some(internal_error(connection_id, reply_id, "store", &e)),
    };

    if message.receiver_id != reader {
        debug!(connection = %connection_id, user = %reader, message_id, "Mark read by non-receiver");
        return Some(Frame::error(
            reply_id,
            error_codes::FORBIDDEN,
            "only the receiver can mark a message read",
        ));
    }

    // Only the call that flips the flag publishes the receipt.
    match state.messages.mark_read(message_id, Utc::now()).await {
        Ok(Some(mark)) if mark.newly_read => {
            state.hub.notify_message_read(&mark.message.sender_id, message_id);
            metrics::record_read_receipt();
        }
        Ok(Some(_)) => {}
        Ok(None) => {
            return Some(Frame::error(
                reply_id,
                error_codes::NOT_FOUND,
                format!("message {message_id} not found"),
            ))
        }
        Err(e) => return Some(internal_error(connection_id, reply_id, "store", &e)),
    }

    id.map(Frame::ack)
}

fn unauthenticated(reply_id: u64) -> Frame {
    Frame::error(reply_id, error_codes::UNAUTHENTICATED, "an access token is required")
}

fn internal_error(
    connection_id: &ConnectionId,
    reply_id: u64,
    kind: &'static str,
    e: &dyn std::error::Error,
) -> Frame {
    error!(connection = %connection_id, error = %e, kind, "Request failed");
    metrics::record_error(kind);
    Frame::error(reply_id, error_codes::INTERNAL, "internal error")
}

/// Send a frame to the WebSocket.
async fn send_frame(sender: &mut SplitSink<WebSocket, WsMessage>, frame: &Frame) -> Result<()> {
    let data = codec::encode(frame)?;
    metrics::record_frame(data.len(), "outbound");
    sender.send(WsMessage::Binary(data.to_vec())).await?;
    Ok(())
}
