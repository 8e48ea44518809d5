use std::sync::Arc;
use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, Path, Query, State},
    response::Response,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::auth::RoomClaims;
use crate::models::{ClientMessage, HealthResponse};
use crate::worker::connector::Outbound;
use crate::worker::DocumentWorker;

/// Optional identity hints on the socket URL; must agree with the token.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomQuery {
    pub doc_id: Option<String>,
    pub user_id: Option<String>,
}

/// Socket and health routes served by every worker
pub fn create_worker_routes(worker: Arc<DocumentWorker>) -> Router {
    Router::new()
        .route("/rooms/:room_token/:room_secret", get(room_socket_handler))
        .route("/health", get(worker_health))
        .layer(TraceLayer::new_for_http())
        .with_state(worker)
}

async fn worker_health(State(worker): State<Arc<DocumentWorker>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        role: format!("worker-{}", worker.id()),
        message: format!("Hosting {} rooms", worker.room_count()),
    })
}

/// WebSocket handler
pub async fn room_socket_handler(
    Path((room_token, room_secret)): Path<(String, String)>,
    Query(query): Query<RoomQuery>,
    State(worker): State<Arc<DocumentWorker>>,
    ws: WebSocketUpgrade,
) -> Response {
    info!("New WebSocket connection attempt on worker {}", worker.id());
    ws.on_upgrade(move |socket| handle_socket(socket, worker, room_token, room_secret, query))
}

fn authorize(worker: &DocumentWorker, room_token: &str, query: &RoomQuery) -> Option<RoomClaims> {
    let claims = match worker.auth().verify_room_token(room_token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("Rejecting socket: {}", e);
            return None;
        }
    };
    let doc_matches = query.doc_id.as_deref().map_or(true, |d| d == claims.doc_id);
    let user_matches = query.user_id.as_deref().map_or(true, |u| u == claims.user_id);
    if !doc_matches || !user_matches {
        warn!("Rejecting socket: URL does not match token for doc {}", claims.doc_id);
        return None;
    }
    Some(claims)
}

/// Handle WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    worker: Arc<DocumentWorker>,
    room_token: String,
    room_secret: String,
    query: RoomQuery,
) {
    let (mut sender, mut receiver) = socket.split();

    let Some(claims) = authorize(&worker, &room_token, &query) else {
        let _ = sender.send(Message::Close(None)).await;
        return;
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let session_id = match worker.join_room(&claims, &room_secret, tx) {
        Ok(session_id) => session_id,
        Err(e) => {
            warn!("Rejecting socket for user {}: {}", claims.user_id, e);
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };
    let doc_id = claims.doc_id;

    // Drain the connector's queue into the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let message = match outbound {
                Outbound::Message(message) => message,
                Outbound::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to serialize message for session {}: {}", session_id, e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let recv_worker = worker.clone();
    let recv_doc_id = doc_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(frame)) = receiver.next().await {
            let text = match frame {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let message: ClientMessage = match serde_json::from_str(&text) {
                Ok(message) => message,
                Err(e) => {
                    error!("Failed to parse message for document {}: {}", recv_doc_id, e);
                    continue;
                }
            };
            if let Err(e) = recv_worker.handle_client_message(&recv_doc_id, session_id, message) {
                warn!("Message from session {} in {} failed: {}", session_id, recv_doc_id, e);
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    worker.leave_room(&doc_id, session_id);
    info!("WebSocket session {} on {} terminated", session_id, doc_id);
}
