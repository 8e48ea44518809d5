use axum::{extract::{Extension, Path, State}, http::StatusCode, Json};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::auth::RoomClaims;
use crate::models::{ErrorResponse, RoomTicketResponse};
use crate::orchestrator::ApiState;
use crate::routes::AuthenticatedUser;

/// Open (or find) the room for a document and mint a token to join it
pub async fn room_ticket(
    State(state): State<Arc<ApiState>>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Path(doc_id): Path<String>,
) -> Result<(StatusCode, Json<RoomTicketResponse>), (StatusCode, Json<ErrorResponse>)> {
    let Some(ticket) = state.orchestrator.request_open_doc(&doc_id).await else {
        warn!("No room available for document {}", doc_id);
        return Err(ErrorResponse::reply(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Document '{}' is not available right now", doc_id),
        ));
    };

    let claims = RoomClaims {
        doc_id: ticket.doc_id.clone(),
        user_id: user_id.clone(),
    };
    let room_token = state.auth.sign_room_token(&claims, state.room_token_ttl).map_err(|e| {
        error!("Failed to sign room token for {}: {}", doc_id, e);
        ErrorResponse::reply(StatusCode::INTERNAL_SERVER_ERROR, "Failed to sign room token")
    })?;

    info!("Issued ticket for {} to user {} on {}:{}", doc_id, user_id, ticket.host, ticket.port);

    let url = format!(
        "ws://{}:{}/rooms/{}/{}",
        ticket.host, ticket.port, room_token, ticket.room_secret
    );
    Ok((
        StatusCode::OK,
        Json(RoomTicketResponse {
            host: ticket.host,
            port: ticket.port,
            doc_id: ticket.doc_id,
            room_secret: ticket.room_secret,
            room_token,
            url,
        }),
    ))
}
