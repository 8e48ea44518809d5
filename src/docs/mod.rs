use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Open the room of a document and get a ticket to join it
#[utoipa::path(
    post,
    path = "/api/v1/documents/{doc_id}/room",
    params(
        ("doc_id" = String, Path, description = "Document id")
    ),
    responses(
        (status = 200, description = "Room ticket issued", body = RoomTicketResponse),
        (status = 401, description = "Missing or invalid user token"),
        (status = 503, description = "Document unavailable right now", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn room_ticket_doc() {}

/// Worker fleet and host diagnostics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Diagnostics snapshot", body = DiagnosticsResponse),
        (status = 401, description = "Missing or invalid user token")
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        room_ticket_doc,
        diagnostics_doc,
    ),
    components(
        schemas(HealthResponse, RoomTicketResponse, DiagnosticsResponse, WorkerRecord, WorkerStatus, ErrorResponse)
    ),
    tags(
        (name = "api", description = "Room placement endpoints")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_room_ticket_path() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/documents/{doc_id}/room"));
        assert!(doc.paths.paths.contains_key("/api/health"));
    }
}
