use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Document metadata sent to a client once it joins a room. Carries no content.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub id: String,
    pub title: String,
    pub owner: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A document as held by the persistent store.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub metadata: DocumentMetadata,
    /// Replicated document snapshot, only loaded when requested
    pub state: Option<Vec<u8>>,
    pub commit_id: Option<i64>,
}
