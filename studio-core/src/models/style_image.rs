use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleImage {
    pub id: Uuid,
    pub project_id: Uuid,
    /// Data URI, stored as received.
    pub image_data: String,
    pub created_at: i64,
}
