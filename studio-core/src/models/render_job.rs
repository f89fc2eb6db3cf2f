use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One generation result. Immutable once stored; a remix creates a new job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderJob {
    pub id: Uuid,
    pub project_id: Uuid,
    /// Present for image-conditioned renders, absent for text-only ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_instruction: Option<String>,
    pub output_image: String,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewRenderJob {
    pub project_id: Uuid,
    pub reference_image: Option<String>,
    pub user_instruction: Option<String>,
    pub output_image: String,
}
