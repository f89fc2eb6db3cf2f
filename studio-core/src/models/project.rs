use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A saved visual style. The descriptor is set once at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_descriptor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_instruction: Option<String>,
    pub created_at: i64,
}

impl Project {
    /// The descriptor if it carries any non-whitespace text.
    pub fn descriptor(&self) -> Option<&str> {
        self.style_descriptor
            .as_deref()
            .filter(|d| !d.trim().is_empty())
    }
}

/// Caller-supplied fields for a new project; id and timestamp are assigned by the store.
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub style_descriptor: Option<String>,
    pub training_instruction: Option<String>,
}
