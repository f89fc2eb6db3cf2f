//! Project and render orchestration.
//!
//! Ties the Local Store to a `StyleGateway`:
//! - a project becomes "trained" once, at creation, either from extracted
//!   images or from a raw text descriptor
//! - renders use the stored descriptor and are saved as new, immutable jobs
//!
//! Each user action holds an in-flight guard so the same action cannot run
//! twice at once; a second attempt fails with `StudioError::Busy`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use uuid::Uuid;

use crate::config::PolicyConfig;
use crate::data_uri::DataUri;
use crate::error::StudioError;
use crate::gateway::{GenerationRequest, GenerationResult, StyleGateway};
use crate::models::{NewProject, NewRenderJob, Project, RenderJob, StyleImage};
use crate::store::LocalStore;

// ============================================================================
// Inputs / outputs
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct NewStyleProject {
    pub name: String,
    pub description: Option<String>,
    /// Only used when extracting from images.
    pub training_instruction: Option<String>,
}

/// What the user fills in to request a render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderInput {
    pub reference_image: Option<String>,
    pub instruction: Option<String>,
    /// Falls back to the configured default image model.
    pub model: Option<String>,
    /// Falls back to the policy default.
    pub aspect_ratio: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    /// Image produced and saved at the head of the project's renders.
    Rendered(RenderJob),
    /// The model replied with text only; nothing was saved.
    TextOnly(String),
}

/// Dashboard row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub image_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub style_images: Vec<StyleImage>,
    pub render_jobs: Vec<RenderJob>,
}

// ============================================================================
// In-flight guard
// ============================================================================

#[derive(Debug, Clone, Default)]
struct InFlight {
    active: Arc<Mutex<HashSet<String>>>,
}

struct InFlightGuard {
    active: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl InFlight {
    fn acquire(&self, key: String) -> Result<InFlightGuard, StudioError> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(key.clone()) {
            tracing::warn!(action = %key, "Refusing duplicate in-flight action");
            return Err(StudioError::Busy(key));
        }
        Ok(InFlightGuard {
            active: Arc::clone(&self.active),
            key,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.key);
    }
}

// ============================================================================
// Studio
// ============================================================================

pub struct Studio {
    store: LocalStore,
    gateway: Arc<dyn StyleGateway>,
    policy: PolicyConfig,
    default_model: String,
    in_flight: InFlight,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn check_images(images: &[String]) -> Result<(), StudioError> {
    for (i, raw) in images.iter().enumerate() {
        let uri = DataUri::parse(raw)
            .map_err(|e| StudioError::Validation(format!("Image {} is not a valid data URI: {}", i, e)))?;
        if !uri.is_image() {
            return Err(StudioError::Validation(format!(
                "Image {} has non-image type '{}'",
                i, uri.mime_type
            )));
        }
    }
    Ok(())
}

impl Studio {
    pub fn new(
        store: LocalStore,
        gateway: Arc<dyn StyleGateway>,
        policy: PolicyConfig,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            policy,
            default_model: default_model.into(),
            in_flight: InFlight::default(),
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    // ------------------------------------------------------------------------
    // Untrained -> Trained
    // ------------------------------------------------------------------------

    /// Extract a descriptor from example images and save it as a new project.
    pub async fn create_from_images(
        &self,
        fields: NewStyleProject,
        mut images: Vec<String>,
    ) -> Result<Project, StudioError> {
        let name = fields.name.trim().to_string();
        if name.is_empty() || images.len() < self.policy.min_style_images {
            return Err(StudioError::Validation(format!(
                "Please provide a name and at least {} style images.",
                self.policy.min_style_images
            )));
        }
        if images.len() > self.policy.max_style_images {
            tracing::warn!(
                supplied = images.len(),
                kept = self.policy.max_style_images,
                "Too many style images; keeping the first ones"
            );
            images.truncate(self.policy.max_style_images);
        }
        check_images(&images)?;

        let _guard = self.in_flight.acquire(format!("train:{name}"))?;

        let training_instruction = non_blank(fields.training_instruction);
        let descriptor = self
            .gateway
            .extract_style(&images, training_instruction.as_deref())
            .await?;

        tracing::info!(
            gateway = self.gateway.name(),
            descriptor_len = descriptor.len(),
            "Style extracted"
        );

        let project = self
            .store
            .create_project(NewProject {
                name,
                description: non_blank(fields.description),
                style_descriptor: Some(descriptor),
                training_instruction,
            })
            .await?;

        self.save_style_images(&project, images).await?;
        Ok(project)
    }

    /// Save a user-written descriptor as a new project. Never calls the gateway.
    /// Any images given are kept as style references.
    pub async fn create_from_prompt(
        &self,
        fields: NewStyleProject,
        raw_prompt: &str,
        images: Vec<String>,
    ) -> Result<Project, StudioError> {
        let name = fields.name.trim().to_string();
        if name.is_empty() || raw_prompt.trim().is_empty() {
            return Err(StudioError::Validation(
                "Please provide a name and your style prompt.".to_string(),
            ));
        }
        check_images(&images)?;

        let project = self
            .store
            .create_project(NewProject {
                name,
                description: non_blank(fields.description),
                style_descriptor: Some(raw_prompt.to_string()),
                training_instruction: None,
            })
            .await?;

        if !images.is_empty() {
            self.save_style_images(&project, images).await?;
        }
        Ok(project)
    }

    /// Attach the style images to a just-created project. If that fails the
    /// project is removed again so no trained project is left without them.
    async fn save_style_images(&self, project: &Project, images: Vec<String>) -> Result<(), StudioError> {
        let Err(e) = self.store.append_style_images(project.id, images).await else {
            return Ok(());
        };

        tracing::error!(project_id = %project.id, error = %e, "Saving style images failed; removing project");
        if let Err(rollback) = self.store.delete_project(project.id).await {
            tracing::error!(project_id = %project.id, error = %rollback, "Project rollback failed");
        }
        Err(e.into())
    }

    // ------------------------------------------------------------------------
    // Trained -> Rendering
    // ------------------------------------------------------------------------

    pub async fn render(&self, project_id: Uuid, input: RenderInput) -> Result<RenderOutcome, StudioError> {
        let project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or_else(|| StudioError::NotFound(format!("Project {project_id}")))?;

        let descriptor = project.descriptor().map(str::to_string).ok_or_else(|| {
            StudioError::Validation(
                "This project doesn't have a trained style descriptor. Try creating a new project."
                    .to_string(),
            )
        })?;

        let reference_image = non_blank(input.reference_image);
        let instruction = non_blank(input.instruction);
        if self.policy.require_generation_input && reference_image.is_none() && instruction.is_none() {
            return Err(StudioError::Validation(
                "Please upload a reference image or describe what to render.".to_string(),
            ));
        }
        if let Some(reference) = &reference_image {
            check_images(std::slice::from_ref(reference))?;
        }

        let _guard = self.in_flight.acquire(format!("render:{project_id}"))?;

        let request = GenerationRequest {
            descriptor,
            model_id: non_blank(input.model).unwrap_or_else(|| self.default_model.clone()),
            aspect_ratio: Some(
                non_blank(input.aspect_ratio).unwrap_or_else(|| self.policy.default_aspect_ratio.clone()),
            ),
            instruction,
            reference_image,
        };

        match self.gateway.generate(&request).await? {
            GenerationResult::Image(output_image) => {
                let job = self
                    .store
                    .append_render_job(NewRenderJob {
                        project_id,
                        reference_image: request.reference_image,
                        user_instruction: request.instruction,
                        output_image,
                    })
                    .await?;
                Ok(RenderOutcome::Rendered(job))
            }
            GenerationResult::TextFallback(text) => {
                tracing::warn!(project_id = %project_id, "Render produced text only; nothing saved");
                Ok(RenderOutcome::TextOnly(text))
            }
        }
    }

    /// Seed a new render input from an earlier job. The job itself is untouched
    /// and the new render keeps no link back to it.
    pub async fn remix(&self, project_id: Uuid, job_id: Uuid) -> Result<RenderInput, StudioError> {
        let job = self.render_job(project_id, job_id).await?;
        Ok(RenderInput {
            reference_image: job.reference_image,
            instruction: job.user_instruction,
            model: None,
            aspect_ratio: None,
        })
    }

    // ------------------------------------------------------------------------
    // Queries and deletes
    // ------------------------------------------------------------------------

    pub async fn list_projects(&self) -> Result<Vec<ProjectSummary>, StudioError> {
        let projects = self.store.list_projects().await?;
        let mut summaries = Vec::with_capacity(projects.len());
        for project in projects {
            let image_count = self.store.list_style_images(project.id).await?.len();
            summaries.push(ProjectSummary { project, image_count });
        }
        Ok(summaries)
    }

    pub async fn project_detail(&self, project_id: Uuid) -> Result<ProjectDetail, StudioError> {
        let project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or_else(|| StudioError::NotFound(format!("Project {project_id}")))?;
        let style_images = self.store.list_style_images(project_id).await?;
        let render_jobs = self.store.list_render_jobs(project_id).await?;
        Ok(ProjectDetail {
            project,
            style_images,
            render_jobs,
        })
    }

    pub async fn render_job(&self, project_id: Uuid, job_id: Uuid) -> Result<RenderJob, StudioError> {
        self.store
            .get_render_job(project_id, job_id)
            .await?
            .ok_or_else(|| StudioError::NotFound(format!("Render {job_id}")))
    }

    pub async fn delete_project(&self, project_id: Uuid) -> Result<(), StudioError> {
        let _guard = self.in_flight.acquire(format!("delete:{project_id}"))?;
        self.store.delete_project(project_id).await?;
        Ok(())
    }

    pub async fn delete_render(&self, project_id: Uuid, job_id: Uuid) -> Result<(), StudioError> {
        if !self.store.delete_render_job(project_id, job_id).await? {
            return Err(StudioError::NotFound(format!("Render {job_id}")));
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
