use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use super::{KvOp, KvStore, StoreError};
use crate::models::{now_millis, NewProject, NewRenderJob, Project, RenderJob, StyleImage};

pub const PROJECTS_KEY: &str = "ai_studio_projects";

pub fn images_key(project_id: Uuid) -> String {
    format!("ai_studio_images_{project_id}")
}

pub fn renders_key(project_id: Uuid) -> String {
    format!("ai_studio_renders_{project_id}")
}

/// Typed project, style-image and render-job collections over a `KvStore`.
///
/// Each collection is a separately keyed JSON array. Nothing here spans keys
/// atomically except what the backend's `apply` provides.
#[derive(Clone)]
pub struct LocalStore {
    kv: Arc<dyn KvStore>,
}

impl LocalStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn backend_name(&self) -> &str {
        self.kv.name()
    }

    async fn read_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, StoreError> {
        match self.kv.get(key).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    async fn write_list<T: Serialize>(&self, key: &str, items: &[T]) -> Result<(), StoreError> {
        self.kv.set(key, serde_json::to_value(items)?).await
    }

    async fn ensure_project(&self, project_id: Uuid) -> Result<(), StoreError> {
        match self.get_project(project_id).await? {
            Some(_) => Ok(()),
            None => Err(StoreError::UnknownProject(project_id)),
        }
    }

    // ------------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------------

    pub async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        self.read_list(PROJECTS_KEY).await
    }

    /// Assign id and timestamp, then prepend so the newest project comes first.
    pub async fn create_project(&self, fields: NewProject) -> Result<Project, StoreError> {
        let project = Project {
            id: Uuid::new_v4(),
            name: fields.name,
            description: fields.description,
            style_descriptor: fields.style_descriptor,
            training_instruction: fields.training_instruction,
            created_at: now_millis(),
        };

        let mut projects = self.list_projects().await?;
        projects.insert(0, project.clone());
        self.write_list(PROJECTS_KEY, &projects).await?;

        tracing::info!(project_id = %project.id, name = %project.name, "Project created");
        Ok(project)
    }

    pub async fn get_project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        let projects = self.list_projects().await?;
        Ok(projects.into_iter().find(|p| p.id == id))
    }

    /// Remove the project and both of its child collections in one batch.
    ///
    /// On a backend without transactions a failure after the first write
    /// returns `StoreError::Partial` and may leave orphaned child keys. They
    /// are unreachable without the parent entry and are not cleaned up.
    pub async fn delete_project(&self, id: Uuid) -> Result<(), StoreError> {
        let projects: Vec<Project> = self
            .list_projects()
            .await?
            .into_iter()
            .filter(|p| p.id != id)
            .collect();

        self.kv
            .apply(vec![
                KvOp::Set(PROJECTS_KEY.to_string(), serde_json::to_value(&projects)?),
                KvOp::Delete(images_key(id)),
                KvOp::Delete(renders_key(id)),
            ])
            .await?;

        tracing::info!(project_id = %id, "Project deleted with its images and renders");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Style images
    // ------------------------------------------------------------------------

    pub async fn list_style_images(&self, project_id: Uuid) -> Result<Vec<StyleImage>, StoreError> {
        self.read_list(&images_key(project_id)).await
    }

    /// Append after any existing images and return the full updated list.
    /// No dedup and no cap.
    pub async fn append_style_images(
        &self,
        project_id: Uuid,
        images: Vec<String>,
    ) -> Result<Vec<StyleImage>, StoreError> {
        self.ensure_project(project_id).await?;

        let created_at = now_millis();
        let mut all = self.list_style_images(project_id).await?;
        all.extend(images.into_iter().map(|image_data| StyleImage {
            id: Uuid::new_v4(),
            project_id,
            image_data,
            created_at,
        }));

        self.write_list(&images_key(project_id), &all).await?;
        Ok(all)
    }

    // ------------------------------------------------------------------------
    // Render jobs
    // ------------------------------------------------------------------------

    pub async fn list_render_jobs(&self, project_id: Uuid) -> Result<Vec<RenderJob>, StoreError> {
        self.read_list(&renders_key(project_id)).await
    }

    pub async fn get_render_job(
        &self,
        project_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<RenderJob>, StoreError> {
        let jobs = self.list_render_jobs(project_id).await?;
        Ok(jobs.into_iter().find(|j| j.id == job_id))
    }

    /// Prepend so the newest render comes first.
    pub async fn append_render_job(&self, job: NewRenderJob) -> Result<RenderJob, StoreError> {
        self.ensure_project(job.project_id).await?;

        let job = RenderJob {
            id: Uuid::new_v4(),
            project_id: job.project_id,
            reference_image: job.reference_image,
            user_instruction: job.user_instruction,
            output_image: job.output_image,
            created_at: now_millis(),
        };

        let mut jobs = self.list_render_jobs(job.project_id).await?;
        jobs.insert(0, job.clone());
        self.write_list(&renders_key(job.project_id), &jobs).await?;

        tracing::info!(project_id = %job.project_id, job_id = %job.id, "Render job saved");
        Ok(job)
    }

    /// Returns whether a job was removed.
    pub async fn delete_render_job(&self, project_id: Uuid, job_id: Uuid) -> Result<bool, StoreError> {
        let jobs = self.list_render_jobs(project_id).await?;
        let before = jobs.len();
        let remaining: Vec<RenderJob> = jobs.into_iter().filter(|j| j.id != job_id).collect();
        if remaining.len() == before {
            return Ok(false);
        }

        self.write_list(&renders_key(project_id), &remaining).await?;
        tracing::info!(project_id = %project_id, job_id = %job_id, "Render job deleted");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileStore, MemoryStore};
    use async_trait::async_trait;
    use serde_json::Value;

    fn memory_store() -> LocalStore {
        LocalStore::new(Arc::new(MemoryStore::new()))
    }

    fn named(name: &str) -> NewProject {
        NewProject {
            name: name.to_string(),
            style_descriptor: Some(format!("{name} descriptor")),
            ..NewProject::default()
        }
    }

    fn render_for(project_id: Uuid, output: &str) -> NewRenderJob {
        NewRenderJob {
            project_id,
            reference_image: None,
            user_instruction: Some("make it moody".to_string()),
            output_image: output.to_string(),
        }
    }

    #[tokio::test]
    async fn test_uninitialized_store_reads_empty() {
        let store = memory_store();
        let id = Uuid::new_v4();
        assert!(store.list_projects().await.unwrap().is_empty());
        assert!(store.list_style_images(id).await.unwrap().is_empty());
        assert!(store.list_render_jobs(id).await.unwrap().is_empty());
        assert!(store.get_project(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_project_prepends_newest_first() {
        let store = memory_store();
        let first = store.create_project(named("First")).await.unwrap();
        let second = store.create_project(named("Second")).await.unwrap();

        let projects = store.list_projects().await.unwrap();
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].id, second.id);
        assert_eq!(projects[1].id, first.id);
        assert_ne!(first.id, second.id);

        let fetched = store.get_project(first.id).await.unwrap().unwrap();
        assert_eq!(fetched, first);
    }

    #[tokio::test]
    async fn test_append_style_images_keeps_existing_and_assigns_unique_ids() {
        let store = memory_store();
        let project = store.create_project(named("Ink")).await.unwrap();

        store
            .append_style_images(project.id, vec!["data:image/png;base64,AAA".to_string()])
            .await
            .unwrap();
        let all = store
            .append_style_images(
                project.id,
                vec![
                    "data:image/png;base64,BBB".to_string(),
                    "data:image/png;base64,CCC".to_string(),
                ],
            )
            .await
            .unwrap();

        let listed = store.list_style_images(project.id).await.unwrap();
        assert_eq!(listed, all);
        let data: Vec<&str> = listed.iter().map(|i| i.image_data.as_str()).collect();
        assert_eq!(
            data,
            vec![
                "data:image/png;base64,AAA",
                "data:image/png;base64,BBB",
                "data:image/png;base64,CCC"
            ]
        );

        let mut ids: Vec<Uuid> = listed.iter().map(|i| i.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
        assert!(listed.iter().all(|i| i.project_id == project.id));
    }

    #[tokio::test]
    async fn test_children_require_existing_project() {
        let store = memory_store();
        let ghost = Uuid::new_v4();

        let images = store
            .append_style_images(ghost, vec!["data:image/png;base64,AAA".to_string()])
            .await;
        assert!(matches!(images, Err(StoreError::UnknownProject(id)) if id == ghost));

        let job = store.append_render_job(render_for(ghost, "out")).await;
        assert!(matches!(job, Err(StoreError::UnknownProject(id)) if id == ghost));
    }

    #[tokio::test]
    async fn test_render_jobs_prepend_and_delete_one() {
        let store = memory_store();
        let project = store.create_project(named("Neon")).await.unwrap();
        store
            .append_style_images(project.id, vec!["data:image/png;base64,AAA".to_string()])
            .await
            .unwrap();

        let a = store.append_render_job(render_for(project.id, "a")).await.unwrap();
        let b = store.append_render_job(render_for(project.id, "b")).await.unwrap();
        let c = store.append_render_job(render_for(project.id, "c")).await.unwrap();

        let ids: Vec<Uuid> = store
            .list_render_jobs(project.id)
            .await
            .unwrap()
            .iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(ids, vec![c.id, b.id, a.id]);

        assert!(store.delete_render_job(project.id, b.id).await.unwrap());
        assert!(!store.delete_render_job(project.id, b.id).await.unwrap());

        let remaining = store.list_render_jobs(project.id).await.unwrap();
        assert_eq!(remaining, vec![c.clone(), a.clone()]);
        assert_eq!(store.list_style_images(project.id).await.unwrap().len(), 1);
        assert_eq!(store.get_render_job(project.id, a.id).await.unwrap(), Some(a));
    }

    #[tokio::test]
    async fn test_delete_project_cascades() {
        let store = memory_store();
        let keep = store.create_project(named("Keep")).await.unwrap();
        let doomed = store.create_project(named("Doomed")).await.unwrap();

        for project in [&keep, &doomed] {
            store
                .append_style_images(project.id, vec!["data:image/png;base64,AAA".to_string()])
                .await
                .unwrap();
            store.append_render_job(render_for(project.id, "out")).await.unwrap();
        }

        store.delete_project(doomed.id).await.unwrap();

        let projects = store.list_projects().await.unwrap();
        assert_eq!(projects, vec![keep.clone()]);
        assert!(store.list_style_images(doomed.id).await.unwrap().is_empty());
        assert!(store.list_render_jobs(doomed.id).await.unwrap().is_empty());
        assert_eq!(store.list_style_images(keep.id).await.unwrap().len(), 1);
        assert_eq!(store.list_render_jobs(keep.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_render_on_deleted_project_writes_nothing() {
        let kv = Arc::new(MemoryStore::new());
        let store = LocalStore::new(kv.clone());
        let project = store.create_project(named("Gone")).await.unwrap();
        store.delete_project(project.id).await.unwrap();

        let removed = store.delete_render_job(project.id, Uuid::new_v4()).await.unwrap();
        assert!(!removed);
        assert_eq!(kv.keys().await, vec![PROJECTS_KEY.to_string()]);
    }

    #[tokio::test]
    async fn test_file_backed_collections_persist() {
        let dir = tempfile::tempdir().unwrap();
        let project_id = {
            let store = LocalStore::new(Arc::new(FileStore::open(dir.path()).await.unwrap()));
            let project = store.create_project(named("Durable")).await.unwrap();
            store.append_render_job(render_for(project.id, "out")).await.unwrap();
            project.id
        };

        let store = LocalStore::new(Arc::new(FileStore::open(dir.path()).await.unwrap()));
        assert_eq!(store.backend_name(), "file");
        assert_eq!(store.get_project(project_id).await.unwrap().unwrap().name, "Durable");
        assert_eq!(store.list_render_jobs(project_id).await.unwrap().len(), 1);
    }

    /// Store that fails every delete of a renders key, to exercise the
    /// non-atomic cascade window.
    struct FailingRendersDelete {
        inner: MemoryStore,
    }

    #[async_trait]
    impl KvStore for FailingRendersDelete {
        async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
            self.inner.set(key, value).await
        }

        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            if key.starts_with("ai_studio_renders_") {
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk unplugged",
                )));
            }
            self.inner.delete(key).await
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_partial_cascade_reports_partial_and_leaves_orphan() {
        let store = LocalStore::new(Arc::new(FailingRendersDelete {
            inner: MemoryStore::new(),
        }));
        let project = store.create_project(named("Fragile")).await.unwrap();
        store
            .append_style_images(project.id, vec!["data:image/png;base64,AAA".to_string()])
            .await
            .unwrap();
        store.append_render_job(render_for(project.id, "out")).await.unwrap();

        match store.delete_project(project.id).await {
            Err(StoreError::Partial { applied, total, .. }) => {
                assert_eq!(applied, 2);
                assert_eq!(total, 3);
            }
            other => panic!("Expected Partial, got {other:?}"),
        }

        // Parent and images are gone; the renders collection is orphaned.
        assert!(store.get_project(project.id).await.unwrap().is_none());
        assert!(store.list_style_images(project.id).await.unwrap().is_empty());
        assert_eq!(store.list_render_jobs(project.id).await.unwrap().len(), 1);

        // The orphan cannot receive new children without its parent.
        let more = store.append_render_job(render_for(project.id, "late")).await;
        assert!(matches!(more, Err(StoreError::UnknownProject(_))));
    }
}
