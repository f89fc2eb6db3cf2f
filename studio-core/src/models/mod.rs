pub mod project;
pub mod render_job;
pub mod style_image;

pub use project::{NewProject, Project};
pub use render_job::{NewRenderJob, RenderJob};
pub use style_image::StyleImage;

/// Creation timestamp in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
