pub mod config;
pub mod data_uri;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod gemini;
pub mod models;
pub mod prompts;
pub mod remote;
pub mod store;
pub mod studio;

pub use config::StudioConfig;
pub use data_uri::DataUri;
pub use envelope::{Envelope, GenerateRequest, TrainRequest};
pub use error::StudioError;
pub use gateway::{GatewayError, GenerationRequest, GenerationResult, StyleGateway};
pub use gemini::{GeminiClient, GeminiConfig, GeminiError};
pub use remote::RemoteGateway;
pub use store::{open_store, KvStore, LocalStore, StoreError};
pub use studio::{NewStyleProject, ProjectDetail, ProjectSummary, RenderInput, RenderOutcome, Studio};
