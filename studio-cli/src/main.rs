//! studio-cli: local front end for the style studio
//!
//! Owns the Local Store (projects, style images, renders) and runs the
//! project/render workflow. Model calls go through the studio server by
//! default so the API key stays there; `--direct` calls Gemini in-process.
//!
//! # Subcommands
//! - `projects [--json]`                              : dashboard listing
//! - `create --name <n> (--image <p>... | --prompt <t>)`: new style project
//! - `show <project> [--json]`                        : project detail
//! - `delete <project>`                               : delete with cascade
//! - `render <project> [--reference <p>] [--instruction <t>]`: new render
//! - `remix <project> <job>`                          : re-run an earlier render
//! - `delete-render <project> <job>`                  : remove one render
//! - `export <project> <job> --out <p>`               : write a render to disk
//! - `models`                                         : list available models
//! - `status`                                         : server and store status

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use studio_core::data_uri::{extension_for_mime, mime_for_extension};
use studio_core::{
    open_store, DataUri, Envelope, GeminiClient, GeminiConfig, LocalStore, NewStyleProject, RemoteGateway,
    RenderInput, RenderOutcome, StudioConfig, Studio, StyleGateway,
};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

const DEFAULT_CONFIG: &str = "studio.toml";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "studio-cli", version, about = "AI style studio: train a style, render in it")]
struct Cli {
    /// Path to the studio TOML config
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: String,

    /// Studio HTTP server URL (defaults to the [http] section of the config)
    #[arg(long, env = "STUDIO_HTTP_URL")]
    server: Option<String>,

    /// Call Gemini directly with GEMINI_API_KEY instead of going through the server
    #[arg(long)]
    direct: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List style projects, newest first
    Projects {
        #[arg(long)]
        json: bool,
    },

    /// Create a style project from example images or from a written prompt
    Create {
        #[arg(long)]
        name: String,

        #[arg(long)]
        description: Option<String>,

        /// Style example image (repeat 3-10 times)
        #[arg(long = "image", required_unless_present = "prompt")]
        images: Vec<PathBuf>,

        /// Extra guidance for style extraction
        #[arg(long, conflicts_with = "prompt")]
        instruction: Option<String>,

        /// Use this text as the style descriptor instead of extracting one
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Show a project with its style images and renders
    Show {
        /// Project id or exact name
        project: String,

        #[arg(long)]
        json: bool,
    },

    /// Delete a project, its style images and its renders
    Delete { project: String },

    /// Render a new image in the project's style
    Render {
        project: String,

        /// Image whose structure the render should follow
        #[arg(long)]
        reference: Option<PathBuf>,

        #[arg(long)]
        instruction: Option<String>,

        /// Image model id (defaults to [gemini].default_image_model)
        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        aspect_ratio: Option<String>,

        /// Also write the rendered image here
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Render again using an earlier job's reference image and instruction
    Remix {
        project: String,
        job: Uuid,

        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        aspect_ratio: Option<String>,

        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Delete one render from a project
    DeleteRender { project: String, job: Uuid },

    /// Write a render's output image to a file
    Export {
        project: String,
        job: Uuid,

        #[arg(long)]
        out: PathBuf,
    },

    /// List models visible to the API key
    Models,

    /// Show server health and store backend
    Status,
}

// ============================================================================
// Image files <-> data URIs
// ============================================================================

/// Read an image file into a `data:<mime>;base64,...` string.
pub fn load_image(path: &Path) -> anyhow::Result<String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| anyhow!("{} has no file extension", path.display()))?;
    let mime = mime_for_extension(ext)
        .ok_or_else(|| anyhow!("{} is not a supported image type", path.display()))?;
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(DataUri::from_bytes(mime, &bytes).to_string())
}

/// Decode a data URI to `out`. Adds an extension from the mime type when `out` has none.
pub fn write_image(data_uri: &str, out: &Path) -> anyhow::Result<PathBuf> {
    let uri = DataUri::parse(data_uri)?;
    let bytes = uri.decode()?;
    let target = if out.extension().is_some() {
        out.to_path_buf()
    } else {
        out.with_extension(extension_for_mime(&uri.mime_type))
    };
    std::fs::write(&target, bytes).with_context(|| format!("writing {}", target.display()))?;
    Ok(target)
}

fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

fn format_created(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "?".to_string())
}

// ============================================================================
// Wiring
// ============================================================================

fn server_url(cli_server: Option<&str>, config: &StudioConfig) -> String {
    match cli_server {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => format!("http://{}:{}", config.http.host, config.http.port),
    }
}

fn build_gateway(direct: bool, server: &str, config: &StudioConfig) -> anyhow::Result<Arc<dyn StyleGateway>> {
    if direct {
        let client = GeminiClient::new(GeminiConfig::from_settings(None, &config.gemini))?;
        Ok(Arc::new(client))
    } else {
        Ok(Arc::new(RemoteGateway::new(server, config.gemini.timeout_seconds)?))
    }
}

async fn build_studio(cli: &Cli, config: &StudioConfig, server: &str) -> anyhow::Result<Studio> {
    let kv = open_store(&config.store).await?;
    let store = LocalStore::new(Arc::from(kv));
    let gateway = build_gateway(cli.direct, server, config)?;
    Ok(Studio::new(
        store,
        gateway,
        config.policy.clone(),
        config.gemini.default_image_model.clone(),
    ))
}

/// Accept a full id or an exact project name.
async fn resolve_project(studio: &Studio, reference: &str) -> anyhow::Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(reference) {
        return Ok(id);
    }
    let projects = studio.store().list_projects().await?;
    let mut matches = projects.iter().filter(|p| p.name == reference);
    match (matches.next(), matches.next()) {
        (Some(project), None) => Ok(project.id),
        (Some(_), Some(_)) => bail!("Several projects are named '{}'; use the id", reference),
        (None, _) => bail!("No project named '{}'", reference),
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn do_projects(studio: &Studio, json: bool) -> anyhow::Result<()> {
    let summaries = studio.list_projects().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }
    if summaries.is_empty() {
        eprintln!("No projects yet. Create one with `studio-cli create`.");
        return Ok(());
    }
    for s in &summaries {
        println!(
            "{}  {:<24} {:>2} images  {}",
            short_id(s.project.id),
            s.project.name,
            s.image_count,
            format_created(s.project.created_at)
        );
    }
    Ok(())
}

async fn do_create(
    studio: &Studio,
    fields: NewStyleProject,
    image_paths: &[PathBuf],
    prompt: Option<String>,
) -> anyhow::Result<()> {
    let images = image_paths
        .iter()
        .map(|p| load_image(p))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let project = match prompt {
        Some(prompt) => studio.create_from_prompt(fields, &prompt, images).await?,
        None => {
            eprintln!("Analyzing {} style images...", images.len());
            studio.create_from_images(fields, images).await?
        }
    };

    println!("Created project {} ({})", project.name, project.id);
    if let Some(descriptor) = project.descriptor() {
        println!("\n{}", descriptor);
    }
    Ok(())
}

async fn do_show(studio: &Studio, project_id: Uuid, json: bool) -> anyhow::Result<()> {
    let detail = studio.project_detail(project_id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let p = &detail.project;
    println!("{}  ({})", p.name, p.id);
    println!("Created:      {}", format_created(p.created_at));
    if let Some(description) = &p.description {
        println!("Description:  {}", description);
    }
    if let Some(instruction) = &p.training_instruction {
        println!("Instruction:  {}", instruction);
    }
    println!("Style images: {}", detail.style_images.len());
    println!("\nStyle descriptor:\n{}\n", p.descriptor().unwrap_or("(none)"));

    println!("Renders: {}", detail.render_jobs.len());
    for job in &detail.render_jobs {
        println!(
            "  {}  {}  ref:{}  {}",
            job.id,
            format_created(job.created_at),
            if job.reference_image.is_some() { "yes" } else { "no" },
            job.user_instruction.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn do_render(studio: &Studio, project_id: Uuid, input: RenderInput, out: Option<&Path>) -> anyhow::Result<()> {
    match studio.render(project_id, input).await? {
        RenderOutcome::Rendered(job) => {
            println!("Rendered {}", job.id);
            if let Some(out) = out {
                let written = write_image(&job.output_image, out)?;
                println!("Wrote {}", written.display());
            }
        }
        RenderOutcome::TextOnly(text) => {
            eprintln!("The model returned text instead of an image; nothing was saved.");
            println!("{}", text);
        }
    }
    Ok(())
}

async fn do_export(studio: &Studio, project_id: Uuid, job_id: Uuid, out: &Path) -> anyhow::Result<()> {
    let job = studio.render_job(project_id, job_id).await?;
    let written = write_image(&job.output_image, out)?;
    println!("Wrote {}", written.display());
    Ok(())
}

async fn do_models(direct: bool, server: &str, config: &StudioConfig) -> anyhow::Result<()> {
    let models = if direct {
        GeminiClient::new(GeminiConfig::from_settings(None, &config.gemini))?
            .list_models()
            .await?
    } else {
        let url = format!("{}/models", server);
        let envelope: Envelope = reqwest::get(&url)
            .await
            .with_context(|| format!("connection failed to {}", url))?
            .json()
            .await?;
        if !envelope.success {
            bail!("{}", envelope.error_message());
        }
        envelope.models.unwrap_or_default()
    };

    for model in models {
        println!("{}", model);
    }
    Ok(())
}

async fn do_status(server: &str, config: &StudioConfig, direct: bool) -> anyhow::Result<()> {
    let store = LocalStore::new(Arc::from(open_store(&config.store).await?));
    let project_count = store.list_projects().await?.len();
    println!("Store:        {} ({} projects)", store.backend_name(), project_count);
    println!("Image model:  {}", config.gemini.default_image_model);

    if direct {
        let key_set = std::env::var("GEMINI_API_KEY").is_ok() || std::env::var("GOOGLE_API_KEY").is_ok();
        println!("Gateway:      gemini (direct)");
        println!("API key:      {}", if key_set { "configured" } else { "missing" });
        return Ok(());
    }

    let url = format!("{}/health", server);
    match reqwest::get(&url).await {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().await.unwrap_or_default();
            println!("Server:       {} ({})", body["status"].as_str().unwrap_or("unknown"), server);
            println!("Version:      {}", body["version"].as_str().unwrap_or("?"));
            println!("Gateway:      {}", body["gateway"].as_str().unwrap_or("?"));
            println!(
                "API key:      {}",
                if body["apiKeyConfigured"].as_bool().unwrap_or(false) { "configured" } else { "missing" }
            );
        }
        Ok(r) => bail!("server unhealthy (HTTP {})", r.status()),
        Err(e) => bail!("cannot reach {}: {}", url, e),
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = StudioConfig::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config))?;
    let server = server_url(cli.server.as_deref(), &config);

    match &cli.command {
        Commands::Models => return do_models(cli.direct, &server, &config).await,
        Commands::Status => return do_status(&server, &config, cli.direct).await,
        _ => {}
    }

    let studio = build_studio(&cli, &config, &server).await?;

    match cli.command {
        Commands::Projects { json } => do_projects(&studio, json).await,
        Commands::Create {
            name,
            description,
            images,
            instruction,
            prompt,
        } => {
            let fields = NewStyleProject {
                name,
                description,
                training_instruction: instruction,
            };
            do_create(&studio, fields, &images, prompt).await
        }
        Commands::Show { project, json } => {
            let id = resolve_project(&studio, &project).await?;
            do_show(&studio, id, json).await
        }
        Commands::Delete { project } => {
            let id = resolve_project(&studio, &project).await?;
            studio.delete_project(id).await?;
            println!("Deleted project {}", id);
            Ok(())
        }
        Commands::Render {
            project,
            reference,
            instruction,
            model,
            aspect_ratio,
            out,
        } => {
            let id = resolve_project(&studio, &project).await?;
            let input = RenderInput {
                reference_image: reference.as_deref().map(load_image).transpose()?,
                instruction,
                model,
                aspect_ratio,
            };
            do_render(&studio, id, input, out.as_deref()).await
        }
        Commands::Remix {
            project,
            job,
            model,
            aspect_ratio,
            out,
        } => {
            let id = resolve_project(&studio, &project).await?;
            let mut input = studio.remix(id, job).await?;
            input.model = model;
            input.aspect_ratio = aspect_ratio;
            do_render(&studio, id, input, out.as_deref()).await
        }
        Commands::DeleteRender { project, job } => {
            let id = resolve_project(&studio, &project).await?;
            studio.delete_render(id, job).await?;
            println!("Deleted render {}", job);
            Ok(())
        }
        Commands::Export { project, job, out } => {
            let id = resolve_project(&studio, &project).await?;
            do_export(&studio, id, job, &out).await
        }
        Commands::Models | Commands::Status => Ok(()),
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("studio-cli: {:#}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // TEST 1: load_image encodes bytes with a mime type from the extension
    // ========================================================================
    #[test]
    fn test_load_image_builds_data_uri() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swatch.PNG");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let uri = load_image(&path).unwrap();
        assert_eq!(uri, "data:image/png;base64,iVBORw==");
    }

    // ========================================================================
    // TEST 2: unsupported or extensionless files are refused
    // ========================================================================
    #[test]
    fn test_load_image_rejects_non_images() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("notes.txt");
        std::fs::write(&text, "hello").unwrap();
        assert!(load_image(&text).is_err());

        let bare = dir.path().join("README");
        std::fs::write(&bare, "hello").unwrap();
        assert!(load_image(&bare).is_err());
    }

    // ========================================================================
    // TEST 3: write_image decodes and picks an extension when missing
    // ========================================================================
    #[test]
    fn test_write_image_adds_extension() {
        let dir = tempfile::tempdir().unwrap();

        let written = write_image("data:image/jpeg;base64,/9j/", &dir.path().join("render")).unwrap();
        assert_eq!(written.extension().and_then(|e| e.to_str()), Some("jpg"));
        assert_eq!(std::fs::read(&written).unwrap(), vec![0xff, 0xd8, 0xff]);

        let explicit = write_image("data:image/png;base64,iVBORw==", &dir.path().join("out.png")).unwrap();
        assert_eq!(explicit, dir.path().join("out.png"));
    }

    // ========================================================================
    // TEST 4: write_image refuses malformed payloads
    // ========================================================================
    #[test]
    fn test_write_image_rejects_bad_uri() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_image("not a uri", &dir.path().join("x.png")).is_err());
        assert!(write_image("data:image/png;base64,@@@", &dir.path().join("y.png")).is_err());
    }

    // ========================================================================
    // TEST 5: server URL comes from the flag, else from [http]
    // ========================================================================
    #[test]
    fn test_server_url_resolution() {
        let config = StudioConfig::default();
        assert_eq!(server_url(None, &config), "http://127.0.0.1:8787");
        assert_eq!(server_url(Some("http://studio.local:9000/"), &config), "http://studio.local:9000");
    }

    // ========================================================================
    // TEST 6: display helpers
    // ========================================================================
    #[test]
    fn test_display_helpers() {
        let id = Uuid::parse_str("7b5c24ab-1234-5678-9abc-def012345678").unwrap();
        assert_eq!(short_id(id), "7b5c24ab");
        assert_eq!(format_created(0), "1970-01-01 00:00");
    }

    // ========================================================================
    // TEST 7: clap accepts the create forms and rejects mixing them
    // ========================================================================
    #[test]
    fn test_create_argument_rules() {
        let cli = Cli::try_parse_from([
            "studio-cli", "create", "--name", "Neon", "--image", "a.png", "--image", "b.png",
        ])
        .unwrap();
        match cli.command {
            Commands::Create { images, prompt, .. } => {
                assert_eq!(images.len(), 2);
                assert!(prompt.is_none());
            }
            other => panic!("Expected Create, got {other:?}"),
        }

        assert!(Cli::try_parse_from(["studio-cli", "create", "--name", "Neon"]).is_err());
        assert!(Cli::try_parse_from([
            "studio-cli", "create", "--name", "Neon", "--prompt", "flat pastel", "--instruction", "x",
        ])
        .is_err());
    }

    // ========================================================================
    // TEST 8: project references resolve by id or unique name
    // ========================================================================
    #[tokio::test]
    async fn test_resolve_project() {
        let store = LocalStore::new(Arc::new(studio_core::store::MemoryStore::new()));
        let gateway: Arc<dyn StyleGateway> = Arc::new(RemoteGateway::new("http://127.0.0.1:9", 1).unwrap());
        let studio = Studio::new(store, gateway, Default::default(), "model");

        let neon = studio
            .create_from_prompt(
                NewStyleProject {
                    name: "Neon".to_string(),
                    ..NewStyleProject::default()
                },
                "glow",
                vec![],
            )
            .await
            .unwrap();

        assert_eq!(resolve_project(&studio, "Neon").await.unwrap(), neon.id);
        assert_eq!(resolve_project(&studio, &neon.id.to_string()).await.unwrap(), neon.id);
        assert!(resolve_project(&studio, "Pastel").await.is_err());
    }
}
