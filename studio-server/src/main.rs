use clap::Parser;
use studio_core::{GeminiClient, GeminiConfig, GeminiError, StudioConfig};
use studio_server::http::{self, HttpState};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "studio.toml")]
    config: String,

    /// Check the API key against the model listing and exit.
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience: production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match StudioConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging
    let default_level = config
        .service
        .log_level
        .parse()
        .unwrap_or(tracing::Level::INFO);
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .init();

    let gemini = match GeminiClient::new(GeminiConfig::from_settings(None, &config.gemini)) {
        Ok(client) => Some(client),
        Err(GeminiError::MissingApiKey) => {
            tracing::warn!("GEMINI_API_KEY not set; /train, /generate and /models will fail");
            None
        }
        Err(e) => {
            eprintln!("Failed to build Gemini client: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        let Some(client) = gemini.as_ref() else {
            println!("❌ GEMINI_API_KEY is not configured");
            std::process::exit(1);
        };
        match client.list_models().await {
            Ok(models) => println!("✅ Gemini reachable: {} models visible", models.len()),
            Err(e) => {
                println!("❌ Gemini check failed: {}", e);
                std::process::exit(1);
            }
        }
        println!("✅ Studio health check passed");
        return Ok(());
    }

    if !config.http.enabled {
        tracing::warn!("HTTP server disabled in config; nothing to do");
        return Ok(());
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let state = HttpState::from_gemini(gemini, config);
    http::start_http_server(state, tx.subscribe()).await?;

    Ok(())
}
