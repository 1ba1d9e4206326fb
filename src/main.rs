//! llm-relay - a frontend-facing proxy for hosted and local AI models
//!
//! Forwards chat and function-calling requests to Replicate, Gemini or a
//! local Ollama daemon and answers in one normalized shape.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use llm_relay::config::Config;
use llm_relay::proxy::run_server;

#[derive(Parser)]
#[command(name = "llm-relay")]
#[command(about = "Frontend-facing proxy for Replicate, Gemini and Ollama")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server
    Serve {
        /// Path to an optional configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override listen address (takes precedence over PORT)
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration and print the resolved settings
    Check {
        /// Path to an optional configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("llm_relay={},tower_http={}", default_level, default_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => {
            let mut config = Config::load(config.as_deref())?;
            init_tracing(&config.logging.level);

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                config.server.listen = addr;
            }

            run_server(config).await
        }

        Commands::Check { config } => {
            init_tracing("info");
            let path = config
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<defaults>".to_string());
            tracing::info!(config = %path, "Checking configuration");

            let config = Config::load(config.as_deref())?;
            println!("Configuration OK");
            println!("  listen:        {}", config.server.listen);
            println!(
                "  replicate:     {} (timeout {}s)",
                config.replicate.url, config.replicate.timeout_secs
            );
            println!(
                "  gemini:        {} (model {}, key {})",
                config.gemini.base_url, config.gemini.default_model, config.gemini.key_source
            );
            println!(
                "  ollama:        {} (model {})",
                config.ollama.url, config.ollama.default_model
            );
            println!(
                "  retry:         {} retries, {}ms backoff unit",
                config.retry.max_retries, config.retry.backoff_unit_ms
            );
            Ok(())
        }
    }
}
