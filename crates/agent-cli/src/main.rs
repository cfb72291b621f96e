//! coding-agent
//!
//! Interactive chat with a local Ollama model that can read and write
//! files in the current directory through tool markup in its replies.

mod config;
mod repl;

use std::sync::Arc;

use agent_core::{AgentBuilder, FileTools, LlmProvider};
use agent_runtime::OllamaProvider;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::repl::Repl;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Logs go to stderr so they stay out of the chat transcript
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env()?;

    // Initialize LLM provider
    let provider = Arc::new(OllamaProvider::from_config(config.ollama.clone())?);

    // Verify Ollama connection and model
    let model = &config.generation.model;
    match provider.health_check().await {
        Ok(true) => {
            tracing::info!(url = %config.ollama.base_url(), "connected to Ollama");
            match provider.has_model(model).await {
                Ok(true) => tracing::info!(%model, "model available"),
                Ok(false) => {
                    tracing::warn!("Model '{}' not found on the Ollama server", model);
                    tracing::warn!("  Pull it first: ollama pull {}", model);
                }
                Err(e) => tracing::warn!(error = %e, "could not list Ollama models"),
            }
        }
        Ok(false) | Err(_) => {
            tracing::warn!("Ollama not reachable at {}", config.ollama.base_url());
            tracing::warn!("  Make sure Ollama is running: ollama serve");
        }
    }

    let tools = FileTools::new().with_max_read_bytes(config.max_read_bytes);
    let agent = AgentBuilder::new()
        .provider(provider)
        .tools(tools)
        .generation(config.generation)
        .max_follow_ups(config.max_follow_ups)
        .build()?;

    Repl::new(agent).run().await
}
