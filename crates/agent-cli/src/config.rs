//! Startup Configuration
//!
//! Everything is fixed at startup from environment variables; `main`
//! loads `.env` first so a project-local file works too.

use std::str::FromStr;

use agent_core::{GenerationOptions, tool::DEFAULT_MAX_READ_BYTES};
use agent_runtime::OllamaConfig;
use anyhow::{Context, Result};

/// Resolved CLI configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub ollama: OllamaConfig,
    pub generation: GenerationOptions,
    pub max_follow_ups: usize,
    pub max_read_bytes: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let ollama = OllamaConfig::from_lookup(&lookup)?;

        let mut generation = GenerationOptions::default();
        if let Some(model) = lookup("OLLAMA_MODEL").filter(|m| !m.trim().is_empty()) {
            generation.model = model.trim().to_string();
        }
        if let Some(temperature) = parse(&lookup, "AGENT_TEMPERATURE")? {
            generation.temperature = temperature;
        }
        if let Some(num_ctx) = parse(&lookup, "AGENT_NUM_CTX")? {
            generation.num_ctx = num_ctx;
        }

        Ok(Self {
            ollama,
            generation,
            max_follow_ups: parse(&lookup, "AGENT_MAX_FOLLOW_UPS")?.unwrap_or(0),
            max_read_bytes: parse(&lookup, "AGENT_MAX_READ_BYTES")?
                .unwrap_or(DEFAULT_MAX_READ_BYTES),
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .with_context(|| format!("invalid value for {key}: {raw:?}"))
        })
        .transpose()
}
