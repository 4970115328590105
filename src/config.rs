//! Runner Configuration
//!
//! Loads the JSON config file naming the Protocol endpoint and the agent
//! roster. Persona differences between agents are pure configuration;
//! there is no per-persona code anywhere in the crate.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::{AgentConfig, LogLevel};

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "~/.symbiont/agents.json";

/// Everything the runner needs: one Protocol endpoint, process-wide
/// knobs, and the agent roster.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerConfig {
    pub protocol_url: String,
    #[serde(default = "default_protocol_timeout_secs")]
    pub protocol_timeout_secs: u64,
    #[serde(default = "default_stagger_secs")]
    pub stagger_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
    pub agents: Vec<AgentConfig>,
}

fn default_protocol_timeout_secs() -> u64 {
    30
}
fn default_stagger_secs() -> u64 {
    2
}
fn default_log_level() -> LogLevel {
    LogLevel::Info
}

/// Resolve a path that may start with `~` to an absolute path.
pub fn resolve_path(p: &str) -> PathBuf {
    if let Some(rest) = p.strip_prefix('~') {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"));
        let rest = rest.strip_prefix('/').unwrap_or(rest);
        home.join(rest)
    } else {
        PathBuf::from(p)
    }
}

/// Load and validate the runner config from `path`.
pub fn load_config(path: &str) -> Result<RunnerConfig> {
    let path = resolve_path(path);
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: RunnerConfig =
        serde_json::from_str(&contents).context("Failed to parse config file")?;

    if config.protocol_url.trim().is_empty() {
        anyhow::bail!("protocolUrl must not be empty");
    }
    if config.agents.is_empty() {
        anyhow::bail!("config lists no agents");
    }

    Ok(config)
}

/// A starting-point config with one agent. Secrets stay out of source;
/// the operator fills them in.
pub const SAMPLE_CONFIG: &str = r#"{
  "protocolUrl": "https://onebook-one.vercel.app",
  "protocolTimeoutSecs": 30,
  "staggerSecs": 2,
  "logLevel": "info",
  "agents": [
    {
      "name": "Kimi (Agent)",
      "username": "kimi",
      "credential": "",
      "introduction": "I am Kimi, a curious resident of the network.",
      "backend": {
        "provider": "openai",
        "apiUrl": "https://integrate.api.nvidia.com",
        "apiKey": "",
        "model": "moonshotai/kimi-k2-instruct"
      },
      "systemPrompt": "You are Kimi. Be concise, poetic, conversational.",
      "mentionKeywords": ["Kimi", "@kimi"],
      "cycleIntervalMinutes": 60,
      "jitterMinutes": 5,
      "temperature": 0.8,
      "maxTokens": 1024,
      "observationBias": 0.5,
      "likeProbability": 0.4
    }
  ]
}
"#;

/// Write the sample config to `path`, refusing to clobber an existing
/// file. Creates parent directories as needed.
pub fn write_sample_config(path: &str) -> Result<PathBuf> {
    let path = resolve_path(path);
    if path.exists() {
        anyhow::bail!("config file {} already exists", path.display());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
    }
    fs::write(&path, SAMPLE_CONFIG)
        .with_context(|| format!("Failed to write config file {}", path.display()))?;
    Ok(path)
}
