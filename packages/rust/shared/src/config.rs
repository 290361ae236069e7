//! Application configuration for TicketForge.
//!
//! User config lives at `~/.ticketforge/ticketforge.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TicketForgeError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "ticketforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".ticketforge";

// ---------------------------------------------------------------------------
// Config structs (matching ticketforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Run-size defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Ollama endpoint and model settings.
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Sampling options for ticket generation.
    #[serde(default = "SamplingConfig::tickets")]
    pub sampling: SamplingConfig,

    /// Sampling options for KB consolidation.
    #[serde(default = "SamplingConfig::kb")]
    pub kb_sampling: SamplingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            defaults: DefaultsConfig::default(),
            ollama: OllamaConfig::default(),
            sampling: SamplingConfig::tickets(),
            kb_sampling: SamplingConfig::kb(),
        }
    }
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Output directory for the generated tables.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Total number of tickets a `generate` run produces.
    #[serde(default = "default_total_tickets")]
    pub total_tickets: u32,

    /// Tickets requested per model call.
    #[serde(default = "default_tickets_per_call")]
    pub tickets_per_call: u32,

    /// Cap on representative tickets embedded in one consolidation prompt.
    #[serde(default = "default_max_tickets_per_prompt")]
    pub max_tickets_per_prompt: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            total_tickets: default_total_tickets(),
            tickets_per_call: default_tickets_per_call(),
            max_tickets_per_prompt: default_max_tickets_per_prompt(),
        }
    }
}

fn default_output_dir() -> String {
    "output".into()
}
fn default_total_tickets() -> u32 {
    20
}
fn default_tickets_per_call() -> u32 {
    5
}
fn default_max_tickets_per_prompt() -> u32 {
    10
}

/// `[ollama]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL of the Ollama server.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for ticket generation.
    #[serde(default = "default_ticket_model")]
    pub ticket_model: String,

    /// Model used for KB consolidation.
    #[serde(default = "default_ticket_model")]
    pub kb_model: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ticket_model: default_ticket_model(),
            kb_model: default_ticket_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}
fn default_ticket_model() -> String {
    "llama3.1:8b-instruct-q4_K_M".into()
}
fn default_timeout_secs() -> u64 {
    600
}

/// `[sampling]` / `[kb_sampling]` sections — the generation-option snapshot
/// sent with every model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub top_p: f32,
    /// Context window in tokens (`num_ctx`).
    pub num_ctx: u32,
    pub repeat_penalty: f32,
    /// Fixed seed forwarded to the model; also seeds the process RNG.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    /// Predicted-token cap (`num_predict`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

impl SamplingConfig {
    /// Defaults for ticket generation.
    pub fn tickets() -> Self {
        Self {
            temperature: 0.2,
            top_p: 0.9,
            num_ctx: 2048,
            repeat_penalty: 1.1,
            seed: Some(12345),
            num_predict: Some(1024),
        }
    }

    /// Defaults for KB consolidation: larger context, no fixed seed.
    pub fn kb() -> Self {
        Self {
            temperature: 0.5,
            top_p: 0.9,
            num_ctx: 4096,
            repeat_penalty: 1.1,
            seed: None,
            num_predict: Some(1500),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.ticketforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TicketForgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.ticketforge/ticketforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| TicketForgeError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        TicketForgeError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| TicketForgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| TicketForgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| TicketForgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("localhost:11434"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.total_tickets, 20);
        assert_eq!(parsed.defaults.tickets_per_call, 5);
        assert_eq!(parsed.ollama.timeout_secs, 600);
    }

    #[test]
    fn sampling_sections_have_distinct_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.sampling.temperature, 0.2);
        assert_eq!(config.sampling.seed, Some(12345));
        assert_eq!(config.kb_sampling.temperature, 0.5);
        assert_eq!(config.kb_sampling.seed, None);
        assert_eq!(config.kb_sampling.num_ctx, 4096);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
total_tickets = 100

[ollama]
ticket_model = "phi3:3.8b"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.total_tickets, 100);
        assert_eq!(config.defaults.tickets_per_call, 5);
        assert_eq!(config.ollama.ticket_model, "phi3:3.8b");
        assert_eq!(config.ollama.base_url, "http://localhost:11434");
        assert_eq!(config.sampling.num_ctx, 2048);
    }
}
