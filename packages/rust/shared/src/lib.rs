//! Shared types, error model, and configuration for TicketForge.
//!
//! This crate is the foundation depended on by all other TicketForge crates.
//! It provides:
//! - [`TicketForgeError`] — the unified error type
//! - Domain types ([`TicketRecord`], [`KbArticle`], [`GroupKey`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, OllamaConfig, SamplingConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{Result, TicketForgeError};
pub use types::{
    GroupKey, KbArticle, NO_ERROR_CODE, TicketRecord, coerced_level, priority_label,
    priority_level,
};
