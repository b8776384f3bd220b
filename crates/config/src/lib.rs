//! Configuration loading, validation and env substitution.
//!
//! Config files: `config.json`, `config.toml`, `config.yaml` or `config.yml`.
//! Searched in `./` then `~/.config/mirror/`, unless a path is given explicitly.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{config_dir, discover_config, find_config_file, load_config},
    schema::{
        AuthorRule, EmbedColor, EmbedFields, EmbedOptions, MetricsConfig, MirrorConfig,
        RedirectConfig, RelayConfig, RouteOptions, StatusConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
