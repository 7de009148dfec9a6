//! Configuration loading, env substitution and validation.
//!
//! Config files: `skillet.toml`, `skillet.yaml`, `skillet.yml` or `skillet.json`.
//! Searched in the working directory, then in the user config directory
//! (`~/.config/skillet/` on Linux).
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{config_dir, discover_and_load, load_config},
    schema::{
        ArchiveConfig, InstallConfig, InstallMethodPreference, OciConfig, SkilletConfig,
        StorageConfig,
    },
    validate::{Diagnostic, Severity, validate},
};
