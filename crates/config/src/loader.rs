use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::SkilletConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "skillet.toml",
    "skillet.yaml",
    "skillet.yml",
    "skillet.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<SkilletConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&substitute_env(&raw), path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `<cwd>/skillet.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/skillet/skillet.{toml,yaml,yml,json}` (user-global)
///
/// Returns `SkilletConfig::default()` if no config file is found or the one
/// found cannot be parsed.
pub fn discover_and_load(cwd: &Path) -> SkilletConfig {
    let Some(path) = find_config_file(cwd) else {
        debug!("no config file found, using defaults");
        return SkilletConfig::default();
    };

    debug!(path = %path.display(), "loading config");
    load_config(&path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
        SkilletConfig::default()
    })
}

/// First existing config file in the standard locations.
pub fn find_config_file(cwd: &Path) -> Option<PathBuf> {
    let project = CONFIG_FILENAMES.iter().map(|name| cwd.join(name));
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    project.chain(global).find(|p| p.is_file())
}

/// Returns the user-global config directory (`~/.config/skillet/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "skillet").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> Result<SkilletConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        other => Err(Error::UnsupportedFormat(other.to_string())),
    }
}
