//! The `.skillet-source.json` sidecar recording where an installed skill
//! came from.

use std::path::Path;

use {
    serde::{Deserialize, Serialize},
    skillet_common::{FileSystem, fs::write_atomic},
    skillet_sources::ResolvedSource,
    tracing::debug,
};

use crate::{
    error::{Context, Result},
    types::InstallMethod,
};

pub const SIDECAR_FILE: &str = ".skillet-source.json";

/// Source type recorded for skills without a readable sidecar.
pub const UNKNOWN_SOURCE_TYPE: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    #[serde(rename = "type")]
    pub source_type: String,
    pub url: String,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    /// Repository subdirectory the skill was installed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subpath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    pub install_method: InstallMethod,
}

impl Provenance {
    pub fn from_resolved(source: &ResolvedSource, install_method: InstallMethod) -> Self {
        Self {
            source_type: source.source_type.to_string(),
            url: source.url.clone(),
            git_ref: source.git_ref.clone(),
            subpath: source.subpath.clone(),
            digest: source.digest.clone(),
            install_method,
        }
    }
}

/// Write the sidecar into `skill_dir` (following a symlinked directory).
pub fn write_provenance(
    fs: &dyn FileSystem,
    skill_dir: &Path,
    provenance: &Provenance,
) -> Result<()> {
    let mut json = serde_json::to_vec_pretty(provenance)
        .context("cannot encode provenance")?;
    json.push(b'\n');
    write_atomic(fs, &skill_dir.join(SIDECAR_FILE), &json)?;
    Ok(())
}

/// The sidecar in `skill_dir`, `None` when absent or malformed.
pub fn read_provenance(fs: &dyn FileSystem, skill_dir: &Path) -> Option<Provenance> {
    let path = skill_dir.join(SIDECAR_FILE);
    let bytes = fs.read(&path).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(provenance) => Some(provenance),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "ignoring malformed provenance sidecar");
            None
        },
    }
}
