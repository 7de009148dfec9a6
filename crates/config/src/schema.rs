/// Config schema types (archive limits, OCI transport, install defaults, storage).
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkilletConfig {
    pub archive: ArchiveConfig,
    pub oci: OciConfig,
    pub install: InstallConfig,
    pub storage: StorageConfig,
}

/// Ceilings applied to HTTP archive sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Abort the download once this many bytes have been received. Defaults to 50 MiB.
    pub max_download_bytes: u64,
    /// Reject archives with more entries than this. Defaults to 10 000.
    pub max_entries: usize,
    /// Reject archives whose extracted files sum to more than this. Defaults to 200 MiB.
    pub max_extracted_bytes: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_download_bytes: 50 * 1024 * 1024,
            max_entries: 10_000,
            max_extracted_bytes: 200 * 1024 * 1024,
        }
    }
}

/// OCI registry transport options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OciConfig {
    /// Registry hosts (with optional port) always contacted over plain HTTP.
    pub insecure_registries: Vec<String>,
    /// Use plain HTTP for every registry.
    pub force_http: bool,
}

/// How an installed skill is materialized in an agent directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallMethodPreference {
    Symlink,
    Copy,
}

/// Defaults for the `add` flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Agent ids used when none are passed on the command line.
    pub agents: Vec<String>,
    /// Install method used without prompting.
    pub method: Option<InstallMethodPreference>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Override for the content-addressed storage root.
    pub root: Option<PathBuf>,
}
