use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kind of upstream a skill was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Git,
    Http,
    Oci,
    Local,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Http => "http",
            Self::Oci => "oci",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "git" => Ok(Self::Git),
            "http" => Ok(Self::Http),
            "oci" => Ok(Self::Oci),
            "local" => Ok(Self::Local),
            other => Err(Error::invalid_source(other, "unknown source type")),
        }
    }
}

/// Result of resolving a source string into local content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub source_type: SourceType,
    /// Canonical, scheme-qualified URL.
    pub url: String,
    /// Branch or tag, git only.
    pub git_ref: Option<String>,
    /// Repository subdirectory the content was taken from, git only.
    pub subpath: Option<String>,
    /// Commit SHA (git), manifest digest (OCI) or archive digest (HTTP).
    pub digest: Option<String>,
    /// Directory containing one or more skill directories.
    pub content_path: PathBuf,
    /// Scratch directory created for this resolution, if any.
    pub scratch_dir: Option<PathBuf>,
}

impl ResolvedSource {
    /// `type:url:ref:digest`, the identity the storage root is keyed by.
    pub fn source_id(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.source_type,
            self.url,
            self.git_ref.as_deref().unwrap_or(""),
            self.digest.as_deref().unwrap_or("")
        )
    }
}

/// Ceilings enforced while downloading and unpacking archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLimits {
    pub max_download_bytes: u64,
    pub max_entries: usize,
    pub max_extracted_bytes: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_download_bytes: 50 * 1024 * 1024,
            max_entries: 10_000,
            max_extracted_bytes: 200 * 1024 * 1024,
        }
    }
}

/// Inputs shared by every resolver.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Parent of the per-operation scratch directories.
    pub temp_root: PathBuf,
    /// Base for relative local paths.
    pub cwd: PathBuf,
    /// Expansion target for `~/` paths.
    pub home_dir: Option<PathBuf>,
    pub limits: ArchiveLimits,
    /// Contact every OCI registry over plain HTTP.
    pub force_http: bool,
    /// OCI registries contacted over plain HTTP.
    pub insecure_registries: Vec<String>,
}

impl ResolveOptions {
    pub fn new(temp_root: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            temp_root: temp_root.into(),
            cwd: cwd.into(),
            home_dir: None,
            limits: ArchiveLimits::default(),
            force_http: false,
            insecure_registries: Vec::new(),
        }
    }

    pub fn oci_insecure(&self, registry: &str) -> bool {
        self.force_http || self.insecure_registries.iter().any(|r| r == registry)
    }
}

/// Create a uniquely named scratch directory `<temp_root>/skillet-<kind>-<ms>-<rand>`.
///
/// The directory is not removed by the resolvers; the caller owns it.
pub(crate) fn make_scratch_dir(temp_root: &Path, kind: &str) -> Result<PathBuf> {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let dir = temp_root.join(format!("skillet-{kind}-{millis}-{}", &suffix[..8]));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
