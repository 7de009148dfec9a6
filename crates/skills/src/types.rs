use std::{collections::BTreeMap, fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

/// File every skill directory carries.
pub const SKILL_FILE: &str = "SKILL.md";

/// Reserved boolean key inside `metadata`.
pub const INTERNAL_METADATA_KEY: &str = "internal";

/// A validated `SKILL.md`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkillDescriptor {
    pub name: String,
    pub description: String,
    pub license: Option<String>,
    pub compatibility: Option<String>,
    /// Accepted as either `allowed-tools` or `allowedTools`.
    pub allowed_tools: Option<String>,
    /// String-valued metadata, excluding the reserved `internal` flag.
    pub metadata: BTreeMap<String, String>,
    pub internal: Option<bool>,
    pub body: String,
}

/// A skill found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSkill {
    pub descriptor: SkillDescriptor,
    /// Directory holding the `SKILL.md`.
    pub path: PathBuf,
}

impl DiscoveredSkill {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// How an installed skill is materialized in an agent directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallMethod {
    #[default]
    Symlink,
    Copy,
}

impl InstallMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Symlink => "symlink",
            Self::Copy => "copy",
        }
    }
}

impl fmt::Display for InstallMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "symlink" => Ok(Self::Symlink),
            "copy" => Ok(Self::Copy),
            other => Err(format!("unknown install method '{other}'")),
        }
    }
}

impl From<skillet_config::InstallMethodPreference> for InstallMethod {
    fn from(pref: skillet_config::InstallMethodPreference) -> Self {
        match pref {
            skillet_config::InstallMethodPreference::Symlink => Self::Symlink,
            skillet_config::InstallMethodPreference::Copy => Self::Copy,
        }
    }
}

/// Project-local or user-global installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Project,
    Global,
}
